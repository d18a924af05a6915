// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Variable-pool request blocks.
//!
//! The variable-pool interface is a chained-request protocol: the caller
//! hands the interpreter a linked list of request blocks, each describing a
//! single fetch / set / drop / next / private operation. Per-block results
//! land in `shvret`; the call as a whole returns the bitwise OR of every
//! block's return bits.

use crate::strings::RxString;

/// Operation selector for a variable-pool request block.
///
/// The `Sym*` variants parse the name as a Rexx symbol (uppercased, compound
/// tails resolved); the direct variants use the name literally.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShvCode {
    /// Set a variable from `shvvalue`, direct name.
    Set = 0,
    /// Fetch a variable into `shvvalue`, direct name.
    Fetch = 1,
    /// Drop a variable, direct name.
    Drop = 2,
    /// Set a variable, symbolic name.
    SymSet = 3,
    /// Fetch a variable, symbolic name.
    SymFetch = 4,
    /// Drop a variable, symbolic name.
    SymDrop = 5,
    /// Fetch the next variable in the iteration.
    Next = 6,
    /// Fetch interpreter-private information by name.
    Private = 7,
}

impl ShvCode {
    /// Decode a raw request code.
    #[must_use]
    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Set),
            1 => Some(Self::Fetch),
            2 => Some(Self::Drop),
            3 => Some(Self::SymSet),
            4 => Some(Self::SymFetch),
            5 => Some(Self::SymDrop),
            6 => Some(Self::Next),
            7 => Some(Self::Private),
            _ => None,
        }
    }

    /// Whether this operation parses the name as a Rexx symbol.
    #[must_use]
    pub const fn is_symbolic(self) -> bool {
        matches!(self, Self::SymSet | Self::SymFetch | Self::SymDrop)
    }

    /// Whether this operation resets the `Next` iteration cursor.
    ///
    /// Any operation other than `Next` restarts iteration from the top.
    #[must_use]
    pub const fn resets_iteration(self) -> bool {
        !matches!(self, Self::Next)
    }
}

/// Per-block and composite return bits.
///
/// Blocks accumulate bits with bitwise OR; the chain result is the OR of all
/// blocks, so a caller can test the whole chain with a single mask.
pub struct ShvReturn;

impl ShvReturn {
    /// Operation completed.
    pub const OK: u8 = 0x00;
    /// Set created a new variable / fetch found an unassigned variable.
    pub const NEWV: u8 = 0x01;
    /// `Next` found no further variables.
    pub const LVAR: u8 = 0x02;
    /// Value was truncated into the caller's buffer.
    pub const TRUNC: u8 = 0x04;
    /// Invalid variable name.
    pub const BADN: u8 = 0x08;
    /// Out of memory while copying a value.
    pub const MEMFL: u8 = 0x10;
    /// Invalid request code.
    pub const BADF: u8 = 0x80;
}

/// A single request block in a variable-pool chain.
///
/// `shvnext` links the blocks; the chain is processed in order and
/// processing continues past per-block failures.
#[repr(C)]
#[derive(Debug)]
pub struct ShvBlock {
    /// Next block in the chain, or null.
    pub shvnext: *mut ShvBlock,
    /// Variable name.
    pub shvname: RxString,
    /// Variable value (input for set, output for fetch/next).
    pub shvvalue: RxString,
    /// Requested operation (a raw `ShvCode`).
    pub shvcode: u8,
    /// Per-block return bits (`ShvReturn`).
    pub shvret: u8,
}

impl ShvBlock {
    /// A zeroed request block with the given operation code.
    #[must_use]
    pub const fn new(code: ShvCode) -> Self {
        Self {
            shvnext: core::ptr::null_mut(),
            shvname: RxString::empty(),
            shvvalue: RxString::empty(),
            shvcode: code as u8,
            shvret: ShvReturn::OK,
        }
    }
}
