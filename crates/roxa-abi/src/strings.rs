// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Length-prefixed byte strings for the external function ABI.
//!
//! Rexx strings are counted, not NUL-terminated. A registered external
//! function receives its arguments as `ConstRxString` values and returns its
//! result through a caller-provided `RxString` that it may reallocate.

use core::ptr;

/// A mutable length-prefixed byte string crossing the C boundary.
///
/// The callee may replace `strptr` with memory obtained from the allocator
/// designated by the host; the caller frees it with the paired deallocator.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RxString {
    /// Length of the string in bytes.
    pub strlength: usize,
    /// Pointer to the string data (not NUL-terminated).
    pub strptr: *mut u8,
}

impl RxString {
    /// An empty string with a null data pointer.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            strlength: 0,
            strptr: ptr::null_mut(),
        }
    }

    /// Check whether the data pointer is null.
    ///
    /// A null pointer is distinct from an empty string: it signals an
    /// omitted value rather than a present zero-length one.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.strptr.is_null()
    }
}

impl Default for RxString {
    fn default() -> Self {
        Self::empty()
    }
}

/// An immutable length-prefixed byte string crossing the C boundary.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ConstRxString {
    /// Length of the string in bytes.
    pub strlength: usize,
    /// Pointer to the string data (not NUL-terminated).
    pub strptr: *const u8,
}

impl ConstRxString {
    /// An empty string with a null data pointer.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            strlength: 0,
            strptr: ptr::null(),
        }
    }

    /// Check whether the data pointer is null.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.strptr.is_null()
    }

    /// Borrow the string contents as a byte slice.
    ///
    /// # Safety
    ///
    /// `strptr` must point to `strlength` readable bytes that outlive the
    /// returned slice.
    #[must_use]
    pub const unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.strptr.is_null() {
            &[]
        } else {
            // SAFETY: guaranteed by the caller
            unsafe { core::slice::from_raw_parts(self.strptr, self.strlength) }
        }
    }
}

impl Default for ConstRxString {
    fn default() -> Self {
        Self::empty()
    }
}
