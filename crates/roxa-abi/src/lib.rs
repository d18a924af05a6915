// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Shared ABI definitions between the Roxa interpreter core and native callers.
//!
//! This crate defines the contract crossed whenever control leaves the
//! interpreter:
//! - Length-prefixed byte strings for the registered external function ABI
//! - Variable-pool request blocks and their composite return codes
//! - System exit codes
//! - Native call signature type codes (16-bit, zero-terminated arrays)
//! - The image file header and its compatibility sentinels
//!
//! # Design Principles
//!
//! - **No dependencies**: Pure data types, 100% host-testable
//! - **Stable layout**: Boundary types use `#[repr(C)]`
//! - **64-bit only**: Roxa targets 64-bit platforms exclusively

#![no_std]

pub mod exits;
pub mod image;
pub mod pool;
pub mod signature;
pub mod strings;

#[cfg(test)]
mod image_test;
#[cfg(test)]
mod pool_test;
#[cfg(test)]
mod signature_test;
#[cfg(test)]
mod strings_test;

// Re-export commonly used types at crate root
pub use exits::ExitCode;
pub use image::ImageHeader;
pub use pool::{ShvCode, ShvReturn};
pub use signature::{ArgDescriptor, ArgType};
pub use strings::{ConstRxString, RxString};
