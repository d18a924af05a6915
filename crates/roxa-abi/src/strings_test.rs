// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the boundary string types.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::strings::{ConstRxString, RxString};

#[test]
fn empty_is_null() {
    assert!(RxString::empty().is_null());
    assert!(ConstRxString::empty().is_null());
    assert_eq!(RxString::empty().strlength, 0);
}

#[test]
fn null_reads_as_empty_slice() {
    let s = ConstRxString::empty();
    // SAFETY: a null ConstRxString yields an empty slice
    let bytes = unsafe { s.as_bytes() };
    assert!(bytes.is_empty());
}

#[test]
fn borrowed_bytes_roundtrip() {
    let data = b"RESULT";
    let s = ConstRxString {
        strlength: data.len(),
        strptr: data.as_ptr(),
    };
    // SAFETY: data outlives the borrow
    let bytes = unsafe { s.as_bytes() };
    assert_eq!(bytes, data);
}
