// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for variable-pool request block definitions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::pool::{ShvBlock, ShvCode, ShvReturn};

#[test]
fn code_roundtrip() {
    for raw in 0..=7u8 {
        let code = ShvCode::from_raw(raw).unwrap();
        assert_eq!(code as u8, raw);
    }
    assert!(ShvCode::from_raw(8).is_none());
    assert!(ShvCode::from_raw(0xFF).is_none());
}

#[test]
fn symbolic_codes() {
    assert!(ShvCode::SymSet.is_symbolic());
    assert!(ShvCode::SymFetch.is_symbolic());
    assert!(ShvCode::SymDrop.is_symbolic());
    assert!(!ShvCode::Set.is_symbolic());
    assert!(!ShvCode::Next.is_symbolic());
    assert!(!ShvCode::Private.is_symbolic());
}

#[test]
fn next_keeps_cursor() {
    assert!(!ShvCode::Next.resets_iteration());
    assert!(ShvCode::Fetch.resets_iteration());
    assert!(ShvCode::Private.resets_iteration());
}

#[test]
fn return_bits_compose() {
    let composite = ShvReturn::NEWV | ShvReturn::TRUNC;
    assert_ne!(composite & ShvReturn::NEWV, 0);
    assert_ne!(composite & ShvReturn::TRUNC, 0);
    assert_eq!(composite & ShvReturn::BADN, 0);
}

#[test]
fn new_block_is_clean() {
    let block = ShvBlock::new(ShvCode::Fetch);
    assert!(block.shvnext.is_null());
    assert!(block.shvname.is_null());
    assert_eq!(block.shvret, ShvReturn::OK);
}
