// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for signature type code decoding.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::signature::{ArgDescriptor, ArgType, OPTIONAL_FLAG, TERMINATOR, decode_signature};

#[test]
fn decode_all_known_codes() {
    for code in 0..=35u16 {
        let arg = ArgType::from_code(code).unwrap();
        assert_eq!(arg as u16, code);
    }
    assert!(ArgType::from_code(36).is_none());
}

#[test]
fn optional_bit_roundtrip() {
    let desc = ArgDescriptor::from_code(ArgType::WholeNumber as u16 | OPTIONAL_FLAG).unwrap();
    assert_eq!(desc.arg_type, ArgType::WholeNumber);
    assert!(desc.optional);
    assert_eq!(desc.to_code(), ArgType::WholeNumber as u16 | OPTIONAL_FLAG);
}

#[test]
fn pseudo_arguments() {
    assert!(ArgType::Oself.is_pseudo());
    assert!(ArgType::ArgList.is_pseudo());
    assert!(ArgType::Name.is_pseudo());
    assert!(!ArgType::StemObject.is_pseudo());
    assert!(!ArgType::CString.is_pseudo());
}

#[test]
fn decode_full_signature() {
    // int64 fn(cstring, optional wholenumber, OSELF)
    let raw = [
        ArgType::Int64 as u16,
        ArgType::CString as u16,
        ArgType::WholeNumber as u16 | OPTIONAL_FLAG,
        ArgType::Oself as u16,
        TERMINATOR,
    ];
    let mut out = [ArgDescriptor::required(ArgType::Void); 8];
    let count = decode_signature(&raw, &mut out).unwrap();
    assert_eq!(count, 4);
    assert_eq!(out[0].arg_type, ArgType::Int64);
    assert!(out[2].optional);
    assert_eq!(out[3].arg_type, ArgType::Oself);
}

#[test]
fn decode_rejects_missing_terminator() {
    let raw = [ArgType::Void as u16 | OPTIONAL_FLAG; 3];
    let mut out = [ArgDescriptor::required(ArgType::Void); 8];
    assert!(decode_signature(&raw, &mut out).is_none());
}

#[test]
fn decode_rejects_unknown_code() {
    let raw = [ArgType::Void as u16, 999, TERMINATOR];
    let mut out = [ArgDescriptor::required(ArgType::Void); 8];
    assert!(decode_signature(&raw, &mut out).is_none());
}
