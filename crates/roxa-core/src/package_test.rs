// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for package serialisation and lookup.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::instructions::RexxCode;
use crate::package::{COMPILED_SENTINEL, Package};

fn sample_package() -> Package {
    let main = RexxCode {
        name: Box::from("SAMPLE"),
        source_lines: vec![Box::from("say 'hi'"), Box::from("exit 0")],
        ..RexxCode::default()
    };
    Package {
        name: Box::from("SAMPLE"),
        main: Arc::new(main),
        routines: BTreeMap::new(),
        public_routines: BTreeMap::new(),
        classes: Vec::new(),
        requires: Vec::new(),
        libraries: Vec::new(),
        resources: BTreeMap::new(),
        options: Vec::new(),
    }
}

#[test]
fn serialize_places_sentinel_on_second_line() {
    let text = sample_package().serialize();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[1], COMPILED_SENTINEL);
    assert_eq!(lines[2], "say 'hi'");
}

#[test]
fn precompiled_payload_roundtrip() {
    let text = sample_package().serialize();
    let payload = Package::precompiled_payload(&text).unwrap();
    assert_eq!(payload, "say 'hi'\nexit 0");
}

#[test]
fn plain_source_is_not_precompiled() {
    assert!(Package::precompiled_payload("say 'hi'\nexit 0").is_none());
    assert!(Package::precompiled_payload("").is_none());
    assert!(Package::precompiled_payload("one line").is_none());
}

#[test]
fn routine_lookup() {
    let mut package = sample_package();
    let routine = crate::types::ObjRef::new(crate::types::SegmentId::new(0), 0);
    package.routines.insert(Box::from("F"), routine);
    assert_eq!(package.find_routine("F"), Some(routine));
    assert!(package.find_routine("G").is_none());
    assert!(package.find_class("F").is_none());
}
