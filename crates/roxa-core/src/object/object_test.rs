// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the universal object model.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;

use crate::execution::number::RexxNumber;
use crate::types::{MINIMUM_OBJECT_SIZE, OBJECT_GRAIN, ObjRef, SegmentId, is_valid_size};

use super::{ObjectCell, ObjectData, TypeTag};

fn r(offset: u32) -> ObjRef {
    ObjRef::new(SegmentId::new(0), offset)
}

#[test]
fn tag_roundtrip() {
    for tag in TypeTag::ALL {
        assert_eq!(TypeTag::from_raw(tag as u8), Some(tag));
    }
    assert!(TypeTag::from_raw(200).is_none());
}

#[test]
fn table_digest_is_stable() {
    let a = TypeTag::table_digest();
    let b = TypeTag::table_digest();
    assert_eq!(a, b);
    assert_ne!(a, 0);
}

#[test]
fn header_sizes_are_grained() {
    let cell = ObjectCell::new(ObjectData::String("x".into()), false);
    assert!(is_valid_size(cell.header.size()));
    assert!(cell.header.size() >= MINIMUM_OBJECT_SIZE);

    let big = ObjectCell::new(ObjectData::Buffer(vec![0u8; 1000]), false);
    assert!(is_valid_size(big.header.size()));
    assert_eq!(big.header.size() % OBJECT_GRAIN, 0);
    assert!(big.header.size() >= 1000);
}

#[test]
fn mark_word_flips_meaning() {
    let mut cell = ObjectCell::new(ObjectData::Nil, false);
    assert!(cell.header.is_marked(false));
    assert!(!cell.header.is_marked(true));
    cell.header.set_mark(true);
    assert!(cell.header.is_marked(true));
    assert!(!cell.header.is_marked(false));
}

#[test]
fn leaf_hint_matches_bodies() {
    assert!(ObjectCell::new(ObjectData::String("s".into()), false)
        .header
        .has_no_refs());
    assert!(ObjectCell::new(
        ObjectData::Number(RexxNumber::from_integer(5)),
        false
    )
    .header
    .has_no_refs());
    assert!(!ObjectCell::new(ObjectData::Array(vec![r(0)]), false)
        .header
        .has_no_refs());
}

#[test]
fn for_each_ref_enumerates_children() {
    let mut dir = BTreeMap::new();
    dir.insert(Box::from("A"), r(0x10));
    dir.insert(Box::from("B"), r(0x20));
    let cell = ObjectCell::new(ObjectData::Directory(dir), false);

    let mut seen = Vec::new();
    cell.for_each_ref(&mut |child| seen.push(child));
    assert_eq!(seen, vec![r(0x10), r(0x20)]);
}

#[test]
fn for_each_ref_skips_null_and_weak() {
    let cell = ObjectCell::new(ObjectData::Array(vec![ObjRef::NULL, r(0x30)]), false);
    let mut seen = Vec::new();
    cell.for_each_ref(&mut |child| seen.push(child));
    assert_eq!(seen, vec![r(0x30)]);

    // Weak references never keep their referent alive.
    let weak = ObjectCell::new(ObjectData::WeakReference(r(0x40)), false);
    let mut seen = Vec::new();
    weak.for_each_ref(&mut |child| seen.push(child));
    assert!(seen.is_empty());
}

#[test]
fn map_refs_rewrites_fields() {
    let mut cell = ObjectCell::new(ObjectData::Array(vec![r(0x10), ObjRef::NULL]), false);
    cell.map_refs(&mut |old| ObjRef::new(SegmentId::new(1), old.offset()));
    match &cell.data {
        ObjectData::Array(items) => {
            assert_eq!(items[0], ObjRef::new(SegmentId::new(1), 0x10));
            assert!(items[1].is_null());
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn stem_carries_default_and_tails() {
    let mut cell = ObjectCell::new(ObjectData::new_stem("A."), false);
    match &mut cell.data {
        ObjectData::Stem(stem) => {
            assert_eq!(stem.name.as_ref(), "A.");
            assert!(stem.default.is_null());
            stem.tails.insert("1".into(), r(0x50));
        }
        other => panic!("unexpected body: {other:?}"),
    }
    let mut seen = Vec::new();
    cell.for_each_ref(&mut |child| seen.push(child));
    assert_eq!(seen, vec![r(0x50)]);
}
