// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for envelope flatten/unflatten.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::execution::number::{NumericForm, RexxNumber};
use crate::object::ObjectData;
use crate::types::ObjRef;

use super::envelope::{flatten, unflatten};
use super::sets::PoolBoundaryPolicy;
use super::wire::{NoCode, WireError};
use super::{Memory, RootList};

fn memory() -> Memory {
    Memory::create(PoolBoundaryPolicy::default())
}

#[test]
fn string_roundtrip() {
    let mut memory = memory();
    let original = memory.new_string("payload").unwrap();
    let bytes = flatten(&memory, original);

    let restored = unflatten(&mut memory, &bytes, &mut NoCode).unwrap();
    assert_ne!(restored, original);
    assert_eq!(memory.string_text(restored), Some("payload"));
}

#[test]
fn graph_roundtrip_preserves_structure() {
    let mut memory = memory();
    let name = memory.new_string("deep").unwrap();
    let number = memory.new_number(RexxNumber::from_integer(123)).unwrap();
    let inner = memory.new_array(vec![name, number]).unwrap();
    let dir = memory.new_directory().unwrap();
    memory.dir_put(dir, "LIST", inner);
    memory.dir_put(dir, "NAME", name);

    let bytes = flatten(&memory, dir);
    let restored = unflatten(&mut memory, &bytes, &mut NoCode).unwrap();

    let list = memory.dir_get(restored, "LIST").unwrap();
    let items = memory.array_items(list).to_vec();
    assert_eq!(items.len(), 2);
    assert_eq!(memory.string_text(items[0]), Some("deep"));
    let value = memory.number_value(items[1]).unwrap();
    assert_eq!(value.format(9, NumericForm::Scientific), "123");

    // Shared references stay shared after the rewrite pass.
    assert_eq!(memory.dir_get(restored, "NAME"), Some(items[0]));
}

#[test]
fn cycles_survive() {
    let mut memory = memory();
    let a = memory.new_array(vec![]).unwrap();
    let b = memory.new_array(vec![a]).unwrap();
    memory.array_append(a, b);

    let bytes = flatten(&memory, a);
    let restored = unflatten(&mut memory, &bytes, &mut NoCode).unwrap();
    let restored_b = memory.array_items(restored)[0];
    assert_eq!(memory.array_items(restored_b)[0], restored);
}

#[test]
fn singletons_cross_by_identity() {
    let mut memory = memory();
    let nil = memory.nil();
    let true_obj = memory.true_object();
    let array = memory.new_array(vec![nil, true_obj, memory.false_object()]).unwrap();

    let bytes = flatten(&memory, array);
    let restored = unflatten(&mut memory, &bytes, &mut NoCode).unwrap();
    let items = memory.array_items(restored);
    // Proxies re-resolve to the process singletons, not copies.
    assert_eq!(items[0], memory.nil());
    assert_eq!(items[1], memory.true_object());
    assert_eq!(items[2], memory.false_object());
}

#[test]
fn unflattened_graph_survives_collection() {
    let mut memory = memory();
    let original = memory.new_string("live").unwrap();
    let bytes = flatten(&memory, original);
    let restored = unflatten(&mut memory, &bytes, &mut NoCode).unwrap();

    let roots = [restored];
    memory.collect(&mut RootList(&roots));
    assert!(memory.is_resident(restored));
    assert_eq!(memory.string_text(restored), Some("live"));
}

#[test]
fn truncated_envelope_is_rejected() {
    let mut memory = memory();
    let original = memory.new_string("x").unwrap();
    let bytes = flatten(&memory, original);

    let result = unflatten(&mut memory, &bytes[..8], &mut NoCode);
    assert!(result.is_err());

    let result = unflatten(&mut memory, &bytes[..bytes.len() - 4], &mut NoCode);
    assert!(result.is_err());
}

#[test]
fn code_proxy_requires_a_resolver() {
    let mut memory = memory();
    let code = crate::parser::translate_code(&mut memory, "R", "return 1").unwrap();
    let routine = memory
        .allocate(ObjectData::Routine(crate::object::RoutineData {
            name: "R".into(),
            code,
        }))
        .unwrap();

    let bytes = flatten(&memory, routine);
    let result = unflatten(&mut memory, &bytes, &mut NoCode);
    assert_eq!(
        result,
        Err(super::envelope::EnvelopeError::Wire(
            WireError::UnresolvedCode
        ))
    );

    let mut resolver = super::wire::TranslatingResolver;
    let restored = unflatten(&mut memory, &bytes, &mut resolver).unwrap();
    match &memory.cell(restored).data {
        ObjectData::Routine(data) => assert_eq!(data.name.as_ref(), "R"),
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn null_fields_stay_null() {
    let mut memory = memory();
    let stem = memory.allocate(ObjectData::new_stem("S.")).unwrap();
    let bytes = flatten(&memory, stem);
    let restored = unflatten(&mut memory, &bytes, &mut NoCode).unwrap();
    match &memory.cell(restored).data {
        ObjectData::Stem(data) => {
            assert_eq!(data.name.as_ref(), "S.");
            assert!(data.default.is_null());
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn flatten_result_fields() {
    let mut memory = memory();
    let r = memory.new_string("abc").unwrap();
    let bytes = flatten(&memory, r);
    // Prefix: total length then root offset (the first record).
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[8..16]);
    assert_eq!(u64::from_le_bytes(buf), 0);
    assert!(ObjRef::NULL.is_null());
}
