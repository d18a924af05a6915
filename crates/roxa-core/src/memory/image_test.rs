// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for image save/restore.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use roxa_abi::image::{ImageHeader, ImageMismatch};

use crate::object::TypeTag;

use super::image::{RestoreError, restore_image, save_image};
use super::sets::PoolBoundaryPolicy;
use super::wire::NoCode;
use super::{Memory, RootList};

fn memory() -> Memory {
    Memory::create(PoolBoundaryPolicy::default())
}

#[test]
fn save_then_restore_rebuilds_globals() {
    let mut saver = memory();
    let marker = saver.new_string("image marker").unwrap();
    saver.dir_put(saver.environment(), "MARKER", marker);
    saver.global_name("INTERNED").unwrap();
    let bytes = save_image(&mut saver).unwrap();

    let mut restorer = memory();
    restore_image(&mut restorer, &bytes, &mut NoCode).unwrap();

    // The restored environment is old space and carries the marker.
    let environment = restorer.environment();
    assert!(restorer.cell(environment).header.is_old_space());
    let marker = restorer.dir_get(environment, "MARKER").unwrap();
    assert_eq!(restorer.string_text(marker), Some("image marker"));

    // Singletons keep their identity wiring.
    assert_eq!(restorer.dir_get(environment, "NIL"), Some(restorer.nil()));
    assert_eq!(restorer.tag(restorer.nil()), TypeTag::Nil);
    assert_eq!(restorer.boolean(true), restorer.true_object());

    // The interned string table came along.
    let again = restorer.global_name("INTERNED").unwrap();
    assert!(restorer.cell(again).header.is_old_space());

    assert!(restorer.check_ledgers());
}

#[test]
fn old_space_survives_collection_without_roots() {
    let mut saver = memory();
    let bytes = save_image(&mut saver).unwrap();

    let mut restorer = memory();
    restore_image(&mut restorer, &bytes, &mut NoCode).unwrap();
    let environment = restorer.environment();

    restorer.collect(&mut RootList(&[]));
    assert!(restorer.is_resident(environment));
    assert_eq!(
        restorer.dir_get(environment, "NIL"),
        Some(restorer.nil())
    );
}

#[test]
fn old_to_new_barrier_keeps_new_children() {
    let mut saver = memory();
    let bytes = save_image(&mut saver).unwrap();
    let mut restorer = memory();
    restore_image(&mut restorer, &bytes, &mut NoCode).unwrap();

    // An old-space container acquires a new-space reference.
    let environment = restorer.environment();
    let young = restorer.new_string("young value").unwrap();
    restorer.dir_put(environment, "YOUNG", young);

    // No explicit roots: only the old2new table keeps the child alive.
    restorer.collect(&mut RootList(&[]));
    let young = restorer.dir_get(environment, "YOUNG").unwrap();
    assert!(restorer.is_resident(young));
    assert_eq!(restorer.string_text(young), Some("young value"));

    // Subsequent cycles keep it just the same.
    restorer.collect(&mut RootList(&[]));
    assert!(restorer.is_resident(young));
}

#[test]
fn header_mismatch_aborts_restore() {
    let mut saver = memory();
    let mut bytes = save_image(&mut saver).unwrap();

    // Corrupt the class-table digest sentinel.
    bytes[16] ^= 0xFF;
    let mut restorer = memory();
    let result = restore_image(&mut restorer, &bytes, &mut NoCode);
    assert_eq!(
        result,
        Err(RestoreError::Mismatch(ImageMismatch::ClassTable))
    );
}

#[test]
fn truncated_image_aborts_restore() {
    let mut saver = memory();
    let bytes = save_image(&mut saver).unwrap();
    let mut restorer = memory();
    let result = restore_image(&mut restorer, &bytes[..ImageHeader::SIZE + 8], &mut NoCode);
    assert!(result.is_err());
}

#[test]
fn not_an_image_aborts_restore() {
    let mut restorer = memory();
    let result = restore_image(&mut restorer, b"definitely not an image", &mut NoCode);
    assert_eq!(
        result,
        Err(RestoreError::Mismatch(ImageMismatch::BadMagic))
    );
}
