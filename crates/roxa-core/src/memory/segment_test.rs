// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the segment extent ledger.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::object::{ObjectCell, ObjectData};
use crate::types::{MINIMUM_OBJECT_SIZE, OBJECT_GRAIN};

use super::segment::{MemorySegment, SetKind};

const SIZE: usize = 64 * OBJECT_GRAIN;

fn cell() -> ObjectCell {
    ObjectCell::new(ObjectData::Nil, true)
}

#[test]
fn fresh_segment_is_one_dead_block() {
    let segment = MemorySegment::new(SetKind::Normal, SIZE);
    assert_eq!(segment.size(), SIZE);
    assert_eq!(segment.live_objects(), 0);
    assert_eq!(segment.dead_bytes(), SIZE);
    assert!(segment.check_ledger());
}

#[test]
fn carve_splits_the_block() {
    let mut segment = MemorySegment::new(SetKind::Normal, SIZE);
    let object = cell();
    let need = object.header.size();
    let remainder = segment.carve(0, object, MINIMUM_OBJECT_SIZE);

    let (tail_offset, tail_size) = remainder.unwrap();
    assert_eq!(tail_offset as usize, need);
    assert_eq!(tail_size, SIZE - need);
    assert_eq!(segment.live_objects(), 1);
    assert_eq!(segment.live_bytes() + segment.dead_bytes(), SIZE);
    assert!(segment.check_ledger());
}

#[test]
fn carve_absorbs_small_tails() {
    let mut segment = MemorySegment::new(SetKind::Normal, MINIMUM_OBJECT_SIZE + OBJECT_GRAIN);
    // The tail would be one grain: too small to stand alone.
    let remainder = segment.carve(0, cell(), MINIMUM_OBJECT_SIZE);
    assert!(remainder.is_none());
    let (_, object) = segment.objects().next().unwrap();
    assert_eq!(object.header.size(), MINIMUM_OBJECT_SIZE + OBJECT_GRAIN);
    assert!(segment.check_ledger());
}

#[test]
fn release_coalesces_neighbours() {
    let mut segment = MemorySegment::new(SetKind::Normal, SIZE);
    let first = cell();
    let first_size = first.header.size();
    segment.carve(0, first, MINIMUM_OBJECT_SIZE);
    let second = cell();
    let second_size = second.header.size();
    segment.carve(first_size as u32, second, MINIMUM_OBJECT_SIZE);
    let third = cell();
    segment.carve((first_size + second_size) as u32, third, MINIMUM_OBJECT_SIZE);

    // Release the middle object, then the first: the dead blocks coalesce.
    segment.release(first_size as u32);
    segment.release(0);
    let blocks: Vec<(u32, usize)> = segment.dead_blocks().collect();
    assert_eq!(blocks[0], (0, first_size + second_size));
    assert!(segment.check_ledger());
}

#[test]
fn sweep_releases_unmarked_objects() {
    let mut segment = MemorySegment::new(SetKind::Normal, SIZE);
    let marked = ObjectCell::new(ObjectData::Nil, true);
    let kept = marked.header.size();
    segment.carve(0, marked, MINIMUM_OBJECT_SIZE);
    let unmarked = ObjectCell::new(ObjectData::Nil, false);
    segment.carve(kept as u32, unmarked, MINIMUM_OBJECT_SIZE);

    let result = segment.sweep(true);
    assert_eq!(result.live_objects, 1);
    assert_eq!(result.live_bytes, kept);
    // The dead bytes cover everything the survivor does not.
    assert_eq!(result.live_bytes + result.dead_bytes, SIZE);
    assert!(segment.check_ledger());
}

#[test]
fn sweep_of_empty_segment_reports_whole_extent() {
    let mut segment = MemorySegment::new(SetKind::Large, SIZE);
    let result = segment.sweep(false);
    assert_eq!(result.live_objects, 0);
    assert_eq!(result.dead_bytes, SIZE);
    assert_eq!(result.dead_blocks.len(), 1);
}
