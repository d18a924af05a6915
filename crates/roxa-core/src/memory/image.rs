// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Image save and restore.
//!
//! Saving walks the root set with a copying mark handler (the envelope
//! machinery without singleton proxies: the singletons themselves belong in
//! the image) and prepends the [`ImageHeader`] control block. The save
//! array - the root table - is an ordinary array record whose offset the
//! header carries.
//!
//! Restoring validates the header sentinels against the running build,
//! then performs the single linear scan the format guarantees: each record
//! becomes an old-space object at its own offset, and every reference field
//! `offset` becomes `(old segment, offset)`. Type identity survives via the
//! behaviour tag; decode through the current build's tag table is the
//! vtable rewrite.

use log::debug;

use roxa_abi::image::{ImageHeader, ImageMismatch};

use crate::object::{HeaderFlags, ObjectCell, ObjectData, ObjectHeader, TypeTag};
use crate::types::ObjRef;

use super::envelope::Envelope;
use super::segment::{MemorySegment, SetKind};
use super::wire::{self, CodeResolver, RecordKind, WireError, record_len};
use super::{Memory, MemoryError};

/// Save-array slots, in order.
const SAVE_ENVIRONMENT: usize = 0;
const SAVE_SYSTEM: usize = 1;
const SAVE_NIL: usize = 2;
const SAVE_TRUE: usize = 3;
const SAVE_FALSE: usize = 4;
const SAVE_GLOBAL_STRINGS: usize = 5;
const SAVE_SLOTS: usize = 6;

/// Errors raised while restoring an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreError {
    /// A header sentinel does not match the running build.
    Mismatch(ImageMismatch),
    /// The object data is malformed.
    Wire(WireError),
    /// The pool refused the old-space segment.
    Storage(MemoryError),
}

impl core::fmt::Display for RestoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Mismatch(e) => write!(f, "{e}"),
            Self::Wire(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl From<ImageMismatch> for RestoreError {
    fn from(e: ImageMismatch) -> Self {
        Self::Mismatch(e)
    }
}

impl From<WireError> for RestoreError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

impl From<MemoryError> for RestoreError {
    fn from(e: MemoryError) -> Self {
        Self::Storage(e)
    }
}

/// Serialise the startup object graph.
///
/// # Errors
///
/// Propagates allocation failure for the temporary save array.
pub fn save_image(memory: &mut Memory) -> Result<Vec<u8>, MemoryError> {
    // Collect the interned strings into a serialisable directory.
    let strings_dir = memory.new_directory()?;
    let names: Vec<(Box<str>, ObjRef)> = memory
        .global_strings()
        .map(|(k, v)| (k.into(), v))
        .collect();
    for (name, value) in names {
        memory.dir_put(strings_dir, &name, value);
    }

    let mut save_array = vec![ObjRef::NULL; SAVE_SLOTS];
    save_array[SAVE_ENVIRONMENT] = memory.environment();
    save_array[SAVE_SYSTEM] = memory.system();
    save_array[SAVE_NIL] = memory.nil();
    save_array[SAVE_TRUE] = memory.true_object();
    save_array[SAVE_FALSE] = memory.false_object();
    save_array[SAVE_GLOBAL_STRINGS] = strings_dir;
    let root = memory.new_array(save_array)?;

    // No singleton proxies: the image is where the singletons live.
    let envelope = Envelope::new(memory, false).flatten(root);
    // Strip the envelope prefix; the image header replaces it.
    let (lengths, records) = envelope.split_at(16);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&lengths[0..8]);
    let total = u64::from_le_bytes(len_bytes);
    len_bytes.copy_from_slice(&lengths[8..16]);
    let root_offset = u64::from_le_bytes(len_bytes);

    let header = ImageHeader::current(TypeTag::table_digest(), total, root_offset);
    let mut out = Vec::with_capacity(ImageHeader::SIZE + records.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(records);

    debug!("image saved: {} bytes, {} records region", out.len(), total);
    Ok(out)
}

/// Restore a saved image, attaching it as the old-space segment.
///
/// # Errors
///
/// Returns [`RestoreError`] when a sentinel mismatches, the data is
/// truncated, or the pool cannot hold the segment.
pub fn restore_image(
    memory: &mut Memory,
    bytes: &[u8],
    resolver: &mut dyn CodeResolver,
) -> Result<(), RestoreError> {
    let header = ImageHeader::from_bytes(bytes).ok_or(ImageMismatch::BadMagic)?;
    header.validate(TypeTag::table_digest())?;

    let total = header.image_length as usize;
    if ImageHeader::SIZE + total > bytes.len() {
        return Err(WireError::Truncated.into());
    }
    let records = &bytes[ImageHeader::SIZE..ImageHeader::SIZE + total];

    if !memory.pool_mut().commit(total) {
        return Err(MemoryError::OutOfStorage.into());
    }
    let old_segment = memory.attach_old_segment(MemorySegment::new(SetKind::OldSpace, total));

    // The single linear scan: every record becomes an old-space object at
    // its own offset; reference offsets map straight into the segment.
    let mark_word = memory.mark_word();
    let mut offset = 0usize;
    while offset < total {
        let record = wire::read_record_header(records, offset)?;
        if record.kind != RecordKind::Cell {
            return Err(WireError::BadRecord.into());
        }
        let tag = TypeTag::from_raw(record.tag).ok_or(WireError::BadRecord)?;
        let body = wire::record_body(records, offset, &record);
        let mut into_segment = |raw: u64| ObjRef::new(old_segment, raw as u32);
        let data = wire::decode_body(memory, tag, body, &mut into_segment, resolver)?;

        let length = record_len(record.body_len);
        let mut cell = ObjectCell::new(data, mark_word);
        let mut flags = cell.header.flags();
        flags.insert(HeaderFlags::OLD_SPACE);
        cell.header = ObjectHeader::new(tag, length, flags);

        memory
            .segment_mut(old_segment)
            .carve(offset as u32, cell, crate::types::MINIMUM_OBJECT_SIZE);
        offset += length;
    }

    // Re-anchor the globals from the save array.
    let root = ObjRef::new(old_segment, header.save_array_offset as u32);
    let slots: Vec<ObjRef> = match &memory.cell(root).data {
        ObjectData::Array(items) if items.len() >= SAVE_SLOTS => items.clone(),
        _ => return Err(WireError::BadRecord.into()),
    };
    memory.set_restored_globals(
        slots[SAVE_ENVIRONMENT],
        slots[SAVE_SYSTEM],
        slots[SAVE_NIL],
        slots[SAVE_TRUE],
        slots[SAVE_FALSE],
    );
    memory.restore_global_strings(slots[SAVE_GLOBAL_STRINGS]);

    debug!("image restored: {total} bytes of old space");
    Ok(())
}
