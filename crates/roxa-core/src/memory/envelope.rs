// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Envelopes: flatten and unflatten arbitrary object graphs.
//!
//! Flattening runs a copying mark handler over the graph: every reachable
//! cell is assigned a buffer offset on first sight, then written with its
//! reference fields rewritten to offsets. Process singletons (`.nil`,
//! `.true`, `.false`) cross the envelope as proxies that re-resolve to the
//! local singletons on the other side; methods and routines cross as source
//! proxies re-translated through a [`CodeResolver`].
//!
//! Unflattening is the reverse: a linear scan materialises one cell per
//! record with its references still holding raw offsets, then each cell's
//! unflatten hook (`map_refs`) rewrites them to the freshly allocated
//! references.

use std::collections::HashMap;

use crate::types::ObjRef;

use super::wire::{
    self, CodeResolver, RecordKind, SingletonId, WireError, record_len, write_record,
};
use super::{MarkHandler, Memory, MemoryError};

/// Envelope prefix: total record bytes plus the root record's offset.
const PREFIX_LEN: usize = 16;

/// Errors raised while opening an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The byte stream is malformed.
    Wire(WireError),
    /// The heap could not hold the unflattened graph.
    Storage(MemoryError),
}

impl core::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl From<WireError> for EnvelopeError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

impl From<MemoryError> for EnvelopeError {
    fn from(e: MemoryError) -> Self {
        Self::Storage(e)
    }
}

/// The flattening state: discovery order, offsets, and the write cursor.
pub struct Envelope<'m> {
    memory: &'m Memory,
    offsets: HashMap<ObjRef, u64>,
    order: Vec<ObjRef>,
    worklist: Vec<ObjRef>,
    /// Next free offset; advanced as in-flight objects are placed.
    current_offset: u64,
    proxy_singletons: bool,
}

impl MarkHandler for Envelope<'_> {
    fn mark(&mut self, r: ObjRef) {
        self.place(r);
    }
}

impl<'m> Envelope<'m> {
    /// Start an envelope over a heap.
    #[must_use]
    pub fn new(memory: &'m Memory, proxy_singletons: bool) -> Self {
        Self {
            memory,
            offsets: HashMap::new(),
            order: Vec::new(),
            worklist: Vec::new(),
            current_offset: 0,
            proxy_singletons,
        }
    }

    fn singleton_of(&self, r: ObjRef) -> Option<SingletonId> {
        if !self.proxy_singletons {
            return None;
        }
        if r == self.memory.nil() {
            Some(SingletonId::Nil)
        } else if r == self.memory.true_object() {
            Some(SingletonId::True)
        } else if r == self.memory.false_object() {
            Some(SingletonId::False)
        } else {
            None
        }
    }

    /// Assign an offset on first sight and queue the object for traversal.
    fn place(&mut self, r: ObjRef) -> u64 {
        if let Some(&offset) = self.offsets.get(&r) {
            return offset;
        }
        let offset = self.current_offset;
        self.offsets.insert(r, offset);
        self.order.push(r);

        let length = if self.singleton_of(r).is_some() {
            record_len(0)
        } else {
            // Sizing pass: reference fields are fixed-width, so a zero map
            // yields the exact body length.
            let body = wire::encode_body(&self.memory.cell(r).data, &mut |_| 0);
            record_len(body.len())
        };
        self.current_offset += length as u64;

        if self.singleton_of(r).is_none() {
            self.worklist.push(r);
        }
        offset
    }

    /// Flatten the graph reachable from `root` into a byte envelope.
    #[must_use]
    pub fn flatten(mut self, root: ObjRef) -> Vec<u8> {
        self.place(root);
        while let Some(r) = self.worklist.pop() {
            let mut children = Vec::new();
            self.memory
                .cell(r)
                .for_each_ref(&mut |child| children.push(child));
            for child in children {
                self.place(child);
            }
        }

        let mut out = Vec::with_capacity(PREFIX_LEN + self.current_offset as usize);
        out.extend_from_slice(&(self.current_offset).to_le_bytes());
        out.extend_from_slice(&self.offsets[&root].to_le_bytes());

        for r in &self.order {
            if let Some(id) = self.singleton_of(*r) {
                write_record(
                    &mut out,
                    RecordKind::Singleton,
                    wire::singleton_record_tag(id),
                    &[],
                );
            } else {
                let cell = self.memory.cell(*r);
                let body = wire::encode_body(&cell.data, &mut |child| self.offsets[&child]);
                write_record(&mut out, RecordKind::Cell, cell.header.tag() as u8, &body);
            }
        }
        out
    }
}

/// Flatten the object graph reachable from `root`.
#[must_use]
pub fn flatten(memory: &Memory, root: ObjRef) -> Vec<u8> {
    Envelope::new(memory, true).flatten(root)
}

/// Unflatten an envelope, returning the new root reference.
///
/// Allocation during unflattening never collects (references are still raw
/// offsets until the rewrite pass); the caller anchors the returned root.
///
/// # Errors
///
/// Returns [`EnvelopeError`] for malformed envelopes, unresolvable code
/// proxies, or heap exhaustion.
pub fn unflatten(
    memory: &mut Memory,
    bytes: &[u8],
    resolver: &mut dyn CodeResolver,
) -> Result<ObjRef, EnvelopeError> {
    if bytes.len() < PREFIX_LEN {
        return Err(WireError::Truncated.into());
    }
    let mut u64_at = [0u8; 8];
    u64_at.copy_from_slice(&bytes[0..8]);
    let total = u64::from_le_bytes(u64_at) as usize;
    u64_at.copy_from_slice(&bytes[8..16]);
    let root_offset = u64::from_le_bytes(u64_at);
    if PREFIX_LEN + total > bytes.len() {
        return Err(WireError::Truncated.into());
    }
    let records = &bytes[PREFIX_LEN..PREFIX_LEN + total];

    // Pass one: materialise every record; reference fields keep their raw
    // offsets, packed as placeholder ObjRefs.
    let mut table: HashMap<u64, ObjRef> = HashMap::new();
    let mut created: Vec<ObjRef> = Vec::new();
    let mut offset = 0usize;
    while offset < records.len() {
        let header = wire::read_record_header(records, offset)?;
        let target = match header.kind {
            RecordKind::Singleton => {
                match wire::singleton_from_tag(header.tag).ok_or(WireError::BadRecord)? {
                    SingletonId::Nil => memory.nil(),
                    SingletonId::True => memory.true_object(),
                    SingletonId::False => memory.false_object(),
                }
            }
            RecordKind::Cell => {
                let tag = crate::object::TypeTag::from_raw(header.tag)
                    .ok_or(WireError::BadRecord)?;
                let body = wire::record_body(records, offset, &header);
                let mut keep_raw = ObjRef::from_u64 as fn(u64) -> ObjRef;
                let data = wire::decode_body(memory, tag, body, &mut keep_raw, resolver)?;
                let r = memory.allocate(data)?;
                created.push(r);
                r
            }
        };
        table.insert(offset as u64, target);
        offset += record_len(header.body_len);
    }

    // Pass two: the unflatten hook rewrites raw offsets to real references.
    for r in created {
        let mut rewrite = |fake: ObjRef| table.get(&fake.as_u64()).copied().unwrap_or(ObjRef::NULL);
        memory.cell_mut(r).map_refs(&mut rewrite);
    }

    table
        .get(&root_offset)
        .copied()
        .ok_or_else(|| WireError::BadRecord.into())
}
