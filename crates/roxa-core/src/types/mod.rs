// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Core reference types and allocation constants.
//!
//! Object references are index-based rather than pointer-based: an [`ObjRef`]
//! packs a segment-table index and a grain-aligned byte offset within that
//! segment. This keeps the heap's "segment + offset" addressing model while
//! letting the collector operate entirely on indices.


use core::fmt;

/// The minimum allocation unit for an object: a pair of pointer values.
pub const OBJECT_GRAIN: usize = core::mem::size_of::<usize>() * 2;

/// Smallest object we will allocate from storage.
pub const MINIMUM_OBJECT_SIZE: usize = 3 * OBJECT_GRAIN;

/// Largest possible object: one grain less than the maximum size.
pub const MAXIMUM_OBJECT_SIZE: usize = usize::MAX - OBJECT_GRAIN;

/// Unit of granularity for large allocations.
pub const LARGE_ALLOCATION_UNIT: usize = 128 * OBJECT_GRAIN;

/// Largest block size kept on a per-size subpool chain.
pub const LARGEST_SUBPOOL: usize = 512;

/// Default size for a segment allocation.
pub const SEGMENT_SIZE: usize = 256 * LARGE_ALLOCATION_UNIT * 2;

/// Threshold above which an object gets its own dedicated segment.
pub const SINGLE_BLOCK_THRESHOLD: usize = SEGMENT_SIZE;

/// Round `n` up to a multiple of `to`.
#[inline]
#[must_use]
pub const fn round_up(n: usize, to: usize) -> usize {
    n.div_ceil(to) * to
}

/// Round a requested size up to the object grain.
#[inline]
#[must_use]
pub const fn round_object_boundary(n: usize) -> usize {
    round_up(n, OBJECT_GRAIN)
}

/// Round a large allocation up to the large allocation unit.
#[inline]
#[must_use]
pub const fn round_large_allocation(n: usize) -> usize {
    round_up(n, LARGE_ALLOCATION_UNIT)
}

/// Check that a size is a legal object size.
#[inline]
#[must_use]
pub const fn is_valid_size(s: usize) -> bool {
    s >= MINIMUM_OBJECT_SIZE && s % OBJECT_GRAIN == 0
}

/// Index of a segment in the heap's segment table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SegmentId(u32);

impl SegmentId {
    /// Create a segment id from a table index.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentId({})", self.0)
    }
}

/// A heap object reference: segment-table index plus byte offset.
///
/// The null reference is all-ones; segment 0 offset 0 is a valid object.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ObjRef(u64);

impl ObjRef {
    /// The null reference.
    pub const NULL: Self = Self(u64::MAX);

    /// Create a reference from a segment id and byte offset.
    #[inline]
    #[must_use]
    pub const fn new(segment: SegmentId, offset: u32) -> Self {
        Self(((segment.0 as u64) << 32) | offset as u64)
    }

    /// Check whether this is the null reference.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// The segment this reference points into.
    #[inline]
    #[must_use]
    pub const fn segment(self) -> SegmentId {
        SegmentId((self.0 >> 32) as u32)
    }

    /// The byte offset within the segment.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0 as u32
    }

    /// The raw packed representation.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Rebuild a reference from its raw packed representation.
    #[inline]
    #[must_use]
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

impl Default for ObjRef {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "ObjRef(null)")
        } else {
            write!(f, "ObjRef({}:{:#x})", self.segment().0, self.offset())
        }
    }
}

/// Identifier of an activity within the activity manager.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ActivityId(u32);

impl ActivityId {
    /// Create an activity id.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActivityId({})", self.0)
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
