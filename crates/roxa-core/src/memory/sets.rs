// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Segment sets: per-policy pools of segments.
//!
//! Four sets partition the heap:
//! - **Normal** keeps per-size-class free chains (one per grain step up to
//!   the largest subpool) plus a large-dead fallback chain.
//! - **Large** keeps a single free list searched best-fit.
//! - **SingleObject** gives every object a dedicated segment and returns
//!   empty segments to the pool after sweep.
//! - **OldSpace** holds restored-image objects and is never swept.
//!
//! Set-level free lists are rebuilt from the segment ledgers on every sweep.

use crate::types::{
    LARGE_ALLOCATION_UNIT, LARGEST_SUBPOOL, MINIMUM_OBJECT_SIZE, OBJECT_GRAIN, SegmentId,
};

/// Number of exact-size dead chains in the normal set (zero-based indexing
/// needs one extra slot).
pub const DEAD_POOLS: usize = LARGEST_SUBPOOL / OBJECT_GRAIN + 1;

/// A dead block parked on a set-level chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeBlock {
    /// The segment holding the block.
    pub segment: SegmentId,
    /// Block offset within the segment.
    pub offset: u32,
    /// Block size in bytes.
    pub size: usize,
}

/// Whether a pool allocation may exactly exhaust the uncommitted tail.
///
/// The two platform backends compute the boundary differently; both
/// policies are implemented and selectable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PoolBoundaryPolicy {
    /// An allocation equal to the remaining space succeeds.
    #[default]
    Inclusive,
    /// An allocation equal to the remaining space fails.
    Exclusive,
}

/// The backing pool ledger: reserved address space and committed bytes.
#[derive(Debug)]
pub struct MemoryPool {
    reserved: usize,
    committed: usize,
    policy: PoolBoundaryPolicy,
}

impl MemoryPool {
    /// A pool with the given reservation and boundary policy.
    #[must_use]
    pub const fn new(reserved: usize, policy: PoolBoundaryPolicy) -> Self {
        Self {
            reserved,
            committed: 0,
            policy,
        }
    }

    /// Bytes not yet committed.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.reserved - self.committed
    }

    /// The configured boundary policy.
    #[must_use]
    pub const fn policy(&self) -> PoolBoundaryPolicy {
        self.policy
    }

    /// Commit `size` bytes for a new segment.
    ///
    /// Returns `false` when the pool cannot satisfy the request under its
    /// boundary policy.
    pub fn commit(&mut self, size: usize) -> bool {
        let remaining = self.remaining();
        let fits = match self.policy {
            PoolBoundaryPolicy::Inclusive => size <= remaining,
            PoolBoundaryPolicy::Exclusive => size < remaining,
        };
        if fits {
            self.committed += size;
        }
        fits
    }

    /// Return `size` bytes to the pool (segment freed).
    pub fn release(&mut self, size: usize) {
        self.committed = self.committed.saturating_sub(size);
    }
}

/// Occupancy statistics shared by the sweepable sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetCounters {
    /// Bytes held by live objects.
    pub live_bytes: usize,
    /// Bytes held by dead blocks.
    pub dead_bytes: usize,
    /// Live objects across all segments.
    pub live_objects: usize,
}

/// The normal set: small-object allocation with per-size subpool chains.
#[derive(Debug)]
pub struct NormalSegmentSet {
    /// Segments owned by this set.
    pub segments: Vec<SegmentId>,
    subpools: Vec<Vec<FreeBlock>>,
    /// Look-aside: the chain that last satisfied each size class.
    last_used_subpool: [usize; DEAD_POOLS + 1],
    large_dead: Vec<FreeBlock>,
    /// Sweep counters.
    pub counters: SetCounters,
}

/// Target free fraction after a normal-set expansion.
const NORMAL_EXPANSION_THRESHOLD: f32 = 0.30;

impl NormalSegmentSet {
    /// An empty normal set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            subpools: vec![Vec::new(); DEAD_POOLS],
            last_used_subpool: core::array::from_fn(|i| i.min(DEAD_POOLS)),
            large_dead: Vec::new(),
            counters: SetCounters::default(),
        }
    }

    /// Map a grain-rounded length to its subpool index.
    #[inline]
    #[must_use]
    pub const fn length_to_pool(length: usize) -> usize {
        length / OBJECT_GRAIN
    }

    /// Find a block for a small allocation.
    ///
    /// Walks the exact-size chain and then larger chains via the look-aside
    /// index; blocks from the subpool chains are accepted whole. Falls back
    /// to the large-dead chain, where the caller is expected to split.
    pub fn find_fit(&mut self, length: usize) -> Option<FreeBlock> {
        let target = Self::length_to_pool(length);
        if target < DEAD_POOLS {
            let mut current = self.last_used_subpool[target];
            while current < DEAD_POOLS {
                if let Some(block) = self.subpools[current].pop() {
                    self.last_used_subpool[target] = current;
                    return Some(block);
                }
                current += 1;
                // Follow existing redirections to skip known-empty chains.
                while current < DEAD_POOLS {
                    if self.last_used_subpool[current] < DEAD_POOLS {
                        current = current.max(self.last_used_subpool[current]);
                        self.last_used_subpool[target] = current;
                        break;
                    }
                    current += 1;
                }
            }
            // Nothing small left; skip directly to the large chain next time.
            self.last_used_subpool[target] = DEAD_POOLS;
        }

        // First-fit from the large-dead fallback chain.
        let position = self.large_dead.iter().position(|b| b.size >= length)?;
        Some(self.large_dead.swap_remove(position))
    }

    /// Park a dead block on the matching chain.
    pub fn add_dead(&mut self, block: FreeBlock) {
        if block.size > LARGEST_SUBPOOL {
            self.large_dead.push(block);
        } else {
            let pool = Self::length_to_pool(block.size);
            self.subpools[pool].push(block);
            // Chain has items again.
            self.last_used_subpool[pool] = pool;
        }
    }

    /// Drop every parked block; sweep repopulates from the ledgers.
    pub fn prepare_for_sweep(&mut self) {
        for chain in &mut self.subpools {
            chain.clear();
        }
        self.large_dead.clear();
        self.last_used_subpool = core::array::from_fn(|i| i.min(DEAD_POOLS));
        self.counters = SetCounters::default();
    }

    /// Suggested expansion so that the target free fraction holds.
    #[must_use]
    pub fn suggest_expansion(&self) -> usize {
        let live = self.counters.live_bytes as f32;
        let recommended = live / (1.0 - NORMAL_EXPANSION_THRESHOLD);
        let total = (self.counters.live_bytes + self.counters.dead_bytes) as f32;
        if recommended > total {
            (recommended - total) as usize
        } else {
            0
        }
    }
}

impl Default for NormalSegmentSet {
    fn default() -> Self {
        Self::new()
    }
}

/// The large set: best-fit allocation from a single dead cache.
#[derive(Debug, Default)]
pub struct LargeSegmentSet {
    /// Segments owned by this set.
    pub segments: Vec<SegmentId>,
    dead_cache: Vec<FreeBlock>,
    /// Sweep counters.
    pub counters: SetCounters,
    /// Satisfied allocation requests since the last sweep.
    pub requests: usize,
}

impl LargeSegmentSet {
    /// An empty large set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-fit search: the smallest cached block that satisfies `length`.
    ///
    /// The caller splits remainders of at least [`LARGE_ALLOCATION_UNIT`]
    /// back into the cache via [`Self::add_dead`].
    pub fn find_best_fit(&mut self, length: usize) -> Option<FreeBlock> {
        let mut best: Option<usize> = None;
        for (i, block) in self.dead_cache.iter().enumerate() {
            if block.size >= length && best.is_none_or(|b| block.size < self.dead_cache[b].size) {
                best = Some(i);
            }
        }
        let found = best.map(|i| self.dead_cache.swap_remove(i));
        if found.is_some() {
            self.requests += 1;
        }
        found
    }

    /// Park a dead block on the cache.
    pub fn add_dead(&mut self, block: FreeBlock) {
        self.dead_cache.push(block);
    }

    /// Drop every cached block; sweep repopulates from the ledgers.
    pub fn prepare_for_sweep(&mut self) {
        self.dead_cache.clear();
        self.counters = SetCounters::default();
    }

    /// The split minimum for large allocations.
    #[must_use]
    pub const fn split_minimum() -> usize {
        LARGE_ALLOCATION_UNIT
    }
}

/// The single-object set: one dedicated segment per very large object.
#[derive(Debug, Default)]
pub struct SingleObjectSegmentSet {
    /// Segments owned by this set.
    pub segments: Vec<SegmentId>,
    /// Sweep counters.
    pub counters: SetCounters,
}

impl SingleObjectSegmentSet {
    /// An empty single-object set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The old-space set: restored image objects, scanned but never swept.
#[derive(Debug, Default)]
pub struct OldSegmentSet {
    /// Segments owned by this set.
    pub segments: Vec<SegmentId>,
}

impl OldSegmentSet {
    /// An empty old-space set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Normal-set split minimum: any remainder big enough to be an object goes
/// back on a chain.
#[must_use]
pub const fn normal_split_minimum() -> usize {
    MINIMUM_OBJECT_SIZE
}
