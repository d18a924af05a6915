// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The native-call boundary.
//!
//! A [`NativeActivation`] mediates every callout: it marshals interpreter
//! references to C-ABI values by the callee's signature, protects any
//! object the marshaller creates from collection, and hosts the
//! variable-pool cursor whose lifetime must end with the callout.
//!
//! Local-reference protection is two-level: a single-slot fast path for
//! the common one-result case, with an on-demand identity table behind it.
//! Clearing the activation releases everything at once.


pub mod signature;
pub mod variable_pool;

use std::collections::HashSet;

use crate::types::ObjRef;

/// The variable-pool NEXT cursor.
///
/// Lives on the native activation so its lifetime ends with the callout;
/// it is never a heap object.
#[derive(Debug, Default)]
pub struct PoolCursor {
    names: Vec<Box<str>>,
    position: Option<usize>,
    /// Variable-pool access is scoped to the callout.
    pub enabled: bool,
}

impl PoolCursor {
    /// Reset the iteration (any non-NEXT operation).
    pub fn reset(&mut self) {
        self.position = None;
        self.names.clear();
    }

    /// Advance over a variable-name snapshot, captured on the first NEXT
    /// after a reset.
    pub fn advance(&mut self, snapshot: impl FnOnce() -> Vec<Box<str>>) -> Option<Box<str>> {
        if self.position.is_none() {
            self.names = snapshot();
            self.position = Some(0);
        }
        let at = self.position.unwrap_or(0);
        let name = self.names.get(at).cloned();
        if name.is_some() {
            self.position = Some(at + 1);
        }
        name
    }
}

/// The native callout frame.
#[derive(Debug, Default)]
pub struct NativeActivation {
    /// The invoked message or function name.
    pub name: Box<str>,
    /// The method object backing the call, or null.
    pub executable: ObjRef,
    /// The receiver for method callouts, or null.
    pub receiver: ObjRef,
    /// The positional arguments.
    pub args: Vec<ObjRef>,
    /// Single-slot protection fast path.
    result_slot: ObjRef,
    /// Overflow protection table.
    saved: HashSet<ObjRef>,
    /// Variable-pool NEXT cursor.
    pub pool: PoolCursor,
}

impl NativeActivation {
    /// A fresh activation for one callout.
    #[must_use]
    pub fn new(name: &str, executable: ObjRef, receiver: ObjRef, args: Vec<ObjRef>) -> Self {
        Self {
            name: name.into(),
            executable,
            receiver,
            args,
            result_slot: ObjRef::NULL,
            saved: HashSet::new(),
            pool: PoolCursor {
                names: Vec::new(),
                position: None,
                enabled: true,
            },
        }
    }

    /// Protect an object for the duration of the callout.
    ///
    /// The first object takes the single-slot fast path; later ones land
    /// in the identity table.
    pub fn save_local_reference(&mut self, r: ObjRef) {
        if r.is_null() {
            return;
        }
        if self.result_slot.is_null() {
            self.result_slot = r;
        } else if self.result_slot != r {
            self.saved.insert(r);
        }
    }

    /// Drop a single protected reference.
    pub fn remove_local_reference(&mut self, r: ObjRef) {
        if self.result_slot == r {
            self.result_slot = ObjRef::NULL;
        } else {
            self.saved.remove(&r);
        }
    }

    /// Release every protected reference (activation teardown).
    pub fn clear_local_references(&mut self) {
        self.result_slot = ObjRef::NULL;
        self.saved.clear();
    }

    /// Number of currently protected references.
    #[must_use]
    pub fn protected_count(&self) -> usize {
        usize::from(!self.result_slot.is_null()) + self.saved.len()
    }

    /// Report every reference the activation keeps alive.
    pub fn for_each_ref(&self, visit: &mut dyn FnMut(ObjRef)) {
        let mut see = |r: ObjRef| {
            if !r.is_null() {
                visit(r);
            }
        };
        see(self.executable);
        see(self.receiver);
        self.args.iter().copied().for_each(&mut see);
        see(self.result_slot);
        self.saved.iter().copied().for_each(&mut see);
    }
}
