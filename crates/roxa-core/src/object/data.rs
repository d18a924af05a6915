// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Composite body payloads for the object model.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::instructions::RexxCode;
use crate::types::{ActivityId, ObjRef};

/// Compound-variable container.
///
/// The stem value (`STEM.`) doubles as the default for unassigned tails;
/// a null default means unassigned tails evaluate to their derived name.
#[derive(Clone, Debug)]
pub struct StemData {
    /// The stem name including the trailing period.
    pub name: Box<str>,
    /// Value assigned to the stem as a whole, or null.
    pub default: ObjRef,
    /// Tail string to value.
    pub tails: BTreeMap<Box<str>, ObjRef>,
}

/// A reference to a variable inside a dictionary, usable as an alias.
#[derive(Clone, Debug)]
pub struct VariableRefData {
    /// The dictionary holding the variable.
    pub dictionary: ObjRef,
    /// The variable's name within that dictionary.
    pub name: Box<str>,
}

/// The executable part of a method or routine.
#[derive(Clone, Debug)]
pub enum ExecutableCode {
    /// Interpreted Rexx code.
    Rexx(Arc<RexxCode>),
    /// Native method, an index into the interpreter's native registry.
    Native(u32),
    /// Generated attribute getter for the named object variable.
    AttributeGet(Box<str>),
    /// Generated attribute setter for the named object variable.
    AttributeSet(Box<str>),
}

/// Class object payload.
#[derive(Clone, Debug)]
pub struct ClassData {
    /// The class id (uppercased name).
    pub name: Box<str>,
    /// Instance method table for this scope.
    pub methods: BTreeMap<Box<str>, ObjRef>,
    /// Direct superclasses in resolution order.
    pub superclasses: Vec<ObjRef>,
    /// The metaclass, or null for the default.
    pub metaclass: ObjRef,
    /// Whether this class was declared as a mixin.
    pub mixin: bool,
    /// Whether instances take part in uninit processing.
    pub has_uninit: bool,
}

/// Method object payload.
#[derive(Clone, Debug)]
pub struct MethodData {
    /// The method name (uppercased).
    pub name: Box<str>,
    /// The executable body.
    pub code: ExecutableCode,
    /// Guarded methods reserve the object's variable scope on entry.
    pub guarded: bool,
    /// Protected methods require a security-manager check.
    pub protected: bool,
    /// Private methods are only reachable from the same object.
    pub private: bool,
    /// The defining scope (class id) for object variable lookup.
    pub scope: Box<str>,
}

/// Routine object payload.
#[derive(Clone, Debug)]
pub struct RoutineData {
    /// The routine name (uppercased).
    pub name: Box<str>,
    /// The interpreted body.
    pub code: Arc<RexxCode>,
}

/// Instance payload: class pointer plus per-scope variable dictionaries.
#[derive(Clone, Debug)]
pub struct InstanceData {
    /// The instance's class.
    pub class: ObjRef,
    /// Scope id to variable dictionary, created on first touch.
    pub dictionaries: Vec<(Box<str>, ObjRef)>,
}

/// An object variable dictionary: a guardable scope.
///
/// Guard bookkeeping lives here rather than in a side table so that a scope
/// and its reservation state are collected together.
#[derive(Clone, Debug, Default)]
pub struct VariableDictData {
    /// The variables of this scope.
    pub variables: BTreeMap<Box<str>, ObjRef>,
    /// The activity holding the reservation, if any.
    pub reserver: Option<ActivityId>,
    /// Reservation nesting depth for the holder.
    pub nest: usize,
    /// Activities blocked waiting to reserve, FIFO.
    pub waiters: VecDeque<ActivityId>,
    /// Activities parked in GUARD WHEN, woken on any variable update.
    pub watchers: Vec<ActivityId>,
}

impl VariableDictData {
    /// An empty, unreserved dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            variables: BTreeMap::new(),
            reserver: None,
            nest: 0,
            waiters: VecDeque::new(),
            watchers: Vec::new(),
        }
    }
}

/// Stack frame type strings.
///
/// Method frames report `ROUTINE`: callers may rely on the historic string,
/// so the alias only exists to let call sites name their intent.
pub mod frame_types {
    /// Top-level program frame.
    pub const PROGRAM: &str = "PROGRAM";
    /// Routine call frame.
    pub const ROUTINE: &str = "ROUTINE";
    /// Method call frame; reports the same string as routines.
    pub const METHOD: &str = ROUTINE;
    /// Internal call frame (CALL to a label).
    pub const INTERNAL_CALL: &str = "INTERNALCALL";
    /// INTERPRET frame.
    pub const INTERPRET: &str = "INTERPRET";
    /// Parser frame for translate-time errors.
    pub const PARSE: &str = "PARSE";

    const TABLE: [&str; 5] = [PROGRAM, ROUTINE, INTERNAL_CALL, INTERPRET, PARSE];

    /// Wire index of a frame type string.
    #[must_use]
    pub fn index_of(frame_type: &str) -> u8 {
        TABLE
            .iter()
            .position(|t| *t == frame_type)
            .unwrap_or(0) as u8
    }

    /// Frame type string for a wire index.
    #[must_use]
    pub fn by_index(index: u8) -> Option<&'static str> {
        TABLE.get(index as usize).copied()
    }
}

/// Traceback stack frame descriptor.
#[derive(Clone, Debug)]
pub struct StackFrameData {
    /// Frame type string (`PROGRAM`, `ROUTINE`, ...).
    pub frame_type: &'static str,
    /// Name of the item executing at this frame.
    pub name: Box<str>,
    /// The executable backing the frame, or null.
    pub executable: ObjRef,
    /// Source line, `usize::MAX` when unavailable.
    pub line: usize,
    /// Preformatted trace line.
    pub trace_line: Box<str>,
    /// Arguments passed to the frame.
    pub arguments: Vec<ObjRef>,
}
