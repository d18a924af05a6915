// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The universal object model.
//!
//! Every language-visible value is a heap cell: a header (behaviour tag,
//! size, flag byte) plus a typed body. The collector never inspects bodies
//! directly; it asks each cell to enumerate its reference fields through
//! [`ObjectCell::for_each_ref`], mirroring the per-class `live` hook of the
//! original design.
//!
//! Sizes are byte counts rounded to the allocation grain. The body variants
//! own ordinary Rust collections; the reported size is the grain-rounded
//! footprint the segment ledger accounts for.

#[cfg(test)]
mod object_test;

mod data;

pub use data::{
    ClassData, ExecutableCode, InstanceData, MethodData, RoutineData, StackFrameData, StemData,
    VariableDictData, VariableRefData, frame_types,
};

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::execution::number::RexxNumber;
use crate::types::{MINIMUM_OBJECT_SIZE, OBJECT_GRAIN, ObjRef, round_object_boundary};

/// Behaviour tag: selects the method table and the wire encoding of a cell.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeTag {
    /// The `.nil` singleton.
    Nil = 0,
    /// Immutable character string.
    String = 1,
    /// Decimal number.
    Number = 2,
    /// Ordered array of references.
    Array = 3,
    /// Name-to-object directory.
    Directory = 4,
    /// Compound-variable container.
    Stem = 5,
    /// Immutable byte buffer.
    Buffer = 6,
    /// Mutable byte buffer.
    MutableBuffer = 7,
    /// Opaque host pointer.
    Pointer = 8,
    /// Weak reference, cleared when the referent dies.
    WeakReference = 9,
    /// Variable reference (dictionary + name).
    VariableReference = 10,
    /// Class object.
    Class = 11,
    /// Method object.
    Method = 12,
    /// Routine object.
    Routine = 13,
    /// Instance with per-scope variable dictionaries.
    Instance = 14,
    /// Object variable dictionary (guardable scope).
    VariableDict = 15,
    /// Traceback stack frame descriptor.
    StackFrame = 16,
}

impl TypeTag {
    /// All tags in tag order. The image class digest hashes this table.
    pub const ALL: [Self; 17] = [
        Self::Nil,
        Self::String,
        Self::Number,
        Self::Array,
        Self::Directory,
        Self::Stem,
        Self::Buffer,
        Self::MutableBuffer,
        Self::Pointer,
        Self::WeakReference,
        Self::VariableReference,
        Self::Class,
        Self::Method,
        Self::Routine,
        Self::Instance,
        Self::VariableDict,
        Self::StackFrame,
    ];

    /// The class name exposed for this primitive behaviour.
    #[must_use]
    pub const fn class_name(self) -> &'static str {
        match self {
            Self::Nil => "Nil",
            Self::String => "String",
            Self::Number => "Number",
            Self::Array => "Array",
            Self::Directory => "Directory",
            Self::Stem => "Stem",
            Self::Buffer => "Buffer",
            Self::MutableBuffer => "MutableBuffer",
            Self::Pointer => "Pointer",
            Self::WeakReference => "WeakReference",
            Self::VariableReference => "VariableReference",
            Self::Class => "Class",
            Self::Method => "Method",
            Self::Routine => "Routine",
            Self::Instance => "Object",
            Self::VariableDict => "VariableDictionary",
            Self::StackFrame => "StackFrame",
        }
    }

    /// Decode a raw tag byte.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        if (raw as usize) < Self::ALL.len() {
            Some(Self::ALL[raw as usize])
        } else {
            None
        }
    }

    /// FNV-1a digest over the tag table; an image is only restorable by a
    /// build with the identical table.
    #[must_use]
    pub fn table_digest() -> u64 {
        let mut hash: u64 = 0xCBF2_9CE4_8422_2325;
        for tag in Self::ALL {
            for byte in tag.class_name().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
            }
            hash ^= u64::from(tag as u8);
            hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
        }
        hash
    }
}

bitflags! {
    /// Object header flag byte.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        /// Live mark; its meaning flips against the heap's mark word.
        const MARK = 0b0000_0001;
        /// The object belongs to the restored image (never swept).
        const OLD_SPACE = 0b0000_0010;
        /// Leaf hint: the body holds no references, marking can skip it.
        const NO_REFS = 0b0000_0100;
        /// The object's class defines an uninit method.
        const HAS_UNINIT = 0b0000_1000;
    }
}

/// The universal object header.
#[derive(Clone, Debug)]
pub struct ObjectHeader {
    size: usize,
    tag: TypeTag,
    flags: HeaderFlags,
}

impl ObjectHeader {
    /// Build a header; the size is grain-rounded and clamped to the minimum
    /// object size.
    #[must_use]
    pub fn new(tag: TypeTag, size: usize, flags: HeaderFlags) -> Self {
        Self {
            size: round_object_boundary(size).max(MINIMUM_OBJECT_SIZE),
            tag,
            flags,
        }
    }

    /// Object size in bytes: always a grain multiple.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// The behaviour tag.
    #[inline]
    #[must_use]
    pub const fn tag(&self) -> TypeTag {
        self.tag
    }

    /// The raw flag byte.
    #[inline]
    #[must_use]
    pub const fn flags(&self) -> HeaderFlags {
        self.flags
    }

    /// Whether the cell is marked live under the given mark word.
    #[inline]
    #[must_use]
    pub const fn is_marked(&self, mark_word: bool) -> bool {
        self.flags.contains(HeaderFlags::MARK) == mark_word
    }

    /// Set the live mark for the given mark word.
    #[inline]
    pub fn set_mark(&mut self, mark_word: bool) {
        self.flags.set(HeaderFlags::MARK, mark_word);
    }

    /// Whether the cell lives in old space.
    #[inline]
    #[must_use]
    pub const fn is_old_space(&self) -> bool {
        self.flags.contains(HeaderFlags::OLD_SPACE)
    }

    /// Move the cell into old space (image restore only).
    #[inline]
    pub fn set_old_space(&mut self) {
        self.flags.insert(HeaderFlags::OLD_SPACE);
    }

    /// Whether the body is guaranteed reference-free.
    #[inline]
    #[must_use]
    pub const fn has_no_refs(&self) -> bool {
        self.flags.contains(HeaderFlags::NO_REFS)
    }

    /// Whether the object's class defines an uninit method.
    #[inline]
    #[must_use]
    pub const fn has_uninit(&self) -> bool {
        self.flags.contains(HeaderFlags::HAS_UNINIT)
    }

    /// Record that the object's class defines an uninit method.
    #[inline]
    pub fn set_has_uninit(&mut self, value: bool) {
        self.flags.set(HeaderFlags::HAS_UNINIT, value);
    }
}

/// A heap cell: header plus typed body.
#[derive(Clone, Debug)]
pub struct ObjectCell {
    /// The universal header.
    pub header: ObjectHeader,
    /// The typed body.
    pub data: ObjectData,
}

impl ObjectCell {
    /// Build a cell, computing the size and leaf hint from the body.
    #[must_use]
    pub fn new(data: ObjectData, mark_word: bool) -> Self {
        let mut flags = HeaderFlags::empty();
        if data.is_leaf() {
            flags.insert(HeaderFlags::NO_REFS);
        }
        let mut header = ObjectHeader::new(data.tag(), data.footprint(), flags);
        header.set_mark(mark_word);
        Self { header, data }
    }

    /// Enumerate every reference field of the body.
    ///
    /// This is the `live` hook: the collector, the image writer and the
    /// envelope all traverse through it.
    pub fn for_each_ref(&self, visit: &mut dyn FnMut(ObjRef)) {
        self.data.for_each_ref(visit);
    }

    /// Rewrite every reference field of the body in place.
    ///
    /// This is the `flatten`/`unflatten` hook: codecs use it to translate
    /// between heap references and buffer offsets.
    pub fn map_refs(&mut self, map: &mut dyn FnMut(ObjRef) -> ObjRef) {
        self.data.map_refs(map);
    }
}

/// The typed body of a heap cell.
#[derive(Clone, Debug)]
pub enum ObjectData {
    /// The `.nil` singleton.
    Nil,
    /// Immutable character string.
    String(Box<str>),
    /// Decimal number.
    Number(RexxNumber),
    /// Ordered array of references.
    Array(Vec<ObjRef>),
    /// Name-to-object directory (also the shape of condition objects).
    Directory(BTreeMap<Box<str>, ObjRef>),
    /// Compound-variable container.
    Stem(StemData),
    /// Immutable byte buffer.
    Buffer(Vec<u8>),
    /// Mutable byte buffer.
    MutableBuffer(Vec<u8>),
    /// Opaque host pointer.
    Pointer(usize),
    /// Weak reference; `ObjRef::NULL` once the referent has died.
    WeakReference(ObjRef),
    /// Variable reference into a dictionary.
    VariableReference(VariableRefData),
    /// Class object.
    Class(ClassData),
    /// Method object.
    Method(MethodData),
    /// Routine object.
    Routine(RoutineData),
    /// Instance with per-scope variable dictionaries.
    Instance(InstanceData),
    /// Object variable dictionary (guardable scope).
    VariableDict(VariableDictData),
    /// Traceback stack frame descriptor.
    StackFrame(StackFrameData),
}

impl ObjectData {
    /// An empty stem with the given derived name.
    #[must_use]
    pub fn new_stem(name: &str) -> Self {
        Self::Stem(StemData {
            name: name.into(),
            default: ObjRef::NULL,
            tails: BTreeMap::new(),
        })
    }

    /// The behaviour tag for this body.
    #[must_use]
    pub const fn tag(&self) -> TypeTag {
        match self {
            Self::Nil => TypeTag::Nil,
            Self::String(_) => TypeTag::String,
            Self::Number(_) => TypeTag::Number,
            Self::Array(_) => TypeTag::Array,
            Self::Directory(_) => TypeTag::Directory,
            Self::Stem(_) => TypeTag::Stem,
            Self::Buffer(_) => TypeTag::Buffer,
            Self::MutableBuffer(_) => TypeTag::MutableBuffer,
            Self::Pointer(_) => TypeTag::Pointer,
            Self::WeakReference(_) => TypeTag::WeakReference,
            Self::VariableReference(_) => TypeTag::VariableReference,
            Self::Class(_) => TypeTag::Class,
            Self::Method(_) => TypeTag::Method,
            Self::Routine(_) => TypeTag::Routine,
            Self::Instance(_) => TypeTag::Instance,
            Self::VariableDict(_) => TypeTag::VariableDict,
            Self::StackFrame(_) => TypeTag::StackFrame,
        }
    }

    /// Whether the body can never hold references (the marking skip hint).
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(
            self,
            Self::Nil
                | Self::String(_)
                | Self::Number(_)
                | Self::Buffer(_)
                | Self::MutableBuffer(_)
                | Self::Pointer(_)
        )
    }

    /// Estimated heap footprint in bytes, before grain rounding.
    ///
    /// The segment ledger charges this amount; it tracks the payload so the
    /// accounting invariants stay meaningful, not the exact allocator bytes.
    #[must_use]
    pub fn footprint(&self) -> usize {
        let payload = match self {
            Self::Nil | Self::Pointer(_) => 0,
            Self::String(s) => s.len(),
            Self::Number(n) => n.digit_count() + OBJECT_GRAIN,
            Self::Array(items) => items.len() * core::mem::size_of::<ObjRef>(),
            Self::Directory(map) => map
                .iter()
                .map(|(k, _)| k.len() + core::mem::size_of::<ObjRef>() + OBJECT_GRAIN)
                .sum(),
            Self::Stem(stem) => {
                stem.name.len()
                    + stem
                        .tails
                        .iter()
                        .map(|(k, _)| k.len() + core::mem::size_of::<ObjRef>() + OBJECT_GRAIN)
                        .sum::<usize>()
            }
            Self::Buffer(bytes) | Self::MutableBuffer(bytes) => bytes.len(),
            Self::WeakReference(_) => core::mem::size_of::<ObjRef>(),
            Self::VariableReference(var) => var.name.len() + core::mem::size_of::<ObjRef>(),
            Self::Class(class) => {
                class.name.len()
                    + class.methods.len() * 2 * core::mem::size_of::<ObjRef>()
                    + class.superclasses.len() * core::mem::size_of::<ObjRef>()
            }
            Self::Method(method) => method.name.len() + 4 * OBJECT_GRAIN,
            Self::Routine(routine) => routine.name.len() + 4 * OBJECT_GRAIN,
            Self::Instance(instance) => {
                instance.dictionaries.len() * 2 * core::mem::size_of::<ObjRef>() + OBJECT_GRAIN
            }
            Self::VariableDict(dict) => dict
                .variables
                .iter()
                .map(|(k, _)| k.len() + core::mem::size_of::<ObjRef>() + OBJECT_GRAIN)
                .sum(),
            Self::StackFrame(frame) => {
                frame.name.len()
                    + frame.trace_line.len()
                    + frame.arguments.len() * core::mem::size_of::<ObjRef>()
            }
        };
        core::mem::size_of::<ObjectHeader>() + payload
    }

    /// Enumerate every reference field.
    pub fn for_each_ref(&self, visit: &mut dyn FnMut(ObjRef)) {
        let mut see = |r: ObjRef| {
            if !r.is_null() {
                visit(r);
            }
        };
        match self {
            Self::Nil
            | Self::String(_)
            | Self::Number(_)
            | Self::Buffer(_)
            | Self::MutableBuffer(_)
            | Self::Pointer(_) => {}
            // Weak references do not keep their referent alive; the sweep
            // clears dead referents separately.
            Self::WeakReference(_) => {}
            Self::Array(items) => items.iter().copied().for_each(&mut see),
            Self::Directory(map) => map.values().copied().for_each(&mut see),
            Self::Stem(stem) => {
                see(stem.default);
                stem.tails.values().copied().for_each(&mut see);
            }
            Self::VariableReference(var) => see(var.dictionary),
            Self::Class(class) => {
                class.methods.values().copied().for_each(&mut see);
                class.superclasses.iter().copied().for_each(&mut see);
                see(class.metaclass);
            }
            Self::Method(method) => {
                if let ExecutableCode::Rexx(code) = &method.code {
                    code.literals().iter().copied().for_each(&mut see);
                }
            }
            Self::Routine(routine) => {
                routine.code.literals().iter().copied().for_each(&mut see);
            }
            Self::Instance(instance) => {
                see(instance.class);
                instance
                    .dictionaries
                    .iter()
                    .map(|(_, dict)| *dict)
                    .for_each(&mut see);
            }
            Self::VariableDict(dict) => dict.variables.values().copied().for_each(&mut see),
            Self::StackFrame(frame) => {
                see(frame.executable);
                frame.arguments.iter().copied().for_each(&mut see);
            }
        }
    }

    /// Rewrite every reference field in place.
    pub fn map_refs(&mut self, map: &mut dyn FnMut(ObjRef) -> ObjRef) {
        let mut fix = |r: &mut ObjRef| {
            if !r.is_null() {
                *r = map(*r);
            }
        };
        match self {
            Self::Nil
            | Self::String(_)
            | Self::Number(_)
            | Self::Buffer(_)
            | Self::MutableBuffer(_)
            | Self::Pointer(_) => {}
            Self::WeakReference(referent) => fix(referent),
            Self::Array(items) => items.iter_mut().for_each(&mut fix),
            Self::Directory(dir) => dir.values_mut().for_each(&mut fix),
            Self::Stem(stem) => {
                fix(&mut stem.default);
                stem.tails.values_mut().for_each(&mut fix);
            }
            Self::VariableReference(var) => fix(&mut var.dictionary),
            Self::Class(class) => {
                class.methods.values_mut().for_each(&mut fix);
                class.superclasses.iter_mut().for_each(&mut fix);
                fix(&mut class.metaclass);
            }
            // Code literals are immutable behind their Arc; methods and
            // routines cross envelopes as source proxies instead.
            Self::Method(_) | Self::Routine(_) => {}
            Self::Instance(instance) => {
                fix(&mut instance.class);
                instance
                    .dictionaries
                    .iter_mut()
                    .for_each(|(_, dict)| fix(dict));
            }
            Self::VariableDict(dict) => dict.variables.values_mut().for_each(&mut fix),
            Self::StackFrame(frame) => {
                fix(&mut frame.executable);
                frame.arguments.iter_mut().for_each(&mut fix);
            }
        }
    }

    /// Borrow the string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}
