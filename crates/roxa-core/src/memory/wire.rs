// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Wire encoding of object cells.
//!
//! Image save/restore and envelope flatten/unflatten share one record
//! format. A serialised graph is a sequence of grain-aligned records;
//! every reference field is the buffer offset of the target record, so a
//! single linear scan mapping `offset -> base + offset` reconstructs a
//! valid heap.
//!
//! Record layout:
//!
//! ```text
//! u8  record kind (cell / singleton proxy / code proxy)
//! u8  behaviour tag
//! u16 reserved
//! u32 body length
//! body bytes, padded to the object grain
//! ```
//!
//! Records are padded to at least the minimum object size so that restored
//! records can stand as old-space objects at their own offsets.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::execution::number::{NumericForm, RexxNumber};
use crate::instructions::RexxCode;
use crate::object::{
    ClassData, ExecutableCode, InstanceData, MethodData, ObjectData, RoutineData, StackFrameData,
    StemData, TypeTag, VariableDictData, VariableRefData, frame_types,
};
use crate::types::{MINIMUM_OBJECT_SIZE, ObjRef, round_object_boundary};

/// Fixed record header length.
pub const RECORD_HEADER: usize = 8;

/// Record kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// A full object cell.
    Cell,
    /// A proxy resolving to a process singleton.
    Singleton,
}

impl RecordKind {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Cell),
            1 => Some(Self::Singleton),
            _ => None,
        }
    }

    const fn to_raw(self) -> u8 {
        match self {
            Self::Cell => 0,
            Self::Singleton => 1,
        }
    }
}

/// Process singletons a proxy can name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SingletonId {
    /// `.nil`
    Nil,
    /// `.true`
    True,
    /// `.false`
    False,
}

impl SingletonId {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Nil),
            1 => Some(Self::True),
            2 => Some(Self::False),
            _ => None,
        }
    }

    const fn to_raw(self) -> u8 {
        match self {
            Self::Nil => 0,
            Self::True => 1,
            Self::False => 2,
        }
    }
}

/// Errors raised while decoding a serialised graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ended inside a record.
    Truncated,
    /// An unknown record kind or behaviour tag.
    BadRecord,
    /// String data was not valid UTF-8.
    BadUtf8,
    /// A number failed to parse back.
    BadNumber,
    /// A code body could not be resolved (no resolver, or parse failure).
    UnresolvedCode,
}

impl core::fmt::Display for WireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated => write!(f, "serialised object data is truncated"),
            Self::BadRecord => write!(f, "unrecognised record in serialised object data"),
            Self::BadUtf8 => write!(f, "invalid string data in serialised object"),
            Self::BadNumber => write!(f, "invalid number data in serialised object"),
            Self::UnresolvedCode => write!(f, "cannot restore executable code"),
        }
    }
}

/// Re-creates executable code bodies while decoding.
///
/// Envelope unflatten and image restore carry methods and routines as
/// source proxies; the interpreter supplies a resolver that re-translates
/// the source.
pub trait CodeResolver {
    /// Translate proxy source back into executable code.
    fn resolve(
        &mut self,
        memory: &mut crate::memory::Memory,
        name: &str,
        source: &str,
    ) -> Option<Arc<RexxCode>>;
}

/// A resolver for graphs that must not contain code bodies.
pub struct NoCode;

impl CodeResolver for NoCode {
    fn resolve(
        &mut self,
        _memory: &mut crate::memory::Memory,
        _name: &str,
        _source: &str,
    ) -> Option<Arc<RexxCode>> {
        None
    }
}

/// A resolver that re-translates proxy source through the parser.
pub struct TranslatingResolver;

impl CodeResolver for TranslatingResolver {
    fn resolve(
        &mut self,
        memory: &mut crate::memory::Memory,
        name: &str,
        source: &str,
    ) -> Option<Arc<RexxCode>> {
        crate::parser::translate_code(memory, name, source).ok()
    }
}

/// Total record length for a body, grain padded and ledger safe.
#[must_use]
pub fn record_len(body_len: usize) -> usize {
    round_object_boundary(RECORD_HEADER + body_len).max(MINIMUM_OBJECT_SIZE)
}

// ----------------------------------------------------------------------
// Primitive writers / readers
// ----------------------------------------------------------------------

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u64(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn put_bytes(out: &mut Vec<u8>, b: &[u8]) {
    put_u64(out, b.len() as u64);
    out.extend_from_slice(b);
}

/// A cursor over a body slice.
struct Reader<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, at: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.at + n > self.data.len() {
            return Err(WireError::Truncated);
        }
        let slice = &self.data[self.at..self.at + n];
        self.at += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn str(&mut self) -> Result<&'a str, WireError> {
        let len = self.u64()? as usize;
        core::str::from_utf8(self.take(len)?).map_err(|_| WireError::BadUtf8)
    }

    fn bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.u64()? as usize;
        self.take(len)
    }
}

// ----------------------------------------------------------------------
// Cell bodies
// ----------------------------------------------------------------------

/// Encode a reference through the offset map; null stays null.
fn put_ref(out: &mut Vec<u8>, r: ObjRef, map: &mut dyn FnMut(ObjRef) -> u64) {
    if r.is_null() {
        put_u64(out, u64::MAX);
    } else {
        put_u64(out, map(r));
    }
}

fn code_source(code: &RexxCode) -> String {
    code.source_lines.join("\n")
}

/// Encode one cell body. `map` translates references to buffer offsets;
/// sizing passes use a zero map since every reference is a fixed 8 bytes.
pub fn encode_body(data: &ObjectData, map: &mut dyn FnMut(ObjRef) -> u64) -> Vec<u8> {
    let mut out = Vec::new();
    match data {
        ObjectData::Nil => {}
        ObjectData::String(s) => put_str(&mut out, s),
        ObjectData::Number(n) => {
            let digits = n.digit_count().max(9);
            put_str(&mut out, &n.format(digits, NumericForm::Scientific));
        }
        ObjectData::Array(items) => {
            put_u64(&mut out, items.len() as u64);
            for item in items {
                put_ref(&mut out, *item, map);
            }
        }
        ObjectData::Directory(dir) => {
            put_u64(&mut out, dir.len() as u64);
            for (key, value) in dir {
                put_str(&mut out, key);
                put_ref(&mut out, *value, map);
            }
        }
        ObjectData::Stem(stem) => {
            put_str(&mut out, &stem.name);
            put_ref(&mut out, stem.default, map);
            put_u64(&mut out, stem.tails.len() as u64);
            for (tail, value) in &stem.tails {
                put_str(&mut out, tail);
                put_ref(&mut out, *value, map);
            }
        }
        ObjectData::Buffer(bytes) | ObjectData::MutableBuffer(bytes) => {
            put_bytes(&mut out, bytes);
        }
        ObjectData::Pointer(value) => put_u64(&mut out, *value as u64),
        ObjectData::WeakReference(referent) => put_ref(&mut out, *referent, map),
        ObjectData::VariableReference(var) => {
            put_ref(&mut out, var.dictionary, map);
            put_str(&mut out, &var.name);
        }
        ObjectData::Class(class) => {
            put_str(&mut out, &class.name);
            out.push(u8::from(class.mixin));
            out.push(u8::from(class.has_uninit));
            put_ref(&mut out, class.metaclass, map);
            put_u64(&mut out, class.superclasses.len() as u64);
            for parent in &class.superclasses {
                put_ref(&mut out, *parent, map);
            }
            put_u64(&mut out, class.methods.len() as u64);
            for (name, method) in &class.methods {
                put_str(&mut out, name);
                put_ref(&mut out, *method, map);
            }
        }
        ObjectData::Method(method) => {
            put_str(&mut out, &method.name);
            put_str(&mut out, &method.scope);
            out.push(u8::from(method.guarded));
            out.push(u8::from(method.protected));
            out.push(u8::from(method.private));
            match &method.code {
                ExecutableCode::Rexx(code) => {
                    out.push(0);
                    put_str(&mut out, &code_source(code));
                }
                ExecutableCode::Native(index) => {
                    out.push(1);
                    put_u32(&mut out, *index);
                }
                ExecutableCode::AttributeGet(name) => {
                    out.push(2);
                    put_str(&mut out, name);
                }
                ExecutableCode::AttributeSet(name) => {
                    out.push(3);
                    put_str(&mut out, name);
                }
            }
        }
        ObjectData::Routine(routine) => {
            put_str(&mut out, &routine.name);
            put_str(&mut out, &code_source(&routine.code));
        }
        ObjectData::Instance(instance) => {
            put_ref(&mut out, instance.class, map);
            put_u64(&mut out, instance.dictionaries.len() as u64);
            for (scope, dict) in &instance.dictionaries {
                put_str(&mut out, scope);
                put_ref(&mut out, *dict, map);
            }
        }
        ObjectData::VariableDict(dict) => {
            // Guard reservation state is per-process and not serialised.
            put_u64(&mut out, dict.variables.len() as u64);
            for (name, value) in &dict.variables {
                put_str(&mut out, name);
                put_ref(&mut out, *value, map);
            }
        }
        ObjectData::StackFrame(frame) => {
            out.push(frame_types::index_of(frame.frame_type));
            put_str(&mut out, &frame.name);
            put_ref(&mut out, frame.executable, map);
            put_u64(&mut out, frame.line as u64);
            put_str(&mut out, &frame.trace_line);
            put_u64(&mut out, frame.arguments.len() as u64);
            for arg in &frame.arguments {
                put_ref(&mut out, *arg, map);
            }
        }
    }
    out
}

fn read_ref(reader: &mut Reader<'_>, map: &mut dyn FnMut(u64) -> ObjRef) -> Result<ObjRef, WireError> {
    let raw = reader.u64()?;
    if raw == u64::MAX {
        Ok(ObjRef::NULL)
    } else {
        Ok(map(raw))
    }
}

/// Decode one cell body. `map` translates buffer offsets to references.
///
/// # Errors
///
/// Returns a [`WireError`] for malformed data or unresolvable code.
pub fn decode_body(
    memory: &mut crate::memory::Memory,
    tag: TypeTag,
    body: &[u8],
    map: &mut dyn FnMut(u64) -> ObjRef,
    resolver: &mut dyn CodeResolver,
) -> Result<ObjectData, WireError> {
    let mut reader = Reader::new(body);
    let data = match tag {
        TypeTag::Nil => ObjectData::Nil,
        TypeTag::String => ObjectData::String(reader.str()?.into()),
        TypeTag::Number => {
            let text = reader.str()?;
            ObjectData::Number(RexxNumber::parse(text).map_err(|_| WireError::BadNumber)?)
        }
        TypeTag::Array => {
            let count = reader.u64()? as usize;
            let mut items = Vec::with_capacity(count.min(1 << 16));
            for _ in 0..count {
                items.push(read_ref(&mut reader, map)?);
            }
            ObjectData::Array(items)
        }
        TypeTag::Directory => {
            let count = reader.u64()? as usize;
            let mut dir = BTreeMap::new();
            for _ in 0..count {
                let key: Box<str> = reader.str()?.into();
                let value = read_ref(&mut reader, map)?;
                dir.insert(key, value);
            }
            ObjectData::Directory(dir)
        }
        TypeTag::Stem => {
            let name: Box<str> = reader.str()?.into();
            let default = read_ref(&mut reader, map)?;
            let count = reader.u64()? as usize;
            let mut tails = BTreeMap::new();
            for _ in 0..count {
                let tail: Box<str> = reader.str()?.into();
                let value = read_ref(&mut reader, map)?;
                tails.insert(tail, value);
            }
            ObjectData::Stem(StemData {
                name,
                default,
                tails,
            })
        }
        TypeTag::Buffer => ObjectData::Buffer(reader.bytes()?.to_vec()),
        TypeTag::MutableBuffer => ObjectData::MutableBuffer(reader.bytes()?.to_vec()),
        TypeTag::Pointer => ObjectData::Pointer(reader.u64()? as usize),
        TypeTag::WeakReference => ObjectData::WeakReference(read_ref(&mut reader, map)?),
        TypeTag::VariableReference => {
            let dictionary = read_ref(&mut reader, map)?;
            let name: Box<str> = reader.str()?.into();
            ObjectData::VariableReference(VariableRefData { dictionary, name })
        }
        TypeTag::Class => {
            let name: Box<str> = reader.str()?.into();
            let mixin = reader.u8()? != 0;
            let has_uninit = reader.u8()? != 0;
            let metaclass = read_ref(&mut reader, map)?;
            let super_count = reader.u64()? as usize;
            let mut superclasses = Vec::with_capacity(super_count.min(64));
            for _ in 0..super_count {
                superclasses.push(read_ref(&mut reader, map)?);
            }
            let method_count = reader.u64()? as usize;
            let mut methods = BTreeMap::new();
            for _ in 0..method_count {
                let method_name: Box<str> = reader.str()?.into();
                let method = read_ref(&mut reader, map)?;
                methods.insert(method_name, method);
            }
            ObjectData::Class(ClassData {
                name,
                methods,
                superclasses,
                metaclass,
                mixin,
                has_uninit,
            })
        }
        TypeTag::Method => {
            let name: Box<str> = reader.str()?.into();
            let scope: Box<str> = reader.str()?.into();
            let guarded = reader.u8()? != 0;
            let protected = reader.u8()? != 0;
            let private = reader.u8()? != 0;
            let code = match reader.u8()? {
                0 => {
                    let source = reader.str()?;
                    let code = resolver
                        .resolve(memory, &name, source)
                        .ok_or(WireError::UnresolvedCode)?;
                    ExecutableCode::Rexx(code)
                }
                1 => ExecutableCode::Native(reader.u32()?),
                2 => ExecutableCode::AttributeGet(reader.str()?.into()),
                3 => ExecutableCode::AttributeSet(reader.str()?.into()),
                _ => return Err(WireError::BadRecord),
            };
            ObjectData::Method(MethodData {
                name,
                code,
                guarded,
                protected,
                private,
                scope,
            })
        }
        TypeTag::Routine => {
            let name: Box<str> = reader.str()?.into();
            let source = reader.str()?;
            let code = resolver
                .resolve(memory, &name, source)
                .ok_or(WireError::UnresolvedCode)?;
            ObjectData::Routine(RoutineData { name, code })
        }
        TypeTag::Instance => {
            let class = read_ref(&mut reader, map)?;
            let count = reader.u64()? as usize;
            let mut dictionaries = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                let scope: Box<str> = reader.str()?.into();
                let dict = read_ref(&mut reader, map)?;
                dictionaries.push((scope, dict));
            }
            ObjectData::Instance(InstanceData {
                class,
                dictionaries,
            })
        }
        TypeTag::VariableDict => {
            let count = reader.u64()? as usize;
            let mut dict = VariableDictData::new();
            for _ in 0..count {
                let name: Box<str> = reader.str()?.into();
                let value = read_ref(&mut reader, map)?;
                dict.variables.insert(name, value);
            }
            ObjectData::VariableDict(dict)
        }
        TypeTag::StackFrame => {
            let frame_type =
                frame_types::by_index(reader.u8()?).ok_or(WireError::BadRecord)?;
            let name: Box<str> = reader.str()?.into();
            let executable = read_ref(&mut reader, map)?;
            let line = reader.u64()? as usize;
            let trace_line: Box<str> = reader.str()?.into();
            let count = reader.u64()? as usize;
            let mut arguments = Vec::with_capacity(count.min(256));
            for _ in 0..count {
                arguments.push(read_ref(&mut reader, map)?);
            }
            ObjectData::StackFrame(StackFrameData {
                frame_type,
                name,
                executable,
                line,
                trace_line,
                arguments,
            })
        }
    };
    Ok(data)
}

// ----------------------------------------------------------------------
// Records
// ----------------------------------------------------------------------

/// A decoded record header.
pub struct RecordHeader {
    /// The record kind.
    pub kind: RecordKind,
    /// Behaviour tag (cells) or singleton id (proxies).
    pub tag: u8,
    /// Body length in bytes.
    pub body_len: usize,
}

/// Write a record, returning its total padded length.
pub fn write_record(out: &mut Vec<u8>, kind: RecordKind, tag: u8, body: &[u8]) -> usize {
    let total = record_len(body.len());
    out.push(kind.to_raw());
    out.push(tag);
    out.extend_from_slice(&[0, 0]);
    put_u32(out, body.len() as u32);
    out.extend_from_slice(body);
    let padding = total - RECORD_HEADER - body.len();
    out.extend(core::iter::repeat(0u8).take(padding));
    total
}

/// Encode a singleton proxy body.
#[must_use]
pub fn singleton_record_tag(id: SingletonId) -> u8 {
    id.to_raw()
}

/// Resolve a proxy tag back to its singleton.
#[must_use]
pub fn singleton_from_tag(tag: u8) -> Option<SingletonId> {
    SingletonId::from_raw(tag)
}

/// Read the record header at `offset`.
///
/// # Errors
///
/// Returns [`WireError::Truncated`] or [`WireError::BadRecord`].
pub fn read_record_header(buffer: &[u8], offset: usize) -> Result<RecordHeader, WireError> {
    if offset + RECORD_HEADER > buffer.len() {
        return Err(WireError::Truncated);
    }
    let kind = RecordKind::from_raw(buffer[offset]).ok_or(WireError::BadRecord)?;
    let tag = buffer[offset + 1];
    let mut len = [0u8; 4];
    len.copy_from_slice(&buffer[offset + 4..offset + 8]);
    let body_len = u32::from_le_bytes(len) as usize;
    if offset + RECORD_HEADER + body_len > buffer.len() {
        return Err(WireError::Truncated);
    }
    Ok(RecordHeader {
        kind,
        tag,
        body_len,
    })
}

/// Borrow the body slice for a record header at `offset`.
#[must_use]
pub fn record_body<'a>(buffer: &'a [u8], offset: usize, header: &RecordHeader) -> &'a [u8] {
    &buffer[offset + RECORD_HEADER..offset + RECORD_HEADER + header.body_len]
}
