// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Native call signature type codes.
//!
//! A native method or function advertises its signature as a zero-terminated
//! array of 16-bit type codes. Position 0 is the return type; the remaining
//! positions describe the arguments in order. Setting [`OPTIONAL_FLAG`] on an
//! argument code marks the positional argument as omittable.
//!
//! The raw codes are the wire format; inside the interpreter every code is
//! decoded into an [`ArgDescriptor`] so marshalling works on typed enums
//! rather than bare integers.

/// Bit set on an argument code to mark the argument optional.
pub const OPTIONAL_FLAG: u16 = 0x8000;

/// End-of-signature marker.
pub const TERMINATOR: u16 = 0x0000;

/// A decoded signature slot type.
///
/// The first block are value conversions; the `Oself`..`Name` block are
/// pseudo-arguments synthesised from the call context rather than consumed
/// from the caller's argument list.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgType {
    /// No value (return-type slot only).
    Void = 0,
    /// Uncoerced object reference.
    ObjectPtr = 1,
    /// Signed 8-bit integer.
    Int8 = 2,
    /// Signed 16-bit integer.
    Int16 = 3,
    /// Signed 32-bit integer.
    Int32 = 4,
    /// Signed 64-bit integer.
    Int64 = 5,
    /// Pointer-sized signed integer.
    Intptr = 6,
    /// Unsigned 8-bit integer.
    Uint8 = 7,
    /// Unsigned 16-bit integer.
    Uint16 = 8,
    /// Unsigned 32-bit integer.
    Uint32 = 9,
    /// Unsigned 64-bit integer.
    Uint64 = 10,
    /// Pointer-sized unsigned integer.
    Uintptr = 11,
    /// `size_t` value.
    Size = 12,
    /// `ssize_t` value.
    Ssize = 13,
    /// Whole number checked against the caller's DIGITS setting.
    WholeNumber = 14,
    /// Whole number required to be `> 0`.
    PositiveWholeNumber = 15,
    /// Whole number required to be `>= 0`.
    NonnegativeWholeNumber = 16,
    /// String length value.
    StringSize = 17,
    /// Double-precision float.
    Double = 18,
    /// Single-precision float.
    Float = 19,
    /// Boolean 0/1.
    Logical = 20,
    /// NUL-terminated C string.
    CString = 21,
    /// String object reference.
    StringObject = 22,
    /// Array object reference.
    ArrayObject = 23,
    /// Stem object reference, looked up in the caller's context.
    StemObject = 24,
    /// Class object reference.
    ClassObject = 25,
    /// Mutable buffer object reference.
    MutableBufferObject = 26,
    /// Variable reference object.
    VariableReference = 27,
    /// Opaque pointer object.
    Pointer = 28,
    /// Pointer rendered as a hex string.
    PointerString = 29,
    /// Pseudo-argument: the receiver object.
    Oself = 30,
    /// Pseudo-argument: the method's variable scope.
    Scope = 31,
    /// Pseudo-argument: the super-class scope.
    Super = 32,
    /// Pseudo-argument: the implementation-defined CSELF pointer.
    Cself = 33,
    /// Pseudo-argument: the raw argument array.
    ArgList = 34,
    /// Pseudo-argument: the invoked message name.
    Name = 35,
}

impl ArgType {
    /// Decode a raw type code without its optional bit.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => Self::Void,
            1 => Self::ObjectPtr,
            2 => Self::Int8,
            3 => Self::Int16,
            4 => Self::Int32,
            5 => Self::Int64,
            6 => Self::Intptr,
            7 => Self::Uint8,
            8 => Self::Uint16,
            9 => Self::Uint32,
            10 => Self::Uint64,
            11 => Self::Uintptr,
            12 => Self::Size,
            13 => Self::Ssize,
            14 => Self::WholeNumber,
            15 => Self::PositiveWholeNumber,
            16 => Self::NonnegativeWholeNumber,
            17 => Self::StringSize,
            18 => Self::Double,
            19 => Self::Float,
            20 => Self::Logical,
            21 => Self::CString,
            22 => Self::StringObject,
            23 => Self::ArrayObject,
            24 => Self::StemObject,
            25 => Self::ClassObject,
            26 => Self::MutableBufferObject,
            27 => Self::VariableReference,
            28 => Self::Pointer,
            29 => Self::PointerString,
            30 => Self::Oself,
            31 => Self::Scope,
            32 => Self::Super,
            33 => Self::Cself,
            34 => Self::ArgList,
            35 => Self::Name,
            _ => return None,
        })
    }

    /// Whether this slot is synthesised from the call context instead of
    /// consuming a positional argument.
    #[must_use]
    pub const fn is_pseudo(self) -> bool {
        matches!(
            self,
            Self::Oself | Self::Scope | Self::Super | Self::Cself | Self::ArgList | Self::Name
        )
    }
}

/// A decoded signature slot: the type plus its optional bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgDescriptor {
    /// The slot type.
    pub arg_type: ArgType,
    /// Whether the positional argument may be omitted.
    pub optional: bool,
}

impl ArgDescriptor {
    /// A required descriptor of the given type.
    #[must_use]
    pub const fn required(arg_type: ArgType) -> Self {
        Self {
            arg_type,
            optional: false,
        }
    }

    /// An optional descriptor of the given type.
    #[must_use]
    pub const fn optional(arg_type: ArgType) -> Self {
        Self {
            arg_type,
            optional: true,
        }
    }

    /// Decode a raw 16-bit code including the optional bit.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        let optional = code & OPTIONAL_FLAG != 0;
        match ArgType::from_code(code & !OPTIONAL_FLAG) {
            Some(arg_type) => Some(Self { arg_type, optional }),
            None => None,
        }
    }

    /// Encode back to the raw 16-bit wire form.
    #[must_use]
    pub const fn to_code(self) -> u16 {
        if self.optional {
            self.arg_type as u16 | OPTIONAL_FLAG
        } else {
            self.arg_type as u16
        }
    }
}

/// Decode a zero-terminated raw signature into descriptors.
///
/// Returns `None` when a code is unrecognised or no terminator is found.
/// Position 0 of the result is the return type.
pub fn decode_signature(raw: &[u16], out: &mut [ArgDescriptor]) -> Option<usize> {
    let mut count = 0;
    for &code in raw {
        if code == TERMINATOR {
            return Some(count);
        }
        if count >= out.len() {
            return None;
        }
        out[count] = ArgDescriptor::from_code(code)?;
        count += 1;
    }
    None
}
