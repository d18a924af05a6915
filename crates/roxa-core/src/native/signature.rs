// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Signature-driven argument marshalling.
//!
//! A native callee advertises a zero-terminated array of 16-bit type codes
//! (decoded into [`ArgDescriptor`] slots, position 0 the return type). For
//! each argument slot the marshaller pulls the next positional argument or
//! synthesises a pseudo-argument from the call context. Conversion failures
//! report the 1-based argument position; every object the marshaller
//! creates is protected on the activation for the callout's duration.

use roxa_abi::signature::{ArgDescriptor, ArgType};

use crate::activity::NumericSettings;
use crate::activity::condition::{RexxError, SyntaxError, error_codes};
use crate::execution::eval::{display_string, to_number};
use crate::execution::number::RexxNumber;
use crate::memory::Memory;
use crate::object::{ObjectData, TypeTag, VariableRefData};
use crate::types::ObjRef;

use super::NativeActivation;

/// A marshalled C-ABI value.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// No value (void return).
    Void,
    /// An uncoerced object reference.
    Object(ObjRef),
    /// Signed integer of any advertised width.
    Int(i64),
    /// Unsigned integer of any advertised width.
    Uint(u64),
    /// `size_t` / string-size value.
    Size(usize),
    /// `ssize_t` value.
    Ssize(isize),
    /// Whole number checked against DIGITS.
    Whole(i64),
    /// Double-precision float.
    Double(f64),
    /// Single-precision float.
    Float(f32),
    /// Boolean 0/1.
    Logical(bool),
    /// Owned string data (CSTRING, pointer-string).
    String(String),
    /// Opaque pointer value.
    Pointer(usize),
    /// An omitted optional argument.
    Omitted,
}

fn missing_argument(position: usize) -> RexxError {
    RexxError::Syntax(SyntaxError::with(
        error_codes::ARGUMENT_REQUIRED,
        vec![position.to_string()],
    ))
}

fn class_mismatch(position: usize, wanted: &str) -> RexxError {
    RexxError::Syntax(SyntaxError::with(
        error_codes::ARGUMENT_CLASS,
        vec![position.to_string(), wanted.to_string()],
    ))
}

fn out_of_range(position: usize) -> RexxError {
    RexxError::Syntax(SyntaxError::with(
        error_codes::ARGUMENT_RANGE,
        vec![position.to_string()],
    ))
}

fn whole_argument(
    memory: &Memory,
    settings: &NumericSettings,
    position: usize,
    value: ObjRef,
) -> Result<i64, RexxError> {
    let number = to_number(memory, value)
        .map_err(|_| class_mismatch(position, "number"))?;
    number
        .to_whole(settings.digits)
        .map_err(|_| out_of_range(position))
}

fn ranged_int<T: TryFrom<i64>>(position: usize, value: i64) -> Result<T, RexxError> {
    T::try_from(value).map_err(|_| out_of_range(position))
}

fn ranged_uint<T: TryFrom<u64>>(position: usize, value: i64) -> Result<T, RexxError> {
    let unsigned = u64::try_from(value).map_err(|_| out_of_range(position))?;
    T::try_from(unsigned).map_err(|_| out_of_range(position))
}

/// Marshal a call's arguments by its decoded signature.
///
/// `signature` excludes the return slot. The caller's frame index locates
/// stem arguments passed by name.
///
/// # Errors
///
/// Missing required arguments, range overflows and class mismatches raise
/// structured argument errors naming the 1-based position.
pub fn marshal_arguments(
    memory: &mut Memory,
    activation: &mut NativeActivation,
    settings: &NumericSettings,
    signature: &[ArgDescriptor],
    scope: ObjRef,
    message_name: &str,
) -> Result<Vec<NativeValue>, RexxError> {
    let mut out = Vec::with_capacity(signature.len());
    let mut position = 0usize;

    for descriptor in signature {
        if descriptor.arg_type.is_pseudo() {
            out.push(pseudo_argument(
                memory,
                activation,
                descriptor.arg_type,
                scope,
                message_name,
            )?);
            continue;
        }

        position += 1;
        let value = activation.args.get(position - 1).copied();
        let value = match value {
            Some(v) if !v.is_null() => v,
            _ => {
                if descriptor.optional {
                    out.push(NativeValue::Omitted);
                    continue;
                }
                return Err(missing_argument(position));
            }
        };

        out.push(convert_argument(
            memory, activation, settings, descriptor.arg_type, position, value,
        )?);
    }
    Ok(out)
}

/// Synthesise a context pseudo-argument.
fn pseudo_argument(
    memory: &mut Memory,
    activation: &mut NativeActivation,
    arg_type: ArgType,
    scope: ObjRef,
    message_name: &str,
) -> Result<NativeValue, RexxError> {
    Ok(match arg_type {
        ArgType::Oself => NativeValue::Object(activation.receiver),
        ArgType::Scope => NativeValue::Object(scope),
        // Super-class scope resolution is a dispatch concern; the boundary
        // hands over the plain scope.
        ArgType::Super => NativeValue::Object(scope),
        ArgType::Cself => {
            // The implementation pointer of a Pointer-bodied receiver.
            let value = match &memory.cell(activation.receiver).data {
                ObjectData::Pointer(p) => *p,
                _ => 0,
            };
            NativeValue::Pointer(value)
        }
        ArgType::ArgList => {
            let array = memory.new_array(activation.args.clone())?;
            activation.save_local_reference(array);
            NativeValue::Object(array)
        }
        ArgType::Name => NativeValue::String(message_name.to_string()),
        _ => NativeValue::Void,
    })
}

/// Convert one positional argument.
fn convert_argument(
    memory: &mut Memory,
    activation: &mut NativeActivation,
    settings: &NumericSettings,
    arg_type: ArgType,
    position: usize,
    value: ObjRef,
) -> Result<NativeValue, RexxError> {
    let tag = memory.tag(value);
    Ok(match arg_type {
        ArgType::Void => NativeValue::Void,
        ArgType::ObjectPtr => NativeValue::Object(value),

        ArgType::Int8 => {
            let whole = whole_argument(memory, settings, position, value)?;
            NativeValue::Int(i64::from(ranged_int::<i8>(position, whole)?))
        }
        ArgType::Int16 => {
            let whole = whole_argument(memory, settings, position, value)?;
            NativeValue::Int(i64::from(ranged_int::<i16>(position, whole)?))
        }
        ArgType::Int32 => {
            let whole = whole_argument(memory, settings, position, value)?;
            NativeValue::Int(i64::from(ranged_int::<i32>(position, whole)?))
        }
        ArgType::Int64 => NativeValue::Int(whole_argument(memory, settings, position, value)?),
        ArgType::Intptr | ArgType::Ssize => {
            let whole = whole_argument(memory, settings, position, value)?;
            NativeValue::Ssize(ranged_int::<isize>(position, whole)?)
        }
        ArgType::Uint8 => {
            let whole = whole_argument(memory, settings, position, value)?;
            NativeValue::Uint(u64::from(ranged_uint::<u8>(position, whole)?))
        }
        ArgType::Uint16 => {
            let whole = whole_argument(memory, settings, position, value)?;
            NativeValue::Uint(u64::from(ranged_uint::<u16>(position, whole)?))
        }
        ArgType::Uint32 => {
            let whole = whole_argument(memory, settings, position, value)?;
            NativeValue::Uint(u64::from(ranged_uint::<u32>(position, whole)?))
        }
        ArgType::Uint64 => {
            let whole = whole_argument(memory, settings, position, value)?;
            NativeValue::Uint(ranged_uint::<u64>(position, whole)?)
        }
        ArgType::Uintptr | ArgType::Size | ArgType::StringSize => {
            let whole = whole_argument(memory, settings, position, value)?;
            NativeValue::Size(ranged_uint::<usize>(position, whole)?)
        }
        ArgType::WholeNumber => {
            NativeValue::Whole(whole_argument(memory, settings, position, value)?)
        }
        ArgType::PositiveWholeNumber => {
            let whole = whole_argument(memory, settings, position, value)?;
            if whole <= 0 {
                return Err(RexxError::Syntax(SyntaxError::with(
                    error_codes::ARGUMENT_POSITIVE,
                    vec![position.to_string()],
                )));
            }
            NativeValue::Whole(whole)
        }
        ArgType::NonnegativeWholeNumber => {
            let whole = whole_argument(memory, settings, position, value)?;
            if whole < 0 {
                return Err(RexxError::Syntax(SyntaxError::with(
                    error_codes::ARGUMENT_NONNEGATIVE,
                    vec![position.to_string()],
                )));
            }
            NativeValue::Whole(whole)
        }
        ArgType::Double => {
            let text = display_string(memory, value, settings);
            let parsed: f64 = text
                .trim()
                .parse()
                .map_err(|_| class_mismatch(position, "number"))?;
            NativeValue::Double(parsed)
        }
        ArgType::Float => {
            let text = display_string(memory, value, settings);
            let parsed: f32 = text
                .trim()
                .parse()
                .map_err(|_| class_mismatch(position, "number"))?;
            NativeValue::Float(parsed)
        }
        ArgType::Logical => {
            let whole = whole_argument(memory, settings, position, value)?;
            match whole {
                0 => NativeValue::Logical(false),
                1 => NativeValue::Logical(true),
                _ => return Err(out_of_range(position)),
            }
        }
        ArgType::CString | ArgType::PointerString => {
            NativeValue::String(display_string(memory, value, settings))
        }
        ArgType::StringObject => {
            if tag == TypeTag::String {
                NativeValue::Object(value)
            } else {
                // Coerce and protect the temporary.
                let text = display_string(memory, value, settings);
                let coerced = memory.new_string(&text)?;
                activation.save_local_reference(coerced);
                NativeValue::Object(coerced)
            }
        }
        ArgType::ArrayObject => {
            if tag != TypeTag::Array {
                return Err(class_mismatch(position, "Array"));
            }
            NativeValue::Object(value)
        }
        ArgType::StemObject => {
            if tag == TypeTag::Stem {
                NativeValue::Object(value)
            } else {
                return Err(class_mismatch(position, "Stem"));
            }
        }
        ArgType::ClassObject => {
            if tag != TypeTag::Class {
                return Err(class_mismatch(position, "Class"));
            }
            NativeValue::Object(value)
        }
        ArgType::MutableBufferObject => {
            if tag != TypeTag::MutableBuffer {
                return Err(class_mismatch(position, "MutableBuffer"));
            }
            NativeValue::Object(value)
        }
        ArgType::VariableReference => {
            if tag != TypeTag::VariableReference {
                return Err(class_mismatch(position, "VariableReference"));
            }
            NativeValue::Object(value)
        }
        ArgType::Pointer => match &memory.cell(value).data {
            ObjectData::Pointer(p) => NativeValue::Pointer(*p),
            _ => return Err(class_mismatch(position, "Pointer")),
        },
        // Pseudo-arguments are handled by the caller.
        ArgType::Oself
        | ArgType::Scope
        | ArgType::Super
        | ArgType::Cself
        | ArgType::ArgList
        | ArgType::Name => NativeValue::Void,
    })
}

/// Convert a callee's return value back by the return-type slot.
///
/// # Errors
///
/// Allocation failures propagate.
pub fn convert_result(
    memory: &mut Memory,
    activation: &mut NativeActivation,
    return_type: ArgType,
    value: NativeValue,
) -> Result<Option<ObjRef>, RexxError> {
    let result = match (return_type, value) {
        (ArgType::Void, _) | (_, NativeValue::Void | NativeValue::Omitted) => None,
        (_, NativeValue::Object(r)) => Some(r),
        (_, NativeValue::Int(v) | NativeValue::Whole(v)) => {
            Some(memory.new_number(RexxNumber::from_integer(v))?)
        }
        (_, NativeValue::Ssize(v)) => {
            Some(memory.new_number(RexxNumber::from_integer(v as i64))?)
        }
        (_, NativeValue::Uint(v)) => {
            let text = v.to_string();
            let number = RexxNumber::parse(&text)
                .map_err(|_| RexxError::Syntax(SyntaxError::new(error_codes::NONNUMERIC_VALUE)))?;
            Some(memory.new_number(number)?)
        }
        (_, NativeValue::Size(v)) => {
            let text = v.to_string();
            let number = RexxNumber::parse(&text)
                .map_err(|_| RexxError::Syntax(SyntaxError::new(error_codes::NONNUMERIC_VALUE)))?;
            Some(memory.new_number(number)?)
        }
        (_, NativeValue::Double(v)) => {
            let text = format!("{v}");
            let number = RexxNumber::parse(&text)
                .map_err(|_| RexxError::Syntax(SyntaxError::new(error_codes::NONNUMERIC_VALUE)))?;
            Some(memory.new_number(number)?)
        }
        (_, NativeValue::Float(v)) => {
            let text = format!("{v}");
            let number = RexxNumber::parse(&text)
                .map_err(|_| RexxError::Syntax(SyntaxError::new(error_codes::NONNUMERIC_VALUE)))?;
            Some(memory.new_number(number)?)
        }
        (_, NativeValue::Logical(v)) => Some(memory.boolean(v)),
        (ArgType::PointerString, NativeValue::Pointer(p)) => {
            Some(memory.new_string(&format!("{p:#x}"))?)
        }
        (_, NativeValue::Pointer(p)) => Some(memory.allocate(ObjectData::Pointer(p))?),
        (_, NativeValue::String(text)) => Some(memory.new_string(&text)?),
    };
    if let Some(result) = result {
        activation.save_local_reference(result);
    }
    Ok(result)
}

/// Build a variable-reference object for a named variable.
///
/// # Errors
///
/// Allocation failures propagate.
pub fn variable_reference(
    memory: &mut Memory,
    activation: &mut NativeActivation,
    name: &str,
) -> Result<ObjRef, RexxError> {
    let reference = memory
        .allocate(ObjectData::VariableReference(VariableRefData {
            dictionary: ObjRef::NULL,
            name: name.into(),
        }))?;
    activation.save_local_reference(reference);
    Ok(reference)
}
