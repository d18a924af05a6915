// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Built-in function registry.
//!
//! A representative set, not the full library: unresolved call names fall
//! back here after the label map and package routines, and only then count
//! as external calls. Every built-in sees the caller's kernel state and
//! frame index so context functions (ARG, CONDITION) can reach their data.

use crate::activity::NumericSettings;
use crate::activity::condition::{RexxError, SyntaxError, error_codes};
use crate::activity::frames::ActivationFrame;
use crate::activity::manager::Kernel;
use crate::execution::eval::{display_string, to_number};
use crate::execution::number::RexxNumber;
use crate::types::{ActivityId, ObjRef};

/// A built-in entry point.
pub type Builtin = crate::execution::BuiltinFn;

/// Look up a built-in by uppercased name.
pub fn lookup(name: &str) -> Option<Builtin> {
    Some(match name {
        "ARG" => builtin_arg,
        "CONDITION" => builtin_condition,
        "LENGTH" => builtin_length,
        "ABS" => builtin_abs,
        _ => return None,
    })
}

fn frame_settings(kernel: &Kernel, activity: ActivityId, fi: usize) -> NumericSettings {
    match kernel.entry(activity).stack.frame_at(fi) {
        Some(ActivationFrame::Rexx(activation)) => activation.settings,
        _ => NumericSettings::default(),
    }
}

/// ARG() / ARG(n): argument count or the n-th argument.
fn builtin_arg(
    kernel: &mut Kernel,
    activity: ActivityId,
    fi: usize,
    args: &[ObjRef],
) -> Result<ObjRef, RexxError> {
    let settings = frame_settings(kernel, activity, fi);
    let frame_args: Vec<ObjRef> = match kernel.entry(activity).stack.frame_at(fi) {
        Some(ActivationFrame::Rexx(activation)) => activation.args.clone(),
        _ => Vec::new(),
    };

    match args.first().copied() {
        None => {
            let count = frame_args.len() as i64;
            Ok(kernel.memory.new_number(RexxNumber::from_integer(count))?)
        }
        Some(index_value) => {
            let index = to_number(&kernel.memory, index_value)?
                .to_whole(settings.digits)
                .map_err(|_| {
                    RexxError::Syntax(SyntaxError::with(
                        error_codes::ARGUMENT_POSITIVE,
                        vec!["1".to_string()],
                    ))
                })?;
            if index < 1 {
                return Err(RexxError::Syntax(SyntaxError::with(
                    error_codes::ARGUMENT_POSITIVE,
                    vec!["1".to_string()],
                )));
            }
            match frame_args.get(index as usize - 1) {
                Some(value) if !value.is_null() => Ok(*value),
                _ => Ok(kernel.memory.global_name("")?),
            }
        }
    }
}

/// CONDITION(option): information about the current trapped condition.
fn builtin_condition(
    kernel: &mut Kernel,
    activity: ActivityId,
    fi: usize,
    args: &[ObjRef],
) -> Result<ObjRef, RexxError> {
    let settings = frame_settings(kernel, activity, fi);
    let option = args
        .first()
        .copied()
        .filter(|r| !r.is_null())
        .map(|r| display_string(&kernel.memory, r, &settings).to_ascii_uppercase());
    let option = option
        .as_deref()
        .and_then(|text| text.chars().next())
        .unwrap_or('I');

    let condition = kernel.entry(activity).condition;
    if condition.is_null() {
        return match option {
            'O' => Ok(kernel.memory.nil()),
            _ => Ok(kernel.memory.global_name("")?),
        };
    }

    let lookup = |key: &str, kernel: &mut Kernel| -> Result<ObjRef, RexxError> {
        match kernel.memory.dir_get(condition, key) {
            Some(value) => Ok(value),
            None => Ok(kernel.memory.global_name("")?),
        }
    };
    match option {
        'C' => lookup("CONDITION", kernel),
        'D' => lookup("DESCRIPTION", kernel),
        'O' => Ok(condition),
        // 'S': the condition state; trapped conditions report ON.
        'S' => Ok(kernel.memory.global_name("ON")?),
        _ => lookup("CONDITION", kernel),
    }
}

/// LENGTH(string).
fn builtin_length(
    kernel: &mut Kernel,
    activity: ActivityId,
    fi: usize,
    args: &[ObjRef],
) -> Result<ObjRef, RexxError> {
    let settings = frame_settings(kernel, activity, fi);
    let Some(value) = args.first().copied().filter(|r| !r.is_null()) else {
        return Err(RexxError::Syntax(SyntaxError::with(
            error_codes::ARGUMENT_REQUIRED,
            vec!["1".to_string()],
        )));
    };
    let text = display_string(&kernel.memory, value, &settings);
    Ok(kernel
        .memory
        .new_number(RexxNumber::from_integer(text.len() as i64))?)
}

/// ABS(number).
fn builtin_abs(
    kernel: &mut Kernel,
    _activity: ActivityId,
    _fi: usize,
    args: &[ObjRef],
) -> Result<ObjRef, RexxError> {
    let Some(value) = args.first().copied().filter(|r| !r.is_null()) else {
        return Err(RexxError::Syntax(SyntaxError::with(
            error_codes::ARGUMENT_REQUIRED,
            vec!["1".to_string()],
        )));
    };
    let number = to_number(&kernel.memory, value)?;
    Ok(kernel.memory.new_number(number.abs())?)
}
