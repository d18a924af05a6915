// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The variable-pool interface.
//!
//! A chained-request protocol: each request block describes one fetch /
//! set / drop / next / private operation against the caller's variable
//! context. Per-block results accumulate in `ret`; the chain result is the
//! bitwise OR of every block, and processing continues past per-block
//! failures. The NEXT iteration cursor lives on the native activation and
//! any non-NEXT operation resets it.

use roxa_abi::pool::{ShvCode, ShvReturn};

use crate::activity::NumericSettings;
use crate::activity::manager::Kernel;
use crate::execution::RexxActivation;
use crate::execution::eval::display_string;
use crate::types::ActivityId;

use super::PoolCursor;

/// One request of a variable-pool chain, at the Rust level.
///
/// The C-ABI shape (`ShvBlock`) maps onto this field for field; the core
/// works on owned strings so no boundary lifetimes leak inward.
#[derive(Debug, Clone)]
pub struct PoolRequest {
    /// The operation.
    pub code: ShvCode,
    /// Variable name (input; output for NEXT).
    pub name: String,
    /// Variable value (input for set, output for fetch/next).
    pub value: String,
    /// Per-block return bits.
    pub ret: u8,
}

impl PoolRequest {
    /// A request with empty name and value.
    #[must_use]
    pub fn new(code: ShvCode) -> Self {
        Self {
            code,
            name: String::new(),
            value: String::new(),
            ret: ShvReturn::OK,
        }
    }
}

/// Validate and normalise a symbolic variable name.
fn symbolic_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    let upper = trimmed.to_ascii_uppercase();
    let mut chars = upper.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || matches!(c, '_' | '!' | '?') => {}
        _ => return None,
    }
    if upper
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '!' | '?'))
    {
        Some(upper)
    } else {
        None
    }
}

fn resolve_name(request: &PoolRequest) -> Result<String, u8> {
    if request.name.is_empty() {
        return Err(ShvReturn::BADN);
    }
    if request.code.is_symbolic() {
        symbolic_name(&request.name).ok_or(ShvReturn::BADN)
    } else {
        Ok(request.name.clone())
    }
}

fn caller_frame<'k>(
    kernel: &'k mut Kernel,
    activity: ActivityId,
) -> Option<&'k mut RexxActivation> {
    kernel
        .entry_mut(activity)
        .stack
        .current_rexx_mut()
        .map(|activation| &mut *activation)
}

/// Process a request chain against the caller's variable context.
///
/// Returns the composite return bits across the chain.
pub fn process_pool(
    kernel: &mut Kernel,
    activity: ActivityId,
    cursor: &mut PoolCursor,
    requests: &mut [PoolRequest],
) -> u8 {
    let mut composite = ShvReturn::OK;
    for request in requests {
        request.ret = if cursor.enabled {
            process_request(kernel, activity, cursor, request)
        } else {
            ShvReturn::BADF
        };
        composite |= request.ret;
    }
    composite
}

fn process_request(
    kernel: &mut Kernel,
    activity: ActivityId,
    cursor: &mut PoolCursor,
    request: &mut PoolRequest,
) -> u8 {
    if request.code.resets_iteration() {
        cursor.reset();
    }

    match request.code {
        ShvCode::Set | ShvCode::SymSet => {
            let name = match resolve_name(request) {
                Ok(name) => name,
                Err(bits) => return bits,
            };
            let value = match kernel.memory.new_string(&request.value) {
                Ok(value) => value,
                Err(_) => return ShvReturn::MEMFL,
            };
            let Some(frame) = caller_frame(kernel, activity) else {
                return ShvReturn::BADF;
            };
            let fresh = frame.get_by_name(&name).is_none();
            frame.set_by_name(&name, value);
            if fresh { ShvReturn::NEWV } else { ShvReturn::OK }
        }

        ShvCode::Fetch | ShvCode::SymFetch => {
            let name = match resolve_name(request) {
                Ok(name) => name,
                Err(bits) => return bits,
            };
            let settings = NumericSettings::default();
            let found = match caller_frame(kernel, activity) {
                Some(frame) => frame.get_by_name(&name),
                None => return ShvReturn::BADF,
            };
            match found {
                Some(value) => {
                    request.value = display_string(&kernel.memory, value, &settings);
                    ShvReturn::OK
                }
                None => {
                    // An unassigned variable fetches its own name.
                    request.value = name;
                    ShvReturn::NEWV
                }
            }
        }

        ShvCode::Drop | ShvCode::SymDrop => {
            let name = match resolve_name(request) {
                Ok(name) => name,
                Err(bits) => return bits,
            };
            let Some(frame) = caller_frame(kernel, activity) else {
                return ShvReturn::BADF;
            };
            let fresh = frame.get_by_name(&name).is_none();
            frame.drop_by_name(&name);
            if fresh { ShvReturn::NEWV } else { ShvReturn::OK }
        }

        ShvCode::Next => {
            let names = {
                let Some(frame) = caller_frame(kernel, activity) else {
                    return ShvReturn::BADF;
                };
                frame.variable_names()
            };
            match cursor.advance(|| names) {
                Some(name) => {
                    let settings = NumericSettings::default();
                    let value = caller_frame(kernel, activity)
                        .and_then(|frame| frame.get_by_name(&name));
                    request.name = name.to_string();
                    request.value = match value {
                        Some(value) => display_string(&kernel.memory, value, &settings),
                        None => request.name.clone(),
                    };
                    ShvReturn::OK
                }
                None => ShvReturn::LVAR,
            }
        }

        ShvCode::Private => match request.name.to_ascii_uppercase().as_str() {
            "VERSION" => {
                request.value = crate::VERSION.to_string();
                ShvReturn::OK
            }
            "SOURCE" => {
                let Some(frame) = caller_frame(kernel, activity) else {
                    return ShvReturn::BADF;
                };
                request.value = frame.code.name.to_string();
                ShvReturn::OK
            }
            _ => ShvReturn::BADN,
        },
    }
}
