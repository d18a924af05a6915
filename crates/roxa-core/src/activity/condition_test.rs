// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for conditions and the message catalogue.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::memory::Memory;
use crate::memory::sets::PoolBoundaryPolicy;

use super::condition::{
    RexxError, SyntaxError, conditions, create_condition_object, create_syntax_condition,
    display_code, error_codes, major_code, mark_propagated, minor_code, primary_message,
    secondary_message, stringify_for_message, substitute_message,
};

#[test]
fn code_packing() {
    assert_eq!(major_code(error_codes::DIVIDE_BY_ZERO), 42);
    assert_eq!(minor_code(error_codes::DIVIDE_BY_ZERO), 903);
    assert_eq!(display_code(error_codes::DIVIDE_BY_ZERO), "42.903");
    assert_eq!(display_code(error_codes::UNEXPECTED_END), "10");
}

#[test]
fn catalogue_lookups() {
    assert_eq!(primary_message(42), "Arithmetic overflow/underflow");
    assert!(secondary_message(error_codes::DIVIDE_BY_ZERO).is_some());
    assert!(secondary_message(error_codes::UNEXPECTED_END).is_none());
    assert_eq!(primary_message(12345), "Unknown error");
}

#[test]
fn marker_substitution() {
    let text = substitute_message("Label \"&1\" not found in &2", &[
        "TARGET".to_string(),
        "PROG".to_string(),
    ]);
    assert_eq!(text, "Label \"TARGET\" not found in PROG");

    // Missing additionals vanish; unknown markers stay literal text.
    assert_eq!(substitute_message("&1 and &9", &["x".to_string()]), "x and ");
    assert_eq!(substitute_message("100& done", &[]), "100& done");
}

#[test]
fn syntax_error_message() {
    let error = SyntaxError::with(
        error_codes::LABEL_NOT_FOUND_NAME,
        vec!["SYNTAX".to_string()],
    );
    assert_eq!(error.message().unwrap(), "Label \"SYNTAX\" not found");
    assert_eq!(format!("{error}"), "Error 16.901: Label \"SYNTAX\" not found");
}

#[test]
fn at_line_keeps_first_location() {
    let error = SyntaxError::new(error_codes::INVALID_EXPRESSION)
        .at_line(4)
        .at_line(9);
    assert_eq!(error.line, 4);
}

#[test]
fn syntax_condition_object_fields() {
    let mut memory = Memory::create(PoolBoundaryPolicy::default());
    let mut error = SyntaxError::with(
        error_codes::DIVIDE_BY_ZERO,
        vec!["0".to_string()],
    );
    error.line = 12;
    error.program = "TEST".to_string();

    let object = create_syntax_condition(&mut memory, &error).unwrap();
    let name = memory.dir_get(object, "CONDITION").unwrap();
    assert_eq!(memory.string_text(name), Some("SYNTAX"));
    let code = memory.dir_get(object, "CODE").unwrap();
    assert_eq!(memory.string_text(code), Some("42.903"));
    let rc = memory.dir_get(object, "RC").unwrap();
    assert!(memory.number_value(rc).is_some());
    assert!(memory.dir_get(object, "MESSAGE").is_some());
    assert!(memory.dir_get(object, "PROGRAM").is_some());
    assert!(memory.dir_get(object, "POSITION").is_some());

    // PROPAGATED starts false and flips on propagation.
    assert_eq!(
        memory.dir_get(object, "PROPAGATED"),
        Some(memory.false_object())
    );
    mark_propagated(&mut memory, object);
    assert_eq!(
        memory.dir_get(object, "PROPAGATED"),
        Some(memory.true_object())
    );
}

#[test]
fn plain_condition_object_fields() {
    let mut memory = Memory::create(PoolBoundaryPolicy::default());
    let object = create_condition_object(
        &mut memory,
        conditions::HALT,
        "operator request",
        crate::types::ObjRef::NULL,
        crate::types::ObjRef::NULL,
    )
    .unwrap();
    let name = memory.dir_get(object, "CONDITION").unwrap();
    assert_eq!(memory.string_text(name), Some("HALT"));
    assert!(memory.dir_get(object, "ADDITIONAL").is_none());
}

#[test]
fn rexx_error_codes() {
    let syntax = RexxError::Syntax(SyntaxError::new(error_codes::DIVIDE_BY_ZERO));
    assert_eq!(syntax.return_code(), 42);
    assert_eq!(syntax.condition_name(), conditions::SYNTAX);
    assert_eq!(RexxError::Storage.return_code(), 5);
}

#[test]
fn string_conversion_recursion_guard() {
    let mut memory = Memory::create(PoolBoundaryPolicy::default());
    let value = memory.new_string("plain").unwrap();

    let mut requesting = false;
    assert_eq!(
        stringify_for_message(&memory, value, &mut requesting),
        "plain"
    );
    assert!(!requesting);

    // A re-entrant request reroutes to the default name.
    let mut requesting = true;
    assert_eq!(
        stringify_for_message(&memory, value, &mut requesting),
        "a String"
    );
}
