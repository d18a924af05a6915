// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the translate driver: control structures, labels, deferred
//! resolution, and directives.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use crate::activity::condition::{SyntaxError, error_codes};
use crate::instructions::{BinaryOp, CallTarget, Expr, Keyword};
use crate::memory::Memory;
use crate::memory::sets::PoolBoundaryPolicy;
use crate::object::ObjectData;
use crate::package::Package;

use super::source::ProgramSource;
use super::{translate_interpret, translate_program};

fn translate(text: &str) -> Arc<Package> {
    try_translate(text).unwrap()
}

fn try_translate(text: &str) -> Result<Arc<Package>, SyntaxError> {
    let mut memory = Memory::create(PoolBoundaryPolicy::default());
    let source = ProgramSource::from_buffer("TEST", text);
    translate_program(&mut memory, &source)
}

#[test]
fn say_with_arithmetic_translates_to_one_instruction() {
    let package = translate("say 1 + 2 * 3");
    let code = &package.main;
    assert_eq!(code.instructions.len(), 1);
    let Keyword::Say { expr: Some(expr) } = &code.instruction(code.first.unwrap()).keyword
    else {
        panic!("expected a SAY instruction");
    };
    // The operand order is push 1, push 2, push 3, MULTIPLY, ADD.
    let Expr::Binary { op, right, .. } = code.expr(*expr) else {
        panic!("expected a binary expression");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(
        code.expr(*right),
        Expr::Binary {
            op: BinaryOp::Multiply,
            ..
        }
    ));
    assert_eq!(code.max_stack, 3);
}

#[test]
fn if_then_else_links_branches() {
    let package = translate("if x then say 1\nelse say 2\nsay 3");
    let code = &package.main;

    let Keyword::If {
        then_target,
        else_target,
        ..
    } = &code.instruction(code.first.unwrap()).keyword
    else {
        panic!("expected an IF instruction");
    };
    let else_target = else_target.expect("an ELSE branch");

    // Both arms join at the trailing SAY.
    let join = code.instruction(*then_target).next.unwrap();
    assert_eq!(code.instruction(else_target).next, Some(join));
    assert!(matches!(code.instruction(join).keyword, Keyword::Say { .. }));
}

#[test]
fn if_without_else_joins_through_the_if() {
    let package = translate("if x then say 1\nsay 2");
    let code = &package.main;
    let first = code.first.unwrap();
    let Keyword::If { then_target, .. } = &code.instruction(first).keyword else {
        panic!("expected an IF instruction");
    };
    let join = code.instruction(first).next.unwrap();
    assert_eq!(code.instruction(*then_target).next, Some(join));
}

#[test]
fn then_may_start_the_next_clause() {
    let package = translate("if x\nthen say 1");
    let code = &package.main;
    assert!(matches!(
        code.instruction(code.first.unwrap()).keyword,
        Keyword::If { .. }
    ));
}

#[test]
fn do_end_loops_link_opener_and_closer() {
    let package = translate("do i = 1 to 3\nsay i\nend");
    let code = &package.main;
    let first = code.first.unwrap();
    let Keyword::Do {
        end_target,
        repetitive,
        spec,
    } = &code.instruction(first).keyword
    else {
        panic!("expected a DO instruction");
    };
    assert!(*repetitive);
    assert!(spec.control.is_some());
    let Keyword::End { opener } = &code.instruction(*end_target).keyword else {
        panic!("expected the END instruction");
    };
    assert_eq!(*opener, first);
}

#[test]
fn missing_end_reports_the_opener_line() {
    let error = try_translate("say 1\ndo i = 1 to 3\nsay i").unwrap_err();
    assert_eq!(error.code, error_codes::INCOMPLETE_DO);
    // The line number points at the DO, not the end of file.
    assert_eq!(error.line, 2);
}

#[test]
fn missing_select_end_reports_the_opener_line() {
    let error = try_translate("select\nwhen 1 then say 1").unwrap_err();
    assert_eq!(error.code, error_codes::INCOMPLETE_SELECT);
    assert_eq!(error.line, 1);
}

#[test]
fn select_when_chain() {
    let package = translate("select\nwhen a then say 1\nwhen b then say 2\notherwise say 3\nend");
    let code = &package.main;
    let select = code.first.unwrap();
    let Keyword::Select {
        end_target,
        has_otherwise,
    } = &code.instruction(select).keyword
    else {
        panic!("expected SELECT");
    };
    assert!(*has_otherwise);

    // The SELECT flows into the first WHEN; its false branch is the second.
    let first_when = code.instruction(select).next.unwrap();
    let Keyword::When { on_false, .. } = &code.instruction(first_when).keyword else {
        panic!("expected WHEN");
    };
    assert!(matches!(
        code.instruction(*on_false).keyword,
        Keyword::When { .. }
    ));
    assert!(matches!(
        code.instruction(*end_target).keyword,
        Keyword::End { .. }
    ));
}

#[test]
fn otherwise_without_select_is_an_error() {
    let error = try_translate("otherwise say 1").unwrap_err();
    assert_eq!(error.code, error_codes::UNEXPECTED_OTHERWISE);
}

#[test]
fn when_without_select_is_an_error() {
    let error = try_translate("when 1 then say 1").unwrap_err();
    assert_eq!(error.code, error_codes::UNEXPECTED_WHEN_NO_SELECT);
}

#[test]
fn otherwise_before_any_when_is_an_error() {
    let error = try_translate("select\notherwise say 1\nend").unwrap_err();
    assert_eq!(error.code, error_codes::WHEN_EXPECTED_FIRST);
}

#[test]
fn else_without_if_is_an_error() {
    let error = try_translate("else say 1").unwrap_err();
    assert_eq!(error.code, error_codes::UNEXPECTED_ELSE);
}

#[test]
fn end_without_block_is_an_error() {
    let error = try_translate("end").unwrap_err();
    assert_eq!(error.code, error_codes::UNEXPECTED_END_NO_BLOCK);
}

#[test]
fn end_name_must_match_the_control_variable() {
    let error = try_translate("do i = 1 to 2\nsay i\nend j").unwrap_err();
    assert_eq!(error.code, error_codes::END_MISMATCH_DO);

    // A matching name closes cleanly.
    assert!(try_translate("do i = 1 to 2\nsay i\nend i").is_ok());
}

#[test]
fn labels_are_hoisted_and_first_wins() {
    let package = translate("start: say 1\nstart: say 2");
    let code = &package.main;
    let target = code.labels.get("START").copied().unwrap();
    // The first definition wins.
    assert_eq!(target, code.first.unwrap());
    assert_eq!(code.labels.len(), 1);
}

#[test]
fn call_resolves_to_internal_labels() {
    let package = translate("call helper\nexit\nhelper: return 5");
    let code = &package.main;
    let Keyword::Call { target, .. } = &code.instruction(code.first.unwrap()).keyword else {
        panic!("expected CALL");
    };
    let CallTarget::Label(label) = target else {
        panic!("expected the label to be resolved, got {target:?}");
    };
    assert_eq!(Some(*label), code.labels.get("HELPER").copied());
}

#[test]
fn unresolved_calls_stay_for_runtime() {
    let package = translate("call unknown");
    let code = &package.main;
    let Keyword::Call { target, .. } = &code.instruction(code.first.unwrap()).keyword else {
        panic!("expected CALL");
    };
    assert_eq!(*target, CallTarget::Unresolved);
}

#[test]
fn routine_directive_defines_a_routine() {
    let mut memory = Memory::create(PoolBoundaryPolicy::default());
    let source = ProgramSource::from_buffer("TEST", "exit\n::routine double\nreturn arg(1) * 2");
    let package = translate_program(&mut memory, &source).unwrap();

    let routine = package.find_routine("DOUBLE").unwrap();
    match &memory.cell(routine).data {
        ObjectData::Routine(data) => {
            assert_eq!(data.name.as_ref(), "DOUBLE");
            assert!(!data.code.instructions.is_empty());
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn class_directives_install_in_dependency_order() {
    let mut memory = Memory::create(PoolBoundaryPolicy::default());
    let source = ProgramSource::from_buffer(
        "TEST",
        "exit\n::class child subclass base\n::class base\n::class other",
    );
    let package = translate_program(&mut memory, &source).unwrap();

    let order: Vec<&str> = package
        .classes
        .iter()
        .map(|(name, _)| name.as_ref())
        .collect();
    let base_at = order.iter().position(|n| *n == "BASE").unwrap();
    let child_at = order.iter().position(|n| *n == "CHILD").unwrap();
    assert!(base_at < child_at);

    // The child really references the installed base class.
    let child = package.find_class("CHILD").unwrap();
    let base = package.find_class("BASE").unwrap();
    match &memory.cell(child).data {
        ObjectData::Class(data) => assert_eq!(data.superclasses, vec![base]),
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn cyclic_class_dependencies_abort() {
    let error =
        try_translate("exit\n::class a subclass b\n::class b subclass a").unwrap_err();
    assert_eq!(error.code, error_codes::TRANSLATION_CYCLIC);
    // At least one of the classes is named.
    assert!(error.additional[0] == "A" || error.additional[0] == "B");
}

#[test]
fn method_directives_attach_to_the_class() {
    let mut memory = Memory::create(PoolBoundaryPolicy::default());
    let source = ProgramSource::from_buffer(
        "TEST",
        "exit\n::class counter\n::method bump\nreturn 1\n::method uninit\nreturn 0",
    );
    let package = translate_program(&mut memory, &source).unwrap();
    let class = package.find_class("COUNTER").unwrap();
    match &memory.cell(class).data {
        ObjectData::Class(data) => {
            assert!(data.methods.contains_key("BUMP"));
            assert!(data.has_uninit);
            // Methods get stamped with their defining scope.
            let bump = data.methods["BUMP"];
            match &memory.cell(bump).data {
                ObjectData::Method(method) => assert_eq!(method.scope.as_ref(), "COUNTER"),
                other => panic!("unexpected body: {other:?}"),
            }
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn interpret_translation_rejects_directives() {
    let mut memory = Memory::create(PoolBoundaryPolicy::default());
    let error = translate_interpret(&mut memory, "say 1\n::routine f").unwrap_err();
    assert_eq!(error.code, error_codes::INTERPRET_DIRECTIVE);

    let code = translate_interpret(&mut memory, "x = 1").unwrap();
    assert!(code.interpret);
    assert_eq!(code.variable_count, 0);
}

#[test]
fn max_stack_bounds_nested_expressions() {
    let package = translate("say ((1 + 2) * (3 + 4)) + f(5, 6)");
    assert!(package.main.max_stack >= 3);
}
