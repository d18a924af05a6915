// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! End-to-end tests for the interpreter instance.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use parking_lot::Mutex;

use roxa_abi::exits::{ExitCode, ExitResult};

use crate::activity::condition::{RexxError, error_codes};

use super::Interpreter;

/// An interpreter whose SAY stream is captured.
fn capture() -> (Interpreter, Arc<Mutex<Vec<String>>>) {
    let interpreter = Interpreter::new();
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    interpreter.set_exit_handler(
        ExitCode::SayTraceOutput,
        Arc::new(move |_, text| {
            sink.lock().push(text.to_string());
            ExitResult::Handled
        }),
    );
    (interpreter, lines)
}

fn run(text: &str) -> (i64, Vec<String>) {
    let (interpreter, lines) = capture();
    let activity = interpreter.attach_thread();
    let package = interpreter
        .create_program(&activity, "TEST", text)
        .unwrap();
    let rc = interpreter.run_program(&activity, &package, &[]);
    let output = lines.lock().clone();
    (rc, output)
}

#[test]
fn say_prints_arithmetic_results() {
    let (rc, output) = run("say 1 + 2 * 3");
    assert_eq!(rc, 0);
    assert_eq!(output, vec!["7"]);
}

#[test]
fn assignment_and_concatenation() {
    let (rc, output) = run("a = 'Hello'\nb = 'there'\nsay a b\nsay a||b");
    assert_eq!(rc, 0);
    assert_eq!(output, vec!["Hello there", "Hellothere"]);
}

#[test]
fn if_else_branches() {
    let (_, output) = run("x = 5\nif x > 3 then say 'big'\nelse say 'small'");
    assert_eq!(output, vec!["big"]);
    let (_, output) = run("x = 1\nif x > 3 then say 'big'\nelse say 'small'");
    assert_eq!(output, vec!["small"]);
}

#[test]
fn select_picks_the_first_true_when() {
    let program = "x = 2\nselect\nwhen x = 1 then say 'one'\nwhen x = 2 then say 'two'\notherwise say 'many'\nend";
    let (_, output) = run(program);
    assert_eq!(output, vec!["two"]);

    let program = "x = 9\nselect\nwhen x = 1 then say 'one'\notherwise say 'many'\nend";
    let (_, output) = run(program);
    assert_eq!(output, vec!["many"]);
}

#[test]
fn select_without_match_raises_error_7() {
    let program = "x = 9\nselect\nwhen x = 1 then say 'one'\nend";
    let (rc, _) = run(program);
    assert_eq!(rc, 7);
}

#[test]
fn do_loops_iterate() {
    let (_, output) = run("do i = 1 to 3\nsay i\nend");
    assert_eq!(output, vec!["1", "2", "3"]);

    let (_, output) = run("do i = 10 to 1 by -4\nsay i\nend");
    assert_eq!(output, vec!["10", "6", "2"]);

    let (_, output) = run("do 2\nsay 'x'\nend");
    assert_eq!(output, vec!["x", "x"]);
}

#[test]
fn do_while_and_until() {
    let (_, output) = run("i = 0\ndo while i < 3\ni = i + 1\nsay i\nend");
    assert_eq!(output, vec!["1", "2", "3"]);

    let (_, output) = run("i = 0\ndo until i >= 2\ni = i + 1\nsay i\nend");
    assert_eq!(output, vec!["1", "2"]);
}

#[test]
fn leave_and_iterate() {
    let (_, output) = run("do i = 1 to 5\nif i = 3 then leave\nsay i\nend");
    assert_eq!(output, vec!["1", "2"]);

    let (_, output) = run("do i = 1 to 4\nif i = 2 then iterate\nsay i\nend");
    assert_eq!(output, vec!["1", "3", "4"]);
}

#[test]
fn routines_and_the_result_variable() {
    let program = "call double 21\nsay result\nexit\n::routine double\nreturn arg(1) * 2";
    let (rc, output) = run(program);
    assert_eq!(rc, 0);
    assert_eq!(output, vec!["42"]);
}

#[test]
fn internal_label_calls() {
    let program = "call shout\nexit\nshout: say 'internal'\nreturn";
    let (_, output) = run(program);
    assert_eq!(output, vec!["internal"]);
}

#[test]
fn scenario_loop_with_routine_runs_silently() {
    // do i=1 to 3; call f i; end with ::routine f: RC 0 and no output.
    let program = "do i = 1 to 3\ncall f i\nend\n::routine f\nreturn arg(1) * 2";
    let (rc, output) = run(program);
    assert_eq!(rc, 0);
    assert!(output.is_empty());
}

#[test]
fn routine_called_directly_computes() {
    let (interpreter, _) = capture();
    let activity = interpreter.attach_thread();
    let program = "exit\n::routine f\nreturn arg(1) * 2";
    let package = interpreter
        .create_program(&activity, "TEST", program)
        .unwrap();
    let result = interpreter
        .call_routine(&activity, &package, "f", &["2"])
        .unwrap();
    assert_eq!(result.as_deref(), Some("4"));
}

#[test]
fn signal_on_syntax_traps_division_by_zero() {
    // Scenario: trapped SYNTAX, CONDITION('C') compares truthy, RC 1.
    let program =
        "signal on syntax\nx = 1/0\nexit 42\nsyntax: exit condition('C')='SYNTAX'";
    let (rc, output) = run(program);
    assert_eq!(rc, 1);
    assert!(output.is_empty());
}

#[test]
fn untrapped_errors_report_and_set_rc() {
    let (rc, output) = run("x = 1/0");
    assert_eq!(rc, 42);
    assert!(output[0].contains("Error 42"));
    assert!(output[0].contains("line 1"));
    assert!(output.iter().any(|l| l.contains("divisor")));
}

#[test]
fn exit_sets_the_return_code() {
    let (rc, _) = run("exit 7");
    assert_eq!(rc, 7);
    let (rc, _) = run("exit");
    assert_eq!(rc, 0);
}

#[test]
fn interpret_runs_in_the_caller_context() {
    let program = "x = 1\ninterpret 'x = x + 1'\nsay x";
    let (_, output) = run(program);
    assert_eq!(output, vec!["2"]);
}

#[test]
fn compound_variables_and_stems() {
    let program = "a.1 = 'one'\nn = 1\nsay a.n\nsay a.2\na. = 'all'\nsay a.7";
    let (_, output) = run(program);
    assert_eq!(output, vec!["one", "A.2", "all"]);
}

#[test]
fn novalue_defaults_to_the_name() {
    let (_, output) = run("say missing");
    assert_eq!(output, vec!["MISSING"]);
}

#[test]
fn signal_jumps_to_labels() {
    let program = "signal skip\nsay 'not printed'\nskip: say 'landed'";
    let (_, output) = run(program);
    assert_eq!(output, vec!["landed"]);
}

#[test]
fn signal_to_a_missing_label_is_error_16() {
    let (rc, _) = run("signal nowhere");
    assert_eq!(rc, 16);
}

#[test]
fn numeric_digits_changes_precision() {
    let program = "numeric digits 3\nsay 1 / 3";
    let (_, output) = run(program);
    assert_eq!(output, vec!["0.333"]);
}

#[test]
fn classes_instantiate_and_dispatch() {
    // Class objects land in the package; publish one to the environment and
    // drive dispatch through an environment symbol.
    let (interpreter, lines) = capture();
    let activity = interpreter.attach_thread();
    let package = interpreter
        .create_program(
            &activity,
            "TEST",
            "exit\n::class greeter\n::method hello\nreturn 'hi from method'",
        )
        .unwrap();
    let class = package.find_class("GREETER").unwrap();

    // Install the class in the environment, then run a program using it.
    interpreter.with_kernel(&activity, |kernel| {
        let environment = kernel.memory.environment();
        kernel.memory.dir_put(environment, "GREETER", class);
    });
    let user = interpreter
        .create_program(&activity, "USER", "g = .greeter~new\nsay g~hello")
        .unwrap();
    let rc = interpreter.run_program(&activity, &user, &[]);
    assert_eq!(rc, 0);
    assert_eq!(lines.lock().clone(), vec!["hi from method"]);
}

#[test]
fn condition_builtin_outside_a_trap_is_empty() {
    let (_, output) = run("say condition('C') 'end'");
    assert_eq!(output, vec![" end"]);
}

#[test]
fn failing_say_exit_is_disabled() {
    let interpreter = Interpreter::new();
    interpreter.set_exit_handler(
        ExitCode::SayTraceOutput,
        Arc::new(|_, _| ExitResult::Error),
    );
    let activity = interpreter.attach_thread();
    let package = interpreter
        .create_program(&activity, "TEST", "say 'once'")
        .unwrap();
    // The error disables the exit; execution continues on the default path.
    let rc = interpreter.run_program(&activity, &package, &[]);
    assert_eq!(rc, 0);
}

#[test]
fn translate_errors_carry_program_and_line() {
    let interpreter = Interpreter::new();
    let activity = interpreter.attach_thread();
    let error = interpreter
        .create_program(&activity, "BROKEN", "say 1\ndo i = 1 to 3\nsay i")
        .unwrap_err();
    match error {
        RexxError::Syntax(e) => {
            assert_eq!(e.code, error_codes::INCOMPLETE_DO);
            assert_eq!(e.program, "BROKEN");
            assert_eq!(e.line, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn serialized_programs_restore_equivalently() {
    let (interpreter, lines) = capture();
    let activity = interpreter.attach_thread();
    let package = interpreter
        .create_program(&activity, "ORIG", "say 6 * 7")
        .unwrap();
    let serialized = package.serialize();

    let restored = interpreter
        .create_program(&activity, "RESTORED", &serialized)
        .unwrap();
    let rc = interpreter.run_program(&activity, &restored, &[]);
    assert_eq!(rc, 0);
    assert_eq!(lines.lock().clone(), vec!["42"]);
}
