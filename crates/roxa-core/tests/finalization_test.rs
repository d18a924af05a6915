// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Finalisation integration tests: uninit methods run exactly once.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]

use std::sync::Arc;

use parking_lot::Mutex;

use roxa_abi::exits::{ExitCode, ExitResult};
use roxa_core::Interpreter;

fn capture(interpreter: &Interpreter) -> Arc<Mutex<Vec<String>>> {
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    interpreter.set_exit_handler(
        ExitCode::SayTraceOutput,
        Arc::new(move |_, text| {
            sink.lock().push(text.to_string());
            ExitResult::Handled
        }),
    );
    lines
}

fn publish_class(interpreter: &Interpreter, definition: &str, class_name: &str) {
    let activity = interpreter.attach_thread();
    let package = interpreter
        .create_program(&activity, "SETUP", definition)
        .unwrap();
    let class = package.find_class(class_name).unwrap();
    interpreter.with_kernel(&activity, |kernel| {
        let environment = kernel.memory.environment();
        kernel.memory.dir_put(environment, class_name, class);
    });
}

/// After the only reference is dropped and a collection runs, the uninit
/// method has run exactly once, even across further collections.
#[test]
fn uninit_runs_exactly_once() {
    let interpreter = Interpreter::new();
    let lines = capture(&interpreter);

    publish_class(
        &interpreter,
        "exit\n::class tracked\n::method uninit\nsay 'uninit ran'\nreturn 0",
        "TRACKED",
    );

    let activity = interpreter.attach_thread();
    let package = interpreter
        .create_program(&activity, "MAIN", "x = .tracked~new\nsay 'made'\ndrop x")
        .unwrap();
    assert_eq!(interpreter.run_program(&activity, &package, &[]), 0);
    assert_eq!(lines.lock().clone(), vec!["made"]);

    // The object is garbage now; the collection queues and runs uninit.
    interpreter.collect(&activity);
    assert_eq!(lines.lock().clone(), vec!["made", "uninit ran"]);

    // Subsequent collections never run it again.
    interpreter.collect(&activity);
    interpreter.collect(&activity);
    assert_eq!(lines.lock().clone(), vec!["made", "uninit ran"]);
}

/// A reachable object is never finalised.
#[test]
fn reachable_objects_are_not_finalised() {
    let interpreter = Interpreter::new();
    let lines = capture(&interpreter);

    publish_class(
        &interpreter,
        "exit\n::class tracked\n::method uninit\nsay 'uninit ran'\nreturn 0",
        "TRACKED",
    );

    let activity = interpreter.attach_thread();
    // The instance stays anchored in the environment.
    let package = interpreter
        .create_program(&activity, "MAIN", "x = .tracked~new\nr = x~string")
        .unwrap();
    interpreter.run_program(&activity, &package, &[]);

    interpreter.with_kernel(&activity, |kernel| {
        // Anchor a fresh instance under a global name.
        let class = {
            let environment = kernel.memory.environment();
            kernel.memory.dir_get(environment, "TRACKED").unwrap()
        };
        let instance = kernel
            .allocate(roxa_core::object::ObjectData::Instance(
                roxa_core::object::InstanceData {
                    class,
                    dictionaries: Vec::new(),
                },
            ))
            .unwrap();
        kernel.memory.add_uninit_object(instance);
        let environment = kernel.memory.environment();
        kernel.memory.dir_put(environment, "KEPT", instance);
    });

    interpreter.collect(&activity);
    interpreter.collect(&activity);
    let output = lines.lock().clone();
    // Only the program's own dropped instance finalises; the anchored one
    // never does.
    assert_eq!(
        output.iter().filter(|l| l.as_str() == "uninit ran").count(),
        1
    );
}

/// A failing uninit method does not kill the activity or stop the queue.
#[test]
fn failing_uninit_is_contained() {
    let interpreter = Interpreter::new();
    let lines = capture(&interpreter);

    publish_class(
        &interpreter,
        "exit\n::class bad\n::method uninit\nx = 1/0\nreturn 0",
        "BAD",
    );
    publish_class(
        &interpreter,
        "exit\n::class good\n::method uninit\nsay 'good uninit'\nreturn 0",
        "GOOD",
    );

    let activity = interpreter.attach_thread();
    let package = interpreter
        .create_program(
            &activity,
            "MAIN",
            "a = .bad~new\nb = .good~new\ndrop a\ndrop b",
        )
        .unwrap();
    assert_eq!(interpreter.run_program(&activity, &package, &[]), 0);

    interpreter.collect(&activity);
    // The failing uninit is swallowed; the good one still ran.
    assert!(lines.lock().iter().any(|l| l == "good uninit"));
}
