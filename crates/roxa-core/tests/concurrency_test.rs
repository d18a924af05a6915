// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Concurrency integration tests: the kernel lock and guarded methods.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use roxa_abi::exits::{ExitCode, ExitResult};
use roxa_core::Interpreter;
use roxa_core::object::{InstanceData, ObjectData};

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

/// Publish a class instance under an environment name.
fn publish_instance(interpreter: &Interpreter, definition: &str, class_name: &str, env_name: &str) {
    let activity = interpreter.attach_thread();
    let package = interpreter
        .create_program(&activity, "SETUP", definition)
        .unwrap();
    let class = package.find_class(class_name).unwrap();
    interpreter.with_kernel(&activity, |kernel| {
        let instance = kernel
            .allocate(ObjectData::Instance(InstanceData {
                class,
                dictionaries: Vec::new(),
            }))
            .unwrap();
        let environment = kernel.memory.environment();
        kernel.memory.dir_put(environment, env_name, instance);
    });
}

/// Two activities calling a guarded method on the same object: the output
/// is the concatenation of two complete method bodies, never interleaved.
#[test]
fn guarded_methods_do_not_interleave() {
    let interpreter = Arc::new(Interpreter::new());
    let lines = capture(&interpreter);

    // The say exits release the kernel lock, so without the guard the two
    // bodies could interleave between the begin and end lines.
    let definition = "exit\n\
                      ::class worker\n\
                      ::method job guarded\n\
                      tag = arg(1)\n\
                      say 'begin' tag\n\
                      say 'end' tag\n\
                      return 0";
    publish_instance(&interpreter, definition, "WORKER", "OBJ");

    let mut threads = Vec::new();
    for tag in ["A", "B"] {
        let interpreter = Arc::clone(&interpreter);
        let source = format!("o = .obj\nr = o~job('{tag}')");
        threads.push(thread::spawn(move || {
            let activity = interpreter.attach_thread();
            let package = interpreter
                .create_program(&activity, "CALLER", &source)
                .unwrap();
            assert_eq!(interpreter.run_program(&activity, &package, &[]), 0);
        }));
    }
    for handle in threads {
        handle.join().unwrap();
    }

    let output = lines.lock().clone();
    assert_eq!(output.len(), 4);
    let first_tag = output[0].strip_prefix("begin ").unwrap().to_string();
    assert_eq!(output[1], format!("end {first_tag}"));
    let second_tag = output[2].strip_prefix("begin ").unwrap().to_string();
    assert_eq!(output[3], format!("end {second_tag}"));
    assert_ne!(first_tag, second_tag);
}

/// Repeating the guarded call a few times keeps the invariant under real
/// scheduling pressure.
#[test]
fn guarded_methods_stay_whole_under_repetition() {
    let interpreter = Arc::new(Interpreter::new());
    let lines = capture(&interpreter);

    let definition = "exit\n\
                      ::class worker\n\
                      ::method job guarded\n\
                      tag = arg(1)\n\
                      say 'begin' tag\n\
                      say 'end' tag\n\
                      return 0";
    publish_instance(&interpreter, definition, "WORKER", "OBJ");

    let mut threads = Vec::new();
    for tag in ["A", "B", "C"] {
        let interpreter = Arc::clone(&interpreter);
        let source = format!("o = .obj\ndo 5\nr = o~job('{tag}')\nend");
        threads.push(thread::spawn(move || {
            let activity = interpreter.attach_thread();
            let package = interpreter
                .create_program(&activity, "CALLER", &source)
                .unwrap();
            assert_eq!(interpreter.run_program(&activity, &package, &[]), 0);
        }));
    }
    for handle in threads {
        handle.join().unwrap();
    }

    // Every begin is immediately followed by its matching end.
    let output = lines.lock().clone();
    assert_eq!(output.len(), 30);
    for pair in output.chunks(2) {
        let tag = pair[0].strip_prefix("begin ").unwrap();
        assert_eq!(pair[1], format!("end {tag}"));
    }
}

/// HALT requests surface as a condition at the next clause boundary.
#[test]
fn halt_interrupts_a_running_activity() {
    let interpreter = Arc::new(Interpreter::new());
    let _lines = capture(&interpreter);

    let activity = interpreter.attach_thread();
    let id = activity.id();
    let package = interpreter
        .create_program(&activity, "SPIN", "do forever\nsay 'tick'\nend")
        .unwrap();

    let runner = {
        let interpreter = Arc::clone(&interpreter);
        thread::spawn(move || interpreter.run_program(&activity, &package, &[]))
    };

    thread::sleep(Duration::from_millis(50));
    assert!(interpreter.halt(id, "test halt"));
    let rc = runner.join().unwrap();
    assert_eq!(rc, 4);
}
