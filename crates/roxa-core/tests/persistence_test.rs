// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Persistence integration tests: image save/restore and program
//! serialisation through the public interpreter API.

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

#[test]
fn image_roundtrip_preserves_the_environment() {
    let saver = Interpreter::new();
    let activity = saver.attach_thread();
    saver.with_kernel(&activity, |kernel| {
        let marker = kernel.memory.new_string("from the image").unwrap();
        let environment = kernel.memory.environment();
        kernel.memory.dir_put(environment, "MARKER", marker);
    });
    let bytes = saver.save_image(&activity).unwrap();

    let restored = Interpreter::from_image(&bytes).unwrap();
    let lines = capture(&restored);
    let activity = restored.attach_thread();
    let package = restored
        .create_program(&activity, "USER", "say .marker")
        .unwrap();
    assert_eq!(restored.run_program(&activity, &package, &[]), 0);
    assert_eq!(lines.lock().clone(), vec!["from the image"]);
}

#[test]
fn restored_interpreters_still_collect() {
    let saver = Interpreter::new();
    let activity = saver.attach_thread();
    let bytes = saver.save_image(&activity).unwrap();

    let restored = Interpreter::from_image(&bytes).unwrap();
    let activity = restored.attach_thread();
    // New-space allocation against old-space containers exercises the
    // old-to-new table through a full collection.
    restored.with_kernel(&activity, |kernel| {
        let young = kernel.memory.new_string("young").unwrap();
        let environment = kernel.memory.environment();
        kernel.memory.dir_put(environment, "YOUNG", young);
    });
    restored.collect(&activity);
    restored.with_kernel(&activity, |kernel| {
        let environment = kernel.memory.environment();
        let young = kernel.memory.dir_get(environment, "YOUNG").unwrap();
        assert_eq!(kernel.memory.string_text(young), Some("young"));
        assert!(kernel.memory.check_ledgers());
    });
}

#[test]
fn corrupted_images_abort_startup() {
    let saver = Interpreter::new();
    let activity = saver.attach_thread();
    let mut bytes = saver.save_image(&activity).unwrap();
    bytes[0] ^= 0x55;
    assert!(Interpreter::from_image(&bytes).is_err());
}

#[test]
fn serialized_programs_evaluate_equivalently() {
    let interpreter = Interpreter::new();
    let lines = capture(&interpreter);
    let activity = interpreter.attach_thread();

    let source = "total = 0\ndo i = 1 to 4\ntotal = total + i\nend\nsay total";
    let original = interpreter
        .create_program(&activity, "ORIG", source)
        .unwrap();
    assert_eq!(interpreter.run_program(&activity, &original, &[]), 0);

    // Serialise, restore, and run the restored form on every input.
    let serialized = original.serialize();
    let restored = interpreter
        .create_program(&activity, "RESTORED", &serialized)
        .unwrap();
    assert_eq!(interpreter.run_program(&activity, &restored, &[]), 0);

    assert_eq!(lines.lock().clone(), vec!["10", "10"]);
}

#[test]
fn flatten_unflatten_of_object_graphs() {
    let interpreter = Interpreter::new();
    let activity = interpreter.attach_thread();

    interpreter.with_kernel(&activity, |kernel| {
        let name = kernel.memory.new_string("payload").unwrap();
        let nil = kernel.memory.nil();
        let array = kernel.memory.new_array(vec![name, nil]).unwrap();

        let bytes = roxa_core::memory::envelope::flatten(&kernel.memory, array);
        let restored = roxa_core::memory::envelope::unflatten(
            &mut kernel.memory,
            &bytes,
            &mut roxa_core::memory::wire::NoCode,
        )
        .unwrap();

        let items = kernel.memory.array_items(restored).to_vec();
        // Value equality for strings, identity for singletons.
        assert_eq!(kernel.memory.string_text(items[0]), Some("payload"));
        assert_eq!(items[1], kernel.memory.nil());
    });
}
