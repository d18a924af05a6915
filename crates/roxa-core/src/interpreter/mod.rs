// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The interpreter instance.
//!
//! An [`Interpreter`] owns the kernel lock with its heap, the exit-handler
//! table, the registered native methods, and the command handler. Threads
//! attach as activities, translate programs into packages, and run them
//! through the evaluator.
//!
//! Untrapped errors surface here: the instance formats the standard error
//! report (header with the major code, program and line, then the
//! secondary message) through the say/trace stream and returns the major
//! code as the process return code.

#[cfg(test)]
mod interpreter_test;

mod builtins;

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use roxa_abi::exits::{ExitCode, ExitResult};
use roxa_abi::signature::ArgDescriptor;

use crate::activity::Activity;
use crate::activity::condition::{
    RexxError, display_code, major_code, minor_code, primary_message,
};
use crate::activity::frames::ActivationFrame;
use crate::activity::manager::{ActivityManager, Kernel};
use crate::execution::eval::display_string;
use crate::execution::{Executor, ExecutorServices, Flow, Kx};
use crate::memory::sets::PoolBoundaryPolicy;
use crate::memory::{Memory, image};
use crate::native::signature::{self, NativeValue};
use crate::native::{NativeActivation, PoolCursor};
use crate::package::Package;
use crate::parser::source::ProgramSource;
use crate::parser::translate_program;
use crate::types::{ActivityId, ObjRef};

/// An exit handler: receives the event code and its text payload.
pub type ExitHandler = Arc<dyn Fn(ExitCode, &str) -> ExitResult + Send + Sync>;

/// One slot of the exit table: entry point plus enabled flag.
#[derive(Default, Clone)]
struct ExitSlot {
    handler: Option<ExitHandler>,
    enabled: bool,
}

/// The entry point of a registered native method.
pub type NativeEntry = fn(&mut NativeContext<'_, '_, '_>) -> Result<NativeValue, RexxError>;

/// A registered native method: typed signature plus entry point.
#[derive(Clone)]
pub struct NativeMethod {
    /// The method name.
    pub name: Box<str>,
    /// Decoded signature; position 0 is the return type.
    pub signature: Vec<ArgDescriptor>,
    /// The entry point.
    pub entry: NativeEntry,
}

/// The context handed to a native entry point.
pub struct NativeContext<'a, 'b, 'c> {
    /// Kernel access; releasing it is the callout suspension point.
    pub kx: &'a mut Kx<'b>,
    /// The native frame's stack index.
    pub frame_index: usize,
    /// The marshalled arguments.
    pub args: &'c [NativeValue],
}

impl NativeContext<'_, '_, '_> {
    /// Protect an object reference for the rest of the callout.
    pub fn protect(&mut self, r: ObjRef) {
        let ai = self.kx.activity();
        let fi = self.frame_index;
        let kernel = self.kx.k();
        if let Some(ActivationFrame::Native(activation)) =
            kernel.entry_mut(ai).stack.frame_at_mut(fi)
        {
            activation.save_local_reference(r);
        }
    }

    /// Run a variable-pool request chain against the caller's context.
    pub fn variable_pool(
        &mut self,
        requests: &mut [crate::native::variable_pool::PoolRequest],
    ) -> u8 {
        let ai = self.kx.activity();
        let fi = self.frame_index;
        let kernel = self.kx.k();

        // The cursor moves out for the call so the frame stack stays free.
        let mut cursor = {
            match kernel.entry_mut(ai).stack.frame_at_mut(fi) {
                Some(ActivationFrame::Native(activation)) => {
                    std::mem::take(&mut activation.pool)
                }
                _ => PoolCursor::default(),
            }
        };
        let result =
            crate::native::variable_pool::process_pool(&mut *kernel, ai, &mut cursor, requests);
        if let Some(ActivationFrame::Native(activation)) =
            kernel.entry_mut(ai).stack.frame_at_mut(fi)
        {
            activation.pool = cursor;
        }
        result
    }
}

/// The interpreter instance.
pub struct Interpreter {
    manager: ActivityManager,
    exits: Mutex<Vec<ExitSlot>>,
    natives: Mutex<Vec<NativeMethod>>,
    command_handler: Mutex<Option<Arc<dyn Fn(&str) -> i64 + Send + Sync>>>,
}

impl Interpreter {
    /// A fresh instance with a newly created heap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(PoolBoundaryPolicy::default())
    }

    /// A fresh instance with an explicit pool boundary policy.
    #[must_use]
    pub fn with_policy(policy: PoolBoundaryPolicy) -> Self {
        Self {
            manager: ActivityManager::new(Memory::create(policy)),
            exits: Mutex::new(vec![ExitSlot::default(); ExitCode::SLOTS]),
            natives: Mutex::new(Vec::new()),
            command_handler: Mutex::new(None),
        }
    }

    /// An instance restored from a saved image.
    ///
    /// # Errors
    ///
    /// Header sentinel mismatches and malformed data abort startup.
    pub fn from_image(bytes: &[u8]) -> Result<Self, image::RestoreError> {
        let mut memory = Memory::create(PoolBoundaryPolicy::default());
        let mut resolver = crate::memory::wire::TranslatingResolver;
        image::restore_image(&mut memory, bytes, &mut resolver)?;
        Ok(Self {
            manager: ActivityManager::new(memory),
            exits: Mutex::new(vec![ExitSlot::default(); ExitCode::SLOTS]),
            natives: Mutex::new(Vec::new()),
            command_handler: Mutex::new(None),
        })
    }

    /// The activity manager.
    #[must_use]
    pub const fn manager(&self) -> &ActivityManager {
        &self.manager
    }

    /// Attach the calling thread as a new activity.
    pub fn attach_thread(&self) -> Arc<Activity> {
        self.manager.add_activity()
    }

    /// Install an exit handler.
    pub fn set_exit_handler(&self, code: ExitCode, handler: ExitHandler) {
        let mut exits = self.exits.lock();
        exits[code.slot()] = ExitSlot {
            handler: Some(handler),
            enabled: true,
        };
    }

    /// Enable or disable an installed exit.
    pub fn enable_exit(&self, code: ExitCode, enabled: bool) {
        self.exits.lock()[code.slot()].enabled = enabled;
    }

    /// Install the host command handler.
    pub fn set_command_handler(&self, handler: Arc<dyn Fn(&str) -> i64 + Send + Sync>) {
        *self.command_handler.lock() = Some(handler);
    }

    /// Register a native method; returns its registry index.
    pub fn register_native(&self, method: NativeMethod) -> u32 {
        let mut natives = self.natives.lock();
        natives.push(method);
        (natives.len() - 1) as u32
    }

    /// Call an exit, disabling the slot when the handler reports an error
    /// so a failing exit cannot re-enter itself.
    fn call_exit(&self, code: ExitCode, payload: &str) -> ExitResult {
        let handler = {
            let exits = self.exits.lock();
            let slot = &exits[code.slot()];
            if slot.enabled {
                slot.handler.clone()
            } else {
                None
            }
        };
        let Some(handler) = handler else {
            return ExitResult::NotHandled;
        };
        let result = handler(code, payload);
        if result == ExitResult::Error {
            warn!("exit {code:?} failed; disabling the handler");
            self.enable_exit(code, false);
        }
        result
    }

    /// Translate a program into a registered package.
    ///
    /// A compile frame sits on the activity's stack for the duration so
    /// translate-time errors report the failing clause's location.
    ///
    /// # Errors
    ///
    /// Translation errors propagate with program and line attached.
    pub fn create_program(
        &self,
        activity: &Activity,
        name: &str,
        text: &str,
    ) -> Result<Arc<Package>, RexxError> {
        // Serialised programs re-translate their payload.
        let payload = Package::precompiled_payload(text);
        let text = payload.as_deref().unwrap_or(text);
        let source = ProgramSource::from_buffer(name, text);

        let mut kx = Kx::request(&self.manager, activity.id());
        let ai = kx.activity();
        {
            let kernel = kx.k();
            kernel.entry_mut(ai).stack.push_stack_frame(ActivationFrame::Compile(
                crate::activity::frames::CompileFrame {
                    name: name.into(),
                    line: 0,
                    source_line: Box::from(""),
                },
            ));
        }

        let result = {
            let kernel = kx.k();
            translate_program(&mut kernel.memory, &source)
        };

        let result = match result {
            Ok(package) => {
                kx.k().add_package(Arc::clone(&package));
                Ok(package)
            }
            Err(mut error) => {
                // The compile frame carries the failing location.
                if error.program.is_empty() {
                    error.program = name.to_string();
                }
                let kernel = kx.k();
                if let Some(ActivationFrame::Compile(frame)) =
                    kernel.entry_mut(ai).stack.top_mut()
                {
                    frame.line = error.line;
                    frame.source_line = source
                        .line(error.line)
                        .map_or_else(|| Box::from(""), Box::from);
                }
                Err(RexxError::Syntax(error))
            }
        };

        {
            let kernel = kx.k();
            kernel.entry_mut(ai).stack.pop_stack_frame(false);
        }
        result
    }

    /// Run a program's main block; returns the process return code.
    ///
    /// Untrapped errors print the formatted report through the say stream
    /// and return the error's major code.
    pub fn run_program(&self, activity: &Activity, package: &Arc<Package>, args: &[&str]) -> i64 {
        let mut kx = Kx::request(&self.manager, activity.id());
        let argument_refs: Vec<ObjRef> = {
            let kernel = kx.k();
            args.iter()
                .filter_map(|text| kernel.memory.new_string(text).ok())
                .collect()
        };

        let executor = Executor {
            manager: &self.manager,
            services: self,
        };
        let outcome = executor.run_program(&mut kx, package, argument_refs);
        self.finish_run(&mut kx, package, outcome)
    }

    /// Call a package routine directly; returns its result string.
    ///
    /// # Errors
    ///
    /// Unknown routines and untrapped execution errors propagate.
    pub fn call_routine(
        &self,
        activity: &Activity,
        package: &Arc<Package>,
        name: &str,
        args: &[&str],
    ) -> Result<Option<String>, RexxError> {
        let mut kx = Kx::request(&self.manager, activity.id());
        let routine = package.find_routine(&name.to_ascii_uppercase()).ok_or_else(|| {
            RexxError::Syntax(crate::activity::condition::SyntaxError::with(
                crate::activity::condition::error_codes::ROUTINE_NOT_FOUND,
                vec![name.to_string()],
            ))
        })?;
        let argument_refs: Vec<ObjRef> = {
            let kernel = kx.k();
            args.iter()
                .filter_map(|text| kernel.memory.new_string(text).ok())
                .collect()
        };

        let executor = Executor {
            manager: &self.manager,
            services: self,
        };
        let result =
            executor.invoke_routine(&mut kx, routine, Some(Arc::clone(package)), argument_refs)?;
        let text = result.map(|value| {
            let kernel = kx.k();
            display_string(
                &kernel.memory,
                value,
                &crate::activity::NumericSettings::default(),
            )
        });
        Ok(text)
    }

    /// Convert a finished run into the process return code, reporting
    /// untrapped errors.
    fn finish_run(
        &self,
        kx: &mut Kx<'_>,
        package: &Arc<Package>,
        outcome: Result<Flow, RexxError>,
    ) -> i64 {
        match outcome {
            Ok(Flow::Normal) => 0,
            Ok(Flow::Returned(value)) => self.exit_code(kx, value),
            Err(RexxError::Exit(value)) => self.exit_code(kx, value),
            Err(error) => {
                self.report_error(kx, package, &error);
                i64::from(error.return_code())
            }
        }
    }

    fn exit_code(&self, kx: &mut Kx<'_>, value: ObjRef) -> i64 {
        if value.is_null() {
            return 0;
        }
        let kernel = kx.k();
        let settings = crate::activity::NumericSettings::default();
        crate::execution::eval::to_number(&kernel.memory, value)
            .ok()
            .and_then(|n| n.to_whole(settings.digits).ok())
            .unwrap_or(0)
    }

    /// The standard untrapped-error report: header line, then the
    /// secondary message when the code has one.
    fn report_error(&self, kx: &mut Kx<'_>, package: &Arc<Package>, error: &RexxError) {
        let ai = kx.activity();
        match error {
            RexxError::Syntax(syntax) => {
                let program = if syntax.program.is_empty() {
                    package.name.to_string()
                } else {
                    syntax.program.clone()
                };
                let major = major_code(syntax.code);
                let line = syntax.line;
                self.say(&format!(
                    "Error {major} running {program} line {line}: {}",
                    primary_message(major)
                ));
                if minor_code(syntax.code) != 0 {
                    if let Some(message) = syntax.message() {
                        self.say(&format!("Error {}: {message}", display_code(syntax.code)));
                    }
                }
                // The activity terminates with the condition stored.
                let condition = {
                    let kernel = kx.k();
                    crate::activity::condition::create_syntax_condition(&mut kernel.memory, syntax)
                        .ok()
                };
                if let Some(condition) = condition {
                    kx.k().entry_mut(ai).condition = condition;
                }
            }
            RexxError::Condition { name, object } => {
                self.say(&format!("Error 4 running {}: condition {name}", package.name));
                kx.k().entry_mut(ai).condition = *object;
            }
            RexxError::Storage => {
                self.say("Error 5: System resources exhausted");
            }
            RexxError::Fatal(kind) => {
                self.say(&format!("Fatal interpreter error: {kind:?}"));
            }
            RexxError::Exit(_) => {}
        }
    }

    /// Run a collection followed by uninit processing, from a clean frame.
    pub fn collect(&self, activity: &Activity) {
        let mut kx = Kx::request(&self.manager, activity.id());
        kx.k().collect();
        let executor = Executor {
            manager: &self.manager,
            services: self,
        };
        if let Err(error) = executor.drain_uninits(&mut kx) {
            debug!("uninit drain failed: {error}");
        }
    }

    /// Halt a running activity; its frame raises HALT at the next clause.
    pub fn halt(&self, id: ActivityId, description: &str) -> bool {
        self.manager.halt_activity(id, description)
    }

    /// Direct kernel access for embedders and tests.
    pub fn with_kernel<R>(&self, activity: &Activity, f: impl FnOnce(&mut Kernel) -> R) -> R {
        let mut kx = Kx::request(&self.manager, activity.id());
        f(kx.k())
    }

    /// Save the current heap image.
    ///
    /// # Errors
    ///
    /// Allocation failures for the save array propagate.
    pub fn save_image(&self, activity: &Activity) -> Result<Vec<u8>, RexxError> {
        let mut kx = Kx::request(&self.manager, activity.id());
        Ok(image::save_image(&mut kx.k().memory)?)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorServices for Interpreter {
    fn say(&self, text: &str) {
        match self.call_exit(ExitCode::SayTraceOutput, text) {
            ExitResult::Handled => {}
            ExitResult::NotHandled | ExitResult::Error => {
                println!("{text}");
            }
        }
    }

    fn command(&self, command: &str) -> i64 {
        if self.call_exit(ExitCode::CommandCall, command) == ExitResult::Handled {
            return 0;
        }
        let handler = self.command_handler.lock().clone();
        match handler {
            Some(handler) => handler(command),
            None => 0,
        }
    }

    fn builtin(&self, name: &str) -> Option<crate::execution::BuiltinFn> {
        builtins::lookup(name)
    }

    fn call_native(
        &self,
        kx: &mut Kx<'_>,
        index: u32,
        receiver: ObjRef,
        scope: ObjRef,
        name: &str,
        args: &[ObjRef],
    ) -> Result<ObjRef, RexxError> {
        let method = {
            let natives = self.natives.lock();
            natives.get(index as usize).cloned()
        };
        let Some(method) = method else {
            return Err(RexxError::Syntax(
                crate::activity::condition::SyntaxError::with(
                    crate::activity::condition::error_codes::NO_METHOD,
                    vec![name.to_string(), index.to_string()],
                ),
            ));
        };

        let ai = kx.activity();
        let fi = {
            let kernel = kx.k();
            let entry = kernel.entry_mut(ai);
            entry
                .stack
                .push_stack_frame(ActivationFrame::Native(Box::new(NativeActivation::new(
                    name,
                    ObjRef::NULL,
                    receiver,
                    args.to_vec(),
                ))));
            entry.stack.depth() - 1
        };

        let outcome = self.call_native_inner(kx, &method, fi, scope, name);

        // Teardown releases every local reference before the pop.
        {
            let kernel = kx.k();
            if let Some(ActivationFrame::Native(activation)) =
                kernel.entry_mut(ai).stack.frame_at_mut(fi)
            {
                activation.clear_local_references();
            }
            kernel.entry_mut(ai).stack.pop_stack_frame(false);
        }

        let result = outcome?;
        let kernel = kx.k();
        Ok(result.unwrap_or_else(|| kernel.memory.nil()))
    }
}

impl Interpreter {
    fn call_native_inner(
        &self,
        kx: &mut Kx<'_>,
        method: &NativeMethod,
        fi: usize,
        scope: ObjRef,
        name: &str,
    ) -> Result<Option<ObjRef>, RexxError> {
        let ai = kx.activity();
        let settings = {
            let kernel = kx.k();
            kernel.entry(ai).settings
        };

        let marshalled = {
            let kernel = kx.k();
            let crate::activity::manager::Kernel {
                memory, entries, ..
            } = kernel;
            let Some(ActivationFrame::Native(activation)) =
                entries[ai.index()].stack.frame_at_mut(fi)
            else {
                crate::memory::logic_error("native callout without its frame")
            };
            signature::marshal_arguments(
                memory,
                activation,
                &settings,
                &method.signature[1..],
                scope,
                name,
            )?
        };

        let value = {
            // Reborrow: the context must not consume the caller's access.
            let mut context = NativeContext {
                kx: &mut *kx,
                frame_index: fi,
                args: &marshalled,
            };
            (method.entry)(&mut context)?
        };

        let kernel = kx.k();
        let crate::activity::manager::Kernel {
            memory, entries, ..
        } = kernel;
        let Some(ActivationFrame::Native(activation)) = entries[ai.index()].stack.frame_at_mut(fi)
        else {
            crate::memory::logic_error("native callout without its frame")
        };
        signature::convert_result(memory, activation, method.signature[0].arg_type, value)
    }
}
