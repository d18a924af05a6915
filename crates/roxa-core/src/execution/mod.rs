// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The clause-level evaluator.
//!
//! A [`RexxActivation`] is the interpreted-code frame: instruction cursor,
//! variable slots, DO-loop state, trap table, and the expression evaluation
//! stack. The evaluation stack doubles as GC protection: every intermediate
//! value an expression produces sits on it until consumed, so a collection
//! at any point sees the in-flight operands.
//!
//! Errors travel as `Result` values. Each activation catches them once to
//! try its own traps (SIGNAL ON is non-resumable, CALL ON resumes at the
//! next clause); untrapped errors propagate outward with PROPAGATED set
//! until the base frame terminates the activity.

mod dispatch;
pub mod eval;
pub mod number;

#[cfg(test)]
mod number_test;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::activity::NumericSettings;
use crate::activity::condition::{
    RexxError, SyntaxError, conditions, create_condition_object, create_syntax_condition,
    error_codes, mark_propagated,
};
use crate::activity::frames::{ActivationFrame, InternalFrame};
use crate::activity::guard;
use crate::activity::manager::{ActivityManager, Kernel, KernelAccess};
use crate::instructions::{InstrId, Retriever, RexxCode, VarId};
use crate::object::frame_types;
use crate::package::Package;
use crate::types::{ActivityId, ObjRef};

use number::RexxNumber;

/// Loop bookkeeping for one active DO/LOOP.
#[derive(Debug)]
pub struct DoState {
    /// The opening DO instruction.
    pub do_id: InstrId,
    /// The control variable, for named LEAVE/ITERATE/END.
    pub control_var: Option<VarId>,
    /// Control variable's current value.
    pub current: Option<RexxNumber>,
    /// TO limit.
    pub limit: Option<RexxNumber>,
    /// BY step (default 1).
    pub step: RexxNumber,
    /// FOR iterations remaining.
    pub for_remaining: Option<i64>,
    /// Plain-count iterations remaining.
    pub count_remaining: Option<i64>,
}

/// A registered condition trap.
#[derive(Debug, Clone)]
pub struct TrapState {
    /// The target label.
    pub label: Box<str>,
    /// CALL ON (resumable) rather than SIGNAL ON.
    pub call: bool,
}

/// Where control goes after a frame finishes.
///
/// EXIT is not here: it unwinds every frame through the error channel and
/// only the top-level runner converts it back into a return code.
#[derive(Debug)]
pub enum Flow {
    /// Fell off the end.
    Normal,
    /// RETURN; a null reference means no value was returned.
    Returned(ObjRef),
}

/// One interpreted-code frame.
#[derive(Debug)]
pub struct RexxActivation {
    /// The code block being executed.
    pub code: Arc<RexxCode>,
    /// The owning package, absent for INTERPRET blocks.
    pub package: Option<Arc<Package>>,
    /// The routine/method object backing the frame, or null.
    pub executable: ObjRef,
    /// Program, routine or message name.
    pub name: Box<str>,
    /// The frame type string for tracebacks.
    pub frame_type: &'static str,
    /// The instruction cursor; `None` means the frame has finished.
    pub pc: Option<InstrId>,
    /// Current clause line, for tracebacks and conditions.
    pub line: usize,
    /// Variable slots; slot 0 is unused (dynamic lookup marker).
    slots: Vec<ObjRef>,
    /// Name-to-slot index for dynamic lookup.
    name_index: HashMap<Box<str>, usize>,
    /// Variables created dynamically (INTERPRET).
    dynamic: BTreeMap<Box<str>, ObjRef>,
    /// Invocation arguments.
    pub args: Vec<ObjRef>,
    /// The frame's numeric settings.
    pub settings: NumericSettings,
    /// Condition traps by condition name.
    pub traps: HashMap<Box<str>, TrapState>,
    /// Active DO/LOOP states.
    pub do_stack: Vec<DoState>,
    /// The expression evaluation stack (also GC protection).
    pub eval_stack: Vec<ObjRef>,
    /// High-water mark of the evaluation stack.
    pub high_water: usize,
    /// The receiver for method frames, or null.
    pub receiver: ObjRef,
    /// The reserved object-variable scope for guarded methods, or null.
    pub scope_dict: ObjRef,
    /// Whether this frame holds its scope reservation.
    pub guard_held: bool,
    /// INTERPRET frames delegate variable access to this stack index.
    pub dynamic_parent: Option<usize>,
}

impl RexxActivation {
    /// Build a frame for a code block.
    #[must_use]
    pub fn new(
        code: Arc<RexxCode>,
        package: Option<Arc<Package>>,
        name: &str,
        frame_type: &'static str,
        args: Vec<ObjRef>,
        settings: NumericSettings,
    ) -> Self {
        let mut name_index = HashMap::new();
        for retriever in &code.retrievers {
            match retriever {
                Retriever::Simple { name, slot } | Retriever::Stem { name, slot } => {
                    if *slot != 0 {
                        name_index.insert(name.clone(), *slot);
                    }
                }
                Retriever::Compound { .. } => {}
            }
        }
        let slots = vec![ObjRef::NULL; code.variable_count + 1];
        let pc = code.first;
        Self {
            code,
            package,
            executable: ObjRef::NULL,
            name: name.into(),
            frame_type,
            pc,
            line: 0,
            slots,
            name_index,
            dynamic: BTreeMap::new(),
            args,
            settings,
            traps: HashMap::new(),
            do_stack: Vec::new(),
            eval_stack: Vec::new(),
            high_water: 0,
            receiver: ObjRef::NULL,
            scope_dict: ObjRef::NULL,
            guard_held: false,
            dynamic_parent: None,
        }
    }

    /// Read a slot (or dynamic) variable by name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<ObjRef> {
        if let Some(&slot) = self.name_index.get(name) {
            let value = self.slots[slot];
            return if value.is_null() { None } else { Some(value) };
        }
        self.dynamic.get(name).copied()
    }

    /// Store a variable by name.
    pub fn set_by_name(&mut self, name: &str, value: ObjRef) {
        if let Some(&slot) = self.name_index.get(name) {
            self.slots[slot] = value;
        } else {
            self.dynamic.insert(name.into(), value);
        }
    }

    /// Names of every assigned variable, for pool iteration.
    #[must_use]
    pub fn variable_names(&self) -> Vec<Box<str>> {
        let mut names: Vec<Box<str>> = self
            .name_index
            .iter()
            .filter(|(_, &slot)| !self.slots[slot].is_null())
            .map(|(name, _)| name.clone())
            .collect();
        names.extend(self.dynamic.keys().cloned());
        names.sort();
        names
    }

    /// Drop a variable by name.
    pub fn drop_by_name(&mut self, name: &str) {
        if let Some(&slot) = self.name_index.get(name) {
            self.slots[slot] = ObjRef::NULL;
        } else {
            self.dynamic.remove(name);
        }
    }

    /// Push a value on the evaluation stack.
    pub fn push_eval(&mut self, value: ObjRef) {
        self.eval_stack.push(value);
        self.high_water = self.high_water.max(self.eval_stack.len());
    }

    /// Pop `n` values off the evaluation stack.
    pub fn pop_eval(&mut self, n: usize) {
        for _ in 0..n {
            self.eval_stack.pop();
        }
    }

    /// Report every reference this frame holds.
    pub fn for_each_ref(&self, visit: &mut dyn FnMut(ObjRef)) {
        let mut see = |r: ObjRef| {
            if !r.is_null() {
                visit(r);
            }
        };
        self.slots.iter().copied().for_each(&mut see);
        self.dynamic.values().copied().for_each(&mut see);
        self.args.iter().copied().for_each(&mut see);
        self.eval_stack.iter().copied().for_each(&mut see);
        see(self.receiver);
        see(self.scope_dict);
        see(self.executable);
        // INTERPRET code has no owning package; its literals are rooted
        // through the frame that runs it.
        self.code.literals().iter().copied().for_each(&mut see);
    }
}

/// The kernel-access holder: owns the acquired lock and supports the
/// release/re-request pairing around waits.
pub struct Kx<'i> {
    manager: &'i ActivityManager,
    access: Option<KernelAccess<'i>>,
    id: ActivityId,
}

impl<'i> Kx<'i> {
    /// Acquire kernel access for an activity.
    #[must_use]
    pub fn request(manager: &'i ActivityManager, id: ActivityId) -> Self {
        let access = manager.request(id);
        Self {
            manager,
            access: Some(access),
            id,
        }
    }

    /// The kernel state; only valid while access is held.
    pub fn k(&mut self) -> &mut Kernel {
        match &mut self.access {
            Some(access) => access,
            None => crate::memory::logic_error("kernel access used while released"),
        }
    }

    /// Release the kernel lock (entering a wait).
    pub fn release(&mut self) {
        self.access = None;
    }

    /// Re-acquire the kernel lock after a wait.
    pub fn acquire(&mut self) {
        if self.access.is_none() {
            self.access = Some(self.manager.request(self.id));
        }
    }

    /// Let waiting activities run, then continue.
    pub fn relinquish(&mut self) {
        self.release();
        self.acquire();
    }

    /// The owning activity id.
    #[must_use]
    pub const fn activity(&self) -> ActivityId {
        self.id
    }
}

/// Split kernel access into heap and one Rexx frame.
///
/// The borrow checker guarantees the two halves are disjoint.
macro_rules! frame_parts {
    ($kernel:expr, $ai:expr, $fi:expr) => {{
        // Reborrow so the caller's binding stays usable afterwards.
        let kernel: &mut crate::activity::manager::Kernel = &mut *$kernel;
        let crate::activity::manager::Kernel {
            memory, entries, ..
        } = kernel;
        let frame = entries[$ai.index()].stack.frame_at_mut($fi);
        match frame {
            Some(crate::activity::frames::ActivationFrame::Rexx(activation)) => {
                (memory, &mut **activation)
            }
            _ => crate::memory::logic_error("expected a Rexx activation frame"),
        }
    }};
}

pub(crate) use frame_parts;

/// The executor: drives one activity's frames against the kernel.
pub struct Executor<'i> {
    /// The activity manager (kernel lock owner).
    pub manager: &'i ActivityManager,
    /// The interpreter-level services (exits, built-ins, natives).
    pub services: &'i dyn ExecutorServices,
}

/// A built-in function entry point: kernel, activity, caller frame index,
/// evaluated arguments.
pub type BuiltinFn = fn(&mut Kernel, ActivityId, usize, &[ObjRef]) -> Result<ObjRef, RexxError>;

/// Interpreter services the evaluator calls out to.
pub trait ExecutorServices {
    /// SAY and trace output.
    fn say(&self, text: &str);

    /// Host command dispatch; returns the command RC.
    fn command(&self, command: &str) -> i64;

    /// Look up a built-in function by (uppercased) name.
    fn builtin(&self, name: &str) -> Option<BuiltinFn>;

    /// Invoke a registered native method.
    ///
    /// # Errors
    ///
    /// Marshalling and callee errors propagate.
    fn call_native(
        &self,
        kx: &mut Kx<'_>,
        index: u32,
        receiver: ObjRef,
        scope: ObjRef,
        name: &str,
        args: &[ObjRef],
    ) -> Result<ObjRef, RexxError>;
}

impl Executor<'_> {
    /// Run a program's main block on the current activity.
    ///
    /// # Errors
    ///
    /// Returns the untrapped error after unwinding.
    pub fn run_program(
        &self,
        kx: &mut Kx<'_>,
        package: &Arc<Package>,
        args: Vec<ObjRef>,
    ) -> Result<Flow, RexxError> {
        let activation = RexxActivation::new(
            Arc::clone(&package.main),
            Some(Arc::clone(package)),
            &package.name.clone(),
            frame_types::PROGRAM,
            args,
            NumericSettings::default(),
        );
        self.run_activation(kx, activation)
    }

    /// Push a Rexx activation, run it to completion, and pop it.
    ///
    /// # Errors
    ///
    /// Untrapped errors propagate after the frame is unwound.
    pub fn run_activation(
        &self,
        kx: &mut Kx<'_>,
        activation: RexxActivation,
    ) -> Result<Flow, RexxError> {
        let ai = kx.activity();
        let fi = {
            let kernel = kx.k();
            let entry = kernel.entry_mut(ai);
            entry
                .stack
                .push_stack_frame(ActivationFrame::Rexx(Box::new(activation)));
            entry.refresh_settings();
            entry.stack.depth() - 1
        };

        let result = self.run_frame(kx, fi);

        // Release a held guard reservation and pop the frame.
        let scope = {
            let kernel = kx.k();
            let (_, frame) = frame_parts!(kernel, ai, fi);
            if frame.guard_held {
                frame.scope_dict
            } else {
                ObjRef::NULL
            }
        };
        if !scope.is_null() {
            guard::release_scope(kx.k(), ai, scope);
        }
        {
            let kernel = kx.k();
            let entry = kernel.entry_mut(ai);
            entry.stack.pop_stack_frame(false);
            entry.refresh_settings();
        }
        result
    }

    /// The clause loop for one frame.
    fn run_frame(&self, kx: &mut Kx<'_>, fi: usize) -> Result<Flow, RexxError> {
        let ai = kx.activity();
        let code = {
            let kernel = kx.k();
            let (_, frame) = frame_parts!(kernel, ai, fi);
            Arc::clone(&frame.code)
        };

        loop {
            // Clause boundary: pending halt, finalisable garbage, memory.
            // Conditions raised here (HALT) go through the same traps.
            if let Err(error) = self.clause_boundary(kx, fi) {
                match self.handle_trap(kx, fi, &code, error)? {
                    TrapOutcome::Resumed => {}
                    TrapOutcome::Signalled(target) => {
                        let kernel = kx.k();
                        let (_, frame) = frame_parts!(kernel, ai, fi);
                        frame.do_stack.clear();
                        frame.pc = Some(target);
                    }
                }
                continue;
            }

            let pc = {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.pc
            };
            let Some(pc) = pc else {
                return Ok(Flow::Normal);
            };

            let instruction = code.instruction(pc);
            {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.line = instruction.line;
                frame.pc = instruction.next;
            }

            match self.execute(kx, fi, &code, pc) {
                Ok(Flow::Normal) => {}
                Ok(flow) => return Ok(flow),
                Err(error) => match self.handle_trap(kx, fi, &code, error)? {
                    TrapOutcome::Resumed => {}
                    TrapOutcome::Signalled(target) => {
                        let kernel = kx.k();
                        let (_, frame) = frame_parts!(kernel, ai, fi);
                        frame.do_stack.clear();
                        frame.pc = Some(target);
                    }
                },
            }
        }
    }

    /// Clause-boundary housekeeping.
    fn clause_boundary(&self, kx: &mut Kx<'_>, fi: usize) -> Result<(), RexxError> {
        let ai = kx.activity();

        // External halt request becomes a HALT condition.
        let halt = {
            let kernel = kx.k();
            kernel.entry(ai).handle.take_halt()
        };
        if let Some(description) = halt {
            let kernel = kx.k();
            let object = create_condition_object(
                &mut kernel.memory,
                conditions::HALT,
                &description,
                ObjRef::NULL,
                ObjRef::NULL,
            )?;
            return Err(RexxError::Condition {
                name: conditions::HALT.into(),
                object,
            });
        }

        // Collect when the heap has grown enough since the last cycle.
        let kernel = kx.k();
        if kernel.memory.should_collect() {
            kernel.collect();
        }

        // Drain finalisable garbage found by earlier collections.
        if kernel.memory.has_pending_uninits() {
            self.run_uninits(kx, fi)?;
        }
        Ok(())
    }

    /// Drain the pending uninit queue outside any frame (explicit collect).
    ///
    /// # Errors
    ///
    /// Only storage failures propagate; uninit bodies run trapped.
    pub(crate) fn drain_uninits(&self, kx: &mut Kx<'_>) -> Result<(), RexxError> {
        self.run_uninits(kx, 0)
    }

    /// Dispatch pending uninit methods.
    ///
    /// Each runs with conditions trapped so a failing uninit cannot kill
    /// the activity; re-entry is a no-op via the processing flag.
    fn run_uninits(&self, kx: &mut Kx<'_>, _fi: usize) -> Result<(), RexxError> {
        let ai = kx.activity();
        loop {
            let doomed = {
                let kernel = kx.k();
                kernel.memory.next_pending_uninit()
            };
            let Some(object) = doomed else {
                return Ok(());
            };
            kx.k().memory.set_processing_uninits(true);

            let method = self.find_method(kx.k(), object, "UNINIT");
            if let Some((method, _scope)) = method {
                // An internal frame makes the dispatch visible to
                // tracebacks and the collector.
                {
                    let kernel = kx.k();
                    kernel
                        .entry_mut(ai)
                        .stack
                        .push_stack_frame(ActivationFrame::Internal(InternalFrame {
                            name: "UNINIT".into(),
                            method,
                            receiver: object,
                            arguments: Vec::new(),
                        }));
                }
                let outcome = self.invoke_method(kx, object, method, "UNINIT", Vec::new());
                {
                    let kernel = kx.k();
                    kernel.entry_mut(ai).stack.pop_stack_frame(false);
                }
                if let Err(error) = outcome {
                    // trapConditions: swallow and continue with the queue.
                    log::debug!("uninit method failed: {error}");
                }
            }
            kx.k().memory.set_processing_uninits(false);
        }
    }
}

/// How a trapped error resumes.
enum TrapOutcome {
    /// CALL ON handled it; resume at the next clause.
    Resumed,
    /// SIGNAL ON: control transfers to the label.
    Signalled(InstrId),
}

impl Executor<'_> {
    /// Offer an error to the frame's traps; propagate when untrapped.
    fn handle_trap(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        error: RexxError,
    ) -> Result<TrapOutcome, RexxError> {
        // EXIT and fatal errors bypass the trap machinery entirely.
        if matches!(error, RexxError::Exit(_) | RexxError::Fatal(_)) {
            return Err(error);
        }

        let ai = kx.activity();
        let condition_name: Box<str> = error.condition_name().into();

        let trap = {
            let kernel = kx.k();
            let (_, frame) = frame_parts!(kernel, ai, fi);
            frame
                .traps
                .get(condition_name.as_ref())
                .or_else(|| frame.traps.get(conditions::ANY))
                .cloned()
        };

        let Some(trap) = trap else {
            // Untrapped: fill in location data, mark as propagated, and
            // unwind to the caller.
            return Err(self.propagate(kx, fi, error));
        };

        // Materialise the condition object for CONDITION() access.
        let object = self.condition_object(kx, fi, &error)?;
        {
            let kernel = kx.k();
            mark_trapped(kernel, ai, object);
        }

        let Some(&target) = code.labels.get(trap.label.as_ref()) else {
            return Err(RexxError::Syntax(
                SyntaxError::with(
                    error_codes::LABEL_NOT_FOUND_NAME,
                    vec![trap.label.to_string()],
                )
                .at_line(self.current_line(kx, fi)),
            ));
        };

        if trap.call {
            // CALL ON: run the label as an internal routine, then resume.
            // The trap stays disabled during the handler.
            {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.traps.remove(condition_name.as_ref());
            }
            let _ = self.internal_call(kx, fi, code, target, Vec::new())?;
            Ok(TrapOutcome::Resumed)
        } else {
            // SIGNAL ON: non-resumable; the trap is disabled until re-armed.
            let kernel = kx.k();
            let (_, frame) = frame_parts!(kernel, ai, fi);
            frame.traps.remove(condition_name.as_ref());
            Ok(TrapOutcome::Signalled(target))
        }
    }

    /// Fill location data into an escaping error and flag propagation.
    fn propagate(&self, kx: &mut Kx<'_>, fi: usize, error: RexxError) -> RexxError {
        let ai = kx.activity();
        match error {
            RexxError::Syntax(mut syntax) => {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                if syntax.line == 0 {
                    syntax.line = frame.line;
                }
                if syntax.program.is_empty() {
                    syntax.program = frame.code.name.to_string();
                }
                RexxError::Syntax(syntax)
            }
            RexxError::Condition { name, object } => {
                let kernel = kx.k();
                mark_propagated(&mut kernel.memory, object);
                RexxError::Condition { name, object }
            }
            other => other,
        }
    }

    /// Build (or fetch) the condition directory for an error.
    fn condition_object(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        error: &RexxError,
    ) -> Result<ObjRef, RexxError> {
        let ai = kx.activity();
        match error {
            RexxError::Condition { object, .. } => Ok(*object),
            RexxError::Syntax(syntax) => {
                let mut filled = syntax.clone();
                if filled.line == 0 {
                    filled.line = self.current_line(kx, fi);
                }
                let kernel = kx.k();
                let object = create_syntax_condition(&mut kernel.memory, &filled)?;
                // Attach the traceback of the current frame chain.
                let traceback = build_traceback(&mut *kernel, ai)?;
                kernel.memory.dir_put(object, "TRACEBACK", traceback);
                kernel.memory.dir_put(object, "STACKFRAMES", traceback);
                Ok(object)
            }
            RexxError::Storage => {
                let syntax = SyntaxError::new(error_codes::SYSTEM_RESOURCES);
                let kernel = kx.k();
                Ok(create_syntax_condition(&mut kernel.memory, &syntax)?)
            }
            RexxError::Fatal(_) => {
                let syntax = SyntaxError::new(error_codes::EXECUTION);
                let kernel = kx.k();
                Ok(create_syntax_condition(&mut kernel.memory, &syntax)?)
            }
            RexxError::Exit(_) => unreachable!("Exit is filtered out before condition_object is called"),
        }
    }

    fn current_line(&self, kx: &mut Kx<'_>, fi: usize) -> usize {
        let ai = kx.activity();
        let kernel = kx.k();
        let (_, frame) = frame_parts!(kernel, ai, fi);
        frame.line
    }
}

/// Store a trapped condition as the activity's current condition.
fn mark_trapped(kernel: &mut Kernel, ai: ActivityId, object: ObjRef) {
    kernel.entry_mut(ai).condition = object;
}

/// Build the TRACEBACK array from the activity's frame chain.
fn build_traceback(kernel: &mut Kernel, ai: ActivityId) -> Result<ObjRef, RexxError> {
    let indexes: Vec<usize> = kernel
        .entry(ai)
        .stack
        .frames_top_down()
        .map(|(index, _)| index)
        .collect();
    let array = kernel.memory.new_array(Vec::new())?;
    kernel.memory.hold(array);
    for index in indexes {
        let descriptor = {
            let Kernel {
                memory, entries, ..
            } = kernel;
            match entries[ai.index()].stack.frame_at(index) {
                Some(frame) => frame.create_stack_frame(memory)?,
                None => continue,
            }
        };
        kernel.memory.array_append(array, descriptor);
    }
    Ok(array)
}
