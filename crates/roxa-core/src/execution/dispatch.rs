// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Call dispatch, message sends, variable access and loop control.
//!
//! Call resolution order for an unresolved name: internal label (decided at
//! translate time), package routine, built-in function, external call.
//! Message dispatch walks the receiver's class chain; guarded methods
//! reserve the receiver's scope dictionary before their body runs.

use std::sync::Arc;

use crate::activity::condition::{RexxError, SyntaxError, default_name, error_codes};
use crate::activity::frames::ActivationFrame;
use crate::activity::guard;
use crate::activity::manager::Kernel;
use crate::instructions::{CallTarget, InstrId, Keyword, Retriever, RexxCode, TailPart, VarId};
use crate::object::{ExecutableCode, InstanceData, ObjectData, VariableDictData, frame_types};
use crate::types::{ActivityId, ObjRef};

use super::eval::{display_string, to_number};
use super::number::RexxNumber;
use super::{DoState, Executor, Flow, Kx, RexxActivation, frame_parts};

impl Executor<'_> {
    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// CALL / function-call resolution and dispatch.
    ///
    /// Returns the produced value, or `None` when the target returned no
    /// data.
    pub(super) fn call_by_name(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        name: &str,
        target: &CallTarget,
        args: &[ObjRef],
    ) -> Result<Option<ObjRef>, RexxError> {
        let ai = kx.activity();

        if let CallTarget::Label(label) = target {
            return self.internal_call(kx, fi, code, *label, args.to_vec());
        }

        // A routine defined in the frame's package.
        let routine = {
            let kernel = kx.k();
            let (_, frame) = frame_parts!(kernel, ai, fi);
            frame
                .package
                .as_ref()
                .and_then(|package| package.find_routine(name))
        };
        if let Some(routine) = routine {
            let package = {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.package.clone()
            };
            return self.invoke_routine(kx, routine, package, args.to_vec());
        }

        // Built-in functions.
        if let Some(builtin) = self.services.builtin(name) {
            let kernel = kx.k();
            return builtin(kernel, ai, fi, args).map(Some);
        }

        // External resolution is the last resort; nothing registered means
        // the routine is unknown.
        Err(RexxError::Syntax(SyntaxError::with(
            error_codes::ROUTINE_NOT_FOUND,
            vec![name.to_string()],
        )))
    }

    /// Call an internal label as a subroutine in a fresh activation.
    pub(super) fn internal_call(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        label: InstrId,
        args: Vec<ObjRef>,
    ) -> Result<Option<ObjRef>, RexxError> {
        let ai = kx.activity();
        let (package, settings, name) = {
            let kernel = kx.k();
            let (_, frame) = frame_parts!(kernel, ai, fi);
            (frame.package.clone(), frame.settings, frame.name.clone())
        };

        let mut activation = RexxActivation::new(
            Arc::clone(code),
            package,
            &name,
            frame_types::INTERNAL_CALL,
            args,
            settings,
        );
        activation.pc = Some(label);

        match self.run_activation(kx, activation)? {
            Flow::Returned(value) if !value.is_null() => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Invoke a `::ROUTINE` object.
    pub(crate) fn invoke_routine(
        &self,
        kx: &mut Kx<'_>,
        routine: ObjRef,
        package: Option<Arc<crate::package::Package>>,
        args: Vec<ObjRef>,
    ) -> Result<Option<ObjRef>, RexxError> {
        let (code, name) = {
            let kernel = kx.k();
            match &kernel.memory.cell(routine).data {
                ObjectData::Routine(data) => (Arc::clone(&data.code), data.name.clone()),
                _ => {
                    return Err(RexxError::Syntax(SyntaxError::new(
                        error_codes::ROUTINE_NOT_FOUND,
                    )));
                }
            }
        };

        let mut activation = RexxActivation::new(
            code,
            package,
            &name,
            frame_types::ROUTINE,
            args,
            crate::activity::NumericSettings::default(),
        );
        activation.executable = routine;

        match self.run_activation(kx, activation)? {
            Flow::Returned(value) if !value.is_null() => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Message dispatch
    // ------------------------------------------------------------------

    /// Find a method for a message on a receiver, with its defining scope.
    pub(super) fn find_method(
        &self,
        kernel: &Kernel,
        receiver: ObjRef,
        name: &str,
    ) -> Option<(ObjRef, Box<str>)> {
        let class = match &kernel.memory.cell(receiver).data {
            ObjectData::Instance(instance) => instance.class,
            ObjectData::Class(_) => receiver,
            _ => return None,
        };
        self.find_method_in_class(kernel, class, name)
    }

    fn find_method_in_class(
        &self,
        kernel: &Kernel,
        class: ObjRef,
        name: &str,
    ) -> Option<(ObjRef, Box<str>)> {
        let ObjectData::Class(data) = &kernel.memory.cell(class).data else {
            return None;
        };
        if let Some(&method) = data.methods.get(name) {
            return Some((method, data.name.clone()));
        }
        for parent in &data.superclasses {
            if let Some(found) = self.find_method_in_class(kernel, *parent, name) {
                return Some(found);
            }
        }
        None
    }

    /// Send a message to a receiver.
    pub(super) fn send_message(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        receiver: ObjRef,
        name: &str,
        args: &[ObjRef],
    ) -> Result<Option<ObjRef>, RexxError> {
        let ai = kx.activity();

        // Class objects answer NEW by instantiation.
        let receiver_data_tag = {
            let kernel = kx.k();
            kernel.memory.tag(receiver)
        };
        if receiver_data_tag == crate::object::TypeTag::Class && name == "NEW" {
            return self.instantiate(kx, receiver, args).map(Some);
        }

        // User-defined methods along the class chain.
        let found = {
            let kernel = kx.k();
            self.find_method(kernel, receiver, name)
        };
        if let Some((method, _scope)) = found {
            return self.invoke_method(kx, receiver, method, name, args.to_vec());
        }

        // A small built-in behaviour for the primitive collections.
        let kernel = kx.k();
        let settings = {
            let (_, frame) = frame_parts!(kernel, ai, fi);
            frame.settings
        };
        let memory = &mut kernel.memory;
        match (&memory.cell(receiver).data, name) {
            (ObjectData::Array(items), "[]") => {
                let index = args.first().copied().unwrap_or(ObjRef::NULL);
                let index = to_number(memory, index)?
                    .to_whole(settings.digits)
                    .map_err(|_| {
                        RexxError::Syntax(SyntaxError::new(error_codes::INVALID_WHOLE_NUMBER))
                    })?;
                let value = if index >= 1 {
                    items.get(index as usize - 1).copied()
                } else {
                    None
                };
                Ok(Some(value.unwrap_or_else(|| memory.nil())))
            }
            (ObjectData::Array(items), "ITEMS" | "SIZE") => {
                let count = items.len() as i64;
                Ok(Some(memory.new_number(RexxNumber::from_integer(count))?))
            }
            (ObjectData::Directory(_), "[]") => {
                let key = args.first().copied().unwrap_or(ObjRef::NULL);
                let key = display_string(memory, key, &settings).to_ascii_uppercase();
                Ok(Some(
                    memory
                        .dir_get(receiver, &key)
                        .unwrap_or_else(|| memory.nil()),
                ))
            }
            (ObjectData::Stem(_), "[]") => {
                let tail = args.first().copied().unwrap_or(ObjRef::NULL);
                let tail = display_string(memory, tail, &settings);
                Ok(Some(
                    memory
                        .stem_get(receiver, &tail)
                        .unwrap_or_else(|| memory.nil()),
                ))
            }
            (_, "STRING") => {
                let text = display_string(memory, receiver, &settings);
                Ok(Some(memory.new_string(&text)?))
            }
            _ => Err(RexxError::Syntax(SyntaxError::with(
                error_codes::NO_METHOD,
                vec![default_name(memory, receiver), name.to_string()],
            ))),
        }
    }

    /// Create an instance of a class, running INIT when defined.
    fn instantiate(
        &self,
        kx: &mut Kx<'_>,
        class: ObjRef,
        args: &[ObjRef],
    ) -> Result<ObjRef, RexxError> {
        let instance = {
            let kernel = kx.k();
            let instance = kernel.allocate(ObjectData::Instance(InstanceData {
                class,
                dictionaries: Vec::new(),
            }))?;
            kernel.memory.hold(instance);
            if kernel.memory.class_has_uninit(class) {
                kernel.memory.add_uninit_object(instance);
            }
            instance
        };

        let init = {
            let kernel = kx.k();
            self.find_method(kernel, instance, "INIT")
        };
        if let Some((method, _)) = init {
            self.invoke_method(kx, instance, method, "INIT", args.to_vec())?;
        }
        // The save-stack hold covered the INIT window; from here the
        // caller's evaluation stack anchors the instance.
        kx.k().memory.remove_hold(instance);
        Ok(instance)
    }

    /// Invoke a method object on a receiver.
    pub(super) fn invoke_method(
        &self,
        kx: &mut Kx<'_>,
        receiver: ObjRef,
        method: ObjRef,
        name: &str,
        args: Vec<ObjRef>,
    ) -> Result<Option<ObjRef>, RexxError> {
        let ai = kx.activity();
        let (code, guarded, scope_name) = {
            let kernel = kx.k();
            let ObjectData::Method(data) = &kernel.memory.cell(method).data else {
                return Err(RexxError::Syntax(SyntaxError::with(
                    error_codes::NO_METHOD,
                    vec![default_name(&kernel.memory, receiver), name.to_string()],
                )));
            };
            (data.code.clone(), data.guarded, data.scope.clone())
        };

        let scope_dict = self.scope_dictionary(kx, receiver, &scope_name)?;

        match code {
            ExecutableCode::Rexx(code) => {
                if guarded && !scope_dict.is_null() {
                    self.reserve_scope_blocking(kx, scope_dict)?;
                }

                let mut activation = RexxActivation::new(
                    code,
                    None,
                    name,
                    frame_types::METHOD,
                    args,
                    crate::activity::NumericSettings::default(),
                );
                activation.executable = method;
                activation.receiver = receiver;
                activation.scope_dict = scope_dict;
                activation.guard_held = guarded && !scope_dict.is_null();

                match self.run_activation(kx, activation)? {
                    Flow::Returned(value) if !value.is_null() => Ok(Some(value)),
                    _ => Ok(None),
                }
            }
            ExecutableCode::Native(index) => self
                .services
                .call_native(kx, index, receiver, scope_dict, name, &args)
                .map(Some),
            ExecutableCode::AttributeGet(attr) => {
                if guarded && !scope_dict.is_null() {
                    self.reserve_scope_blocking(kx, scope_dict)?;
                }
                let kernel = kx.k();
                let value = match &kernel.memory.cell(scope_dict).data {
                    ObjectData::VariableDict(dict) => dict.variables.get(attr.as_ref()).copied(),
                    _ => None,
                };
                let value = match value {
                    Some(value) => value,
                    None => kernel.memory.global_name(&attr.to_ascii_uppercase())?,
                };
                if guarded && !scope_dict.is_null() {
                    guard::release_scope(kx.k(), ai, scope_dict);
                }
                Ok(Some(value))
            }
            ExecutableCode::AttributeSet(attr) => {
                if guarded && !scope_dict.is_null() {
                    self.reserve_scope_blocking(kx, scope_dict)?;
                }
                let value = args.first().copied().unwrap_or(ObjRef::NULL);
                {
                    let kernel = kx.k();
                    kernel.memory.record_reference(scope_dict, value);
                    if let ObjectData::VariableDict(dict) =
                        &mut kernel.memory.cell_mut(scope_dict).data
                    {
                        dict.variables.insert(attr.clone(), value);
                    }
                }
                guard::notify_scope_update(kx.k(), scope_dict);
                if guarded && !scope_dict.is_null() {
                    guard::release_scope(kx.k(), ai, scope_dict);
                }
                Ok(None)
            }
        }
    }

    /// The per-scope object variable dictionary, created on first touch.
    fn scope_dictionary(
        &self,
        kx: &mut Kx<'_>,
        receiver: ObjRef,
        scope: &str,
    ) -> Result<ObjRef, RexxError> {
        let kernel = kx.k();
        let existing = match &kernel.memory.cell(receiver).data {
            ObjectData::Instance(instance) => instance
                .dictionaries
                .iter()
                .find(|(name, _)| name.as_ref() == scope)
                .map(|(_, dict)| *dict),
            _ => return Ok(ObjRef::NULL),
        };
        if let Some(dict) = existing {
            return Ok(dict);
        }
        let dict = kernel
            .memory
            .allocate(ObjectData::VariableDict(VariableDictData::new()))?;
        kernel.memory.record_reference(receiver, dict);
        if let ObjectData::Instance(instance) = &mut kernel.memory.cell_mut(receiver).data {
            instance.dictionaries.push((scope.into(), dict));
        }
        Ok(dict)
    }

    /// Reserve a scope, blocking on the guard semaphore until owned.
    pub(super) fn reserve_scope_blocking(
        &self,
        kx: &mut Kx<'_>,
        scope: ObjRef,
    ) -> Result<(), RexxError> {
        let ai = kx.activity();
        let acquired = guard::reserve_scope(kx.k(), ai, scope)?;
        if acquired {
            return Ok(());
        }
        let handle = Arc::clone(&kx.k().entry(ai).handle);
        loop {
            kx.release();
            handle.guard_sem().wait();
            kx.acquire();
            if guard::owns_scope(kx.k(), ai, scope) {
                return Ok(());
            }
            if handle.terminating() {
                guard::cancel_wait(kx.k(), ai, scope);
                return Err(RexxError::Fatal(
                    crate::activity::condition::FatalKind::Internal,
                ));
            }
        }
    }

    /// GUARD ON/OFF with the optional WHEN expression.
    pub(super) fn guard_instruction(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        on: bool,
        when: Option<crate::instructions::ExprId>,
    ) -> Result<Flow, RexxError> {
        let ai = kx.activity();
        let scope = {
            let kernel = kx.k();
            let (_, frame) = frame_parts!(kernel, ai, fi);
            frame.scope_dict
        };
        if scope.is_null() {
            return Ok(Flow::Normal);
        }

        if on {
            let held = {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.guard_held
            };
            if !held {
                self.reserve_scope_blocking(kx, scope)?;
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.guard_held = true;
            }
            if let Some(when) = when {
                self.guard_when(kx, fi, code, scope, when)?;
            }
        } else {
            let held = {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.guard_held
            };
            if held {
                guard::release_scope(kx.k(), ai, scope);
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.guard_held = false;
            }
            if let Some(when) = when {
                self.guard_when(kx, fi, code, scope, when)?;
            }
        }
        Ok(Flow::Normal)
    }

    /// Suspend until the WHEN expression evaluates true, re-evaluating on
    /// every update to the watched scope.
    fn guard_when(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        scope: ObjRef,
        when: crate::instructions::ExprId,
    ) -> Result<(), RexxError> {
        let ai = kx.activity();
        let handle = Arc::clone(&kx.k().entry(ai).handle);
        loop {
            if self.eval_guard_truth(kx, fi, code, when)? {
                return Ok(());
            }
            guard::add_watcher(kx.k(), ai, scope);

            // Release any held reservation so updaters can run.
            let held = {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.guard_held
            };
            if held {
                guard::release_scope(kx.k(), ai, scope);
            }

            kx.release();
            handle.guard_sem().wait();
            kx.acquire();

            guard::remove_watcher(kx.k(), ai, scope);
            if handle.terminating() {
                return Err(RexxError::Fatal(
                    crate::activity::condition::FatalKind::Internal,
                ));
            }
            if held {
                self.reserve_scope_blocking(kx, scope)?;
            }
        }
    }

    fn eval_guard_truth(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        when: crate::instructions::ExprId,
    ) -> Result<bool, RexxError> {
        let ai = kx.activity();
        let value = self.eval(kx, fi, code, when)?;
        let kernel = kx.k();
        let (memory, frame) = frame_parts!(kernel, ai, fi);
        let settings = frame.settings;
        frame.pop_eval(1);
        let number = to_number(memory, value);
        match number {
            Ok(n) => Ok(n.to_whole(settings.digits) == Ok(1)),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // DO / LOOP control
    // ------------------------------------------------------------------

    /// Execute a DO/LOOP opener.
    pub(super) fn do_instruction(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        pc: InstrId,
    ) -> Result<Flow, RexxError> {
        let ai = kx.activity();
        let Keyword::Do {
            spec,
            repetitive,
            end_target,
        } = &code.instruction(pc).keyword
        else {
            crate::memory::logic_error("do_instruction on a non-DO node")
        };
        let (repetitive, end_target) = (*repetitive, *end_target);

        if !repetitive {
            let kernel = kx.k();
            let (_, frame) = frame_parts!(kernel, ai, fi);
            frame.do_stack.push(DoState {
                do_id: pc,
                control_var: None,
                current: None,
                limit: None,
                step: RexxNumber::from_integer(1),
                for_remaining: None,
                count_remaining: None,
            });
            return Ok(Flow::Normal);
        }

        let mut state = DoState {
            do_id: pc,
            control_var: None,
            current: None,
            limit: None,
            step: RexxNumber::from_integer(1),
            for_remaining: None,
            count_remaining: None,
        };

        if let Some(control) = &spec.control {
            let start = self.eval_number(kx, fi, code, control.start)?;
            if let Some(to) = control.to {
                state.limit = Some(self.eval_number(kx, fi, code, to)?);
            }
            if let Some(by) = control.by {
                state.step = self.eval_number(kx, fi, code, by)?;
            }
            if let Some(for_count) = control.for_count {
                state.for_remaining = Some(self.eval_whole_pub(kx, fi, code, for_count)?);
            }
            state.control_var = Some(control.variable);
            let start_value = {
                let kernel = kx.k();
                kernel.memory.new_number(start.clone())?
            };
            self.assign_variable(kx, fi, code, control.variable, start_value)?;
            state.current = Some(start);
        }
        if let Some(count) = spec.count {
            state.count_remaining = Some(self.eval_whole_pub(kx, fi, code, count)?);
        }

        let entering = self.loop_condition(kx, fi, code, &state, spec)?;
        let kernel = kx.k();
        let (_, frame) = frame_parts!(kernel, ai, fi);
        if entering {
            frame.do_stack.push(state);
        } else {
            frame.pc = code.instruction(end_target).next;
        }
        Ok(Flow::Normal)
    }

    /// Execute an END: iterate a loop, close a block, or detect a SELECT
    /// that ran out of WHENs.
    pub(super) fn end_instruction(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        opener: InstrId,
    ) -> Result<Flow, RexxError> {
        let ai = kx.activity();
        match &code.instruction(opener).keyword {
            Keyword::Select { has_otherwise, .. } => {
                if *has_otherwise {
                    Ok(Flow::Normal)
                } else {
                    // Fall-through: no WHEN matched and nothing to run.
                    Err(RexxError::Syntax(SyntaxError::new(
                        error_codes::WHEN_EXPECTED,
                    )))
                }
            }
            Keyword::Do {
                spec, repetitive, ..
            } => {
                if !repetitive {
                    let kernel = kx.k();
                    let (_, frame) = frame_parts!(kernel, ai, fi);
                    frame.do_stack.pop();
                    return Ok(Flow::Normal);
                }

                // UNTIL is tested before the increment.
                if let Some(until) = spec.until_cond {
                    let value = self.eval(kx, fi, code, until)?;
                    let kernel = kx.k();
                    let (memory, frame) = frame_parts!(kernel, ai, fi);
                    let settings = frame.settings;
                    frame.pop_eval(1);
                    let done = super::eval::to_number(memory, value)
                        .ok()
                        .and_then(|n| n.to_whole(settings.digits).ok())
                        == Some(1);
                    if done {
                        frame.do_stack.pop();
                        return Ok(Flow::Normal);
                    }
                }

                // Increment the control variable and the counters.
                let next_value = {
                    let kernel = kx.k();
                    let (_, frame) = frame_parts!(kernel, ai, fi);
                    let settings = frame.settings;
                    let Some(state) = frame.do_stack.last_mut() else {
                        return Err(RexxError::Syntax(SyntaxError::new(
                            error_codes::UNEXPECTED_END_NO_BLOCK,
                        )));
                    };
                    if state.do_id != opener {
                        return Err(RexxError::Syntax(SyntaxError::new(
                            error_codes::UNEXPECTED_END_NO_BLOCK,
                        )));
                    }
                    if let Some(remaining) = &mut state.for_remaining {
                        *remaining -= 1;
                    }
                    if let Some(remaining) = &mut state.count_remaining {
                        *remaining -= 1;
                    }
                    let next = state
                        .current
                        .as_ref()
                        .map(|current| current.add(&state.step, settings.digits));
                    if let Some(next) = &next {
                        state.current = Some(next.clone());
                    }
                    next
                };

                if let Some(next) = next_value {
                    let control_var = {
                        let kernel = kx.k();
                        let (_, frame) = frame_parts!(kernel, ai, fi);
                        frame.do_stack.last().and_then(|s| s.control_var)
                    };
                    if let Some(var) = control_var {
                        let value = {
                            let kernel = kx.k();
                            kernel.memory.new_number(next)?
                        };
                        self.assign_variable(kx, fi, code, var, value)?;
                    }
                }

                // Re-test the loop conditions for another iteration.
                let (state_snapshot, spec_clone) = {
                    let kernel = kx.k();
                    let (_, frame) = frame_parts!(kernel, ai, fi);
                    let Some(state) = frame.do_stack.last() else {
                        return Ok(Flow::Normal);
                    };
                    (
                        DoState {
                            do_id: state.do_id,
                            control_var: state.control_var,
                            current: state.current.clone(),
                            limit: state.limit.clone(),
                            step: state.step.clone(),
                            for_remaining: state.for_remaining,
                            count_remaining: state.count_remaining,
                        },
                        spec.clone(),
                    )
                };
                let continuing = self.loop_condition(kx, fi, code, &state_snapshot, &spec_clone)?;
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                if continuing {
                    frame.pc = code.instruction(opener).next;
                } else {
                    frame.do_stack.pop();
                }
                Ok(Flow::Normal)
            }
            _ => Err(RexxError::Syntax(SyntaxError::new(
                error_codes::UNEXPECTED_END_NO_BLOCK,
            ))),
        }
    }

    /// Entry / iteration condition: counters, TO limit, WHILE.
    fn loop_condition(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        state: &DoState,
        spec: &crate::instructions::DoSpec,
    ) -> Result<bool, RexxError> {
        let ai = kx.activity();
        if state.for_remaining.is_some_and(|n| n <= 0)
            || state.count_remaining.is_some_and(|n| n <= 0)
        {
            return Ok(false);
        }

        if let (Some(current), Some(limit)) = (&state.current, &state.limit) {
            let digits = {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.settings.digits
            };
            let ordering = current.compare(limit, digits, 0);
            let past = if state.step.is_negative() {
                ordering == std::cmp::Ordering::Less
            } else {
                ordering == std::cmp::Ordering::Greater
            };
            if past {
                return Ok(false);
            }
        }

        if let Some(while_cond) = spec.while_cond {
            let value = self.eval(kx, fi, code, while_cond)?;
            let kernel = kx.k();
            let (memory, frame) = frame_parts!(kernel, ai, fi);
            let settings = frame.settings;
            frame.pop_eval(1);
            let keep = super::eval::to_number(memory, value)
                .ok()
                .and_then(|n| n.to_whole(settings.digits).ok())
                == Some(1);
            return Ok(keep);
        }
        Ok(true)
    }

    /// LEAVE / ITERATE: find the target loop by control-variable name.
    pub(super) fn leave_instruction(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        name: Option<&str>,
        iterate: bool,
    ) -> Result<Flow, RexxError> {
        let ai = kx.activity();
        let kernel = kx.k();
        let (_, frame) = frame_parts!(kernel, ai, fi);

        let position = frame.do_stack.iter().rposition(|state| {
            let is_loop = match &code.instruction(state.do_id).keyword {
                Keyword::Do { repetitive, .. } => *repetitive,
                _ => false,
            };
            if !is_loop {
                return false;
            }
            match name {
                None => true,
                Some(wanted) => state.control_var.is_some_and(|var| {
                    matches!(
                        code.retriever(var),
                        Retriever::Simple { name, .. } if name.as_ref() == wanted
                    )
                }),
            }
        });

        let Some(position) = position else {
            return Err(RexxError::Syntax(SyntaxError::new(
                error_codes::LEAVE_NOT_IN_LOOP,
            )));
        };

        let do_id = frame.do_stack[position].do_id;
        let end_target = match &code.instruction(do_id).keyword {
            Keyword::Do { end_target, .. } => *end_target,
            _ => {
                return Err(RexxError::Syntax(SyntaxError::new(
                    error_codes::LEAVE_NOT_IN_LOOP,
                )));
            }
        };

        if iterate {
            // Drop inner loops, keep the target, and run its END logic.
            frame.do_stack.truncate(position + 1);
            frame.pc = Some(end_target);
        } else {
            frame.do_stack.truncate(position);
            frame.pc = code.instruction(end_target).next;
        }
        Ok(Flow::Normal)
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    fn eval_number(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        expr: crate::instructions::ExprId,
    ) -> Result<RexxNumber, RexxError> {
        let ai = kx.activity();
        let value = self.eval(kx, fi, code, expr)?;
        let kernel = kx.k();
        let (memory, frame) = frame_parts!(kernel, ai, fi);
        let number = to_number(memory, value)?;
        frame.pop_eval(1);
        Ok(number)
    }

    fn eval_whole_pub(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        expr: crate::instructions::ExprId,
    ) -> Result<i64, RexxError> {
        let ai = kx.activity();
        let value = self.eval(kx, fi, code, expr)?;
        let kernel = kx.k();
        let (memory, frame) = frame_parts!(kernel, ai, fi);
        let number = to_number(memory, value)?;
        let whole = number
            .to_whole(frame.settings.digits)
            .map_err(|_| RexxError::Syntax(SyntaxError::new(error_codes::INVALID_WHOLE_NUMBER)))?;
        frame.pop_eval(1);
        Ok(whole)
    }

    /// The stack index whose variables a frame uses (INTERPRET delegates).
    fn variable_frame(&self, kernel: &Kernel, ai: ActivityId, fi: usize) -> usize {
        let mut current = fi;
        loop {
            let parent = match kernel.entry(ai).stack.frame_at(current) {
                Some(ActivationFrame::Rexx(activation)) => activation.dynamic_parent,
                _ => None,
            };
            match parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Read a variable through its retriever.
    pub(super) fn variable_value(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        var: VarId,
    ) -> Result<ObjRef, RexxError> {
        let ai = kx.activity();
        match code.retriever(var) {
            Retriever::Simple { name, .. } | Retriever::Stem { name, .. } => {
                let found = {
                    let kernel = kx.k();
                    let target = self.variable_frame(kernel, ai, fi);
                    let (_, frame) = frame_parts!(kernel, ai, target);
                    frame.get_by_name(name)
                };
                match found {
                    Some(value) => Ok(value),
                    None => self.unassigned(kx, fi, name),
                }
            }
            Retriever::Compound { stem, tails } => {
                let tail = self.resolve_tail(kx, fi, code, tails)?;
                let stem_name = match code.retriever(*stem) {
                    Retriever::Stem { name, .. } => name.clone(),
                    _ => {
                        return Err(RexxError::Syntax(SyntaxError::new(
                            error_codes::INVALID_VARIABLE,
                        )));
                    }
                };
                let found = {
                    let kernel = kx.k();
                    let target = self.variable_frame(kernel, ai, fi);
                    let stem_obj = {
                        let (_, frame) = frame_parts!(kernel, ai, target);
                        frame.get_by_name(&stem_name)
                    };
                    stem_obj.and_then(|stem_obj| kernel.memory.stem_get(stem_obj, &tail))
                };
                match found {
                    Some(value) => Ok(value),
                    None => self.unassigned(kx, fi, &format!("{stem_name}{tail}")),
                }
            }
        }
    }

    /// An unassigned variable: NOVALUE when trapped, else its own name.
    fn unassigned(&self, kx: &mut Kx<'_>, fi: usize, name: &str) -> Result<ObjRef, RexxError> {
        let ai = kx.activity();
        let trapped = {
            let kernel = kx.k();
            let (_, frame) = frame_parts!(kernel, ai, fi);
            frame.traps.contains_key(crate::activity::condition::conditions::NOVALUE)
        };
        if trapped {
            let kernel = kx.k();
            let object = crate::activity::condition::create_condition_object(
                &mut kernel.memory,
                crate::activity::condition::conditions::NOVALUE,
                name,
                ObjRef::NULL,
                ObjRef::NULL,
            )?;
            return Err(RexxError::Condition {
                name: crate::activity::condition::conditions::NOVALUE.into(),
                object,
            });
        }
        let kernel = kx.k();
        Ok(kernel.memory.global_name(name)?)
    }

    /// Resolve a compound tail to its string form.
    fn resolve_tail(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        tails: &[TailPart],
    ) -> Result<String, RexxError> {
        let ai = kx.activity();
        let mut out = String::new();
        for (index, part) in tails.iter().enumerate() {
            if index > 0 {
                out.push('.');
            }
            match part {
                TailPart::Text(text) => out.push_str(text),
                TailPart::Var(var) => {
                    let name = match code.retriever(*var) {
                        Retriever::Simple { name, .. } => name.clone(),
                        _ => continue,
                    };
                    let value = {
                        let kernel = kx.k();
                        let target = self.variable_frame(kernel, ai, fi);
                        let (_, frame) = frame_parts!(kernel, ai, target);
                        frame.get_by_name(&name)
                    };
                    match value {
                        Some(value) => {
                            let kernel = kx.k();
                            let (memory, frame) = frame_parts!(kernel, ai, fi);
                            out.push_str(&display_string(memory, value, &frame.settings));
                        }
                        None => out.push_str(&name),
                    }
                }
            }
        }
        Ok(out)
    }

    /// Assign through a retriever.
    pub(super) fn assign_variable(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        var: VarId,
        value: ObjRef,
    ) -> Result<(), RexxError> {
        let ai = kx.activity();
        match code.retriever(var) {
            Retriever::Simple { name, .. } => {
                let kernel = kx.k();
                let target = self.variable_frame(kernel, ai, fi);
                let (_, frame) = frame_parts!(kernel, ai, target);
                frame.set_by_name(name, value);
                Ok(())
            }
            Retriever::Stem { name, .. } => {
                // Assignment to a stem resets the whole collection: a fresh
                // stem with the value as its default.
                let kernel = kx.k();
                let stem = kernel.memory.allocate(ObjectData::new_stem(name))?;
                if let ObjectData::Stem(data) = &mut kernel.memory.cell_mut(stem).data {
                    data.default = value;
                }
                let target = self.variable_frame(kernel, ai, fi);
                let (_, frame) = frame_parts!(kernel, ai, target);
                frame.set_by_name(name, stem);
                Ok(())
            }
            Retriever::Compound { stem, tails } => {
                let tail = self.resolve_tail(kx, fi, code, tails)?;
                let stem_name = match code.retriever(*stem) {
                    Retriever::Stem { name, .. } => name.clone(),
                    _ => {
                        return Err(RexxError::Syntax(SyntaxError::new(
                            error_codes::INVALID_VARIABLE,
                        )));
                    }
                };
                let kernel = kx.k();
                let target = self.variable_frame(kernel, ai, fi);
                let stem_obj = {
                    let (_, frame) = frame_parts!(kernel, ai, target);
                    frame.get_by_name(&stem_name)
                };
                let stem_obj = match stem_obj {
                    Some(stem_obj)
                        if kernel.memory.tag(stem_obj) == crate::object::TypeTag::Stem =>
                    {
                        stem_obj
                    }
                    _ => {
                        let stem_obj =
                            kernel.memory.allocate(ObjectData::new_stem(&stem_name))?;
                        let (_, frame) = frame_parts!(kernel, ai, target);
                        frame.set_by_name(&stem_name, stem_obj);
                        stem_obj
                    }
                };
                kernel.memory.stem_set(stem_obj, &tail, value);
                Ok(())
            }
        }
    }

    /// DROP through a retriever.
    pub(super) fn drop_variable(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        var: VarId,
    ) -> Result<(), RexxError> {
        let ai = kx.activity();
        match code.retriever(var) {
            Retriever::Simple { name, .. } | Retriever::Stem { name, .. } => {
                let kernel = kx.k();
                let target = self.variable_frame(kernel, ai, fi);
                let (_, frame) = frame_parts!(kernel, ai, target);
                frame.drop_by_name(name);
                Ok(())
            }
            Retriever::Compound { stem, tails } => {
                let tail = self.resolve_tail(kx, fi, code, tails)?;
                let stem_name = match code.retriever(*stem) {
                    Retriever::Stem { name, .. } => name.clone(),
                    _ => return Ok(()),
                };
                let kernel = kx.k();
                let target = self.variable_frame(kernel, ai, fi);
                let stem_obj = {
                    let (_, frame) = frame_parts!(kernel, ai, target);
                    frame.get_by_name(&stem_name)
                };
                if let Some(stem_obj) = stem_obj {
                    if let ObjectData::Stem(data) = &mut kernel.memory.cell_mut(stem_obj).data {
                        data.tails.remove(tail.as_str());
                    }
                }
                Ok(())
            }
        }
    }

    /// Store a value under a plain name in the frame's variables.
    pub(super) fn set_name(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        name: &str,
        value: ObjRef,
    ) -> Result<(), RexxError> {
        let ai = kx.activity();
        let kernel = kx.k();
        let target = self.variable_frame(kernel, ai, fi);
        let (_, frame) = frame_parts!(kernel, ai, target);
        frame.set_by_name(name, value);
        Ok(())
    }

    /// Drop a plain name from the frame's variables.
    pub(super) fn drop_name(&self, kx: &mut Kx<'_>, fi: usize, name: &str) {
        let ai = kx.activity();
        let kernel = kx.k();
        let target = self.variable_frame(kernel, ai, fi);
        let (_, frame) = frame_parts!(kernel, ai, target);
        frame.drop_by_name(name);
    }
}
