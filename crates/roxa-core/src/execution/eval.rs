// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Instruction execution and expression evaluation.
//!
//! Expression evaluation keeps every intermediate value on the frame's
//! evaluation stack: `eval` leaves exactly one net value pushed, binary
//! nodes pop their two operands before pushing the result. That makes the
//! translated `max_stack` bound an enforceable property and every
//! in-flight operand a collector root.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::activity::condition::{
    RexxError, SyntaxError, conditions, create_condition_object, error_codes,
};
use crate::instructions::{
    BinaryOp, Expr, ExprId, InstrId, Keyword, NumericSetting, PrefixOp, Retriever, RexxCode,
};
use crate::memory::Memory;
use crate::object::{ObjectData, VariableRefData, frame_types};
use crate::types::ObjRef;

use super::number::{NumberError, NumericForm, RexxNumber};
use super::{Executor, Flow, Kx, RexxActivation, TrapState, frame_parts};

fn nonnumeric(memory: &Memory, value: ObjRef) -> RexxError {
    let text = display_string(memory, value, &crate::activity::NumericSettings::default());
    RexxError::Syntax(SyntaxError::with(
        error_codes::NONNUMERIC_VALUE,
        vec![text],
    ))
}

/// The printable string form of a value.
pub fn display_string(
    memory: &Memory,
    value: ObjRef,
    settings: &crate::activity::NumericSettings,
) -> String {
    if value.is_null() {
        return String::new();
    }
    match &memory.cell(value).data {
        ObjectData::String(s) => s.to_string(),
        ObjectData::Number(n) => n.format(settings.digits, settings.form),
        ObjectData::Nil => "The NIL object".to_string(),
        ObjectData::Buffer(bytes) | ObjectData::MutableBuffer(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
        ObjectData::Stem(stem) => stem.name.to_string(),
        _ => crate::activity::condition::default_name(memory, value),
    }
}

/// Convert a value to a number, or raise the nonnumeric error.
pub fn to_number(memory: &Memory, value: ObjRef) -> Result<RexxNumber, RexxError> {
    if value.is_null() {
        return Err(nonnumeric(memory, value));
    }
    match &memory.cell(value).data {
        ObjectData::Number(n) => Ok(n.clone()),
        ObjectData::String(s) => {
            RexxNumber::parse(s).map_err(|_| nonnumeric(memory, value))
        }
        _ => Err(nonnumeric(memory, value)),
    }
}

/// Convert a value to a logical 0/1.
fn to_truth(
    memory: &Memory,
    value: ObjRef,
    settings: &crate::activity::NumericSettings,
) -> Result<bool, RexxError> {
    let number = to_number(memory, value).map_err(|_| {
        RexxError::Syntax(SyntaxError::with(
            error_codes::LOGICAL_VALUE,
            vec![display_string(memory, value, settings)],
        ))
    })?;
    match number.to_whole(settings.digits) {
        Ok(0) => Ok(false),
        Ok(1) => Ok(true),
        _ => Err(RexxError::Syntax(SyntaxError::with(
            error_codes::LOGICAL_VALUE,
            vec![display_string(memory, value, settings)],
        ))),
    }
}

impl Executor<'_> {
    // ------------------------------------------------------------------
    // Instruction dispatch
    // ------------------------------------------------------------------

    /// Execute the instruction at `pc`; `frame.pc` already points at the
    /// sequential successor.
    pub(super) fn execute(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        pc: InstrId,
    ) -> Result<Flow, RexxError> {
        let ai = kx.activity();
        match &code.instruction(pc).keyword {
            Keyword::Nop | Keyword::Label { .. } | Keyword::Otherwise | Keyword::Else => {
                Ok(Flow::Normal)
            }

            Keyword::Say { expr } => {
                let text = match expr {
                    Some(expr) => {
                        let value = self.eval(kx, fi, code, *expr)?;
                        let kernel = kx.k();
                        let (memory, frame) = frame_parts!(kernel, ai, fi);
                        let text = display_string(memory, value, &frame.settings);
                        frame.pop_eval(1);
                        text
                    }
                    None => String::new(),
                };
                // I/O exits are callouts: a suspension point for the kernel.
                kx.release();
                self.services.say(&text);
                kx.acquire();
                Ok(Flow::Normal)
            }

            Keyword::Assignment { target, expr } => {
                let value = self.eval(kx, fi, code, *expr)?;
                self.assign_variable(kx, fi, code, *target, value)?;
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.pop_eval(1);
                Ok(Flow::Normal)
            }

            Keyword::Command { expr } => {
                let value = self.eval(kx, fi, code, *expr)?;
                let (text, error_trapped, failure_trapped) = {
                    let kernel = kx.k();
                    let (memory, frame) = frame_parts!(kernel, ai, fi);
                    let text = display_string(memory, value, &frame.settings);
                    frame.pop_eval(1);
                    (
                        text,
                        frame.traps.contains_key(conditions::ERROR),
                        frame.traps.contains_key(conditions::FAILURE),
                    )
                };
                // Command handlers run outside the kernel lock.
                kx.release();
                let rc = self.services.command(&text);
                kx.acquire();
                let rc_value = {
                    let kernel = kx.k();
                    let rc_value = kernel.memory.new_number(RexxNumber::from_integer(rc))?;
                    self.set_name(kx, fi, "RC", rc_value)?;
                    rc_value
                };
                if rc != 0 {
                    let (name, trapped) = if rc < 0 {
                        (conditions::FAILURE, failure_trapped)
                    } else {
                        (conditions::ERROR, error_trapped)
                    };
                    if trapped {
                        let kernel = kx.k();
                        let object = create_condition_object(
                            &mut kernel.memory,
                            name,
                            &text,
                            rc_value,
                            ObjRef::NULL,
                        )?;
                        return Err(RexxError::Condition {
                            name: name.into(),
                            object,
                        });
                    }
                }
                Ok(Flow::Normal)
            }

            Keyword::MessageSend { expr } => {
                self.eval(kx, fi, code, *expr)?;
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.pop_eval(1);
                Ok(Flow::Normal)
            }

            Keyword::Exit { expr } => {
                let value = match expr {
                    Some(expr) => {
                        let value = self.eval(kx, fi, code, *expr)?;
                        let kernel = kx.k();
                        let (_, frame) = frame_parts!(kernel, ai, fi);
                        frame.pop_eval(1);
                        value
                    }
                    None => ObjRef::NULL,
                };
                Err(RexxError::Exit(value))
            }

            Keyword::Return { expr } => match expr {
                Some(expr) => {
                    let value = self.eval(kx, fi, code, *expr)?;
                    let kernel = kx.k();
                    let (_, frame) = frame_parts!(kernel, ai, fi);
                    frame.pop_eval(1);
                    Ok(Flow::Returned(value))
                }
                // RETURN with no value still ends the frame; the null
                // reference marks "no data returned".
                None => Ok(Flow::Returned(ObjRef::NULL)),
            },

            Keyword::Call { name, args, target } => {
                let arguments = self.eval_arguments(kx, fi, code, args)?;
                let result = self.call_by_name(kx, fi, code, name, target, &arguments)?;
                {
                    let kernel = kx.k();
                    let (_, frame) = frame_parts!(kernel, ai, fi);
                    frame.pop_eval(arguments.len());
                }
                match result {
                    Some(value) => self.set_name(kx, fi, "RESULT", value)?,
                    None => self.drop_name(kx, fi, "RESULT"),
                }
                Ok(Flow::Normal)
            }

            Keyword::CallOn {
                condition,
                label,
                on,
            } => {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                if *on {
                    frame.traps.insert(
                        condition.clone(),
                        TrapState {
                            label: label.clone(),
                            call: true,
                        },
                    );
                } else {
                    frame.traps.remove(condition.as_ref());
                }
                Ok(Flow::Normal)
            }

            Keyword::SignalOn {
                condition,
                label,
                on,
            } => {
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                if *on {
                    frame.traps.insert(
                        condition.clone(),
                        TrapState {
                            label: label.clone(),
                            call: false,
                        },
                    );
                } else {
                    frame.traps.remove(condition.as_ref());
                }
                Ok(Flow::Normal)
            }

            Keyword::Signal { name, target } => match target {
                Some(target) => {
                    let kernel = kx.k();
                    let (_, frame) = frame_parts!(kernel, ai, fi);
                    // SIGNAL deactivates every loop of the frame.
                    frame.do_stack.clear();
                    frame.pc = Some(*target);
                    Ok(Flow::Normal)
                }
                None => Err(RexxError::Syntax(SyntaxError::with(
                    error_codes::LABEL_NOT_FOUND_NAME,
                    vec![name.to_string()],
                ))),
            },

            Keyword::If {
                condition,
                then_target,
                else_target,
            } => {
                let truth = self.eval_truth(kx, fi, code, *condition)?;
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                if truth {
                    frame.pc = Some(*then_target);
                } else if let Some(else_target) = else_target {
                    frame.pc = Some(*else_target);
                }
                // Without an ELSE the sequential next is already the join.
                Ok(Flow::Normal)
            }

            Keyword::Select { .. } => Ok(Flow::Normal),

            Keyword::When {
                condition,
                then_target,
                on_false,
            } => {
                let truth = self.eval_truth(kx, fi, code, *condition)?;
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.pc = Some(if truth { *then_target } else { *on_false });
                Ok(Flow::Normal)
            }

            Keyword::Do { .. } => self.do_instruction(kx, fi, code, pc),

            Keyword::End { opener } => self.end_instruction(kx, fi, code, *opener),

            Keyword::Leave { name } => self.leave_instruction(kx, fi, code, name.as_deref(), false),

            Keyword::Iterate { name } => {
                self.leave_instruction(kx, fi, code, name.as_deref(), true)
            }

            Keyword::Drop { targets } => {
                for target in targets {
                    self.drop_variable(kx, fi, code, *target)?;
                }
                Ok(Flow::Normal)
            }

            Keyword::Numeric { setting } => {
                match setting {
                    NumericSetting::Digits(expr) => {
                        let digits = match expr {
                            Some(expr) => self.eval_whole(kx, fi, code, *expr)?,
                            None => crate::activity::DEFAULT_DIGITS as i64,
                        };
                        if digits < 1 {
                            return Err(RexxError::Syntax(SyntaxError::new(
                                error_codes::INVALID_WHOLE_NUMBER,
                            )));
                        }
                        let kernel = kx.k();
                        let (_, frame) = frame_parts!(kernel, ai, fi);
                        frame.settings.digits = digits as usize;
                    }
                    NumericSetting::Fuzz(expr) => {
                        let fuzz = match expr {
                            Some(expr) => self.eval_whole(kx, fi, code, *expr)?,
                            None => crate::activity::DEFAULT_FUZZ as i64,
                        };
                        if fuzz < 0 {
                            return Err(RexxError::Syntax(SyntaxError::new(
                                error_codes::INVALID_WHOLE_NUMBER,
                            )));
                        }
                        let kernel = kx.k();
                        let (_, frame) = frame_parts!(kernel, ai, fi);
                        frame.settings.fuzz = fuzz as usize;
                    }
                    NumericSetting::Form(scientific) => {
                        let kernel = kx.k();
                        let (_, frame) = frame_parts!(kernel, ai, fi);
                        frame.settings.form = if *scientific {
                            NumericForm::Scientific
                        } else {
                            NumericForm::Engineering
                        };
                    }
                }
                kx.k().entry_mut(ai).refresh_settings();
                Ok(Flow::Normal)
            }

            Keyword::Guard { on, when } => self.guard_instruction(kx, fi, code, *on, *when),

            Keyword::Interpret { expr } => {
                let value = self.eval(kx, fi, code, *expr)?;
                let (text, settings) = {
                    let kernel = kx.k();
                    let (memory, frame) = frame_parts!(kernel, ai, fi);
                    let text = display_string(memory, value, &frame.settings);
                    frame.pop_eval(1);
                    (text, frame.settings)
                };
                let interpreted = {
                    let kernel = kx.k();
                    crate::parser::translate_interpret(&mut kernel.memory, &text)
                        .map_err(RexxError::Syntax)?
                };
                let mut activation = RexxActivation::new(
                    interpreted,
                    None,
                    "INTERPRET",
                    frame_types::INTERPRET,
                    Vec::new(),
                    settings,
                );
                activation.dynamic_parent = Some(fi);
                match self.run_activation(kx, activation)? {
                    Flow::Returned(value) => Ok(Flow::Returned(value)),
                    _ => Ok(Flow::Normal),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Expression evaluation
    // ------------------------------------------------------------------

    /// Evaluate one expression; the result is returned and also left on
    /// the frame's evaluation stack for collector protection.
    pub(super) fn eval(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        expr: ExprId,
    ) -> Result<ObjRef, RexxError> {
        let ai = kx.activity();
        match code.expr(expr) {
            Expr::Literal(index) => {
                let value = code.literals()[*index as usize];
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.push_eval(value);
                Ok(value)
            }

            Expr::Variable(var) => {
                let value = self.variable_value(kx, fi, code, *var)?;
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.push_eval(value);
                Ok(value)
            }

            Expr::VariableRef(var) => {
                let name = match code.retriever(*var) {
                    Retriever::Simple { name, .. } | Retriever::Stem { name, .. } => name.clone(),
                    Retriever::Compound { .. } => {
                        return Err(RexxError::Syntax(SyntaxError::new(
                            error_codes::INVALID_VARIABLE,
                        )));
                    }
                };
                let kernel = kx.k();
                let value = kernel
                    .memory
                    .allocate(ObjectData::VariableReference(VariableRefData {
                        dictionary: ObjRef::NULL,
                        name,
                    }))?;
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.push_eval(value);
                Ok(value)
            }

            Expr::Environment(name) => {
                let kernel = kx.k();
                let value = match kernel.memory.dir_get(kernel.memory.environment(), name) {
                    Some(value) => value,
                    None => kernel.memory.global_name(&format!(".{name}"))?,
                };
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.push_eval(value);
                Ok(value)
            }

            Expr::Qualified { namespace, name } => {
                let kernel = kx.k();
                let value = match kernel.memory.dir_get(kernel.memory.environment(), name) {
                    Some(value) => value,
                    None => {
                        return Err(RexxError::Syntax(SyntaxError::with(
                            error_codes::INVALID_EXPRESSION_AT,
                            vec![format!("{namespace}:{name}")],
                        )));
                    }
                };
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.push_eval(value);
                Ok(value)
            }

            Expr::Function { name, args, target } => {
                let arguments = self.eval_arguments(kx, fi, code, args)?;
                let result = self.call_by_name(kx, fi, code, name, target, &arguments)?;
                let Some(value) = result else {
                    return Err(RexxError::Syntax(SyntaxError::with(
                        error_codes::NO_DATA_RETURNED,
                        vec![name.to_string()],
                    )));
                };
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.pop_eval(arguments.len());
                frame.push_eval(value);
                Ok(value)
            }

            Expr::Message {
                receiver,
                name,
                args,
                double,
            } => {
                let receiver_value = self.eval(kx, fi, code, *receiver)?;
                let arguments = self.eval_arguments(kx, fi, code, args)?;
                let result = self.send_message(kx, fi, receiver_value, name, &arguments)?;
                let value = if *double {
                    receiver_value
                } else {
                    result.ok_or_else(|| {
                        RexxError::Syntax(SyntaxError::with(
                            error_codes::NO_DATA_RETURNED,
                            vec![name.to_string()],
                        ))
                    })?
                };
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.pop_eval(arguments.len() + 1);
                frame.push_eval(value);
                Ok(value)
            }

            Expr::Binary { op, left, right } => {
                let left_value = self.eval(kx, fi, code, *left)?;
                let right_value = self.eval(kx, fi, code, *right)?;
                let value = self.binary_operation(kx, fi, *op, left_value, right_value)?;
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.pop_eval(2);
                frame.push_eval(value);
                Ok(value)
            }

            Expr::Prefix { op, operand } => {
                let operand_value = self.eval(kx, fi, code, *operand)?;
                let value = self.prefix_operation(kx, fi, *op, operand_value)?;
                let kernel = kx.k();
                let (_, frame) = frame_parts!(kernel, ai, fi);
                frame.pop_eval(1);
                frame.push_eval(value);
                Ok(value)
            }
        }
    }

    /// Evaluate to a logical value, consuming the stack slot.
    fn eval_truth(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        expr: ExprId,
    ) -> Result<bool, RexxError> {
        let ai = kx.activity();
        let value = self.eval(kx, fi, code, expr)?;
        let kernel = kx.k();
        let (memory, frame) = frame_parts!(kernel, ai, fi);
        let truth = to_truth(memory, value, &frame.settings)?;
        frame.pop_eval(1);
        Ok(truth)
    }

    /// Evaluate to a whole number, consuming the stack slot.
    fn eval_whole(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        expr: ExprId,
    ) -> Result<i64, RexxError> {
        let ai = kx.activity();
        let value = self.eval(kx, fi, code, expr)?;
        let kernel = kx.k();
        let (memory, frame) = frame_parts!(kernel, ai, fi);
        let number = to_number(memory, value)?;
        let whole = number.to_whole(frame.settings.digits).map_err(|_| {
            RexxError::Syntax(SyntaxError::new(error_codes::INVALID_WHOLE_NUMBER))
        })?;
        frame.pop_eval(1);
        Ok(whole)
    }

    /// Evaluate an argument list; omitted arguments become null. The
    /// values stay on the evaluation stack until the caller pops them.
    fn eval_arguments(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        code: &Arc<RexxCode>,
        args: &[Option<ExprId>],
    ) -> Result<Vec<ObjRef>, RexxError> {
        let ai = kx.activity();
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Some(expr) => values.push(self.eval(kx, fi, code, *expr)?),
                None => {
                    let kernel = kx.k();
                    let (_, frame) = frame_parts!(kernel, ai, fi);
                    frame.push_eval(ObjRef::NULL);
                    values.push(ObjRef::NULL);
                }
            }
        }
        Ok(values)
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn binary_operation(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        op: BinaryOp,
        left: ObjRef,
        right: ObjRef,
    ) -> Result<ObjRef, RexxError> {
        let ai = kx.activity();
        let kernel = kx.k();
        let settings = {
            let (_, frame) = frame_parts!(kernel, ai, fi);
            frame.settings
        };
        let digits = settings.digits;

        match op {
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::IntegerDivide
            | BinaryOp::Remainder
            | BinaryOp::Power => {
                let a = to_number(&kernel.memory, left)?;
                let b = to_number(&kernel.memory, right)?;
                let result = match op {
                    BinaryOp::Add => Ok(a.add(&b, digits)),
                    BinaryOp::Subtract => Ok(a.subtract(&b, digits)),
                    BinaryOp::Multiply => Ok(a.multiply(&b, digits)),
                    BinaryOp::Divide => a.divide(&b, digits),
                    BinaryOp::IntegerDivide => a.integer_divide(&b, digits),
                    BinaryOp::Remainder => a.remainder(&b, digits),
                    _ => a.power(&b, digits),
                };
                let number = result.map_err(|e| match e {
                    NumberError::DivideByZero => {
                        RexxError::Syntax(SyntaxError::new(error_codes::DIVIDE_BY_ZERO))
                    }
                    NumberError::NotAWholeNumber | NumberError::WholeNumberRange => {
                        RexxError::Syntax(SyntaxError::new(error_codes::INVALID_WHOLE_NUMBER))
                    }
                    _ => RexxError::Syntax(SyntaxError::new(error_codes::ARITHMETIC_OVERFLOW)),
                })?;
                Ok(kernel.memory.new_number(number)?)
            }

            BinaryOp::Concat | BinaryOp::ConcatBlank | BinaryOp::Abuttal => {
                let mut text = display_string(&kernel.memory, left, &settings);
                if matches!(op, BinaryOp::ConcatBlank) {
                    text.push(' ');
                }
                text.push_str(&display_string(&kernel.memory, right, &settings));
                Ok(kernel.memory.new_string(&text)?)
            }

            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual
            | BinaryOp::Less
            | BinaryOp::LessEqual => {
                let ordering = compare_values(&kernel.memory, left, right, &settings);
                let truth = match op {
                    BinaryOp::Equal => ordering == Ordering::Equal,
                    BinaryOp::NotEqual => ordering != Ordering::Equal,
                    BinaryOp::Greater => ordering == Ordering::Greater,
                    BinaryOp::GreaterEqual => ordering != Ordering::Less,
                    BinaryOp::Less => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                };
                Ok(kernel.memory.boolean(truth))
            }

            BinaryOp::StrictEqual
            | BinaryOp::StrictNotEqual
            | BinaryOp::StrictGreater
            | BinaryOp::StrictGreaterEqual
            | BinaryOp::StrictLess
            | BinaryOp::StrictLessEqual => {
                let a = display_string(&kernel.memory, left, &settings);
                let b = display_string(&kernel.memory, right, &settings);
                let ordering = a.as_bytes().cmp(b.as_bytes());
                let truth = match op {
                    BinaryOp::StrictEqual => ordering == Ordering::Equal,
                    BinaryOp::StrictNotEqual => ordering != Ordering::Equal,
                    BinaryOp::StrictGreater => ordering == Ordering::Greater,
                    BinaryOp::StrictGreaterEqual => ordering != Ordering::Less,
                    BinaryOp::StrictLess => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                };
                Ok(kernel.memory.boolean(truth))
            }

            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                let a = to_truth(&kernel.memory, left, &settings)?;
                let b = to_truth(&kernel.memory, right, &settings)?;
                let truth = match op {
                    BinaryOp::And => a && b,
                    BinaryOp::Or => a || b,
                    _ => a != b,
                };
                Ok(kernel.memory.boolean(truth))
            }
        }
    }

    fn prefix_operation(
        &self,
        kx: &mut Kx<'_>,
        fi: usize,
        op: PrefixOp,
        operand: ObjRef,
    ) -> Result<ObjRef, RexxError> {
        let ai = kx.activity();
        let kernel = kx.k();
        let settings = {
            let (_, frame) = frame_parts!(kernel, ai, fi);
            frame.settings
        };
        match op {
            PrefixOp::Not => {
                let truth = to_truth(&kernel.memory, operand, &settings)?;
                Ok(kernel.memory.boolean(!truth))
            }
            PrefixOp::Minus => {
                let number = to_number(&kernel.memory, operand)?;
                Ok(kernel.memory.new_number(number.negate())?)
            }
            PrefixOp::Plus => {
                let number = to_number(&kernel.memory, operand)?;
                Ok(kernel.memory.new_number(number)?)
            }
        }
    }
}

/// Rexx non-strict comparison: numeric when both sides are numbers,
/// otherwise blank-insensitive string comparison.
fn compare_values(
    memory: &Memory,
    left: ObjRef,
    right: ObjRef,
    settings: &crate::activity::NumericSettings,
) -> Ordering {
    if let (Ok(a), Ok(b)) = (to_number(memory, left), to_number(memory, right)) {
        return a.compare(&b, settings.digits, settings.fuzz);
    }
    let a = display_string(memory, left, settings);
    let b = display_string(memory, right, settings);
    a.trim().as_bytes().cmp(b.trim().as_bytes())
}
