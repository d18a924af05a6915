// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The executable instruction graph.
//!
//! A code block is a linked list of instruction nodes held in an arena;
//! every node carries the index of its successor, and block-structured
//! instructions additionally carry direct indices to their paired nodes
//! (IF to its branches, DO to its END, END back to its opener).
//!
//! Expressions form a second arena of tree nodes referenced by `ExprId`.
//! Literal values are heap objects collected in the block's literal pool so
//! the garbage collector can reach them through the owning package.

#[cfg(test)]
mod instructions_test;

use std::collections::BTreeMap;

use crate::types::ObjRef;

/// Index of an instruction node within its code block.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[repr(transparent)]
pub struct InstrId(pub u32);

impl InstrId {
    /// The arena index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an expression node within its code block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct ExprId(pub u32);

impl ExprId {
    /// The arena index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an interned variable retriever within its code block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
#[repr(transparent)]
pub struct VarId(pub u32);

impl VarId {
    /// The arena index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A variable retriever: the precomputed recipe for resolving a name.
///
/// Slot 0 means dynamic lookup by name (forced under INTERPRET); any other
/// slot is a direct index into the activation's variable frame.
#[derive(Clone, Debug)]
pub enum Retriever {
    /// A simple symbol.
    Simple {
        /// Uppercased variable name.
        name: Box<str>,
        /// Frame slot, 0 for dynamic lookup.
        slot: usize,
    },
    /// A stem (name with trailing period).
    Stem {
        /// Uppercased stem name including the period.
        name: Box<str>,
        /// Frame slot, 0 for dynamic lookup.
        slot: usize,
    },
    /// A compound variable: stem plus precomputed tail parts.
    Compound {
        /// Retriever of the backing stem.
        stem: VarId,
        /// Tail components, concatenated with periods at evaluation time.
        tails: Vec<TailPart>,
    },
}

/// One component of a compound variable's tail.
#[derive(Clone, Debug)]
pub enum TailPart {
    /// A literal segment (numeric or empty).
    Text(Box<str>),
    /// A substituted simple-variable segment.
    Var(VarId),
}

/// Binary operators in precedence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    /// `**`
    Power,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    IntegerDivide,
    /// `//`
    Remainder,
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// Abuttal concatenation (no intervening blank).
    Abuttal,
    /// `||`
    Concat,
    /// Blank concatenation (whitespace between terms).
    ConcatBlank,
    /// `=`
    Equal,
    /// `\=` / `<>` / `><`
    NotEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `==`
    StrictEqual,
    /// `\==`
    StrictNotEqual,
    /// `>>`
    StrictGreater,
    /// `>>=`
    StrictGreaterEqual,
    /// `<<`
    StrictLess,
    /// `<<=`
    StrictLessEqual,
    /// `&`
    And,
    /// `|`
    Or,
    /// `&&`
    Xor,
}

impl BinaryOp {
    /// Operator precedence; higher binds tighter.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Power => 8,
            Self::Multiply | Self::Divide | Self::IntegerDivide | Self::Remainder => 7,
            Self::Add | Self::Subtract => 6,
            Self::Abuttal | Self::Concat | Self::ConcatBlank => 5,
            Self::Equal
            | Self::NotEqual
            | Self::Greater
            | Self::GreaterEqual
            | Self::Less
            | Self::LessEqual
            | Self::StrictEqual
            | Self::StrictNotEqual
            | Self::StrictGreater
            | Self::StrictGreaterEqual
            | Self::StrictLess
            | Self::StrictLessEqual => 4,
            Self::And => 3,
            Self::Or | Self::Xor => 2,
        }
    }
}

/// Prefix operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefixOp {
    /// Prefix `+`
    Plus,
    /// Prefix `-`
    Minus,
    /// Prefix `\`
    Not,
}

/// How a call name was resolved after translation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallTarget {
    /// Not yet resolved (during parsing only).
    Unresolved,
    /// An internal label in the same code block.
    Label(InstrId),
    /// A `::ROUTINE` in the same package.
    Routine,
    /// A built-in function.
    Builtin,
    /// Tried as an external call at execution time.
    External,
}

/// An expression tree node.
#[derive(Clone, Debug)]
pub enum Expr {
    /// A literal from the block's literal pool.
    Literal(u32),
    /// A variable read through a retriever.
    Variable(VarId),
    /// A variable-reference term (`>var` / `<var`).
    VariableRef(VarId),
    /// An environment symbol (`.name`).
    Environment(Box<str>),
    /// A qualified class resolution (`namespace:name`).
    Qualified {
        /// The namespace part.
        namespace: Box<str>,
        /// The name part.
        name: Box<str>,
    },
    /// A function call.
    Function {
        /// Uppercased call name.
        name: Box<str>,
        /// Positional arguments; `None` marks an omitted argument.
        args: Vec<Option<ExprId>>,
        /// Resolution decided after translation.
        target: CallTarget,
    },
    /// A message send (`~`, `~~`, or `[` sugar).
    Message {
        /// The receiver term.
        receiver: ExprId,
        /// Uppercased message name.
        name: Box<str>,
        /// Positional arguments; `None` marks an omitted argument.
        args: Vec<Option<ExprId>>,
        /// `~~` returns the receiver instead of the result.
        double: bool,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: ExprId,
        /// Right operand.
        right: ExprId,
    },
    /// A prefix operation.
    Prefix {
        /// The operator.
        op: PrefixOp,
        /// The operand.
        operand: ExprId,
    },
}

/// Loop repetitor specification for DO/LOOP.
#[derive(Clone, Debug, Default)]
pub struct DoSpec {
    /// Controlled loop: `var = start [TO limit] [BY step] [FOR count]`.
    pub control: Option<ControlSpec>,
    /// Plain repetition count.
    pub count: Option<ExprId>,
    /// WHILE condition, tested before each iteration.
    pub while_cond: Option<ExprId>,
    /// UNTIL condition, tested after each iteration.
    pub until_cond: Option<ExprId>,
}

/// The controlled-repetitor part of a DO/LOOP.
#[derive(Clone, Debug)]
pub struct ControlSpec {
    /// The control variable.
    pub variable: VarId,
    /// Initial value expression.
    pub start: ExprId,
    /// TO limit, if present.
    pub to: Option<ExprId>,
    /// BY step, if present (default 1).
    pub by: Option<ExprId>,
    /// FOR iteration cap, if present.
    pub for_count: Option<ExprId>,
}

/// Instruction keyword tag plus per-keyword operands.
#[derive(Clone, Debug)]
pub enum Keyword {
    /// No operation.
    Nop,
    /// A label definition (execution no-op, target of SIGNAL/CALL).
    Label {
        /// The label name.
        name: Box<str>,
    },
    /// SAY expression.
    Say {
        /// The value to print, or none for a blank line.
        expr: Option<ExprId>,
    },
    /// Assignment to a variable.
    Assignment {
        /// Target retriever.
        target: VarId,
        /// The value expression.
        expr: ExprId,
    },
    /// An expression clause issued as a host command.
    Command {
        /// The command expression.
        expr: ExprId,
    },
    /// A standalone message-send clause.
    MessageSend {
        /// The message expression.
        expr: ExprId,
    },
    /// CALL to a label, routine, built-in or external.
    Call {
        /// The call name.
        name: Box<str>,
        /// Positional arguments.
        args: Vec<Option<ExprId>>,
        /// Resolution decided after translation.
        target: CallTarget,
    },
    /// CALL ON / CALL OFF for a condition.
    CallOn {
        /// Condition name.
        condition: Box<str>,
        /// Trap label (defaults to the condition name).
        label: Box<str>,
        /// ON (true) or OFF.
        on: bool,
    },
    /// SIGNAL to a label.
    Signal {
        /// Target label name.
        name: Box<str>,
        /// Filled by deferred resolution.
        target: Option<InstrId>,
    },
    /// SIGNAL ON / SIGNAL OFF for a condition.
    SignalOn {
        /// Condition name.
        condition: Box<str>,
        /// Trap label (defaults to the condition name).
        label: Box<str>,
        /// ON (true) or OFF.
        on: bool,
    },
    /// IF with paired branch pointers.
    If {
        /// The tested condition.
        condition: ExprId,
        /// First instruction of the THEN arm.
        then_target: InstrId,
        /// First instruction of the ELSE arm, if any.
        else_target: Option<InstrId>,
    },
    /// ELSE marker; executed only as a jump-over at the end of a THEN arm.
    Else,
    /// SELECT opener; `next` is the first WHEN.
    Select {
        /// The matching END.
        end_target: InstrId,
        /// Whether an OTHERWISE was present; its absence makes reaching
        /// the END a runtime error.
        has_otherwise: bool,
    },
    /// WHEN inside a SELECT.
    When {
        /// The tested condition.
        condition: ExprId,
        /// First instruction of the THEN arm.
        then_target: InstrId,
        /// Where to go when false: the next WHEN, OTHERWISE, or END.
        on_false: InstrId,
    },
    /// OTHERWISE inside a SELECT; body follows via `next`.
    Otherwise,
    /// DO/LOOP opener.
    Do {
        /// Loop repetitors; all empty means a plain block.
        spec: DoSpec,
        /// Whether this is a repeating block (LOOP or DO with repetitors).
        repetitive: bool,
        /// The matching END.
        end_target: InstrId,
    },
    /// Block END; `opener` points back at the DO/LOOP/SELECT.
    End {
        /// The matching opener.
        opener: InstrId,
    },
    /// LEAVE a loop.
    Leave {
        /// Optional control-variable name selecting the loop.
        name: Option<Box<str>>,
    },
    /// ITERATE a loop.
    Iterate {
        /// Optional control-variable name selecting the loop.
        name: Option<Box<str>>,
    },
    /// DROP variables back to unassigned.
    Drop {
        /// The variables to drop.
        targets: Vec<VarId>,
    },
    /// EXIT the program.
    Exit {
        /// Optional result expression.
        expr: Option<ExprId>,
    },
    /// RETURN from the current invocation.
    Return {
        /// Optional result expression.
        expr: Option<ExprId>,
    },
    /// NUMERIC DIGITS/FUZZ/FORM.
    Numeric {
        /// Which setting is changed.
        setting: NumericSetting,
    },
    /// GUARD ON/OFF with optional WHEN expression.
    Guard {
        /// ON (true) or OFF.
        on: bool,
        /// Optional WHEN condition re-evaluated on variable updates.
        when: Option<ExprId>,
    },
    /// INTERPRET an expression as new source.
    Interpret {
        /// The source expression.
        expr: ExprId,
    },
}

/// Operand of a NUMERIC instruction.
#[derive(Clone, Debug)]
pub enum NumericSetting {
    /// NUMERIC DIGITS [expr]
    Digits(Option<ExprId>),
    /// NUMERIC FUZZ [expr]
    Fuzz(Option<ExprId>),
    /// NUMERIC FORM SCIENTIFIC/ENGINEERING
    Form(bool),
}

/// One node of the instruction list.
#[derive(Clone, Debug)]
pub struct Instruction {
    /// The keyword tag and operands.
    pub keyword: Keyword,
    /// Source line of the clause.
    pub line: usize,
    /// The successor in execution order, if any.
    pub next: Option<InstrId>,
}

/// A translated code block.
///
/// Owns the instruction and expression arenas, the interned retrievers, the
/// label map, the literal pool, the stack-depth estimate and the variable
/// slot count.
#[derive(Debug, Default)]
pub struct RexxCode {
    /// Program or routine name for tracebacks.
    pub name: Box<str>,
    /// Instruction arena; `first` starts the chain.
    pub instructions: Vec<Instruction>,
    /// First instruction of the chain.
    pub first: Option<InstrId>,
    /// Expression arena.
    pub exprs: Vec<Expr>,
    /// Interned variable retrievers.
    pub retrievers: Vec<Retriever>,
    /// Label name to first instruction of the labelled clause.
    pub labels: BTreeMap<Box<str>, InstrId>,
    /// Upper bound on the evaluation-stack depth of any expression.
    pub max_stack: usize,
    /// Number of variable slots (0 when running under INTERPRET).
    pub variable_count: usize,
    /// Literal pool: heap objects created at translation time.
    pub literals: Vec<ObjRef>,
    /// Whether this block runs with dynamic variable lookup.
    pub interpret: bool,
    /// The source text lines, kept for tracebacks.
    pub source_lines: Vec<Box<str>>,
}

impl RexxCode {
    /// The literal pool, the collector's entry into this block.
    #[must_use]
    pub fn literals(&self) -> &[ObjRef] {
        &self.literals
    }

    /// Look up an instruction node.
    #[must_use]
    pub fn instruction(&self, id: InstrId) -> &Instruction {
        &self.instructions[id.index()]
    }

    /// Look up an expression node.
    #[must_use]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Look up a retriever.
    #[must_use]
    pub fn retriever(&self, id: VarId) -> &Retriever {
        &self.retrievers[id.index()]
    }

    /// The source line text for a traceback, if retained.
    #[must_use]
    pub fn source_line(&self, line: usize) -> Option<&str> {
        if line == 0 {
            return None;
        }
        self.source_lines.get(line - 1).map(AsRef::as_ref)
    }

    /// Evaluation-stack depth needed for one expression tree.
    ///
    /// Operands are pushed left to right, so a binary node needs its left
    /// depth, then right depth with the left operand already held.
    #[must_use]
    pub fn expr_depth(&self, id: ExprId) -> usize {
        match self.expr(id) {
            Expr::Literal(_)
            | Expr::Variable(_)
            | Expr::VariableRef(_)
            | Expr::Environment(_)
            | Expr::Qualified { .. } => 1,
            Expr::Function { args, .. } => self.args_depth(args, 0),
            Expr::Message { receiver, args, .. } => {
                let recv = self.expr_depth(*receiver);
                recv.max(self.args_depth(args, 1))
            }
            Expr::Binary { left, right, .. } => {
                let l = self.expr_depth(*left);
                let r = self.expr_depth(*right);
                l.max(r + 1)
            }
            Expr::Prefix { operand, .. } => self.expr_depth(*operand),
        }
    }

    fn args_depth(&self, args: &[Option<ExprId>], held: usize) -> usize {
        let mut depth = held.max(1);
        for (i, arg) in args.iter().enumerate() {
            if let Some(arg) = arg {
                depth = depth.max(held + i + self.expr_depth(*arg));
            }
        }
        depth
    }
}
