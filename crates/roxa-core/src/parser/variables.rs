// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The code-block builder and variable interning.
//!
//! Every variable reference in a code block resolves through a retriever
//! interned once per name: simple symbols get a monotonically assigned
//! frame slot, stems get a slot for their container, and compound names
//! precompute their tail recipe. Under INTERPRET every retriever gets slot
//! 0, which forces dynamic lookup in the parent's variable dictionary.

use std::collections::{BTreeMap, HashMap};

use crate::instructions::{
    Expr, ExprId, InstrId, Instruction, Keyword, Retriever, RexxCode, TailPart, VarId,
};
use crate::types::ObjRef;

/// Builds one [`RexxCode`] during translation.
#[derive(Debug)]
pub struct CodeBuilder {
    name: Box<str>,
    instructions: Vec<Instruction>,
    first: Option<InstrId>,
    exprs: Vec<Expr>,
    retrievers: Vec<Retriever>,
    labels: BTreeMap<Box<str>, InstrId>,
    literals: Vec<ObjRef>,
    interpret: bool,
    source_lines: Vec<Box<str>>,

    slots: usize,
    simple_map: HashMap<Box<str>, VarId>,
    stem_map: HashMap<Box<str>, VarId>,
    compound_map: HashMap<Box<str>, VarId>,
}

impl CodeBuilder {
    /// Start a builder for a code block.
    #[must_use]
    pub fn new(name: &str, interpret: bool, source_lines: Vec<Box<str>>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
            first: None,
            exprs: Vec::new(),
            retrievers: Vec::new(),
            labels: BTreeMap::new(),
            literals: Vec::new(),
            interpret,
            source_lines,
            slots: 0,
            simple_map: HashMap::new(),
            stem_map: HashMap::new(),
            compound_map: HashMap::new(),
        }
    }

    /// Whether this block runs with dynamic variable lookup.
    #[must_use]
    pub const fn is_interpret(&self) -> bool {
        self.interpret
    }

    /// Append an instruction node; linking is the caller's business.
    pub fn add_instruction(&mut self, keyword: Keyword, line: usize) -> InstrId {
        let id = InstrId(self.instructions.len() as u32);
        self.instructions.push(Instruction {
            keyword,
            line,
            next: None,
        });
        if self.first.is_none() {
            self.first = Some(id);
        }
        id
    }

    /// Set an instruction's successor.
    pub fn set_next(&mut self, id: InstrId, next: InstrId) {
        self.instructions[id.index()].next = Some(next);
    }

    /// Mutably borrow an instruction node.
    pub fn instruction_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.instructions[id.index()]
    }

    /// Borrow an instruction node.
    #[must_use]
    pub fn instruction(&self, id: InstrId) -> &Instruction {
        &self.instructions[id.index()]
    }

    /// Number of instructions so far.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Append an expression node.
    pub fn add_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    /// Borrow an expression node.
    #[must_use]
    pub fn expr_at(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Resolve function-call expressions against the label map.
    pub fn resolve_function_labels(&mut self) {
        for index in 0..self.exprs.len() {
            let label = match &self.exprs[index] {
                Expr::Function {
                    name,
                    target: crate::instructions::CallTarget::Unresolved,
                    ..
                } => self.labels.get(name.as_ref()).copied(),
                _ => None,
            };
            if let Some(label) = label {
                if let Expr::Function { target, .. } = &mut self.exprs[index] {
                    *target = crate::instructions::CallTarget::Label(label);
                }
            }
        }
    }

    /// Intern a literal object in the pool.
    pub fn add_literal(&mut self, value: ObjRef) -> u32 {
        if let Some(position) = self.literals.iter().position(|l| *l == value) {
            return position as u32;
        }
        self.literals.push(value);
        (self.literals.len() - 1) as u32
    }

    /// The literal pool built so far (kept alive through the package).
    #[must_use]
    pub fn literals(&self) -> &[ObjRef] {
        &self.literals
    }

    /// Record a label; the first definition wins.
    pub fn add_label(&mut self, name: &str, target: InstrId) {
        self.labels.entry(name.into()).or_insert(target);
    }

    /// Look up a label.
    #[must_use]
    pub fn find_label(&self, name: &str) -> Option<InstrId> {
        self.labels.get(name).copied()
    }

    /// Intern a simple variable, assigning the next slot.
    pub fn add_simple_variable(&mut self, name: &str) -> VarId {
        if let Some(&id) = self.simple_map.get(name) {
            return id;
        }
        let slot = if self.interpret {
            0
        } else {
            self.slots += 1;
            self.slots
        };
        let id = VarId(self.retrievers.len() as u32);
        self.retrievers.push(Retriever::Simple {
            name: name.into(),
            slot,
        });
        self.simple_map.insert(name.into(), id);
        id
    }

    /// Intern a stem variable (name includes the trailing period).
    pub fn add_stem_variable(&mut self, name: &str) -> VarId {
        if let Some(&id) = self.stem_map.get(name) {
            return id;
        }
        let slot = if self.interpret {
            0
        } else {
            self.slots += 1;
            self.slots
        };
        let id = VarId(self.retrievers.len() as u32);
        self.retrievers.push(Retriever::Stem {
            name: name.into(),
            slot,
        });
        self.stem_map.insert(name.into(), id);
        id
    }

    /// Intern a compound variable, sub-parsing the tail.
    ///
    /// Each non-empty non-numeric tail segment is interned as a simple
    /// variable for substitution; numeric and empty segments stay literal.
    pub fn add_compound_variable(&mut self, name: &str) -> VarId {
        if let Some(&id) = self.compound_map.get(name) {
            return id;
        }

        let dot = name.find('.').unwrap_or(name.len() - 1);
        let stem_name = &name[..=dot];
        let stem = self.add_stem_variable(stem_name);

        let tail_text = &name[dot + 1..];
        let mut tails = Vec::new();
        for segment in tail_text.split('.') {
            let is_literal = segment.is_empty() || segment.starts_with(|c: char| c.is_ascii_digit());
            if is_literal {
                tails.push(TailPart::Text(segment.into()));
            } else {
                tails.push(TailPart::Var(self.add_simple_variable(segment)));
            }
        }

        let id = VarId(self.retrievers.len() as u32);
        self.retrievers.push(Retriever::Compound { stem, tails });
        self.compound_map.insert(name.into(), id);
        id
    }

    /// Intern the right retriever for a symbol by its shape.
    pub fn add_variable(&mut self, name: &str) -> VarId {
        if let Some(dot) = name.find('.') {
            if dot == name.len() - 1 {
                self.add_stem_variable(name)
            } else {
                self.add_compound_variable(name)
            }
        } else {
            self.add_simple_variable(name)
        }
    }

    /// Borrow a retriever.
    #[must_use]
    pub fn retriever(&self, id: VarId) -> &Retriever {
        &self.retrievers[id.index()]
    }

    /// Freeze the builder into an executable code block.
    ///
    /// Computes the evaluation-stack bound over every expression reachable
    /// from an instruction operand.
    #[must_use]
    pub fn finish(self) -> RexxCode {
        let mut code = RexxCode {
            name: self.name,
            instructions: self.instructions,
            first: self.first,
            exprs: self.exprs,
            retrievers: self.retrievers,
            labels: self.labels,
            max_stack: 0,
            variable_count: self.slots,
            literals: self.literals,
            interpret: self.interpret,
            source_lines: self.source_lines,
        };

        let mut max_stack = 0usize;
        let mut roots: Vec<ExprId> = Vec::new();
        for instruction in &code.instructions {
            collect_expr_roots(&instruction.keyword, &mut roots);
        }
        for root in roots {
            max_stack = max_stack.max(code.expr_depth(root));
        }
        code.max_stack = max_stack;
        code
    }
}

/// Gather the expression operands of one instruction.
fn collect_expr_roots(keyword: &Keyword, roots: &mut Vec<ExprId>) {
    fn opt(roots: &mut Vec<ExprId>, e: &Option<ExprId>) {
        if let Some(e) = e {
            roots.push(*e);
        }
    }
    match keyword {
        Keyword::Nop
        | Keyword::Label { .. }
        | Keyword::Else
        | Keyword::Otherwise
        | Keyword::End { .. }
        | Keyword::Leave { .. }
        | Keyword::Iterate { .. }
        | Keyword::Drop { .. }
        | Keyword::Signal { .. }
        | Keyword::SignalOn { .. }
        | Keyword::CallOn { .. } => {}
        Keyword::Say { expr } | Keyword::Exit { expr } | Keyword::Return { expr } => {
            opt(roots, expr);
        }
        Keyword::Assignment { expr, .. }
        | Keyword::Command { expr }
        | Keyword::MessageSend { expr }
        | Keyword::Interpret { expr } => roots.push(*expr),
        Keyword::Call { args, .. } => args.iter().for_each(|e| opt(roots, e)),
        Keyword::If { condition, .. } | Keyword::When { condition, .. } => roots.push(*condition),
        Keyword::Select { .. } => {}
        Keyword::Do { spec, .. } => {
            if let Some(control) = &spec.control {
                roots.push(control.start);
                opt(roots, &control.to);
                opt(roots, &control.by);
                opt(roots, &control.for_count);
            }
            opt(roots, &spec.count);
            opt(roots, &spec.while_cond);
            opt(roots, &spec.until_cond);
        }
        Keyword::Numeric { setting } => match setting {
            crate::instructions::NumericSetting::Digits(e)
            | crate::instructions::NumericSetting::Fuzz(e) => opt(roots, e),
            crate::instructions::NumericSetting::Form(_) => {}
        },
        Keyword::Guard { when, .. } => opt(roots, when),
    }
}
