// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The single-pass language parser.
//!
//! `translate` drives a loop per clause. A control stack holds the
//! block-structured instructions awaiting completion: an IF waiting for its
//! THEN body, a SELECT waiting for WHENs, a DO waiting for its END.
//! Instructions link into a list through dangling-exit bookkeeping: every
//! finished construct leaves the set of exits that the next instruction at
//! that nesting level resolves.
//!
//! After the last clause, deferred call resolution matches every recorded
//! CALL/SIGNAL/function name against the completed label map; names still
//! unresolved are tried as built-ins and external calls at execution time.
//!
//! Directives after the first code block configure the package; class
//! directives are dependency-sorted before install order is fixed.

#[cfg(test)]
mod parser_test;
#[cfg(test)]
mod variables_test;

pub mod expression;
pub mod lexer;
pub mod source;
pub mod variables;

use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::activity::condition::{SyntaxError, error_codes};
use crate::instructions::{
    CallTarget, ControlSpec, DoSpec, Expr, ExprId, InstrId, Keyword, NumericSetting, RexxCode,
};
use crate::memory::Memory;
use crate::object::{ClassData, ExecutableCode, MethodData, ObjectData, RoutineData};
use crate::package::Package;
use crate::types::ObjRef;

use expression::{ExpressionParser, Terminators};
use lexer::{Clause, Lexer, OperatorKind, TokenKind, is_variable_symbol};
use source::ProgramSource;
use variables::CodeBuilder;

/// A dangling exit waiting for the next instruction at its level.
#[derive(Clone, Copy, Debug)]
enum PendingLink {
    /// Set `instructions[id].next`.
    Next(InstrId),
    /// Set an IF/WHEN `then_target`.
    ThenOf(InstrId),
    /// Set an IF `else_target`.
    ElseOf(InstrId),
}

/// States of an IF under construction.
#[derive(Debug)]
enum IfState {
    /// Condition parsed; THEN not yet seen.
    WantThen,
    /// THEN seen; the body comes from the clause flow.
    WantThenBody,
    /// Body complete; an ELSE may still follow.
    HaveThen {
        /// The THEN body's dangling exits.
        then_exits: Vec<PendingLink>,
    },
    /// ELSE seen; the else body comes from the clause flow.
    WantElseBody {
        /// The THEN body's dangling exits.
        then_exits: Vec<PendingLink>,
    },
}

/// One entry of the translate-time control stack.
#[derive(Debug)]
enum Control {
    If {
        if_id: InstrId,
        state: IfState,
    },
    Do {
        do_id: InstrId,
        line: usize,
        control_name: Option<Box<str>>,
    },
    Select {
        select_id: InstrId,
        line: usize,
        seen_when: bool,
        in_otherwise: bool,
        /// The WHEN whose `on_false` the next WHEN/OTHERWISE/END resolves.
        unresolved_false: Option<InstrId>,
        /// Exits of completed WHEN bodies, resolved after END.
        exits: Vec<PendingLink>,
    },
    When {
        when_id: InstrId,
        state: IfState,
    },
}

/// Where the next clause comes from: the lexer or a collected body.
enum ClauseStream<'a, 's> {
    Lexer(&'a mut Lexer<'s>),
    List(VecDeque<Clause>),
}

impl ClauseStream<'_, '_> {
    fn next_clause(&mut self) -> Result<Option<Clause>, SyntaxError> {
        match self {
            Self::Lexer(lexer) => lexer.next_clause(),
            Self::List(list) => Ok(list.pop_front()),
        }
    }
}

/// The per-code-block translator.
struct BlockParser<'m, 'a, 's> {
    memory: &'m mut Memory,
    builder: CodeBuilder,
    control: Vec<Control>,
    pending: Vec<PendingLink>,
    clauses: ClauseStream<'a, 's>,
}

/// Did a clause finish an instruction construct or open a block?
#[derive(PartialEq, Eq)]
enum Completion {
    Complete,
    Open,
}

impl BlockParser<'_, '_, '_> {
    /// Resolve every pending link to the freshly added instruction.
    fn attach(&mut self, id: InstrId) {
        let links = std::mem::take(&mut self.pending);
        for link in links {
            match link {
                PendingLink::Next(from) => self.builder.set_next(from, id),
                PendingLink::ThenOf(from) => {
                    match &mut self.builder.instruction_mut(from).keyword {
                        Keyword::If { then_target, .. } | Keyword::When { then_target, .. } => {
                            *then_target = id;
                        }
                        _ => {}
                    }
                }
                PendingLink::ElseOf(from) => {
                    if let Keyword::If { else_target, .. } =
                        &mut self.builder.instruction_mut(from).keyword
                    {
                        *else_target = Some(id);
                    }
                }
            }
        }
        self.pending.push(PendingLink::Next(id));
    }

    /// Cascade construct completion up the control stack.
    ///
    /// Called whenever an instruction construct finishes; an enclosing IF
    /// or WHEN whose body just completed advances its state, and a
    /// completed ELSE-less decision is deferred until the next clause.
    fn finish_body(&mut self) {
        loop {
            match self.control.last_mut() {
                Some(Control::If { state, .. }) if matches!(state, IfState::WantThenBody) => {
                    let exits = std::mem::take(&mut self.pending);
                    *state = IfState::HaveThen { then_exits: exits };
                    return;
                }
                Some(Control::If { state, .. }) if matches!(state, IfState::WantElseBody { .. }) => {
                    let IfState::WantElseBody { then_exits } =
                        std::mem::replace(state, IfState::WantThen)
                    else {
                        return;
                    };
                    self.control.pop();
                    self.pending.extend(then_exits);
                    // Loop: the enclosing construct may be complete now.
                }
                Some(Control::When { state, .. }) if matches!(state, IfState::WantThenBody) => {
                    let exits = std::mem::take(&mut self.pending);
                    let Some(Control::When { when_id, .. }) = self.control.pop() else {
                        return;
                    };
                    let Some(Control::Select {
                        unresolved_false,
                        exits: select_exits,
                        ..
                    }) = self.control.last_mut()
                    else {
                        return;
                    };
                    *unresolved_false = Some(when_id);
                    select_exits.extend(exits);
                    return;
                }
                _ => return,
            }
        }
    }

    /// Close any IF whose ELSE decision is now settled (no ELSE follows).
    fn settle_pending_if(&mut self) {
        while let Some(Control::If { state, .. }) = self.control.last_mut() {
            if matches!(state, IfState::HaveThen { .. }) {
                let IfState::HaveThen { then_exits } =
                    std::mem::replace(state, IfState::WantThen)
                else {
                    return;
                };
                let Some(Control::If { if_id, .. }) = self.control.pop() else {
                    return;
                };
                // The IF's own next is the join when the condition is false.
                self.pending.extend(then_exits);
                self.pending.push(PendingLink::Next(if_id));
                self.finish_body();
            } else {
                return;
            }
        }
    }

    fn expr_parser(&mut self) -> ExpressionParser<'_, '_> {
        ExpressionParser {
            builder: &mut self.builder,
            memory: self.memory,
        }
    }

    /// Translate the whole clause stream into the builder.
    fn translate(&mut self) -> Result<(), SyntaxError> {
        while let Some(mut clause) = self.clauses.next_clause()? {
            if matches!(
                clause.peek().map(|t| &t.kind),
                Some(TokenKind::DirectiveStart)
            ) {
                // Directives belong to the package loop; give the clause
                // back and stop this block.
                match &mut self.clauses {
                    ClauseStream::Lexer(lexer) => lexer.reclaim_clause(clause),
                    ClauseStream::List(list) => list.push_front(clause),
                }
                break;
            }
            self.parse_clause(&mut clause)?;
        }
        self.check_open_blocks()?;
        Ok(())
    }

    /// Verify every DO/SELECT/IF found its END or body at end of source.
    fn check_open_blocks(&self) -> Result<(), SyntaxError> {
        for entry in self.control.iter().rev() {
            match entry {
                Control::Do { line, .. } => {
                    return Err(SyntaxError::with(
                        error_codes::INCOMPLETE_DO,
                        vec![line.to_string()],
                    )
                    .at_line(*line));
                }
                Control::Select { line, .. } => {
                    return Err(SyntaxError::with(
                        error_codes::INCOMPLETE_SELECT,
                        vec![line.to_string()],
                    )
                    .at_line(*line));
                }
                Control::If { state, if_id } | Control::When { state, when_id: if_id } => {
                    let line = self.builder.instruction(*if_id).line;
                    match state {
                        IfState::WantThen => {
                            return Err(SyntaxError::new(error_codes::THEN_EXPECTED_AFTER)
                                .at_line(line));
                        }
                        IfState::WantThenBody => {
                            return Err(
                                SyntaxError::new(error_codes::INCOMPLETE_THEN).at_line(line)
                            );
                        }
                        IfState::WantElseBody { .. } => {
                            return Err(
                                SyntaxError::new(error_codes::INCOMPLETE_ELSE).at_line(line)
                            );
                        }
                        IfState::HaveThen { .. } => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Parse one clause into instructions.
    fn parse_clause(&mut self, clause: &mut Clause) -> Result<(), SyntaxError> {
        clause.skip_blank();
        if clause.at_end() {
            return Ok(());
        }
        let line = clause.current_line();

        // An IF whose THEN body arrived without a THEN yet: the clause must
        // begin with THEN.
        if let Some(Control::If {
            state: state @ IfState::WantThen,
            ..
        }
        | Control::When {
            state: state @ IfState::WantThen,
            ..
        }) = self.control.last_mut()
        {
            if clause.accept_symbol("THEN") {
                *state = IfState::WantThenBody;
                clause.skip_blank();
                if clause.at_end() {
                    return Ok(());
                }
                return self.parse_clause(clause);
            }
            return Err(SyntaxError::new(error_codes::THEN_EXPECTED_AFTER).at_line(line));
        }

        // ELSE binds to the pending IF before anything else is considered.
        let mark = clause.mark();
        if clause.accept_symbol("ELSE") {
            return self.parse_else(clause, line);
        }
        clause.reset(mark);

        // Any other clause settles a pending ELSE-less IF.
        self.settle_pending_if();

        // Label clause: symbol directly followed by a colon.
        if let (Some(TokenKind::Symbol(name)), Some(TokenKind::Colon)) = (
            clause.peek().map(|t| t.kind.clone()),
            clause.peek_at(1).map(|t| t.kind.clone()),
        ) {
            clause.take();
            clause.take();
            let id = self.builder.add_instruction(
                Keyword::Label { name: name.clone() },
                line,
            );
            self.builder.add_label(&name, id);
            self.attach(id);
            self.finish_body();
            clause.skip_blank();
            if clause.at_end() {
                return Ok(());
            }
            return self.parse_clause(clause);
        }

        let completion = self.parse_instruction(clause, line)?;
        if completion == Completion::Complete {
            self.finish_body();
        }
        Ok(())
    }

    fn parse_else(&mut self, clause: &mut Clause, line: usize) -> Result<(), SyntaxError> {
        let Some(Control::If { if_id, state }) = self.control.last_mut() else {
            return Err(SyntaxError::new(error_codes::UNEXPECTED_ELSE).at_line(line));
        };
        let IfState::HaveThen { then_exits } = std::mem::replace(state, IfState::WantThen) else {
            return Err(SyntaxError::new(error_codes::UNEXPECTED_ELSE).at_line(line));
        };
        let if_id = *if_id;
        *state = IfState::WantElseBody { then_exits };
        self.pending.push(PendingLink::ElseOf(if_id));

        clause.skip_blank();
        if clause.at_end() {
            return Ok(());
        }
        self.parse_clause(clause)
    }

    /// Parse the instruction starting at the cursor.
    fn parse_instruction(
        &mut self,
        clause: &mut Clause,
        line: usize,
    ) -> Result<Completion, SyntaxError> {
        let mark = clause.mark();
        let keyword = match clause.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Symbol(s)) => {
                clause.take();
                Some(s)
            }
            _ => None,
        };

        if let Some(word) = keyword {
            match word.as_ref() {
                "NOP" => return self.simple(clause, Keyword::Nop, line),
                "SAY" => {
                    let expr = self
                        .expr_parser()
                        .parse_expression(clause, &Terminators::clause_end())?;
                    return self.simple(clause, Keyword::Say { expr }, line);
                }
                "IF" => return self.parse_if(clause, line),
                "SELECT" => return self.parse_select(clause, line),
                "WHEN" => return self.parse_when(clause, line),
                "OTHERWISE" => return self.parse_otherwise(clause, line),
                "DO" => return self.parse_do(clause, line, false),
                "LOOP" => return self.parse_do(clause, line, true),
                "END" => return self.parse_end(clause, line),
                "EXIT" => {
                    let expr = self
                        .expr_parser()
                        .parse_expression(clause, &Terminators::clause_end())?;
                    return self.simple(clause, Keyword::Exit { expr }, line);
                }
                "RETURN" => {
                    let expr = self
                        .expr_parser()
                        .parse_expression(clause, &Terminators::clause_end())?;
                    return self.simple(clause, Keyword::Return { expr }, line);
                }
                "CALL" => return self.parse_call(clause, line),
                "SIGNAL" => return self.parse_signal(clause, line),
                "DROP" => return self.parse_drop(clause, line),
                "LEAVE" => {
                    let name = self.optional_symbol(clause);
                    return self.simple(clause, Keyword::Leave { name }, line);
                }
                "ITERATE" => {
                    let name = self.optional_symbol(clause);
                    return self.simple(clause, Keyword::Iterate { name }, line);
                }
                "NUMERIC" => return self.parse_numeric(clause, line),
                "GUARD" => return self.parse_guard(clause, line),
                "INTERPRET" => {
                    let expr = self
                        .expr_parser()
                        .parse_required(clause, &Terminators::clause_end())?;
                    return self.simple(clause, Keyword::Interpret { expr }, line);
                }
                _ => {}
            }
        }

        // Not an instruction keyword: reclaim the clause for assignment or
        // expression interpretation.
        clause.reset(mark);
        self.parse_assignment_or_expression(clause, line)
    }

    /// Add a simple (non-block) instruction and absorb the clause end.
    fn simple(
        &mut self,
        clause: &mut Clause,
        keyword: Keyword,
        line: usize,
    ) -> Result<Completion, SyntaxError> {
        clause.skip_blank();
        if !clause.at_end() {
            return Err(SyntaxError::new(error_codes::CLAUSE_END_DATA)
                .at_line(clause.current_line()));
        }
        let id = self.builder.add_instruction(keyword, line);
        self.attach(id);
        Ok(Completion::Complete)
    }

    fn optional_symbol(&mut self, clause: &mut Clause) -> Option<Box<str>> {
        clause.skip_blank();
        match clause.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Symbol(s)) => {
                clause.take();
                Some(s)
            }
            _ => None,
        }
    }

    fn parse_if(&mut self, clause: &mut Clause, line: usize) -> Result<Completion, SyntaxError> {
        let condition = self
            .expr_parser()
            .parse_required(clause, &Terminators::keywords(&["THEN"]))?;
        let if_id = self.builder.add_instruction(
            Keyword::If {
                condition,
                then_target: InstrId(0),
                else_target: None,
            },
            line,
        );
        self.attach(if_id);
        // The attach left Next(if_id) pending; the IF's next is its join,
        // resolved when the construct completes.
        self.pending.clear();
        self.pending.push(PendingLink::ThenOf(if_id));

        clause.skip_blank();
        let state = if clause.accept_symbol("THEN") {
            IfState::WantThenBody
        } else if clause.at_end() {
            IfState::WantThen
        } else {
            return Err(SyntaxError::new(error_codes::THEN_EXPECTED_AFTER).at_line(line));
        };
        self.control.push(Control::If { if_id, state });

        clause.skip_blank();
        if clause.at_end() {
            return Ok(Completion::Open);
        }
        self.parse_clause(clause)?;
        Ok(Completion::Open)
    }

    fn parse_select(&mut self, clause: &mut Clause, line: usize) -> Result<Completion, SyntaxError> {
        clause.skip_blank();
        if !clause.at_end() {
            return Err(SyntaxError::new(error_codes::CLAUSE_END_DATA)
                .at_line(clause.current_line()));
        }
        let select_id = self.builder.add_instruction(
            Keyword::Select {
                end_target: InstrId(0),
                has_otherwise: false,
            },
            line,
        );
        self.attach(select_id);
        // Control flows into the first WHEN through the SELECT's next.
        self.control.push(Control::Select {
            select_id,
            line,
            seen_when: false,
            in_otherwise: false,
            unresolved_false: None,
            exits: Vec::new(),
        });
        Ok(Completion::Open)
    }

    fn parse_when(&mut self, clause: &mut Clause, line: usize) -> Result<Completion, SyntaxError> {
        match self.control.last() {
            Some(Control::Select { in_otherwise, .. }) if !in_otherwise => {}
            _ => {
                return Err(
                    SyntaxError::new(error_codes::UNEXPECTED_WHEN_NO_SELECT).at_line(line)
                );
            }
        }

        let condition = self
            .expr_parser()
            .parse_required(clause, &Terminators::keywords(&["THEN"]))?;
        let when_id = self.builder.add_instruction(
            Keyword::When {
                condition,
                then_target: InstrId(0),
                on_false: InstrId(0),
            },
            line,
        );
        self.attach(when_id);
        self.pending.clear();
        self.pending.push(PendingLink::ThenOf(when_id));

        // Resolve the previous WHEN's false branch to this one.
        if let Some(Control::Select {
            seen_when,
            unresolved_false,
            ..
        }) = self.control.last_mut()
        {
            *seen_when = true;
            if let Some(previous) = unresolved_false.take() {
                if let Keyword::When { on_false, .. } =
                    &mut self.builder.instruction_mut(previous).keyword
                {
                    *on_false = when_id;
                }
            }
        }

        clause.skip_blank();
        let state = if clause.accept_symbol("THEN") {
            IfState::WantThenBody
        } else if clause.at_end() {
            IfState::WantThen
        } else {
            return Err(SyntaxError::new(error_codes::THEN_EXPECTED_AFTER).at_line(line));
        };
        self.control.push(Control::When { when_id, state });

        clause.skip_blank();
        if clause.at_end() {
            return Ok(Completion::Open);
        }
        self.parse_clause(clause)?;
        Ok(Completion::Open)
    }

    fn parse_otherwise(
        &mut self,
        clause: &mut Clause,
        line: usize,
    ) -> Result<Completion, SyntaxError> {
        match self.control.last() {
            Some(Control::Select {
                seen_when: true,
                in_otherwise: false,
                ..
            }) => {}
            Some(Control::Select { seen_when: false, .. }) => {
                return Err(SyntaxError::new(error_codes::WHEN_EXPECTED_FIRST).at_line(line));
            }
            _ => {
                return Err(
                    SyntaxError::new(error_codes::UNEXPECTED_OTHERWISE).at_line(line)
                );
            }
        }

        let otherwise_id = self.builder.add_instruction(Keyword::Otherwise, line);
        // The previous WHEN falls through to the OTHERWISE.
        let mut select_instr = None;
        if let Some(Control::Select {
            select_id,
            in_otherwise,
            unresolved_false,
            ..
        }) = self.control.last_mut()
        {
            *in_otherwise = true;
            select_instr = Some(*select_id);
            if let Some(previous) = unresolved_false.take() {
                if let Keyword::When { on_false, .. } =
                    &mut self.builder.instruction_mut(previous).keyword
                {
                    *on_false = otherwise_id;
                }
            }
        }
        if let Some(select_id) = select_instr {
            if let Keyword::Select { has_otherwise, .. } =
                &mut self.builder.instruction_mut(select_id).keyword
            {
                *has_otherwise = true;
            }
        }
        self.pending.clear();
        self.pending.push(PendingLink::Next(otherwise_id));

        clause.skip_blank();
        if clause.at_end() {
            return Ok(Completion::Open);
        }
        self.parse_clause(clause)?;
        Ok(Completion::Open)
    }

    fn parse_do(
        &mut self,
        clause: &mut Clause,
        line: usize,
        loop_keyword: bool,
    ) -> Result<Completion, SyntaxError> {
        let mut spec = DoSpec::default();
        let mut control_name: Option<Box<str>> = None;
        let mut repetitive = loop_keyword;

        clause.skip_blank();
        let repetitor_keywords: &[&str] = &["TO", "BY", "FOR", "WHILE", "UNTIL"];

        // Controlled repetitor: symbol '=' expression.
        let mark = clause.mark();
        if let Some(TokenKind::Symbol(name)) = clause.peek().map(|t| t.kind.clone()) {
            if is_variable_symbol(&name) {
                clause.take();
                clause.skip_blank();
                if matches!(
                    clause.peek().map(|t| &t.kind),
                    Some(TokenKind::Operator(OperatorKind::Equal))
                ) {
                    clause.take();
                    let variable = self.builder.add_variable(&name);
                    let start = self
                        .expr_parser()
                        .parse_required(clause, &Terminators::keywords(repetitor_keywords))?;
                    let mut control = ControlSpec {
                        variable,
                        start,
                        to: None,
                        by: None,
                        for_count: None,
                    };
                    loop {
                        clause.skip_blank();
                        if clause.accept_symbol("TO") {
                            control.to = Some(self.expr_parser().parse_required(
                                clause,
                                &Terminators::keywords(repetitor_keywords),
                            )?);
                        } else if clause.accept_symbol("BY") {
                            control.by = Some(self.expr_parser().parse_required(
                                clause,
                                &Terminators::keywords(repetitor_keywords),
                            )?);
                        } else if clause.accept_symbol("FOR") {
                            control.for_count = Some(self.expr_parser().parse_required(
                                clause,
                                &Terminators::keywords(repetitor_keywords),
                            )?);
                        } else {
                            break;
                        }
                    }
                    control_name = Some(name);
                    spec.control = Some(control);
                    repetitive = true;
                } else {
                    clause.reset(mark);
                }
            }
        }

        if spec.control.is_none() {
            clause.skip_blank();
            if clause.accept_symbol("FOREVER") {
                repetitive = true;
            } else if !clause.at_end()
                && !matches!(
                    clause.peek().map(|t| &t.kind),
                    Some(TokenKind::Symbol(s)) if s.as_ref() == "WHILE" || s.as_ref() == "UNTIL"
                )
            {
                // A bare expression repetitor: iterate that many times.
                let count = self
                    .expr_parser()
                    .parse_expression(clause, &Terminators::keywords(&["WHILE", "UNTIL"]))?;
                if let Some(count) = count {
                    spec.count = Some(count);
                    repetitive = true;
                }
            }
        }

        clause.skip_blank();
        if clause.accept_symbol("WHILE") {
            spec.while_cond = Some(
                self.expr_parser()
                    .parse_required(clause, &Terminators::clause_end())?,
            );
            repetitive = true;
        } else if clause.accept_symbol("UNTIL") {
            spec.until_cond = Some(
                self.expr_parser()
                    .parse_required(clause, &Terminators::clause_end())?,
            );
            repetitive = true;
        }

        clause.skip_blank();
        if !clause.at_end() {
            return Err(SyntaxError::new(error_codes::CLAUSE_END_DATA)
                .at_line(clause.current_line()));
        }

        let do_id = self.builder.add_instruction(
            Keyword::Do {
                spec,
                repetitive,
                end_target: InstrId(0),
            },
            line,
        );
        self.attach(do_id);
        self.control.push(Control::Do {
            do_id,
            line,
            control_name,
        });
        Ok(Completion::Open)
    }

    fn parse_end(&mut self, clause: &mut Clause, line: usize) -> Result<Completion, SyntaxError> {
        let end_name = self.optional_symbol(clause);
        clause.skip_blank();
        if !clause.at_end() {
            return Err(SyntaxError::new(error_codes::CLAUSE_END_DATA)
                .at_line(clause.current_line()));
        }

        match self.control.last() {
            Some(Control::If {
                state: IfState::WantThenBody | IfState::WantThen,
                ..
            })
            | Some(Control::When {
                state: IfState::WantThenBody | IfState::WantThen,
                ..
            }) => {
                return Err(SyntaxError::new(error_codes::END_AFTER_THEN).at_line(line));
            }
            _ => {}
        }

        match self.control.pop() {
            Some(Control::Do {
                do_id,
                control_name,
                ..
            }) => {
                // END name must match the loop's control variable.
                if let Some(end_name) = &end_name {
                    if control_name.as_deref() != Some(end_name.as_ref()) {
                        return Err(SyntaxError::with(
                            error_codes::END_MISMATCH_DO,
                            vec![end_name.to_string()],
                        )
                        .at_line(line));
                    }
                }
                let end_id = self
                    .builder
                    .add_instruction(Keyword::End { opener: do_id }, line);
                self.attach(end_id);
                if let Keyword::Do { end_target, .. } =
                    &mut self.builder.instruction_mut(do_id).keyword
                {
                    *end_target = end_id;
                }
                self.finish_body();
                Ok(Completion::Complete)
            }
            Some(Control::Select {
                select_id,
                unresolved_false,
                in_otherwise,
                seen_when,
                exits,
                line: select_line,
            }) => {
                if end_name.is_some() {
                    return Err(SyntaxError::new(error_codes::END_MISMATCH_SELECT).at_line(line));
                }
                if !seen_when && !in_otherwise {
                    return Err(
                        SyntaxError::new(error_codes::WHEN_EXPECTED_FIRST).at_line(select_line)
                    );
                }
                let end_id = self
                    .builder
                    .add_instruction(Keyword::End { opener: select_id }, line);
                self.attach(end_id);
                if let Some(previous) = unresolved_false {
                    if let Keyword::When { on_false, .. } =
                        &mut self.builder.instruction_mut(previous).keyword
                    {
                        *on_false = end_id;
                    }
                }
                if let Keyword::Select { end_target, .. } =
                    &mut self.builder.instruction_mut(select_id).keyword
                {
                    *end_target = end_id;
                }
                self.pending.extend(exits);
                self.finish_body();
                Ok(Completion::Complete)
            }
            Some(other) => {
                self.control.push(other);
                Err(SyntaxError::new(error_codes::UNEXPECTED_END_NO_BLOCK).at_line(line))
            }
            None => Err(SyntaxError::new(error_codes::UNEXPECTED_END_NO_BLOCK).at_line(line)),
        }
    }

    fn parse_call(&mut self, clause: &mut Clause, line: usize) -> Result<Completion, SyntaxError> {
        clause.skip_blank();

        // CALL ON / CALL OFF trap management.
        if clause.accept_symbol("ON") {
            return self.parse_trap(clause, line, true, true);
        }
        if clause.accept_symbol("OFF") {
            return self.parse_trap(clause, line, true, false);
        }

        let name = match clause.take().map(|t| t.kind.clone()) {
            Some(TokenKind::Symbol(s)) => s,
            Some(TokenKind::Literal(s)) => s.to_ascii_uppercase().into(),
            _ => {
                return Err(
                    SyntaxError::new(error_codes::STRING_OR_SYMBOL_EXPECTED).at_line(line)
                );
            }
        };

        // Arguments: comma-separated expressions to the end of the clause.
        let mut args: Vec<Option<ExprId>> = Vec::new();
        clause.skip_blank();
        while !clause.at_end() {
            let arg = self.expr_parser().parse_expression(
                clause,
                &Terminators {
                    keywords: &[],
                    comma: true,
                    paren: false,
                    bracket: false,
                },
            )?;
            args.push(arg);
            clause.skip_blank();
            if matches!(clause.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                clause.take();
            } else {
                break;
            }
        }
        while matches!(args.last(), Some(None)) {
            args.pop();
        }

        self.simple(
            clause,
            Keyword::Call {
                name,
                args,
                target: CallTarget::Unresolved,
            },
            line,
        )
    }

    fn parse_signal(&mut self, clause: &mut Clause, line: usize) -> Result<Completion, SyntaxError> {
        clause.skip_blank();
        if clause.accept_symbol("ON") {
            return self.parse_trap(clause, line, false, true);
        }
        if clause.accept_symbol("OFF") {
            return self.parse_trap(clause, line, false, false);
        }

        let name = match clause.take().map(|t| t.kind.clone()) {
            Some(TokenKind::Symbol(s)) => s,
            Some(TokenKind::Literal(s)) => s.to_ascii_uppercase().into(),
            _ => {
                return Err(
                    SyntaxError::new(error_codes::STRING_OR_SYMBOL_EXPECTED).at_line(line)
                );
            }
        };
        self.simple(clause, Keyword::Signal { name, target: None }, line)
    }

    /// Shared tail of CALL ON/OFF and SIGNAL ON/OFF.
    fn parse_trap(
        &mut self,
        clause: &mut Clause,
        line: usize,
        call: bool,
        on: bool,
    ) -> Result<Completion, SyntaxError> {
        clause.skip_blank();
        let Some(TokenKind::Symbol(condition)) = clause.take().map(|t| t.kind.clone()) else {
            return Err(SyntaxError::with(
                error_codes::SYMBOL_EXPECTED,
                vec![if on { "ON" } else { "OFF" }.to_string()],
            )
            .at_line(line));
        };

        let mut label = condition.clone();
        if on {
            clause.skip_blank();
            if clause.accept_symbol("NAME") {
                clause.skip_blank();
                label = match clause.take().map(|t| t.kind.clone()) {
                    Some(TokenKind::Symbol(s)) => s,
                    Some(TokenKind::Literal(s)) => s.to_ascii_uppercase().into(),
                    _ => {
                        return Err(SyntaxError::with(
                            error_codes::SYMBOL_EXPECTED,
                            vec!["NAME".to_string()],
                        )
                        .at_line(line));
                    }
                };
            }
        }

        let keyword = if call {
            Keyword::CallOn {
                condition,
                label,
                on,
            }
        } else {
            Keyword::SignalOn {
                condition,
                label,
                on,
            }
        };
        self.simple(clause, keyword, line)
    }

    fn parse_drop(&mut self, clause: &mut Clause, line: usize) -> Result<Completion, SyntaxError> {
        let mut targets = Vec::new();
        loop {
            clause.skip_blank();
            match clause.peek().map(|t| t.kind.clone()) {
                Some(TokenKind::Symbol(s)) if is_variable_symbol(&s) => {
                    clause.take();
                    targets.push(self.builder.add_variable(&s));
                }
                None => break,
                _ => {
                    return Err(
                        SyntaxError::new(error_codes::VARIABLE_EXPECTED).at_line(line)
                    );
                }
            }
        }
        if targets.is_empty() {
            return Err(SyntaxError::new(error_codes::VARIABLE_EXPECTED).at_line(line));
        }
        self.simple(clause, Keyword::Drop { targets }, line)
    }

    fn parse_numeric(&mut self, clause: &mut Clause, line: usize) -> Result<Completion, SyntaxError> {
        clause.skip_blank();
        if clause.accept_symbol("DIGITS") {
            let expr = self
                .expr_parser()
                .parse_expression(clause, &Terminators::clause_end())?;
            return self.simple(
                clause,
                Keyword::Numeric {
                    setting: NumericSetting::Digits(expr),
                },
                line,
            );
        }
        if clause.accept_symbol("FUZZ") {
            let expr = self
                .expr_parser()
                .parse_expression(clause, &Terminators::clause_end())?;
            return self.simple(
                clause,
                Keyword::Numeric {
                    setting: NumericSetting::Fuzz(expr),
                },
                line,
            );
        }
        if clause.accept_symbol("FORM") {
            clause.skip_blank();
            let scientific = if clause.accept_symbol("ENGINEERING") {
                false
            } else {
                clause.accept_symbol("SCIENTIFIC");
                true
            };
            return self.simple(
                clause,
                Keyword::Numeric {
                    setting: NumericSetting::Form(scientific),
                },
                line,
            );
        }
        Err(SyntaxError::with(
            error_codes::INVALID_SUBKEYWORD,
            vec![clause
                .peek()
                .map_or_else(String::new, |t| format!("{:?}", t.kind))],
        )
        .at_line(line))
    }

    fn parse_guard(&mut self, clause: &mut Clause, line: usize) -> Result<Completion, SyntaxError> {
        clause.skip_blank();
        let on = if clause.accept_symbol("ON") {
            true
        } else if clause.accept_symbol("OFF") {
            false
        } else {
            return Err(SyntaxError::with(
                error_codes::INVALID_SUBKEYWORD,
                vec!["GUARD".to_string()],
            )
            .at_line(line));
        };
        clause.skip_blank();
        let when = if clause.accept_symbol("WHEN") {
            Some(
                self.expr_parser()
                    .parse_required(clause, &Terminators::clause_end())?,
            )
        } else {
            None
        };
        self.simple(clause, Keyword::Guard { on, when }, line)
    }

    /// An unrecognised clause: assignment, message send, or command.
    fn parse_assignment_or_expression(
        &mut self,
        clause: &mut Clause,
        line: usize,
    ) -> Result<Completion, SyntaxError> {
        // Assignment: variable symbol, '=', expression.
        let mark = clause.mark();
        if let Some(TokenKind::Symbol(name)) = clause.peek().map(|t| t.kind.clone()) {
            if is_variable_symbol(&name) {
                clause.take();
                clause.skip_blank();
                if matches!(
                    clause.peek().map(|t| &t.kind),
                    Some(TokenKind::Operator(OperatorKind::Equal))
                ) {
                    clause.take();
                    let target = self.builder.add_variable(&name);
                    let expr = self
                        .expr_parser()
                        .parse_required(clause, &Terminators::clause_end())?;
                    return self.simple(clause, Keyword::Assignment { target, expr }, line);
                }
            }
        }
        clause.reset(mark);

        let expr = self
            .expr_parser()
            .parse_required(clause, &Terminators::clause_end())?;
        let keyword = if matches!(self.builder.expr_at(expr), Expr::Message { .. }) {
            Keyword::MessageSend { expr }
        } else {
            Keyword::Command { expr }
        };
        self.simple(clause, keyword, line)
    }
}

/// Resolve recorded calls against the completed label map.
fn resolve_deferred_calls(builder: &mut CodeBuilder) {
    let count = builder.instruction_count();
    for index in 0..count {
        let id = InstrId(index as u32);
        let label = match &builder.instruction(id).keyword {
            Keyword::Call {
                name,
                target: CallTarget::Unresolved,
                ..
            } => builder.find_label(name),
            Keyword::Signal { name, target: None } => builder.find_label(name),
            _ => continue,
        };
        let Some(label) = label else { continue };
        match &mut builder.instruction_mut(id).keyword {
            Keyword::Call { target, .. } => *target = CallTarget::Label(label),
            Keyword::Signal { target, .. } => *target = Some(label),
            _ => {}
        }
    }
    builder.resolve_function_labels();
}

/// Translate one code block from a clause stream.
fn translate_block(
    memory: &mut Memory,
    name: &str,
    clauses: ClauseStream<'_, '_>,
    source_lines: Vec<Box<str>>,
    interpret: bool,
) -> Result<RexxCode, SyntaxError> {
    let mut parser = BlockParser {
        memory,
        builder: CodeBuilder::new(name, interpret, source_lines),
        control: Vec::new(),
        pending: Vec::new(),
        clauses,
    };
    parser.translate()?;
    parser.settle_pending_if();
    let mut builder = parser.builder;
    resolve_deferred_calls(&mut builder);
    Ok(builder.finish())
}

/// Translate a standalone code block (method or routine source restored
/// from an envelope or image).
///
/// # Errors
///
/// Directives are rejected; translation errors propagate.
pub fn translate_code(
    memory: &mut Memory,
    name: &str,
    text: &str,
) -> Result<Arc<RexxCode>, SyntaxError> {
    let source = ProgramSource::from_buffer(name, text);
    let mut lexer = Lexer::new(&source);
    let lines: Vec<Box<str>> = source.lines().to_vec();
    let code = translate_block(memory, name, ClauseStream::Lexer(&mut lexer), lines, false)?;
    if lexer.next_clause()?.is_some() {
        return Err(SyntaxError::new(error_codes::TRANSLATION_DIRECTIVE));
    }
    Ok(Arc::new(code))
}

/// Translate INTERPRET source in dynamic-lookup mode.
///
/// # Errors
///
/// Directives are rejected; translation errors propagate.
pub fn translate_interpret(memory: &mut Memory, text: &str) -> Result<Arc<RexxCode>, SyntaxError> {
    let source = ProgramSource::from_buffer("INTERPRET", text);
    let mut lexer = Lexer::new(&source);
    let lines: Vec<Box<str>> = source.lines().to_vec();
    let code = translate_block(
        memory,
        "INTERPRET",
        ClauseStream::Lexer(&mut lexer),
        lines,
        true,
    )?;
    // Anything left over is a directive, which INTERPRET forbids.
    if lexer.next_clause()?.is_some() {
        return Err(SyntaxError::new(error_codes::INTERPRET_DIRECTIVE));
    }
    Ok(Arc::new(code))
}

/// A class directive being assembled.
struct ClassDirective {
    name: Box<str>,
    metaclass: Option<Box<str>>,
    mixin: bool,
    subclass: Option<Box<str>>,
    inherits: Vec<Box<str>>,
    methods: Vec<(Box<str>, ObjRef)>,
}

/// Translate a complete program into a package.
///
/// # Errors
///
/// Translation errors propagate with their source line attached.
pub fn translate_program(
    memory: &mut Memory,
    source: &ProgramSource,
) -> Result<Arc<Package>, SyntaxError> {
    let mut lexer = Lexer::new(source);
    let lines: Vec<Box<str>> = source.lines().to_vec();

    let main = translate_block(
        memory,
        source.name(),
        ClauseStream::Lexer(&mut lexer),
        lines.clone(),
        false,
    )?;

    let mut package = Package {
        name: source.name().into(),
        main: Arc::new(main),
        routines: std::collections::BTreeMap::new(),
        public_routines: std::collections::BTreeMap::new(),
        classes: Vec::new(),
        requires: Vec::new(),
        libraries: Vec::new(),
        resources: std::collections::BTreeMap::new(),
        options: Vec::new(),
    };
    let mut class_directives: Vec<ClassDirective> = Vec::new();

    while let Some(mut clause) = lexer.next_clause()? {
        let line = clause.line;
        if !matches!(
            clause.peek().map(|t| &t.kind),
            Some(TokenKind::DirectiveStart)
        ) {
            return Err(
                SyntaxError::new(error_codes::TRANSLATION_DIRECTIVE).at_line(line)
            );
        }
        clause.take();
        clause.skip_blank();
        let Some(TokenKind::Symbol(directive)) = clause.take().map(|t| t.kind.clone()) else {
            return Err(SyntaxError::new(error_codes::STRING_OR_SYMBOL_EXPECTED).at_line(line));
        };

        match directive.as_ref() {
            "ROUTINE" => {
                let (name, public) = parse_directive_name(&mut clause, line, &["PUBLIC"])?;
                let body = collect_body(&mut lexer)?;
                let code = translate_block(
                    memory,
                    &name,
                    ClauseStream::List(body),
                    lines.clone(),
                    false,
                )?;
                let routine = memory
                    .allocate(ObjectData::Routine(RoutineData {
                        name: name.clone(),
                        code: Arc::new(code),
                    }))
                    .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?;
                package.routines.insert(name.clone(), routine);
                if public {
                    package.public_routines.insert(name, routine);
                }
            }
            "CLASS" => {
                let directive = parse_class_directive(&mut clause, line)?;
                class_directives.push(directive);
            }
            "METHOD" => {
                let method = parse_method_directive(memory, &mut clause, &mut lexer, line, &lines)?;
                let Some(class) = class_directives.last_mut() else {
                    return Err(SyntaxError::with(
                        error_codes::INVALID_SUBKEYWORD,
                        vec!["METHOD".to_string()],
                    )
                    .at_line(line));
                };
                class.methods.push(method);
            }
            "ATTRIBUTE" => {
                let (name, _) = parse_directive_name(&mut clause, line, &["GET", "SET"])?;
                let Some(class) = class_directives.last_mut() else {
                    return Err(SyntaxError::with(
                        error_codes::INVALID_SUBKEYWORD,
                        vec!["ATTRIBUTE".to_string()],
                    )
                    .at_line(line));
                };
                let getter = memory
                    .allocate(ObjectData::Method(MethodData {
                        name: name.clone(),
                        code: ExecutableCode::AttributeGet(name.clone()),
                        guarded: true,
                        protected: false,
                        private: false,
                        scope: class.name.clone(),
                    }))
                    .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?;
                class.methods.push((name.clone(), getter));
                let setter_name: Box<str> = format!("{name}=").into();
                let setter = memory
                    .allocate(ObjectData::Method(MethodData {
                        name: setter_name.clone(),
                        code: ExecutableCode::AttributeSet(name.clone()),
                        guarded: true,
                        protected: false,
                        private: false,
                        scope: class.name.clone(),
                    }))
                    .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?;
                class.methods.push((setter_name, setter));
            }
            "CONSTANT" => {
                let (name, value) = parse_constant_directive(memory, &mut clause, line)?;
                let Some(class) = class_directives.last_mut() else {
                    return Err(SyntaxError::with(
                        error_codes::INVALID_SUBKEYWORD,
                        vec!["CONSTANT".to_string()],
                    )
                    .at_line(line));
                };
                class.methods.push((name, value));
            }
            "REQUIRES" => {
                let (name, _) = parse_directive_name(&mut clause, line, &[])?;
                package.requires.push(name);
            }
            "LIBRARY" => {
                let (name, _) = parse_directive_name(&mut clause, line, &[])?;
                package.libraries.push(name);
            }
            "OPTIONS" => {
                while let Some(TokenKind::Symbol(word)) = {
                    clause.skip_blank();
                    clause.peek().map(|t| t.kind.clone())
                } {
                    clause.take();
                    package.options.push(word);
                }
            }
            "RESOURCE" => {
                let (name, _) = parse_directive_name(&mut clause, line, &[])?;
                // Resource bodies are raw source lines up to ::END.
                let body = lexer_take_resource(&mut lexer, source)?;
                package.resources.insert(name, body);
            }
            _ => {
                return Err(SyntaxError::with(
                    error_codes::INVALID_SUBKEYWORD,
                    vec![directive.to_string()],
                )
                .at_line(line));
            }
        }
    }

    install_classes(memory, &mut package, class_directives)?;

    debug!(
        "translated package {}: {} routines, {} classes",
        package.name,
        package.routines.len(),
        package.classes.len()
    );
    Ok(Arc::new(package))
}

/// Parse `name [flags...]` from a directive clause.
fn parse_directive_name(
    clause: &mut Clause,
    line: usize,
    flags: &[&str],
) -> Result<(Box<str>, bool), SyntaxError> {
    clause.skip_blank();
    let name = match clause.take().map(|t| t.kind.clone()) {
        Some(TokenKind::Symbol(s)) => s,
        Some(TokenKind::Literal(s)) => s.to_ascii_uppercase().into(),
        _ => {
            return Err(SyntaxError::new(error_codes::STRING_OR_SYMBOL_EXPECTED).at_line(line));
        }
    };
    let mut flagged = false;
    loop {
        clause.skip_blank();
        match clause.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Symbol(word)) if flags.iter().any(|f| *f == word.as_ref()) => {
                clause.take();
                flagged = true;
            }
            Some(TokenKind::Symbol(_)) => {
                // Unknown trailing words are tolerated here; the directive
                // parsers that care consume them first.
                clause.take();
            }
            _ => break,
        }
    }
    Ok((name, flagged))
}

fn parse_class_directive(clause: &mut Clause, line: usize) -> Result<ClassDirective, SyntaxError> {
    clause.skip_blank();
    let name = match clause.take().map(|t| t.kind.clone()) {
        Some(TokenKind::Symbol(s)) => s,
        Some(TokenKind::Literal(s)) => s.to_ascii_uppercase().into(),
        _ => {
            return Err(SyntaxError::new(error_codes::STRING_OR_SYMBOL_EXPECTED).at_line(line));
        }
    };

    let mut directive = ClassDirective {
        name,
        metaclass: None,
        mixin: false,
        subclass: None,
        inherits: Vec::new(),
        methods: Vec::new(),
    };

    loop {
        clause.skip_blank();
        let Some(TokenKind::Symbol(word)) = clause.peek().map(|t| t.kind.clone()) else {
            break;
        };
        clause.take();
        match word.as_ref() {
            "PUBLIC" | "PRIVATE" => {}
            "MIXINCLASS" => {
                clause.skip_blank();
                if let Some(TokenKind::Symbol(parent)) = clause.take().map(|t| t.kind.clone()) {
                    directive.mixin = true;
                    directive.subclass = Some(parent);
                }
            }
            "SUBCLASS" => {
                clause.skip_blank();
                if let Some(TokenKind::Symbol(parent)) = clause.take().map(|t| t.kind.clone()) {
                    directive.subclass = Some(parent);
                }
            }
            "METACLASS" => {
                clause.skip_blank();
                if let Some(TokenKind::Symbol(meta)) = clause.take().map(|t| t.kind.clone()) {
                    directive.metaclass = Some(meta);
                }
            }
            "INHERIT" => {
                loop {
                    clause.skip_blank();
                    match clause.peek().map(|t| t.kind.clone()) {
                        Some(TokenKind::Symbol(parent)) => {
                            clause.take();
                            directive.inherits.push(parent);
                        }
                        _ => break,
                    }
                }
            }
            _ => {
                return Err(SyntaxError::with(
                    error_codes::INVALID_SUBKEYWORD,
                    vec![word.to_string()],
                )
                .at_line(line));
            }
        }
    }
    Ok(directive)
}

fn parse_method_directive(
    memory: &mut Memory,
    clause: &mut Clause,
    lexer: &mut Lexer<'_>,
    line: usize,
    lines: &[Box<str>],
) -> Result<(Box<str>, ObjRef), SyntaxError> {
    clause.skip_blank();
    let name = match clause.take().map(|t| t.kind.clone()) {
        Some(TokenKind::Symbol(s)) => s,
        Some(TokenKind::Literal(s)) => s.to_ascii_uppercase().into(),
        _ => {
            return Err(SyntaxError::new(error_codes::STRING_OR_SYMBOL_EXPECTED).at_line(line));
        }
    };

    let mut guarded = true;
    let mut protected = false;
    let mut private = false;
    loop {
        clause.skip_blank();
        let Some(TokenKind::Symbol(word)) = clause.peek().map(|t| t.kind.clone()) else {
            break;
        };
        clause.take();
        match word.as_ref() {
            "GUARDED" => guarded = true,
            "UNGUARDED" => guarded = false,
            "PROTECTED" => protected = true,
            "UNPROTECTED" => protected = false,
            "PRIVATE" => private = true,
            "PUBLIC" => private = false,
            "CLASS" | "ABSTRACT" => {}
            _ => {
                return Err(SyntaxError::with(
                    error_codes::INVALID_SUBKEYWORD,
                    vec![word.to_string()],
                )
                .at_line(line));
            }
        }
    }

    let body = collect_body(lexer)?;
    let code = translate_block(
        memory,
        &name,
        ClauseStream::List(body),
        lines.to_vec(),
        false,
    )?;
    let method = memory
        .allocate(ObjectData::Method(MethodData {
            name: name.clone(),
            code: ExecutableCode::Rexx(Arc::new(code)),
            guarded,
            protected,
            private,
            scope: Box::from(""),
        }))
        .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?;
    Ok((name, method))
}

fn parse_constant_directive(
    memory: &mut Memory,
    clause: &mut Clause,
    line: usize,
) -> Result<(Box<str>, ObjRef), SyntaxError> {
    clause.skip_blank();
    let name = match clause.take().map(|t| t.kind.clone()) {
        Some(TokenKind::Symbol(s)) => s,
        _ => {
            return Err(SyntaxError::new(error_codes::STRING_OR_SYMBOL_EXPECTED).at_line(line));
        }
    };
    clause.skip_blank();
    let value = match clause.take().map(|t| t.kind.clone()) {
        Some(TokenKind::Literal(text)) => memory
            .global_name(&text)
            .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?,
        Some(TokenKind::Symbol(text)) => {
            match crate::execution::number::RexxNumber::parse(&text) {
                Ok(number) => memory
                    .new_number(number)
                    .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?,
                Err(_) => memory
                    .global_name(&text)
                    .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?,
            }
        }
        _ => {
            return Err(SyntaxError::new(error_codes::STRING_OR_SYMBOL_EXPECTED).at_line(line));
        }
    };

    // A constant is a tiny generated method returning the value.
    let mut builder = CodeBuilder::new(&name, false, Vec::new());
    let index = builder.add_literal(value);
    let expr = builder.add_expr(Expr::Literal(index));
    builder.add_instruction(Keyword::Return { expr: Some(expr) }, line);
    let code = builder.finish();
    let method = memory
        .allocate(ObjectData::Method(MethodData {
            name: name.clone(),
            code: ExecutableCode::Rexx(Arc::new(code)),
            guarded: false,
            protected: false,
            private: false,
            scope: Box::from(""),
        }))
        .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?;
    Ok((name, method))
}

/// Collect the clauses of a directive body (up to the next directive).
fn collect_body(lexer: &mut Lexer<'_>) -> Result<VecDeque<Clause>, SyntaxError> {
    let mut body = VecDeque::new();
    while let Some(clause) = lexer.next_clause()? {
        if matches!(
            clause.peek().map(|t| &t.kind),
            Some(TokenKind::DirectiveStart)
        ) {
            lexer.reclaim_clause(clause);
            break;
        }
        body.push_back(clause);
    }
    Ok(body)
}

/// Collect raw resource lines up to a `::END` line.
fn lexer_take_resource(
    lexer: &mut Lexer<'_>,
    _source: &ProgramSource,
) -> Result<Vec<Box<str>>, SyntaxError> {
    // Resources are stored by their clause text approximation: each clause
    // until ::END renders back to its symbols and literals.
    let mut body = Vec::new();
    while let Some(clause) = lexer.next_clause()? {
        if matches!(
            clause.peek().map(|t| &t.kind),
            Some(TokenKind::DirectiveStart)
        ) {
            let mut check = clause.clone();
            check.take();
            if check.accept_symbol("END") {
                return Ok(body);
            }
            lexer.reclaim_clause(clause);
            return Ok(body);
        }
        let mut text = String::new();
        for token in &clause.tokens {
            match &token.kind {
                TokenKind::Symbol(s) | TokenKind::Literal(s) => text.push_str(s),
                TokenKind::Blank => text.push(' '),
                _ => {}
            }
        }
        body.push(text.into());
    }
    Ok(body)
}

/// Dependency-sort the class directives and create the class objects.
fn install_classes(
    memory: &mut Memory,
    package: &mut Package,
    mut directives: Vec<ClassDirective>,
) -> Result<(), SyntaxError> {
    // Dependencies on names defined in this package only.
    let local: Vec<Box<str>> = directives.iter().map(|d| d.name.clone()).collect();
    let mut dependencies: Vec<Vec<Box<str>>> = directives
        .iter()
        .map(|d| {
            d.subclass
                .iter()
                .chain(d.inherits.iter())
                .chain(d.metaclass.iter())
                .filter(|name| local.contains(name))
                .cloned()
                .collect()
        })
        .collect();

    let mut order: Vec<usize> = Vec::new();
    let mut placed = vec![false; directives.len()];
    loop {
        let next = (0..directives.len())
            .find(|i| !placed[*i] && dependencies[*i].is_empty());
        let Some(next) = next else { break };
        placed[next] = true;
        order.push(next);
        let name = directives[next].name.clone();
        for deps in &mut dependencies {
            deps.retain(|d| *d != name);
        }
    }

    if order.len() != directives.len() {
        let unresolved = (0..directives.len())
            .find(|i| !placed[*i])
            .map(|i| directives[i].name.to_string())
            .unwrap_or_default();
        return Err(SyntaxError::with(
            error_codes::TRANSLATION_CYCLIC,
            vec![unresolved],
        ));
    }

    // Create class objects in install order so in-package superclasses
    // resolve to already-created classes.
    for index in order {
        let directive = std::mem::replace(
            &mut directives[index],
            ClassDirective {
                name: Box::from(""),
                metaclass: None,
                mixin: false,
                subclass: None,
                inherits: Vec::new(),
                methods: Vec::new(),
            },
        );

        let mut superclasses = Vec::new();
        for parent in directive.subclass.iter().chain(directive.inherits.iter()) {
            if let Some(found) = package.find_class(parent) {
                superclasses.push(found);
            } else if let Some(found) = memory.dir_get(memory.environment(), parent) {
                superclasses.push(found);
            } else {
                debug!("class {} superclass {parent} unresolved", directive.name);
            }
        }

        let has_uninit = directive
            .methods
            .iter()
            .any(|(name, _)| name.as_ref() == "UNINIT");
        let mut methods = std::collections::BTreeMap::new();
        for (name, method) in directive.methods {
            // Stamp the defining scope into each method.
            if let ObjectData::Method(data) = &mut memory.cell_mut(method).data {
                data.scope = directive.name.clone();
            }
            methods.insert(name, method);
        }

        let class = memory
            .allocate(ObjectData::Class(ClassData {
                name: directive.name.clone(),
                methods,
                superclasses,
                metaclass: ObjRef::NULL,
                mixin: directive.mixin,
                has_uninit,
            }))
            .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?;
        package.classes.push((directive.name, class));
    }
    Ok(())
}
