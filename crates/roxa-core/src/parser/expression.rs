// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Expression translation.
//!
//! Expressions are parsed with twin stacks: completed terms on the operand
//! stack, pending operators on the operator stack, and a sentinel fence at
//! the bottom of every subexpression so nested parentheses cannot pop past
//! their own beginning. Message operators (`~`, `~~`, `[`) extend the
//! current term; everything else reduces by precedence.
//!
//! White space between two terms is the implicit blank-concatenation
//! operator; direct abuttal concatenates without the blank.

use crate::activity::condition::{SyntaxError, error_codes};
use crate::instructions::{BinaryOp, CallTarget, Expr, ExprId, PrefixOp};
use crate::memory::Memory;

use super::lexer::{Clause, OperatorKind, TokenKind, is_variable_symbol};
use super::variables::CodeBuilder;

/// Where an expression must stop, beyond the end of the clause.
#[derive(Clone, Copy, Debug, Default)]
pub struct Terminators<'a> {
    /// Keyword symbols that end the expression (THEN, TO, WHILE ...).
    pub keywords: &'a [&'a str],
    /// Stop at a comma (argument lists).
    pub comma: bool,
    /// Stop at a right parenthesis.
    pub paren: bool,
    /// Stop at a right bracket.
    pub bracket: bool,
}

impl<'a> Terminators<'a> {
    /// Stop only at the end of the clause.
    #[must_use]
    pub const fn clause_end() -> Self {
        Self {
            keywords: &[],
            comma: false,
            paren: false,
            bracket: false,
        }
    }

    /// Stop at the listed keywords or the end of the clause.
    #[must_use]
    pub const fn keywords(keywords: &'a [&'a str]) -> Self {
        Self {
            keywords,
            comma: false,
            paren: false,
            bracket: false,
        }
    }

    /// Stop at a right parenthesis (grouping subexpression).
    #[must_use]
    pub const fn subexpression() -> Self {
        Self {
            keywords: &[],
            comma: false,
            paren: true,
            bracket: false,
        }
    }

    /// Stop at commas and the closing character of an argument list.
    #[must_use]
    pub const fn argument(bracket: bool) -> Self {
        Self {
            keywords: &[],
            comma: true,
            paren: !bracket,
            bracket,
        }
    }
}

/// An operator-stack slot: the fence or a pending binary operator.
enum StackOp {
    Fence,
    Binary(BinaryOp),
}

/// Map an operator token to its binary meaning, if it has one.
const fn binary_for(op: OperatorKind) -> Option<BinaryOp> {
    Some(match op {
        OperatorKind::Plus => BinaryOp::Add,
        OperatorKind::Minus => BinaryOp::Subtract,
        OperatorKind::Star => BinaryOp::Multiply,
        OperatorKind::Slash => BinaryOp::Divide,
        OperatorKind::Percent => BinaryOp::IntegerDivide,
        OperatorKind::DoubleSlash => BinaryOp::Remainder,
        OperatorKind::DoubleStar => BinaryOp::Power,
        OperatorKind::Concat => BinaryOp::Concat,
        OperatorKind::And => BinaryOp::And,
        OperatorKind::Or => BinaryOp::Or,
        OperatorKind::Xor => BinaryOp::Xor,
        OperatorKind::Equal => BinaryOp::Equal,
        OperatorKind::NotEqual => BinaryOp::NotEqual,
        OperatorKind::StrictEqual => BinaryOp::StrictEqual,
        OperatorKind::StrictNotEqual => BinaryOp::StrictNotEqual,
        OperatorKind::Greater => BinaryOp::Greater,
        OperatorKind::GreaterEqual => BinaryOp::GreaterEqual,
        OperatorKind::StrictGreater => BinaryOp::StrictGreater,
        OperatorKind::StrictGreaterEqual => BinaryOp::StrictGreaterEqual,
        OperatorKind::Less => BinaryOp::Less,
        OperatorKind::LessEqual => BinaryOp::LessEqual,
        OperatorKind::StrictLess => BinaryOp::StrictLess,
        OperatorKind::StrictLessEqual => BinaryOp::StrictLessEqual,
        OperatorKind::Not => return None,
    })
}

/// Translates expressions into the builder's arenas.
pub struct ExpressionParser<'b, 'm> {
    /// The code block under construction.
    pub builder: &'b mut CodeBuilder,
    /// The heap, for literal allocation.
    pub memory: &'m mut Memory,
}

impl ExpressionParser<'_, '_> {
    /// Whether the clause cursor sits on a terminator for this context.
    fn at_terminator(&self, clause: &Clause, term: &Terminators<'_>) -> bool {
        let Some(token) = clause.peek() else {
            return true;
        };
        match &token.kind {
            TokenKind::Comma => term.comma,
            TokenKind::RightParen => term.paren,
            TokenKind::RightBracket => term.bracket,
            TokenKind::Symbol(s) => term.keywords.iter().any(|k| *k == s.as_ref()),
            _ => false,
        }
    }

    /// Parse a full (possibly empty) expression in this context.
    ///
    /// # Errors
    ///
    /// Raises invalid-expression errors for malformed input.
    pub fn parse_expression(
        &mut self,
        clause: &mut Clause,
        term: &Terminators<'_>,
    ) -> Result<Option<ExprId>, SyntaxError> {
        let mut operators: Vec<StackOp> = vec![StackOp::Fence];
        let mut operands: Vec<ExprId> = Vec::new();

        clause.skip_blank();
        if self.at_terminator(clause, term) {
            return Ok(None);
        }

        loop {
            let Some(operand) = self.parse_term(clause, term)? else {
                return Err(
                    SyntaxError::new(error_codes::INVALID_EXPRESSION).at_line(clause.current_line())
                );
            };
            operands.push(operand);

            // Note blank significance before looking at the next token.
            let had_blank = matches!(clause.peek().map(|t| &t.kind), Some(TokenKind::Blank));
            if had_blank {
                clause.skip_blank();
            }
            if self.at_terminator(clause, term) || clause.at_end() {
                break;
            }
            let Some(token) = clause.peek().cloned() else {
                break;
            };

            let op = match &token.kind {
                TokenKind::Operator(op) => {
                    let Some(binary) = binary_for(*op) else {
                        return Err(SyntaxError::with(
                            error_codes::INVALID_EXPRESSION_AT,
                            vec!["\\".to_string()],
                        )
                        .at_line(token.line));
                    };
                    clause.take();
                    binary
                }
                // A blank-separated message chain extends the prior term.
                TokenKind::Tilde | TokenKind::DoubleTilde | TokenKind::LeftBracket => {
                    let receiver = match operands.pop() {
                        Some(r) => r,
                        None => {
                            return Err(SyntaxError::new(error_codes::INVALID_EXPRESSION)
                                .at_line(token.line));
                        }
                    };
                    let extended = self.parse_postfix(clause, receiver)?;
                    operands.push(extended);
                    continue;
                }
                TokenKind::Symbol(_) | TokenKind::Literal(_) | TokenKind::LeftParen => {
                    if had_blank {
                        BinaryOp::ConcatBlank
                    } else {
                        BinaryOp::Abuttal
                    }
                }
                TokenKind::Comma | TokenKind::RightParen | TokenKind::RightBracket => {
                    return Err(
                        SyntaxError::new(error_codes::UNEXPECTED_COMMA).at_line(token.line)
                    );
                }
                TokenKind::Blank | TokenKind::Colon | TokenKind::DirectiveStart => {
                    return Err(SyntaxError::new(error_codes::INVALID_EXPRESSION)
                        .at_line(token.line));
                }
            };

            // Reduce while the stack top binds at least as tightly.
            while let Some(StackOp::Binary(top)) = operators.last() {
                if top.precedence() >= op.precedence() {
                    self.reduce(&mut operators, &mut operands, clause.current_line())?;
                } else {
                    break;
                }
            }
            operators.push(StackOp::Binary(op));

            clause.skip_blank();
            if self.at_terminator(clause, term) || clause.at_end() {
                // An expression cannot end in the middle of an operator.
                return Err(SyntaxError::new(error_codes::INVALID_EXPRESSION_OPERATOR)
                    .at_line(clause.current_line()));
            }
        }

        // Flush pending operators down to the fence.
        while matches!(operators.last(), Some(StackOp::Binary(_))) {
            self.reduce(&mut operators, &mut operands, clause.current_line())?;
        }
        operators.pop();

        Ok(operands.pop())
    }

    /// Parse an expression that must produce a value.
    ///
    /// # Errors
    ///
    /// Raises invalid-expression when the context yields nothing.
    pub fn parse_required(
        &mut self,
        clause: &mut Clause,
        term: &Terminators<'_>,
    ) -> Result<ExprId, SyntaxError> {
        self.parse_expression(clause, term)?.ok_or_else(|| {
            SyntaxError::new(error_codes::INVALID_EXPRESSION).at_line(clause.current_line())
        })
    }

    fn reduce(
        &mut self,
        operators: &mut Vec<StackOp>,
        operands: &mut Vec<ExprId>,
        line: usize,
    ) -> Result<(), SyntaxError> {
        let Some(StackOp::Binary(op)) = operators.pop() else {
            return Err(SyntaxError::new(error_codes::INVALID_EXPRESSION).at_line(line));
        };
        let Some(right) = operands.pop() else {
            return Err(SyntaxError::new(error_codes::INVALID_EXPRESSION).at_line(line));
        };
        let Some(left) = operands.pop() else {
            return Err(SyntaxError::new(error_codes::INVALID_EXPRESSION).at_line(line));
        };
        operands.push(self.builder.add_expr(Expr::Binary { op, left, right }));
        Ok(())
    }

    /// Parse one term: prefixes, a primary, then any message chain.
    fn parse_term(
        &mut self,
        clause: &mut Clause,
        term: &Terminators<'_>,
    ) -> Result<Option<ExprId>, SyntaxError> {
        clause.skip_blank();
        let Some(token) = clause.peek().cloned() else {
            return Ok(None);
        };
        let line = token.line;

        let base = match token.kind {
            TokenKind::Operator(op @ (OperatorKind::Plus | OperatorKind::Minus | OperatorKind::Not)) => {
                clause.take();
                let operand = self.parse_term(clause, term)?.ok_or_else(|| {
                    SyntaxError::new(error_codes::INVALID_EXPRESSION_OPERATOR).at_line(line)
                })?;
                let prefix = match op {
                    OperatorKind::Plus => PrefixOp::Plus,
                    OperatorKind::Minus => PrefixOp::Minus,
                    _ => PrefixOp::Not,
                };
                self.builder.add_expr(Expr::Prefix {
                    op: prefix,
                    operand,
                })
            }
            // Variable-reference-of: >var or <var at term position.
            TokenKind::Operator(OperatorKind::Greater | OperatorKind::Less) => {
                clause.take();
                clause.skip_blank();
                let name = match clause.take().map(|t| t.kind.clone()) {
                    Some(TokenKind::Symbol(s)) if is_variable_symbol(&s) => s,
                    _ => {
                        return Err(
                            SyntaxError::new(error_codes::INVALID_VARIABLE).at_line(line)
                        );
                    }
                };
                let var = self.builder.add_variable(&name);
                self.builder.add_expr(Expr::VariableRef(var))
            }
            TokenKind::Literal(text) => {
                clause.take();
                self.string_literal(&text)?
            }
            TokenKind::Symbol(name) => {
                clause.take();
                // A directly attached parenthesis makes this a call.
                if matches!(clause.peek().map(|t| &t.kind), Some(TokenKind::LeftParen)) {
                    let args = self.parse_argument_list(clause, false)?;
                    self.builder.add_expr(Expr::Function {
                        name: name.clone(),
                        args,
                        target: CallTarget::Unresolved,
                    })
                } else if matches!(clause.peek().map(|t| &t.kind), Some(TokenKind::Colon))
                    && matches!(
                        clause.peek_at(1).map(|t| &t.kind),
                        Some(TokenKind::Symbol(_))
                    )
                    && is_variable_symbol(&name)
                {
                    // Qualified class resolution: namespace:name.
                    clause.take();
                    let Some(TokenKind::Symbol(qualified)) =
                        clause.take().map(|t| t.kind.clone())
                    else {
                        return Err(SyntaxError::new(error_codes::STRING_OR_SYMBOL_EXPECTED)
                            .at_line(line));
                    };
                    self.builder.add_expr(Expr::Qualified {
                        namespace: name.clone(),
                        name: qualified,
                    })
                } else {
                    self.symbol_term(&name)?
                }
            }
            TokenKind::LeftParen => {
                clause.take();
                let sub = self.parse_expression(clause, &Terminators::subexpression())?;
                let Some(sub) = sub else {
                    return Err(
                        SyntaxError::new(error_codes::INVALID_EXPRESSION).at_line(line)
                    );
                };
                if !matches!(clause.take().map(|t| &t.kind), Some(TokenKind::RightParen)) {
                    return Err(SyntaxError::new(error_codes::UNMATCHED_PAREN).at_line(line));
                }
                sub
            }
            _ => return Ok(None),
        };

        self.parse_postfix(clause, base).map(Some)
    }

    /// Extend a term with message sends: `~name(args)`, `~~name`, `[args]`.
    fn parse_postfix(&mut self, clause: &mut Clause, mut base: ExprId) -> Result<ExprId, SyntaxError> {
        loop {
            let mark = clause.mark();
            clause.skip_blank();
            match clause.peek().map(|t| t.kind.clone()) {
                Some(kind @ (TokenKind::Tilde | TokenKind::DoubleTilde)) => {
                    let line = clause.current_line();
                    clause.take();
                    clause.skip_blank();
                    let name = match clause.take().map(|t| t.kind.clone()) {
                        Some(TokenKind::Symbol(s)) => s,
                        Some(TokenKind::Literal(s)) => s.to_ascii_uppercase().into(),
                        _ => {
                            return Err(SyntaxError::new(error_codes::STRING_OR_SYMBOL_EXPECTED)
                                .at_line(line));
                        }
                    };
                    let args = if matches!(clause.peek().map(|t| &t.kind), Some(TokenKind::LeftParen))
                    {
                        self.parse_argument_list(clause, false)?
                    } else {
                        Vec::new()
                    };
                    base = self.builder.add_expr(Expr::Message {
                        receiver: base,
                        name,
                        args,
                        double: matches!(kind, TokenKind::DoubleTilde),
                    });
                }
                Some(TokenKind::LeftBracket) => {
                    let args = self.parse_argument_list(clause, true)?;
                    base = self.builder.add_expr(Expr::Message {
                        receiver: base,
                        name: "[]".into(),
                        args,
                        double: false,
                    });
                }
                _ => {
                    clause.reset(mark);
                    return Ok(base);
                }
            }
        }
    }

    /// Parse a parenthesised or bracketed argument list.
    ///
    /// Omitted arguments become `None`; trailing omissions are trimmed.
    fn parse_argument_list(
        &mut self,
        clause: &mut Clause,
        bracket: bool,
    ) -> Result<Vec<Option<ExprId>>, SyntaxError> {
        let open_line = clause.current_line();
        clause.take();

        let close = if bracket {
            TokenKind::RightBracket
        } else {
            TokenKind::RightParen
        };
        let mut args: Vec<Option<ExprId>> = Vec::new();

        loop {
            clause.skip_blank();
            if clause.peek().map(|t| &t.kind) == Some(&close) {
                clause.take();
                break;
            }
            if clause.at_end() {
                return Err(SyntaxError::new(error_codes::UNMATCHED_PAREN).at_line(open_line));
            }

            let sub = self.parse_expression(clause, &Terminators::argument(bracket))?;
            args.push(sub);

            clause.skip_blank();
            match clause.peek().map(|t| t.kind.clone()) {
                Some(TokenKind::Comma) => {
                    clause.take();
                }
                Some(k) if k == close => {
                    clause.take();
                    break;
                }
                _ => {
                    return Err(
                        SyntaxError::new(error_codes::UNMATCHED_PAREN).at_line(open_line)
                    );
                }
            }
        }

        while matches!(args.last(), Some(None)) {
            args.pop();
        }
        Ok(args)
    }

    /// Classify a plain symbol term.
    fn symbol_term(&mut self, name: &str) -> Result<ExprId, SyntaxError> {
        // Environment symbol: .name
        if let Some(rest) = name.strip_prefix('.') {
            if !rest.is_empty() && !rest.starts_with(|c: char| c.is_ascii_digit()) {
                return Ok(self.builder.add_expr(Expr::Environment(rest.into())));
            }
        }

        // Numbers become literal number objects; other constant symbols
        // (and malformed numbers) are their own text.
        let first = name.chars().next().unwrap_or(' ');
        if first.is_ascii_digit() || first == '.' {
            return match crate::execution::number::RexxNumber::parse(name) {
                Ok(number) => self.number_literal(number),
                Err(_) => self.string_literal(name),
            };
        }

        if is_variable_symbol(name) {
            let var = self.builder.add_variable(name);
            return Ok(self.builder.add_expr(Expr::Variable(var)));
        }

        self.string_literal(name)
    }

    /// Intern a string literal through the global strings table.
    fn string_literal(&mut self, text: &str) -> Result<ExprId, SyntaxError> {
        let value = self
            .memory
            .global_name(text)
            .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?;
        let index = self.builder.add_literal(value);
        Ok(self.builder.add_expr(Expr::Literal(index)))
    }

    /// Allocate a number literal.
    fn number_literal(
        &mut self,
        number: crate::execution::number::RexxNumber,
    ) -> Result<ExprId, SyntaxError> {
        let value = self
            .memory
            .new_number(number)
            .map_err(|_| SyntaxError::new(error_codes::SYSTEM_RESOURCES))?;
        let index = self.builder.add_literal(value);
        Ok(self.builder.add_expr(Expr::Literal(index)))
    }
}
