// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the instruction graph.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{BinaryOp, Expr, ExprId, Keyword, RexxCode, VarId};

#[test]
fn precedence_ordering() {
    assert!(BinaryOp::Power.precedence() > BinaryOp::Multiply.precedence());
    assert!(BinaryOp::Multiply.precedence() > BinaryOp::Add.precedence());
    assert!(BinaryOp::Add.precedence() > BinaryOp::Concat.precedence());
    assert!(BinaryOp::Concat.precedence() > BinaryOp::Equal.precedence());
    assert!(BinaryOp::Equal.precedence() > BinaryOp::And.precedence());
    assert!(BinaryOp::And.precedence() > BinaryOp::Or.precedence());
    assert_eq!(
        BinaryOp::Multiply.precedence(),
        BinaryOp::Divide.precedence()
    );
}

fn code_with_exprs(exprs: Vec<Expr>) -> RexxCode {
    RexxCode {
        exprs,
        ..RexxCode::default()
    }
}

#[test]
fn expr_depth_of_leaf() {
    let code = code_with_exprs(vec![Expr::Literal(0)]);
    assert_eq!(code.expr_depth(ExprId(0)), 1);
}

#[test]
fn expr_depth_of_binary_chain() {
    // 1 + 2 * 3: literals at 0..3, multiply at 3, add at 4.
    let code = code_with_exprs(vec![
        Expr::Literal(0),
        Expr::Literal(1),
        Expr::Literal(2),
        Expr::Binary {
            op: BinaryOp::Multiply,
            left: ExprId(1),
            right: ExprId(2),
        },
        Expr::Binary {
            op: BinaryOp::Add,
            left: ExprId(0),
            right: ExprId(3),
        },
    ]);
    // Evaluating needs: 1, then (2, 3) with 1 held -> depth 3.
    assert_eq!(code.expr_depth(ExprId(4)), 3);
}

#[test]
fn expr_depth_of_arguments() {
    let code = code_with_exprs(vec![
        Expr::Literal(0),
        Expr::Literal(1),
        Expr::Function {
            name: "F".into(),
            args: vec![Some(ExprId(0)), None, Some(ExprId(1))],
            target: super::CallTarget::Unresolved,
        },
    ]);
    // Third argument evaluated with two slots already held.
    assert_eq!(code.expr_depth(ExprId(2)), 3);
}

#[test]
fn variable_depth_counts_one() {
    let code = code_with_exprs(vec![Expr::Variable(VarId(0))]);
    assert_eq!(code.expr_depth(ExprId(0)), 1);
}

#[test]
fn source_line_lookup() {
    let code = RexxCode {
        source_lines: vec![Box::from("say 1"), Box::from("say 2")],
        ..RexxCode::default()
    };
    assert_eq!(code.source_line(1), Some("say 1"));
    assert_eq!(code.source_line(2), Some("say 2"));
    assert_eq!(code.source_line(0), None);
    assert_eq!(code.source_line(3), None);
}

#[test]
fn instruction_nodes_link() {
    let mut code = RexxCode::default();
    code.instructions.push(super::Instruction {
        keyword: Keyword::Nop,
        line: 1,
        next: Some(super::InstrId(1)),
    });
    code.instructions.push(super::Instruction {
        keyword: Keyword::Nop,
        line: 1,
        next: None,
    });
    assert_eq!(code.instruction(super::InstrId(0)).next, Some(super::InstrId(1)));
    assert!(code.instruction(super::InstrId(1)).next.is_none());
}
