// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the code builder and variable interning.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::instructions::{InstrId, Keyword, Retriever, TailPart};

use super::variables::CodeBuilder;

fn builder() -> CodeBuilder {
    CodeBuilder::new("TEST", false, Vec::new())
}

#[test]
fn simple_slots_are_monotonic() {
    let mut builder = builder();
    let a = builder.add_simple_variable("A");
    let b = builder.add_simple_variable("B");
    assert_ne!(a, b);

    match (builder.retriever(a), builder.retriever(b)) {
        (
            Retriever::Simple { slot: slot_a, .. },
            Retriever::Simple { slot: slot_b, .. },
        ) => {
            assert_eq!(*slot_a, 1);
            assert_eq!(*slot_b, 2);
        }
        other => panic!("unexpected retrievers: {other:?}"),
    }
}

#[test]
fn interning_caches_by_name() {
    let mut builder = builder();
    let first = builder.add_simple_variable("COUNT");
    let second = builder.add_simple_variable("COUNT");
    assert_eq!(first, second);

    let stem_one = builder.add_stem_variable("S.");
    let stem_two = builder.add_stem_variable("S.");
    assert_eq!(stem_one, stem_two);

    let compound_one = builder.add_compound_variable("S.1.X");
    let compound_two = builder.add_compound_variable("S.1.X");
    assert_eq!(compound_one, compound_two);
}

#[test]
fn interpret_forces_dynamic_slots() {
    let mut builder = CodeBuilder::new("INTERPRET", true, Vec::new());
    let var = builder.add_simple_variable("X");
    match builder.retriever(var) {
        Retriever::Simple { slot, .. } => assert_eq!(*slot, 0),
        other => panic!("unexpected retriever: {other:?}"),
    }
    let code = builder.finish();
    assert_eq!(code.variable_count, 0);
    assert!(code.interpret);
}

#[test]
fn compound_tails_split_into_parts() {
    let mut builder = builder();
    let compound = builder.add_compound_variable("A.B.1..C");
    let Retriever::Compound { stem, tails } = builder.retriever(compound) else {
        panic!("expected a compound retriever");
    };

    match builder.retriever(*stem) {
        Retriever::Stem { name, .. } => assert_eq!(name.as_ref(), "A."),
        other => panic!("unexpected stem retriever: {other:?}"),
    }

    // B and C substitute; the numeric and empty segments stay literal.
    assert_eq!(tails.len(), 4);
    assert!(matches!(&tails[0], TailPart::Var(_)));
    assert!(matches!(&tails[1], TailPart::Text(t) if t.as_ref() == "1"));
    assert!(matches!(&tails[2], TailPart::Text(t) if t.is_empty()));
    assert!(matches!(&tails[3], TailPart::Var(_)));
}

#[test]
fn add_variable_routes_by_shape() {
    let mut builder = builder();
    let plain = builder.add_variable("PLAIN");
    let stem = builder.add_variable("STEM.");
    let compound = builder.add_variable("STEM.TAIL");
    assert!(matches!(builder.retriever(plain), Retriever::Simple { .. }));
    assert!(matches!(builder.retriever(stem), Retriever::Stem { .. }));
    assert!(matches!(
        builder.retriever(compound),
        Retriever::Compound { .. }
    ));
}

#[test]
fn labels_first_definition_wins() {
    let mut builder = builder();
    builder.add_label("TARGET", InstrId(1));
    builder.add_label("TARGET", InstrId(9));
    assert_eq!(builder.find_label("TARGET"), Some(InstrId(1)));
    assert_eq!(builder.find_label("MISSING"), None);
}

#[test]
fn finish_computes_the_stack_bound() {
    let mut builder = builder();
    // say 1 + 2 * 3 needs three operand slots.
    let one = builder.add_expr(crate::instructions::Expr::Literal(0));
    let two = builder.add_expr(crate::instructions::Expr::Literal(1));
    let three = builder.add_expr(crate::instructions::Expr::Literal(2));
    let product = builder.add_expr(crate::instructions::Expr::Binary {
        op: crate::instructions::BinaryOp::Multiply,
        left: two,
        right: three,
    });
    let sum = builder.add_expr(crate::instructions::Expr::Binary {
        op: crate::instructions::BinaryOp::Add,
        left: one,
        right: product,
    });
    builder.add_instruction(Keyword::Say { expr: Some(sum) }, 1);

    let code = builder.finish();
    assert_eq!(code.max_stack, 3);
}

#[test]
fn literal_pool_dedups_by_reference() {
    let mut builder = builder();
    let value = crate::types::ObjRef::new(crate::types::SegmentId::new(0), 0x40);
    let first = builder.add_literal(value);
    let second = builder.add_literal(value);
    assert_eq!(first, second);
    assert_eq!(builder.literals().len(), 1);
}
