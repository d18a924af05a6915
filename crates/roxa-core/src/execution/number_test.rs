// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for Rexx decimal arithmetic.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use core::cmp::Ordering;

use proptest::prelude::*;

use super::number::{NumberError, NumericForm, RexxNumber};

const DIGITS: usize = 9;

fn num(text: &str) -> RexxNumber {
    RexxNumber::parse(text).unwrap()
}

fn fmt(n: &RexxNumber) -> String {
    n.format(DIGITS, NumericForm::Scientific)
}

#[test]
fn parse_integers() {
    assert_eq!(fmt(&num("0")), "0");
    assert_eq!(fmt(&num("42")), "42");
    assert_eq!(fmt(&num("-17")), "-17");
    assert_eq!(fmt(&num("+5")), "5");
    assert_eq!(fmt(&num(" 12 ")), "12");
}

#[test]
fn parse_decimals_and_exponents() {
    assert_eq!(fmt(&num("1.5")), "1.5");
    assert_eq!(fmt(&num(".5")), "0.5");
    assert_eq!(fmt(&num("1E3")), "1000");
    assert_eq!(fmt(&num("1.2e-2")), "0.012");
    assert_eq!(fmt(&num("0.000")), "0");
}

#[test]
fn parse_rejects_garbage() {
    assert_eq!(RexxNumber::parse(""), Err(NumberError::NotANumber));
    assert_eq!(RexxNumber::parse("abc"), Err(NumberError::NotANumber));
    assert_eq!(RexxNumber::parse("1.2.3"), Err(NumberError::NotANumber));
    assert_eq!(RexxNumber::parse("1E"), Err(NumberError::NotANumber));
    assert_eq!(RexxNumber::parse("1E+"), Err(NumberError::NotANumber));
    assert_eq!(RexxNumber::parse("."), Err(NumberError::NotANumber));
}

#[test]
fn basic_arithmetic() {
    assert_eq!(fmt(&num("1").add(&num("2"), DIGITS)), "3");
    assert_eq!(fmt(&num("2").multiply(&num("3"), DIGITS)), "6");
    assert_eq!(fmt(&num("1").add(&num("2").multiply(&num("3"), DIGITS), DIGITS)), "7");
    assert_eq!(fmt(&num("10").subtract(&num("4"), DIGITS)), "6");
    assert_eq!(fmt(&num("0.1").add(&num("0.2"), DIGITS)), "0.3");
}

#[test]
fn division() {
    assert_eq!(fmt(&num("6").divide(&num("3"), DIGITS).unwrap()), "2");
    assert_eq!(fmt(&num("1").divide(&num("3"), DIGITS).unwrap()), "0.333333333");
    assert_eq!(fmt(&num("2").divide(&num("3"), DIGITS).unwrap()), "0.666666667");
    assert_eq!(
        num("1").divide(&num("0"), DIGITS),
        Err(NumberError::DivideByZero)
    );
}

#[test]
fn integer_division_and_remainder() {
    assert_eq!(fmt(&num("7").integer_divide(&num("2"), DIGITS).unwrap()), "3");
    assert_eq!(fmt(&num("7").remainder(&num("2"), DIGITS).unwrap()), "1");
    assert_eq!(fmt(&num("-7").integer_divide(&num("2"), DIGITS).unwrap()), "-3");
    assert_eq!(fmt(&num("2.4").remainder(&num("1"), DIGITS).unwrap()), "0.4");
}

#[test]
fn power() {
    assert_eq!(fmt(&num("2").power(&num("10"), DIGITS).unwrap()), "1024");
    assert_eq!(fmt(&num("2").power(&num("0"), DIGITS).unwrap()), "1");
    assert_eq!(fmt(&num("2").power(&num("-1"), DIGITS).unwrap()), "0.5");
    assert_eq!(
        num("2").power(&num("0.5"), DIGITS),
        Err(NumberError::NotAWholeNumber)
    );
}

#[test]
fn rounding_to_digits() {
    // 9 significant digits, half-up
    let third = num("1").divide(&num("3"), 5).unwrap();
    assert_eq!(third.format(5, NumericForm::Scientific), "0.33333");
    let sum = num("123456789").add(&num("1"), 5);
    assert_eq!(sum.format(5, NumericForm::Scientific), "1.2346E+8");
}

#[test]
fn comparison_with_fuzz() {
    assert_eq!(num("1").compare(&num("1"), DIGITS, 0), Ordering::Equal);
    assert_eq!(num("1").compare(&num("2"), DIGITS, 0), Ordering::Less);
    assert_eq!(num("2").compare(&num("1"), DIGITS, 0), Ordering::Greater);
    // FUZZ=2 makes 1.00001 equal to 1 at 4 effective digits
    assert_eq!(num("1.00001").compare(&num("1"), 6, 2), Ordering::Equal);
    assert_eq!(num("1.00001").compare(&num("1"), 9, 0), Ordering::Greater);
}

#[test]
fn whole_number_conversion() {
    assert_eq!(num("42").to_whole(DIGITS).unwrap(), 42);
    assert_eq!(num("-3").to_whole(DIGITS).unwrap(), -3);
    assert_eq!(num("4.00").to_whole(DIGITS).unwrap(), 4);
    assert_eq!(num("1.5").to_whole(DIGITS), Err(NumberError::NotAWholeNumber));
    assert_eq!(
        num("1234567890").to_whole(DIGITS),
        Err(NumberError::WholeNumberRange)
    );
}

#[test]
fn exponential_formatting() {
    let big = num("1234567890");
    assert_eq!(big.format(9, NumericForm::Scientific), "1.23456789E+9");
    let small = num("0.0000000000000000001");
    assert_eq!(small.format(9, NumericForm::Scientific), "1E-19");
}

#[test]
fn engineering_formatting() {
    let n = num("12345678901");
    // adjusted exponent 10 -> engineering exponent 9, two digits before point
    assert_eq!(n.format(9, NumericForm::Engineering), "12.3456789E+9");
    assert_eq!(num("5E7").format(2, NumericForm::Engineering), "50E+6");
}

#[test]
fn negligible_operand_addition() {
    // The second operand is far below the precision window
    let sum = num("1E20").add(&num("1"), DIGITS);
    assert_eq!(fmt(&sum), "1E+20");
}

proptest! {
    #[test]
    fn addition_commutes(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        let x = RexxNumber::from_integer(a);
        let y = RexxNumber::from_integer(b);
        prop_assert_eq!(x.add(&y, DIGITS), y.add(&x, DIGITS));
    }

    #[test]
    fn integer_roundtrip(a in -999_999_999i64..999_999_999) {
        let n = RexxNumber::from_integer(a);
        prop_assert_eq!(n.to_whole(DIGITS).unwrap(), a);
        prop_assert_eq!(fmt(&n), a.to_string());
    }

    #[test]
    fn subtract_self_is_zero(a in -1_000_000i64..1_000_000) {
        let n = RexxNumber::from_integer(a);
        prop_assert!(n.subtract(&n, DIGITS).is_zero());
    }
}
