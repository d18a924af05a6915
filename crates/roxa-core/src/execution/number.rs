// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Rexx decimal arithmetic.
//!
//! Rexx numbers are decimal: a signed mantissa and a power-of-ten exponent.
//! Every operation rounds its result to the caller's NUMERIC DIGITS setting
//! (half-up); comparison honours NUMERIC FUZZ; formatting honours NUMERIC
//! FORM. All intermediate arithmetic is exact via `BigInt`.

use core::cmp::Ordering;
use core::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

/// Exponent-alignment shifts beyond this many positions past the working
/// precision make the smaller operand negligible; skipping the alignment
/// bounds mantissa growth.
const NEGLIGIBLE_GUARD: i64 = 24;

/// Errors raised by numeric operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberError {
    /// The text is not a valid Rexx number.
    NotANumber,
    /// Division by zero.
    DivideByZero,
    /// The exponent left the representable range.
    ExponentOverflow,
    /// A whole number was required.
    NotAWholeNumber,
    /// A whole number exceeded the current DIGITS setting.
    WholeNumberRange,
}

impl fmt::Display for NumberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotANumber => write!(f, "not a valid number"),
            Self::DivideByZero => write!(f, "arithmetic overflow; divisor is zero"),
            Self::ExponentOverflow => write!(f, "exponent out of range"),
            Self::NotAWholeNumber => write!(f, "a whole number is required"),
            Self::WholeNumberRange => write!(f, "whole number out of range for current DIGITS"),
        }
    }
}

/// NUMERIC FORM setting: exponential notation style.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NumericForm {
    /// One digit before the decimal point.
    #[default]
    Scientific,
    /// Exponent kept a multiple of three.
    Engineering,
}

/// A Rexx decimal number: `mantissa * 10^exponent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RexxNumber {
    mantissa: BigInt,
    exponent: i64,
}

impl RexxNumber {
    /// The number zero.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            mantissa: BigInt::zero(),
            exponent: 0,
        }
    }

    /// Build from a binary integer.
    #[must_use]
    pub fn from_integer(value: i64) -> Self {
        Self {
            mantissa: BigInt::from(value),
            exponent: 0,
        }
        .normalized()
    }

    /// Parse Rexx number syntax: optional surrounding blanks, optional sign,
    /// digits with at most one decimal point, optional `E`/`e` exponent.
    ///
    /// # Errors
    ///
    /// Returns [`NumberError::NotANumber`] for anything else.
    pub fn parse(text: &str) -> Result<Self, NumberError> {
        let trimmed = text.trim_matches(' ');
        if trimmed.is_empty() {
            return Err(NumberError::NotANumber);
        }

        let mut chars = trimmed.chars().peekable();
        let mut negative = false;
        if let Some(&c) = chars.peek() {
            if c == '+' || c == '-' {
                negative = c == '-';
                chars.next();
            }
        }

        let mut mantissa = BigInt::zero();
        let mut digits_seen = false;
        let mut decimals: i64 = 0;
        let mut seen_point = false;
        let mut exp_part: Option<i64> = None;

        while let Some(c) = chars.next() {
            match c {
                '0'..='9' => {
                    digits_seen = true;
                    mantissa = mantissa * 10 + i64::from(c as u8 - b'0');
                    if seen_point {
                        decimals += 1;
                    }
                }
                '.' => {
                    if seen_point {
                        return Err(NumberError::NotANumber);
                    }
                    seen_point = true;
                }
                'e' | 'E' => {
                    let mut exp_negative = false;
                    let mut exp_digits = false;
                    let mut exp_value: i64 = 0;
                    if let Some(&s) = chars.peek() {
                        if s == '+' || s == '-' {
                            exp_negative = s == '-';
                            chars.next();
                        }
                    }
                    for e in chars.by_ref() {
                        let Some(d) = e.to_digit(10) else {
                            return Err(NumberError::NotANumber);
                        };
                        exp_digits = true;
                        exp_value = exp_value
                            .checked_mul(10)
                            .and_then(|v| v.checked_add(i64::from(d)))
                            .ok_or(NumberError::ExponentOverflow)?;
                    }
                    if !exp_digits {
                        return Err(NumberError::NotANumber);
                    }
                    exp_part = Some(if exp_negative { -exp_value } else { exp_value });
                }
                _ => return Err(NumberError::NotANumber),
            }
        }

        if !digits_seen {
            return Err(NumberError::NotANumber);
        }

        if negative {
            mantissa = -mantissa;
        }
        let exponent = exp_part
            .unwrap_or(0)
            .checked_sub(decimals)
            .ok_or(NumberError::ExponentOverflow)?;

        Ok(Self { mantissa, exponent }.normalized())
    }

    /// Whether the value is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    /// Whether the value is negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.mantissa.is_negative()
    }

    /// Number of significant decimal digits in the mantissa.
    #[must_use]
    pub fn digit_count(&self) -> usize {
        if self.mantissa.is_zero() {
            1
        } else {
            self.mantissa.magnitude().to_string().len()
        }
    }

    /// Strip trailing zero digits into the exponent; canonicalise zero.
    fn normalized(mut self) -> Self {
        if self.mantissa.is_zero() {
            self.exponent = 0;
            return self;
        }
        let ten = BigInt::from(10);
        loop {
            let (q, r) = self.mantissa.div_rem(&ten);
            if r.is_zero() {
                self.mantissa = q;
                self.exponent += 1;
            } else {
                break;
            }
        }
        self
    }

    /// Round half-up to at most `digits` significant digits.
    #[must_use]
    fn rounded(mut self, digits: usize) -> Self {
        let count = self.digit_count();
        if count <= digits {
            return self;
        }
        let drop = count - digits;
        let divisor = BigInt::from(10).pow(u32::try_from(drop).unwrap_or(u32::MAX));
        let negative = self.mantissa.is_negative();
        let magnitude = self.mantissa.abs();
        let (mut q, r) = magnitude.div_rem(&divisor);
        if r * 2 >= divisor {
            q += 1;
        }
        self.mantissa = if negative { -q } else { q };
        self.exponent += drop as i64;
        self.normalized()
    }

    /// Align two numbers to a common exponent, bounding the shift by the
    /// working precision plus a guard.
    fn aligned(&self, other: &Self, digits: usize) -> (BigInt, BigInt, i64) {
        if self.is_zero() {
            return (BigInt::zero(), other.mantissa.clone(), other.exponent);
        }
        if other.is_zero() {
            return (self.mantissa.clone(), BigInt::zero(), self.exponent);
        }

        let guard = digits as i64 + NEGLIGIBLE_GUARD;

        let top = |n: &Self| n.exponent + n.digit_count() as i64;
        let (hi, lo, swapped) = if top(self) >= top(other) {
            (self, other, false)
        } else {
            (other, self, true)
        };

        // Negligible operand shortcut: the low operand sits entirely below
        // the precision window of the high one.
        let (hi_m, lo_m, exp) = if !lo.is_zero() && top(hi) - top(lo) > guard {
            let exp = hi.exponent - 1;
            let hi_m = &hi.mantissa * BigInt::from(10);
            let lo_m = BigInt::from(if lo.is_negative() { -1 } else { 1 });
            (hi_m, lo_m, exp)
        } else {
            let exp = hi.exponent.min(lo.exponent);
            let scale = |n: &Self| {
                let shift = n.exponent - exp;
                if shift == 0 {
                    n.mantissa.clone()
                } else {
                    &n.mantissa * BigInt::from(10).pow(u32::try_from(shift).unwrap_or(u32::MAX))
                }
            };
            (scale(hi), scale(lo), exp)
        };

        if swapped {
            (lo_m, hi_m, exp)
        } else {
            (hi_m, lo_m, exp)
        }
    }

    /// Addition rounded to `digits`.
    #[must_use]
    pub fn add(&self, other: &Self, digits: usize) -> Self {
        let (a, b, exp) = self.aligned(other, digits);
        Self {
            mantissa: a + b,
            exponent: exp,
        }
        .normalized()
        .rounded(digits)
    }

    /// Subtraction rounded to `digits`.
    #[must_use]
    pub fn subtract(&self, other: &Self, digits: usize) -> Self {
        let (a, b, exp) = self.aligned(other, digits);
        Self {
            mantissa: a - b,
            exponent: exp,
        }
        .normalized()
        .rounded(digits)
    }

    /// Multiplication rounded to `digits`.
    #[must_use]
    pub fn multiply(&self, other: &Self, digits: usize) -> Self {
        Self {
            mantissa: &self.mantissa * &other.mantissa,
            exponent: self.exponent.saturating_add(other.exponent),
        }
        .normalized()
        .rounded(digits)
    }

    /// Division rounded to `digits`.
    ///
    /// # Errors
    ///
    /// Returns [`NumberError::DivideByZero`] when `other` is zero.
    pub fn divide(&self, other: &Self, digits: usize) -> Result<Self, NumberError> {
        if other.is_zero() {
            return Err(NumberError::DivideByZero);
        }
        if self.is_zero() {
            return Ok(Self::zero());
        }

        // Scale the dividend so the integer quotient carries two guard digits.
        let want = other.digit_count() + digits + 2;
        let have = self.digit_count();
        let scale = want.saturating_sub(have);
        let scaled = &self.mantissa * BigInt::from(10).pow(u32::try_from(scale).unwrap_or(u32::MAX));
        let quotient = scaled / &other.mantissa;

        Ok(Self {
            mantissa: quotient,
            exponent: self
                .exponent
                .saturating_sub(other.exponent)
                .saturating_sub(scale as i64),
        }
        .normalized()
        .rounded(digits))
    }

    /// Integer division (`%`): the integer part of the quotient.
    ///
    /// # Errors
    ///
    /// Returns [`NumberError::DivideByZero`] when `other` is zero.
    pub fn integer_divide(&self, other: &Self, digits: usize) -> Result<Self, NumberError> {
        if other.is_zero() {
            return Err(NumberError::DivideByZero);
        }
        let (a, b, _) = self.aligned(other, digits);
        Ok(Self {
            mantissa: a / b,
            exponent: 0,
        }
        .normalized()
        .rounded(digits))
    }

    /// Remainder (`//`): `self - (self % other) * other`.
    ///
    /// # Errors
    ///
    /// Returns [`NumberError::DivideByZero`] when `other` is zero.
    pub fn remainder(&self, other: &Self, digits: usize) -> Result<Self, NumberError> {
        if other.is_zero() {
            return Err(NumberError::DivideByZero);
        }
        let (a, b, exp) = self.aligned(other, digits);
        let q = &a / &b;
        Ok(Self {
            mantissa: a - q * b,
            exponent: exp,
        }
        .normalized()
        .rounded(digits))
    }

    /// Exponentiation by a whole-number power.
    ///
    /// # Errors
    ///
    /// The exponent must be a whole number; division errors propagate for
    /// negative powers.
    pub fn power(&self, exponent: &Self, digits: usize) -> Result<Self, NumberError> {
        let exp = exponent.to_whole(digits)?;
        if exp == 0 {
            return Ok(Self::from_integer(1));
        }

        let work = digits + 2;
        let mut base = self.clone();
        let mut remaining = exp.unsigned_abs();
        let mut result = Self::from_integer(1);
        while remaining > 0 {
            if remaining & 1 == 1 {
                result = result.multiply(&base, work);
            }
            remaining >>= 1;
            if remaining > 0 {
                base = base.multiply(&base, work);
            }
        }

        if exp < 0 {
            result = Self::from_integer(1).divide(&result, work)?;
        }
        Ok(result.rounded(digits))
    }

    /// Unary minus.
    #[must_use]
    pub fn negate(&self) -> Self {
        Self {
            mantissa: -self.mantissa.clone(),
            exponent: self.exponent,
        }
    }

    /// Absolute value.
    #[must_use]
    pub fn abs(&self) -> Self {
        Self {
            mantissa: self.mantissa.abs(),
            exponent: self.exponent,
        }
    }

    /// Comparison under NUMERIC DIGITS and FUZZ.
    ///
    /// FUZZ temporarily reduces the comparison precision: the difference is
    /// computed at `digits - fuzz` and compared against zero.
    #[must_use]
    pub fn compare(&self, other: &Self, digits: usize, fuzz: usize) -> Ordering {
        let precision = digits.saturating_sub(fuzz).max(1);
        let a = self.clone().rounded(precision);
        let b = other.clone().rounded(precision);
        let diff = a.subtract(&b, precision);
        if diff.is_zero() {
            Ordering::Equal
        } else if diff.is_negative() {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }

    /// Convert to a binary whole number, checked against `digits`.
    ///
    /// # Errors
    ///
    /// Fails when the value has a fractional part, needs more than `digits`
    /// digits, or does not fit an `i64`.
    pub fn to_whole(&self, digits: usize) -> Result<i64, NumberError> {
        let rounded = self.clone().rounded(digits);
        if rounded.exponent < 0 {
            return Err(NumberError::NotAWholeNumber);
        }
        if rounded.digit_count() as i64 + rounded.exponent > digits as i64 {
            return Err(NumberError::WholeNumberRange);
        }
        let scaled = &rounded.mantissa
            * BigInt::from(10).pow(u32::try_from(rounded.exponent).unwrap_or(u32::MAX));
        scaled.to_i64().ok_or(NumberError::WholeNumberRange)
    }

    /// Render under the given DIGITS and FORM settings.
    #[must_use]
    pub fn format(&self, digits: usize, form: NumericForm) -> String {
        let value = self.clone().rounded(digits);
        if value.is_zero() {
            return "0".to_string();
        }

        let text = value.mantissa.magnitude().to_string();
        let count = text.len() as i64;
        let before_point = count + value.exponent;
        let after_point = (-value.exponent).max(0);

        let body = if before_point > digits as i64 || after_point > 2 * digits as i64 {
            value.format_exponential(&text, form)
        } else {
            Self::format_plain(&text, value.exponent)
        };

        if value.is_negative() {
            format!("-{body}")
        } else {
            body
        }
    }

    /// Plain notation: digits with an optional decimal point.
    fn format_plain(text: &str, exponent: i64) -> String {
        if exponent >= 0 {
            let mut out = String::from(text);
            out.push_str(&"0".repeat(usize::try_from(exponent).unwrap_or(0)));
            return out;
        }

        let decimals = usize::try_from(-exponent).unwrap_or(0);
        if decimals < text.len() {
            let (int_part, frac_part) = text.split_at(text.len() - decimals);
            format!("{int_part}.{frac_part}")
        } else {
            let mut out = String::from("0.");
            out.push_str(&"0".repeat(decimals - text.len()));
            out.push_str(text);
            out
        }
    }

    /// Exponential notation in the requested FORM.
    fn format_exponential(&self, text: &str, form: NumericForm) -> String {
        // Exponent of the most significant digit.
        let adjusted = self.exponent + text.len() as i64 - 1;

        let (int_len, display_exp) = match form {
            NumericForm::Scientific => (1usize, adjusted),
            NumericForm::Engineering => {
                let shift = adjusted.rem_euclid(3);
                (usize::try_from(shift).unwrap_or(0) + 1, adjusted - shift)
            }
        };

        let int_len = int_len.min(text.len());
        let (int_part, frac_part) = text.split_at(int_len);
        let mut out = String::from(int_part);
        // Engineering form may need zero padding when the mantissa is short.
        let missing = match form {
            NumericForm::Scientific => 0,
            NumericForm::Engineering => {
                let want = usize::try_from(adjusted - display_exp).unwrap_or(0) + 1;
                want.saturating_sub(int_len)
            }
        };
        out.push_str(&"0".repeat(missing));
        if !frac_part.is_empty() {
            out.push('.');
            out.push_str(frac_part);
        }
        if display_exp >= 0 {
            out.push_str(&format!("E+{display_exp}"));
        } else {
            out.push_str(&format!("E-{}", -display_exp));
        }
        out
    }
}
