// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Conditions and the error message catalogue.
//!
//! A condition is a directory object keyed by `CONDITION`, `DESCRIPTION`,
//! `PROPAGATED` and friends. SYNTAX conditions carry a numeric code
//! `major.minor`: the major selects the message family (and the process
//! return code), the minor selects a secondary message whose `&n` markers
//! are substituted with the string form of the n-th ADDITIONAL entry.
//!
//! Errors travel through the evaluator as a `Result` error value; the
//! condition directory is materialised when a trap or a report needs it.

use crate::execution::number::NumericForm;
use crate::memory::{Memory, MemoryError};
use crate::object::ObjectData;
use crate::types::ObjRef;

/// Well-known condition names.
pub mod conditions {
    /// Syntax or runtime evaluation error.
    pub const SYNTAX: &str = "SYNTAX";
    /// External interrupt.
    pub const HALT: &str = "HALT";
    /// Reference to an unassigned variable.
    pub const NOVALUE: &str = "NOVALUE";
    /// Stream not ready.
    pub const NOTREADY: &str = "NOTREADY";
    /// Digits lost in arithmetic.
    pub const LOSTDIGITS: &str = "LOSTDIGITS";
    /// Command failure.
    pub const FAILURE: &str = "FAILURE";
    /// Command error.
    pub const ERROR: &str = "ERROR";
    /// User-defined condition family.
    pub const USER: &str = "USER";
    /// Catch-all trap.
    pub const ANY: &str = "ANY";
}

/// Error codes, packed as `major * 1000 + minor`.
///
/// The major is the message family and the process return code; minor 0
/// means no secondary message.
pub mod error_codes {
    /// Failure during initialization.
    pub const INITIALIZATION: u32 = 3_000;
    /// Failure during initialization: image not found or unusable.
    pub const INITIALIZATION_IMAGE: u32 = 3_901;
    /// Program interrupted.
    pub const PROGRAM_INTERRUPTED: u32 = 4_000;
    /// System resources exhausted.
    pub const SYSTEM_RESOURCES: u32 = 5_000;
    /// Unmatched comment or quote.
    pub const UNMATCHED_QUOTE: u32 = 6_002;
    /// WHEN or OTHERWISE expected.
    pub const WHEN_EXPECTED: u32 = 7_000;
    /// SELECT body must start with WHEN.
    pub const WHEN_EXPECTED_FIRST: u32 = 7_901;
    /// Unexpected THEN or ELSE.
    pub const UNEXPECTED_THEN: u32 = 8_000;
    /// ELSE without a matching IF THEN.
    pub const UNEXPECTED_ELSE: u32 = 8_902;
    /// Unexpected WHEN or OTHERWISE.
    pub const UNEXPECTED_WHEN: u32 = 9_000;
    /// WHEN outside a SELECT.
    pub const UNEXPECTED_WHEN_NO_SELECT: u32 = 9_901;
    /// OTHERWISE outside a SELECT.
    pub const UNEXPECTED_OTHERWISE: u32 = 9_902;
    /// Unexpected or unmatched END.
    pub const UNEXPECTED_END: u32 = 10_000;
    /// END with no matching DO or SELECT.
    pub const UNEXPECTED_END_NO_BLOCK: u32 = 10_901;
    /// END does not match its DO.
    pub const END_MISMATCH_DO: u32 = 10_902;
    /// END does not match its SELECT.
    pub const END_MISMATCH_SELECT: u32 = 10_903;
    /// END immediately follows a THEN.
    pub const END_AFTER_THEN: u32 = 10_904;
    /// Invalid character in program.
    pub const INVALID_CHARACTER: u32 = 13_000;
    /// Incomplete DO/LOOP/SELECT/IF.
    pub const INCOMPLETE_BLOCK: u32 = 14_000;
    /// DO or LOOP requires a matching END.
    pub const INCOMPLETE_DO: u32 = 14_901;
    /// SELECT requires a matching END.
    pub const INCOMPLETE_SELECT: u32 = 14_902;
    /// THEN requires a following instruction.
    pub const INCOMPLETE_THEN: u32 = 14_903;
    /// ELSE requires a following instruction.
    pub const INCOMPLETE_ELSE: u32 = 14_904;
    /// THEN expected.
    pub const THEN_EXPECTED: u32 = 18_000;
    /// An IF or WHEN requires a THEN clause.
    pub const THEN_EXPECTED_AFTER: u32 = 18_901;
    /// Label not found.
    pub const LABEL_NOT_FOUND: u32 = 16_000;
    /// Label "&1" not found.
    pub const LABEL_NOT_FOUND_NAME: u32 = 16_901;
    /// String or symbol expected.
    pub const STRING_OR_SYMBOL_EXPECTED: u32 = 19_000;
    /// Symbol expected after keyword &1.
    pub const SYMBOL_EXPECTED: u32 = 20_901;
    /// Invalid data on end of clause.
    pub const CLAUSE_END_DATA: u32 = 21_000;
    /// Invalid subkeyword &1.
    pub const INVALID_SUBKEYWORD: u32 = 25_901;
    /// Whole number expected.
    pub const INVALID_WHOLE_NUMBER: u32 = 26_000;
    /// Logical value not 0 or 1.
    pub const LOGICAL_VALUE: u32 = 34_901;
    /// Invalid expression.
    pub const INVALID_EXPRESSION: u32 = 35_000;
    /// Incorrect expression detected at "&1".
    pub const INVALID_EXPRESSION_AT: u32 = 35_901;
    /// Expression ended inside a binary operator.
    pub const INVALID_EXPRESSION_OPERATOR: u32 = 35_902;
    /// Unmatched left parenthesis.
    pub const UNMATCHED_PAREN: u32 = 36_000;
    /// Unexpected comma or right parenthesis.
    pub const UNEXPECTED_COMMA: u32 = 37_000;
    /// Incorrect call to routine.
    pub const INCORRECT_CALL: u32 = 40_000;
    /// Too many arguments on call to &1.
    pub const CALL_TOO_MANY_ARGS: u32 = 40_901;
    /// Missing argument &1 on call to &2.
    pub const CALL_MISSING_ARG: u32 = 40_902;
    /// Argument &1 must be a whole number.
    pub const CALL_BAD_WHOLE: u32 = 40_903;
    /// Bad arithmetic conversion: nonnumeric value "&1".
    pub const NONNUMERIC_VALUE: u32 = 41_901;
    /// Arithmetic overflow or underflow.
    pub const ARITHMETIC_OVERFLOW: u32 = 42_000;
    /// Arithmetic overflow; divisor must not be zero.
    pub const DIVIDE_BY_ZERO: u32 = 42_903;
    /// Could not find routine &1.
    pub const ROUTINE_NOT_FOUND: u32 = 43_901;
    /// Function &1 did not return data.
    pub const NO_DATA_RETURNED: u32 = 44_901;
    /// Invalid variable reference.
    pub const INVALID_VARIABLE: u32 = 46_000;
    /// INTERPRET data cannot contain directives.
    pub const INTERPRET_DIRECTIVE: u32 = 49_901;
    /// Invalid argument.
    pub const INVALID_ARGUMENT: u32 = 88_000;
    /// Argument &1 must be a positive whole number.
    pub const ARGUMENT_POSITIVE: u32 = 88_901;
    /// Argument &1 must be a nonnegative whole number.
    pub const ARGUMENT_NONNEGATIVE: u32 = 88_902;
    /// Missing argument; argument &1 is required.
    pub const ARGUMENT_REQUIRED: u32 = 88_903;
    /// Argument &1 must be of the &2 class.
    pub const ARGUMENT_CLASS: u32 = 88_904;
    /// Argument &1 is out of range for its type.
    pub const ARGUMENT_RANGE: u32 = 88_905;
    /// LEAVE/ITERATE outside a matching loop.
    pub const LEAVE_NOT_IN_LOOP: u32 = 28_901;
    /// Variable expected.
    pub const VARIABLE_EXPECTED: u32 = 89_000;
    /// Execution error.
    pub const EXECUTION: u32 = 98_000;
    /// Deadlock detected on guard scope.
    pub const EXECUTION_DEADLOCK: u32 = 98_901;
    /// Object "&1" does not understand message "&2".
    pub const NO_METHOD: u32 = 97_901;
    /// Translation error.
    pub const TRANSLATION: u32 = 99_000;
    /// Cyclic class dependency involving class "&1".
    pub const TRANSLATION_CYCLIC: u32 = 99_901;
    /// Directives are only allowed after the main code block.
    pub const TRANSLATION_DIRECTIVE: u32 = 99_902;
}

/// The message major (and process return code) of a packed error code.
#[inline]
#[must_use]
pub const fn major_code(code: u32) -> u32 {
    code / 1000
}

/// The secondary-message selector of a packed error code.
#[inline]
#[must_use]
pub const fn minor_code(code: u32) -> u32 {
    code % 1000
}

/// The `major.minor` display form of a packed error code.
#[must_use]
pub fn display_code(code: u32) -> String {
    let minor = minor_code(code);
    if minor == 0 {
        format!("{}", major_code(code))
    } else {
        format!("{}.{minor}", major_code(code))
    }
}

/// Primary message for an error major.
#[must_use]
pub fn primary_message(major: u32) -> &'static str {
    match major {
        3 => "Failure during initialization",
        4 => "Program interrupted",
        5 => "System resources exhausted",
        6 => "Unmatched \"/*\" or quote",
        7 => "WHEN or OTHERWISE expected",
        8 => "Unexpected THEN or ELSE",
        9 => "Unexpected WHEN or OTHERWISE",
        10 => "Unexpected or unmatched END",
        13 => "Invalid character in program",
        14 => "Incomplete DO/LOOP/SELECT/IF",
        16 => "Label not found",
        18 => "THEN expected",
        19 => "String or symbol expected",
        20 => "Symbol expected",
        21 => "Invalid data on end of clause",
        25 => "Invalid subkeyword found",
        26 => "Invalid whole number",
        28 => "Invalid LEAVE or ITERATE",
        34 => "Logical value not 0 or 1",
        35 => "Invalid expression",
        36 => "Unmatched \"(\" or \"[\" in expression",
        37 => "Unexpected \",\", \")\", or \"]\"",
        40 => "Incorrect call to routine",
        41 => "Bad arithmetic conversion",
        42 => "Arithmetic overflow/underflow",
        43 => "Routine not found",
        44 => "Function or message did not return data",
        46 => "Invalid variable reference",
        49 => "Interpretation error",
        88 => "Invalid argument",
        89 => "Variable expected",
        97 => "Object method not found",
        98 => "Execution error",
        99 => "Translation error",
        _ => "Unknown error",
    }
}

/// Secondary message template for a packed code; `&n` markers substitute
/// the n-th ADDITIONAL entry.
#[must_use]
pub fn secondary_message(code: u32) -> Option<&'static str> {
    use error_codes as e;
    Some(match code {
        e::INITIALIZATION_IMAGE => "The startup image is missing or unusable",
        e::WHEN_EXPECTED_FIRST => "SELECT body must begin with a WHEN clause",
        e::UNEXPECTED_ELSE => "An ELSE clause has no corresponding IF THEN",
        e::UNEXPECTED_WHEN_NO_SELECT => "A WHEN clause must be contained within a SELECT",
        e::UNEXPECTED_OTHERWISE => "An OTHERWISE clause must be contained within a SELECT",
        e::UNEXPECTED_END_NO_BLOCK => "An END clause has no corresponding DO, LOOP, or SELECT",
        e::END_MISMATCH_DO => "The name \"&1\" on an END clause does not match its DO or LOOP",
        e::END_MISMATCH_SELECT => "An END clause cannot name the SELECT it closes",
        e::END_AFTER_THEN => "An END clause cannot immediately follow a THEN",
        e::INCOMPLETE_DO => "A DO or LOOP on line &1 requires a matching END",
        e::INCOMPLETE_SELECT => "A SELECT on line &1 requires a matching END",
        e::INCOMPLETE_THEN => "A THEN requires a following instruction",
        e::INCOMPLETE_ELSE => "An ELSE requires a following instruction",
        e::LABEL_NOT_FOUND_NAME => "Label \"&1\" not found",
        e::THEN_EXPECTED_AFTER => "An IF or WHEN clause requires a THEN",
        e::SYMBOL_EXPECTED => "Symbol expected after the &1 keyword",
        e::INVALID_SUBKEYWORD => "Invalid subkeyword \"&1\"",
        e::LOGICAL_VALUE => "Value must be exactly \"0\" or \"1\"; found \"&1\"",
        e::LEAVE_NOT_IN_LOOP => "LEAVE or ITERATE is not in a loop, or its name does not match a loop",
        e::INVALID_EXPRESSION_AT => "Incorrect expression detected at \"&1\"",
        e::INVALID_EXPRESSION_OPERATOR => "An expression cannot end with an operator",
        e::CALL_TOO_MANY_ARGS => "Too many arguments on call to &1",
        e::CALL_MISSING_ARG => "Missing argument &1 on call to &2",
        e::CALL_BAD_WHOLE => "Argument &1 must be a whole number",
        e::NONNUMERIC_VALUE => "Nonnumeric value (\"&1\") used in arithmetic operation",
        e::DIVIDE_BY_ZERO => "Arithmetic overflow; divisor must not be zero",
        e::ROUTINE_NOT_FOUND => "Could not find routine \"&1\"",
        e::NO_DATA_RETURNED => "Function \"&1\" did not return data",
        e::INTERPRET_DIRECTIVE => "INTERPRET data cannot contain directives",
        e::ARGUMENT_POSITIVE => "Argument &1 must be a positive whole number",
        e::ARGUMENT_NONNEGATIVE => "Argument &1 must be a nonnegative whole number",
        e::ARGUMENT_REQUIRED => "Missing argument; argument &1 is required",
        e::ARGUMENT_CLASS => "Argument &1 must be of the &2 class",
        e::ARGUMENT_RANGE => "Argument &1 is out of range for its type",
        e::EXECUTION_DEADLOCK => "Deadlock detected waiting on a guarded scope",
        e::NO_METHOD => "Object \"&1\" does not understand message \"&2\"",
        e::TRANSLATION_CYCLIC => "Cyclic class dependency involving class \"&1\"",
        e::TRANSLATION_DIRECTIVE => "Directives are only allowed after the main code block",
        _ => return None,
    })
}

/// Replace `&1`..`&9` markers with additional-information strings.
#[must_use]
pub fn substitute_message(template: &str, additional: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '&' {
            if let Some(d) = chars.peek().and_then(|p| p.to_digit(10)) {
                chars.next();
                let index = d as usize;
                if index >= 1 {
                    if let Some(text) = additional.get(index - 1) {
                        out.push_str(text);
                    }
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// A syntax error travelling up the evaluator before it is objectified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Packed `major * 1000 + minor` code.
    pub code: u32,
    /// Additional information, already in string form.
    pub additional: Vec<String>,
    /// Source line where the error was detected, 0 when unknown.
    pub line: usize,
    /// Program name, filled as the error crosses the frame that knows it.
    pub program: String,
}

impl SyntaxError {
    /// A syntax error with no substitution data.
    #[must_use]
    pub fn new(code: u32) -> Self {
        Self {
            code,
            additional: Vec::new(),
            line: 0,
            program: String::new(),
        }
    }

    /// A syntax error with substitution data.
    #[must_use]
    pub fn with(code: u32, additional: Vec<String>) -> Self {
        Self {
            code,
            additional,
            line: 0,
            program: String::new(),
        }
    }

    /// Attach a source line if none is recorded yet.
    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line == 0 {
            self.line = line;
        }
        self
    }

    /// The fully substituted secondary message, if the code has one.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        secondary_message(self.code).map(|t| substitute_message(t, &self.additional))
    }
}

impl core::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Error {}: {}",
            display_code(self.code),
            self.message()
                .unwrap_or_else(|| primary_message(major_code(self.code)).to_string())
        )
    }
}

/// Fatal failures that bypass normal condition propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// Recursive string conversion inside error formatting.
    RecursiveString,
    /// A native callback threw while the kernel lock was lost.
    LostKernel,
    /// Unrecoverable internal failure.
    Internal,
}

/// The central evaluator error type.
///
/// One mechanism, applied uniformly: every evaluation path returns
/// `Result<_, RexxError>` and unwinds by propagating the error value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RexxError {
    /// A SYNTAX condition (compile-time or runtime evaluation failure).
    Syntax(SyntaxError),
    /// A raised non-SYNTAX condition with its directory object.
    Condition {
        /// The condition name (HALT, NOVALUE, USER ...).
        name: Box<str>,
        /// The condition directory.
        object: ObjRef,
    },
    /// Storage exhaustion.
    Storage,
    /// Fatal failure outside the condition system.
    Fatal(FatalKind),
    /// EXIT instruction: not a failure, but it unwinds every frame of the
    /// program through the same single mechanism.
    Exit(ObjRef),
}

impl RexxError {
    /// The condition name this error raises.
    #[must_use]
    pub fn condition_name(&self) -> &str {
        match self {
            Self::Syntax(_) | Self::Storage | Self::Fatal(_) | Self::Exit(_) => conditions::SYNTAX,
            Self::Condition { name, .. } => name,
        }
    }

    /// The process return code for an untrapped error.
    #[must_use]
    pub const fn return_code(&self) -> u32 {
        match self {
            Self::Syntax(e) => major_code(e.code),
            Self::Condition { .. } => major_code(error_codes::PROGRAM_INTERRUPTED),
            Self::Storage => major_code(error_codes::SYSTEM_RESOURCES),
            Self::Fatal(_) => major_code(error_codes::EXECUTION),
            Self::Exit(_) => 0,
        }
    }
}

impl From<MemoryError> for RexxError {
    fn from(_: MemoryError) -> Self {
        Self::Storage
    }
}

impl From<SyntaxError> for RexxError {
    fn from(e: SyntaxError) -> Self {
        Self::Syntax(e)
    }
}

impl core::fmt::Display for RexxError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Syntax(e) => write!(f, "{e}"),
            Self::Condition { name, .. } => write!(f, "condition {name}"),
            Self::Storage => write!(f, "failed to allocate storage"),
            Self::Fatal(kind) => write!(f, "fatal interpreter error: {kind:?}"),
            Self::Exit(_) => write!(f, "program exit"),
        }
    }
}

/// The string form of an object for message substitution.
///
/// The `requesting_string` flag guards recursive conversion: a re-entrant
/// request reroutes to the object's default name.
#[must_use]
pub fn stringify_for_message(memory: &Memory, r: ObjRef, requesting_string: &mut bool) -> String {
    if r.is_null() {
        return default_name(memory, r);
    }
    if *requesting_string {
        return default_name(memory, r);
    }
    *requesting_string = true;
    let text = match &memory.cell(r).data {
        ObjectData::String(s) => s.to_string(),
        ObjectData::Number(n) => n.format(crate::activity::DEFAULT_DIGITS, NumericForm::Scientific),
        _ => default_name(memory, r),
    };
    *requesting_string = false;
    text
}

/// The default name of an object ("The NIL object", "an Array" ...).
#[must_use]
pub fn default_name(memory: &Memory, r: ObjRef) -> String {
    if r.is_null() {
        return "The NIL object".to_string();
    }
    match &memory.cell(r).data {
        ObjectData::Nil => "The NIL object".to_string(),
        ObjectData::Instance(instance) => {
            let class_name = match &memory.cell(instance.class).data {
                ObjectData::Class(class) => class.name.to_string(),
                _ => "Object".to_string(),
            };
            format!("a {class_name}")
        }
        data => format!("a {}", data.tag().class_name()),
    }
}

/// Build the condition directory for a non-SYNTAX condition.
///
/// # Errors
///
/// Propagates allocation failure.
pub fn create_condition_object(
    memory: &mut Memory,
    condition: &str,
    description: &str,
    additional: ObjRef,
    result: ObjRef,
) -> Result<ObjRef, MemoryError> {
    let object = memory.new_directory()?;
    memory.hold(object);
    let name = memory.new_string(condition)?;
    memory.dir_put(object, "CONDITION", name);
    let description = memory.new_string(description)?;
    memory.dir_put(object, "DESCRIPTION", description);
    let false_obj = memory.false_object();
    memory.dir_put(object, "PROPAGATED", false_obj);
    if !additional.is_null() {
        memory.dir_put(object, "ADDITIONAL", additional);
    }
    if !result.is_null() {
        memory.dir_put(object, "RESULT", result);
    }
    Ok(object)
}

/// Build the condition directory for a SYNTAX condition.
///
/// # Errors
///
/// Propagates allocation failure.
pub fn create_syntax_condition(
    memory: &mut Memory,
    error: &SyntaxError,
) -> Result<ObjRef, MemoryError> {
    let object = memory.new_directory()?;
    memory.hold(object);

    let name = memory.new_string(conditions::SYNTAX)?;
    memory.dir_put(object, "CONDITION", name);
    let rc = memory.new_number(crate::execution::number::RexxNumber::from_integer(
        i64::from(major_code(error.code)),
    ))?;
    memory.dir_put(object, "RC", rc);
    let code = memory.new_string(&display_code(error.code))?;
    memory.dir_put(object, "CODE", code);
    let description = memory.new_string(primary_message(major_code(error.code)))?;
    memory.dir_put(object, "DESCRIPTION", description);
    if let Some(text) = error.message() {
        let message = memory.new_string(&text)?;
        memory.dir_put(object, "MESSAGE", message);
    }
    if !error.program.is_empty() {
        let program = memory.new_string(&error.program)?;
        memory.dir_put(object, "PROGRAM", program);
    }
    if error.line != 0 {
        let position = memory.new_number(crate::execution::number::RexxNumber::from_integer(
            error.line as i64,
        ))?;
        memory.dir_put(object, "POSITION", position);
    }
    let additional: Result<Vec<ObjRef>, MemoryError> = error
        .additional
        .iter()
        .map(|text| memory.new_string(text))
        .collect();
    let additional = memory.new_array(additional?)?;
    memory.dir_put(object, "ADDITIONAL", additional);
    let false_obj = memory.false_object();
    memory.dir_put(object, "PROPAGATED", false_obj);

    Ok(object)
}

/// Mark a condition directory as propagated.
pub fn mark_propagated(memory: &mut Memory, condition: ObjRef) {
    let true_obj = memory.true_object();
    memory.dir_put(condition, "PROPAGATED", true_obj);
}
