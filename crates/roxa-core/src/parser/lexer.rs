// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Clause extraction and tokenisation.
//!
//! A clause is a semicolon-or-newline-delimited token sequence. The lexer
//! works a line at a time, folding continuations (a trailing comma) into
//! one clause and skipping `/* */` comments (nestable) and `--` line
//! comments. White space between two tokens becomes a real [`Blank`]
//! token; the expression parser decides whether it is the implicit
//! concatenation operator or noise.
//!
//! [`Blank`]: TokenKind::Blank

use crate::activity::condition::{SyntaxError, error_codes};

use super::source::ProgramSource;

/// Operator characters and digraphs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorKind {
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `//`
    DoubleSlash,
    /// `**`
    DoubleStar,
    /// `||`
    Concat,
    /// `&`
    And,
    /// `|`
    Or,
    /// `&&`
    Xor,
    /// `=`
    Equal,
    /// `\=`, `<>`, `><`
    NotEqual,
    /// `==`
    StrictEqual,
    /// `\==`
    StrictNotEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `>>`
    StrictGreater,
    /// `>>=`
    StrictGreaterEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `<<`
    StrictLess,
    /// `<<=`
    StrictLessEqual,
    /// Prefix `\`
    Not,
}

/// One token of a clause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// A symbol, uppercased (variables, keywords, numbers, dotted names).
    Symbol(Box<str>),
    /// A quoted literal, content only.
    Literal(Box<str>),
    /// An operator character or digraph.
    Operator(OperatorKind),
    /// Significant white space between two tokens.
    Blank,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `~`
    Tilde,
    /// `~~`
    DoubleTilde,
    /// `::` directive lead-in.
    DirectiveStart,
}

/// A token with its source position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// The token kind and payload.
    pub kind: TokenKind,
    /// 1-based source line.
    pub line: usize,
}

/// A complete clause with a cursor.
///
/// The cursor supports reclaim: a callee that consumed tokens and decided
/// the clause means something else resets to a saved mark and the whole
/// clause is reinterpreted.
#[derive(Clone, Debug, Default)]
pub struct Clause {
    /// The tokens of the clause.
    pub tokens: Vec<Token>,
    /// The 1-based line the clause starts on.
    pub line: usize,
    at: usize,
}

impl Clause {
    /// Whether any tokens remain.
    #[must_use]
    pub fn at_end(&self) -> bool {
        self.at >= self.tokens.len()
    }

    /// Current cursor position, usable with [`Clause::reset`].
    #[must_use]
    pub const fn mark(&self) -> usize {
        self.at
    }

    /// Reset the cursor to a saved mark (the reclaim operation).
    pub fn reset(&mut self, mark: usize) {
        self.at = mark;
    }

    /// Look at the next token without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.at)
    }

    /// Look ahead past the cursor.
    #[must_use]
    pub fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.at + ahead)
    }

    /// Consume and return the next token.
    pub fn take(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.at);
        if token.is_some() {
            self.at += 1;
        }
        token
    }

    /// Consume a blank token if one is next.
    pub fn skip_blank(&mut self) {
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Blank)) {
            self.at += 1;
        }
    }

    /// Consume the next token when it is the given symbol (caseless).
    pub fn accept_symbol(&mut self, word: &str) -> bool {
        self.skip_blank();
        if let Some(Token {
            kind: TokenKind::Symbol(s),
            ..
        }) = self.peek()
        {
            if s.as_ref() == word {
                self.at += 1;
                return true;
            }
        }
        false
    }

    /// The line of the token under the cursor, or the clause line.
    #[must_use]
    pub fn current_line(&self) -> usize {
        self.peek().map_or(self.line, |t| t.line)
    }
}

/// Character classification for symbol characters.
fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '!' | '?')
}

/// Whether a symbol is a valid variable name start.
#[must_use]
pub fn is_variable_symbol(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || matches!(c, '_' | '!' | '?') => {}
        _ => return false,
    }
    true
}

/// The clause lexer: pulls tokens on demand from the source.
pub struct Lexer<'a> {
    source: &'a ProgramSource,
    line_index: usize,
    column: usize,
    /// A clause pushed back whole for reinterpretation.
    reclaimed: Option<Clause>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over a program source.
    #[must_use]
    pub fn new(source: &'a ProgramSource) -> Self {
        Self {
            source,
            line_index: 0,
            column: 0,
            reclaimed: None,
        }
    }

    /// Push an entire clause back; the next [`Self::next_clause`] returns
    /// it with a fresh cursor.
    pub fn reclaim_clause(&mut self, mut clause: Clause) {
        clause.reset(0);
        self.reclaimed = Some(clause);
    }

    fn current_line(&self) -> Option<&'a str> {
        self.source.lines().get(self.line_index).map(AsRef::as_ref)
    }

    fn rest(&self) -> Option<&'a str> {
        self.current_line().map(|l| &l[self.column.min(l.len())..])
    }

    fn advance_line(&mut self) {
        self.line_index += 1;
        self.column = 0;
    }

    /// Skip comments and horizontal white space.
    ///
    /// Returns true when white space or a comment was skipped (the blank is
    /// significant), and an error for an unterminated comment.
    fn skip_noise(&mut self) -> Result<bool, SyntaxError> {
        let mut skipped = false;
        loop {
            let Some(rest) = self.rest() else {
                return Ok(skipped);
            };
            if rest.is_empty() {
                return Ok(skipped);
            }
            let mut chars = rest.char_indices();
            match chars.next() {
                Some((_, c)) if c == ' ' || c == '\t' => {
                    skipped = true;
                    self.column += c.len_utf8();
                }
                Some((_, '-')) if rest.starts_with("--") => {
                    // Line comment: the rest of the line is noise.
                    skipped = true;
                    let line = self.current_line().map_or(0, str::len);
                    self.column = line;
                }
                Some((_, '/')) if rest.starts_with("/*") => {
                    skipped = true;
                    self.skip_comment()?;
                }
                _ => return Ok(skipped),
            }
        }
    }

    /// Skip a (nestable) block comment; the opener is at the cursor.
    fn skip_comment(&mut self) -> Result<(), SyntaxError> {
        let start_line = self.line_index + 1;
        let mut depth = 0usize;
        loop {
            let Some(rest) = self.rest() else {
                return Err(
                    SyntaxError::new(error_codes::UNMATCHED_QUOTE).at_line(start_line)
                );
            };
            if rest.starts_with("/*") {
                depth += 1;
                self.column += 2;
            } else if rest.starts_with("*/") {
                depth -= 1;
                self.column += 2;
                if depth == 0 {
                    return Ok(());
                }
            } else if rest.is_empty() {
                self.advance_line();
            } else {
                self.column += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
    }

    /// Lex a quoted literal; the opening quote is at the cursor.
    fn scan_literal(&mut self, quote: char) -> Result<TokenKind, SyntaxError> {
        let line = self.line_index + 1;
        self.column += 1;
        let mut text = String::new();
        loop {
            let Some(rest) = self.rest() else {
                return Err(SyntaxError::new(error_codes::UNMATCHED_QUOTE).at_line(line));
            };
            let mut chars = rest.chars();
            match chars.next() {
                None => {
                    // Literals do not span lines.
                    return Err(SyntaxError::new(error_codes::UNMATCHED_QUOTE).at_line(line));
                }
                Some(c) if c == quote => {
                    self.column += 1;
                    // A doubled quote is an embedded quote character.
                    if self.rest().is_some_and(|r| r.starts_with(quote)) {
                        self.column += 1;
                        text.push(quote);
                    } else {
                        return Ok(TokenKind::Literal(text.into()));
                    }
                }
                Some(c) => {
                    self.column += c.len_utf8();
                    text.push(c);
                }
            }
        }
    }

    /// Lex a symbol; the first character is at the cursor.
    fn scan_symbol(&mut self) -> TokenKind {
        let rest = self.rest().unwrap_or("");
        let end = rest
            .char_indices()
            .find(|(_, c)| !is_symbol_char(*c))
            .map_or(rest.len(), |(i, _)| i);
        let symbol: String = rest[..end].to_ascii_uppercase();
        self.column += end;
        TokenKind::Symbol(symbol.into())
    }

    /// Lex one operator or special character.
    fn scan_special(&mut self) -> Result<TokenKind, SyntaxError> {
        use OperatorKind as Op;
        let rest = self.rest().unwrap_or("");
        let take = |lexer: &mut Self, n: usize, kind: TokenKind| {
            lexer.column += n;
            Ok(kind)
        };

        // Longest digraphs first.
        for (text, kind) in [
            ("\\==", TokenKind::Operator(Op::StrictNotEqual)),
            (">>=", TokenKind::Operator(Op::StrictGreaterEqual)),
            ("<<=", TokenKind::Operator(Op::StrictLessEqual)),
            ("**", TokenKind::Operator(Op::DoubleStar)),
            ("//", TokenKind::Operator(Op::DoubleSlash)),
            ("||", TokenKind::Operator(Op::Concat)),
            ("&&", TokenKind::Operator(Op::Xor)),
            ("==", TokenKind::Operator(Op::StrictEqual)),
            ("\\=", TokenKind::Operator(Op::NotEqual)),
            ("<>", TokenKind::Operator(Op::NotEqual)),
            ("><", TokenKind::Operator(Op::NotEqual)),
            (">=", TokenKind::Operator(Op::GreaterEqual)),
            ("<=", TokenKind::Operator(Op::LessEqual)),
            (">>", TokenKind::Operator(Op::StrictGreater)),
            ("<<", TokenKind::Operator(Op::StrictLess)),
            ("~~", TokenKind::DoubleTilde),
            ("::", TokenKind::DirectiveStart),
        ] {
            if rest.starts_with(text) {
                return take(self, text.len(), kind);
            }
        }

        let c = rest.chars().next().unwrap_or(' ');
        let kind = match c {
            '+' => TokenKind::Operator(Op::Plus),
            '-' => TokenKind::Operator(Op::Minus),
            '*' => TokenKind::Operator(Op::Star),
            '/' => TokenKind::Operator(Op::Slash),
            '%' => TokenKind::Operator(Op::Percent),
            '&' => TokenKind::Operator(Op::And),
            '|' => TokenKind::Operator(Op::Or),
            '=' => TokenKind::Operator(Op::Equal),
            '>' => TokenKind::Operator(Op::Greater),
            '<' => TokenKind::Operator(Op::Less),
            '\\' => TokenKind::Operator(Op::Not),
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '~' => TokenKind::Tilde,
            _ => {
                return Err(SyntaxError::with(
                    error_codes::INVALID_CHARACTER,
                    vec![c.to_string()],
                )
                .at_line(self.line_index + 1));
            }
        };
        take(self, c.len_utf8(), kind)
    }

    /// Extract the next clause, or `None` at end of source.
    ///
    /// # Errors
    ///
    /// Propagates lexical errors (bad characters, unmatched quotes).
    pub fn next_clause(&mut self) -> Result<Option<Clause>, SyntaxError> {
        if let Some(clause) = self.reclaimed.take() {
            return Ok(Some(clause));
        }

        let mut tokens: Vec<Token> = Vec::new();
        let mut clause_line = 0usize;

        loop {
            if self.line_index >= self.source.lines().len() {
                break;
            }
            let blank = self.skip_noise()?;
            if blank && !tokens.is_empty() {
                let line = self.line_index + 1;
                if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Blank)) {
                    tokens.push(Token {
                        kind: TokenKind::Blank,
                        line,
                    });
                }
            }

            let Some(rest) = self.rest() else { break };
            if rest.is_empty() {
                // End of line ends the clause, unless a continuation comma
                // was the last real token.
                self.advance_line();
                match tokens.last().map(|t| t.kind.clone()) {
                    Some(TokenKind::Comma) => {
                        tokens.pop();
                        continue;
                    }
                    Some(TokenKind::Blank) => {
                        tokens.pop();
                        if matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Comma)) {
                            tokens.pop();
                            continue;
                        }
                        if tokens.is_empty() {
                            continue;
                        }
                        break;
                    }
                    Some(_) => break,
                    None => continue,
                }
            }

            let line = self.line_index + 1;
            let c = rest.chars().next().unwrap_or(';');
            if c == ';' {
                self.column += 1;
                if tokens.is_empty() {
                    continue;
                }
                break;
            }

            let kind = if c == '\'' || c == '"' {
                self.scan_literal(c)?
            } else if is_symbol_char(c) {
                self.scan_symbol()
            } else {
                self.scan_special()?
            };

            if clause_line == 0 {
                clause_line = line;
            }
            tokens.push(Token { kind, line });
        }

        // Trim a trailing blank.
        while matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Blank)) {
            tokens.pop();
        }

        if tokens.is_empty() {
            return Ok(None);
        }
        Ok(Some(Clause {
            line: clause_line,
            tokens,
            at: 0,
        }))
    }
}
