// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Program source access.
//!
//! The parser accepts source as an array of lines, a single buffer, or a
//! file; all three normalise into a line vector. Lines are delimited by LF
//! or CRLF.

use std::fs;
use std::io;
use std::path::Path;

/// A program's source text, normalised to lines.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    name: Box<str>,
    lines: Vec<Box<str>>,
}

impl ProgramSource {
    /// Build from an array of lines.
    #[must_use]
    pub fn from_lines(name: &str, lines: &[&str]) -> Self {
        Self {
            name: name.into(),
            lines: lines.iter().map(|l| Box::from(*l)).collect(),
        }
    }

    /// Build from a single buffer; splits on LF, strips CR.
    #[must_use]
    pub fn from_buffer(name: &str, buffer: &str) -> Self {
        Self {
            name: name.into(),
            lines: buffer
                .split('\n')
                .map(|l| Box::from(l.strip_suffix('\r').unwrap_or(l)))
                .collect(),
        }
    }

    /// Build from a file.
    ///
    /// # Errors
    ///
    /// Propagates the read failure.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let buffer = fs::read_to_string(path)?;
        let name = path.to_string_lossy();
        Ok(Self::from_buffer(&name, &buffer))
    }

    /// The program name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The source lines.
    #[must_use]
    pub fn lines(&self) -> &[Box<str>] {
        &self.lines
    }

    /// One source line by 1-based number.
    #[must_use]
    pub fn line(&self, number: usize) -> Option<&str> {
        if number == 0 {
            return None;
        }
        self.lines.get(number - 1).map(AsRef::as_ref)
    }
}
