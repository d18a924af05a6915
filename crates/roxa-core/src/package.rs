// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Packages: the unit of translated source.
//!
//! A package owns the main code block, the `::ROUTINE` and `::CLASS`
//! definitions with their install order, and the directive metadata
//! (`::REQUIRES`, `::LIBRARY`, `::RESOURCE`, `::OPTIONS`). Loaded packages
//! are collector roots: every literal allocated during translation is
//! reachable through them.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::instructions::RexxCode;
use crate::types::ObjRef;

/// Sentinel marking serialised programs, expected on the second line.
pub const COMPILED_SENTINEL: &str = "/**/@REXX@";

/// A translated program with its directives applied.
#[derive(Debug)]
pub struct Package {
    /// The program name.
    pub name: Box<str>,
    /// The main code block (the clauses before the first directive).
    pub main: Arc<RexxCode>,
    /// `::ROUTINE` objects by name.
    pub routines: BTreeMap<Box<str>, ObjRef>,
    /// The PUBLIC subset of `routines`.
    pub public_routines: BTreeMap<Box<str>, ObjRef>,
    /// `::CLASS` objects in dependency-resolved install order.
    pub classes: Vec<(Box<str>, ObjRef)>,
    /// `::REQUIRES` program names in source order.
    pub requires: Vec<Box<str>>,
    /// `::LIBRARY` names in source order.
    pub libraries: Vec<Box<str>>,
    /// `::RESOURCE` bodies by name.
    pub resources: BTreeMap<Box<str>, Vec<Box<str>>>,
    /// `::OPTIONS` words in source order.
    pub options: Vec<Box<str>>,
}

impl Package {
    /// Look up a routine defined in this package.
    #[must_use]
    pub fn find_routine(&self, name: &str) -> Option<ObjRef> {
        self.routines.get(name).copied()
    }

    /// Look up a class defined in this package.
    #[must_use]
    pub fn find_class(&self, name: &str) -> Option<ObjRef> {
        self.classes
            .iter()
            .find(|(class_name, _)| class_name.as_ref() == name)
            .map(|(_, class)| *class)
    }

    /// Report every object reference owned by the package.
    pub fn for_each_ref(&self, visit: &mut dyn FnMut(ObjRef)) {
        for literal in self.main.literals() {
            visit(*literal);
        }
        for routine in self.routines.values() {
            visit(*routine);
        }
        for (_, class) in &self.classes {
            visit(*class);
        }
    }

    /// Serialise the package to its transportable source form.
    ///
    /// The second line carries [`COMPILED_SENTINEL`]; a loader that finds
    /// it restores by re-translating the payload, which evaluates
    /// equivalently to the original program.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str("/* ");
        out.push_str(&self.name);
        out.push_str(" */\n");
        out.push_str(COMPILED_SENTINEL);
        out.push('\n');
        for line in &self.main.source_lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Recognise serialised program text: the sentinel on the second line.
    ///
    /// Returns the payload to re-translate.
    #[must_use]
    pub fn precompiled_payload(source: &str) -> Option<String> {
        let mut lines = source.lines();
        let _first = lines.next()?;
        if lines.next()? != COMPILED_SENTINEL {
            return None;
        }
        Some(lines.collect::<Vec<_>>().join("\n"))
    }
}
