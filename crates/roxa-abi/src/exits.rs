// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! System exit codes.
//!
//! An interpreter instance keeps a table of exit handlers indexed by these
//! codes; each slot holds an entry point plus an enabled flag. A handler
//! that reports an error is disabled before the error is raised so a failing
//! I/O exit cannot re-enter itself while the failure is being traced.

/// Exit event codes, indexing the per-instance handler table.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExitCode {
    /// Interpreter instance initialisation.
    Initialisation = 1,
    /// Interpreter instance termination.
    Termination = 2,
    /// SAY and trace output.
    SayTraceOutput = 3,
    /// Terminal input (PULL / PARSE PULL from the terminal).
    TerminalInput = 4,
    /// External function call.
    FunctionCall = 5,
    /// Scripting function call.
    ScriptingCall = 6,
    /// Host command call.
    CommandCall = 7,
    /// Queue a line (push / queue).
    QueuePush = 8,
    /// Pull a line from the queue.
    QueuePull = 9,
    /// Query the queue size.
    QueueSize = 10,
    /// Query the current queue name.
    QueueName = 11,
    /// Poll for a pending halt request.
    HaltTest = 12,
    /// Clear a pending halt request.
    HaltClear = 13,
    /// Poll for an external trace toggle.
    TraceTest = 14,
    /// NOVALUE variable reference interception.
    NoValue = 15,
    /// VALUE() external variable access.
    Value = 16,
}

impl ExitCode {
    /// Number of exit table slots (highest code + 1).
    pub const SLOTS: usize = 17;

    /// All exit codes in table order.
    pub const ALL: [Self; 16] = [
        Self::Initialisation,
        Self::Termination,
        Self::SayTraceOutput,
        Self::TerminalInput,
        Self::FunctionCall,
        Self::ScriptingCall,
        Self::CommandCall,
        Self::QueuePush,
        Self::QueuePull,
        Self::QueueSize,
        Self::QueueName,
        Self::HaltTest,
        Self::HaltClear,
        Self::TraceTest,
        Self::NoValue,
        Self::Value,
    ];

    /// The handler table slot for this code.
    #[inline]
    #[must_use]
    pub const fn slot(self) -> usize {
        self as usize
    }
}

/// Handler completion codes.
///
/// `NotHandled` falls back to the interpreter's default behaviour; `Error`
/// raises the failing-exit condition and disables the slot.
#[repr(i8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitResult {
    /// The handler serviced the event.
    Handled = 0,
    /// The handler declined; use default processing.
    NotHandled = 1,
    /// The handler failed.
    Error = -1,
}
