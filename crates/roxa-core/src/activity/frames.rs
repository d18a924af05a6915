// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Activation frames and the per-activity frame stack.
//!
//! Four frame kinds share the stack: interpreted Rexx code, native callout
//! contexts, internal method calls, and the parser's compile frame (which
//! only exists so translate-time errors can report a source location). A
//! stack-base marker sits underneath everything and refuses to pop.
//!
//! The observable behaviour of a frame is its stack-frame descriptor
//! (type string, name, line, trace line), not its representation.

use std::sync::Arc;

use crate::execution::RexxActivation;
use crate::instructions::RexxCode;
use crate::memory::{Memory, MemoryError};
use crate::native::NativeActivation;
use crate::object::{ObjectData, StackFrameData, frame_types};
use crate::types::ObjRef;

use super::NumericSettings;

/// Allocation quantum for the frame stack.
pub const FRAME_QUANTUM: usize = 32;

/// Marker text used when no source is retained for a frame.
pub const NO_SOURCE_MARKER: &str = "Source unavailable";

/// An internal call frame: a primitive method invoked from the runtime.
#[derive(Debug)]
pub struct InternalFrame {
    /// The invoked message name.
    pub name: Box<str>,
    /// The method object, or null.
    pub method: ObjRef,
    /// The receiver.
    pub receiver: ObjRef,
    /// Arguments passed to the call.
    pub arguments: Vec<ObjRef>,
}

/// A compile frame: a source unit being translated.
#[derive(Debug)]
pub struct CompileFrame {
    /// The program name being translated.
    pub name: Box<str>,
    /// The line currently being parsed.
    pub line: usize,
    /// The text of that line, for the traceback.
    pub source_line: Box<str>,
}

/// One element of the activation stack.
#[derive(Debug)]
pub enum ActivationFrame {
    /// The stack-base marker; never popped.
    Base,
    /// Interpreted Rexx code.
    Rexx(Box<RexxActivation>),
    /// A native callout context.
    Native(Box<NativeActivation>),
    /// An internal method call.
    Internal(InternalFrame),
    /// A parser frame for translate-time errors.
    Compile(CompileFrame),
}

impl ActivationFrame {
    /// The message or program name this frame answers for tracebacks.
    #[must_use]
    pub fn message_name(&self) -> &str {
        match self {
            Self::Base => "",
            Self::Rexx(activation) => &activation.name,
            Self::Native(activation) => &activation.name,
            Self::Internal(frame) => &frame.name,
            Self::Compile(frame) => &frame.name,
        }
    }

    /// The executable object backing this frame, or null.
    #[must_use]
    pub fn executable(&self) -> ObjRef {
        match self {
            Self::Rexx(activation) => activation.executable,
            Self::Native(activation) => activation.executable,
            Self::Internal(frame) => frame.method,
            Self::Base | Self::Compile(_) => ObjRef::NULL,
        }
    }

    /// The frame type string reported in stack frames.
    #[must_use]
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::Base => frame_types::PROGRAM,
            Self::Rexx(activation) => activation.frame_type,
            Self::Native(_) => frame_types::ROUTINE,
            Self::Internal(_) => frame_types::INTERNAL_CALL,
            Self::Compile(_) => frame_types::PARSE,
        }
    }

    /// The source line this frame is executing, `usize::MAX` when unknown.
    #[must_use]
    pub fn current_line(&self) -> usize {
        match self {
            Self::Rexx(activation) => activation.line,
            Self::Compile(frame) => frame.line,
            Self::Base | Self::Native(_) | Self::Internal(_) => usize::MAX,
        }
    }

    /// The interpreted code behind this frame, if any.
    #[must_use]
    pub fn code(&self) -> Option<&Arc<RexxCode>> {
        match self {
            Self::Rexx(activation) => Some(&activation.code),
            _ => None,
        }
    }

    /// Report every object reference held by this frame.
    pub fn for_each_ref(&self, visit: &mut dyn FnMut(ObjRef)) {
        let mut see = |r: ObjRef| {
            if !r.is_null() {
                visit(r);
            }
        };
        match self {
            Self::Base | Self::Compile(_) => {}
            Self::Rexx(activation) => activation.for_each_ref(visit),
            Self::Native(activation) => activation.for_each_ref(visit),
            Self::Internal(frame) => {
                see(frame.method);
                see(frame.receiver);
                frame.arguments.iter().copied().for_each(&mut see);
            }
        }
    }

    /// Build the traceback descriptor object for this frame.
    ///
    /// # Errors
    ///
    /// Propagates allocation failure.
    pub fn create_stack_frame(&self, memory: &mut Memory) -> Result<ObjRef, MemoryError> {
        let line = self.current_line();
        let trace_line: Box<str> = match self {
            Self::Rexx(activation) => activation
                .code
                .source_line(line)
                .map_or_else(|| NO_SOURCE_MARKER.into(), |text| {
                    format!("{:6} *-* {}", line, text.trim()).into()
                }),
            Self::Compile(frame) => {
                format!("{:6} *-* {}", frame.line, frame.source_line.trim()).into()
            }
            Self::Base | Self::Native(_) | Self::Internal(_) => NO_SOURCE_MARKER.into(),
        };

        let arguments = match self {
            Self::Rexx(activation) => activation.args.clone(),
            Self::Internal(frame) => frame.arguments.clone(),
            _ => Vec::new(),
        };

        memory.allocate(ObjectData::StackFrame(StackFrameData {
            frame_type: self.frame_type(),
            name: self.message_name().into(),
            executable: self.executable(),
            line,
            trace_line,
            arguments,
        }))
    }
}

/// The per-activity frame stack with its cached markers.
#[derive(Debug)]
pub struct ActivationStack {
    frames: Vec<ActivationFrame>,
    current_rexx: Option<usize>,
}

impl Default for ActivationStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivationStack {
    /// A stack holding only the base marker.
    #[must_use]
    pub fn new() -> Self {
        let mut frames = Vec::with_capacity(FRAME_QUANTUM);
        frames.push(ActivationFrame::Base);
        Self {
            frames,
            current_rexx: None,
        }
    }

    /// Current depth including the base marker.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a frame, growing the backing store by a fixed quantum.
    pub fn push_stack_frame(&mut self, frame: ActivationFrame) {
        if self.frames.len() == self.frames.capacity() {
            self.frames.reserve(FRAME_QUANTUM);
        }
        if matches!(frame, ActivationFrame::Rexx(_)) {
            self.current_rexx = Some(self.frames.len());
        }
        self.frames.push(frame);
    }

    /// Pop the top frame.
    ///
    /// The stack-base marker is pushed back rather than popped. A reply pop
    /// (concurrent method return) skips the frame-reuse cache; with owned
    /// frames there is no cache, so both paths converge here.
    pub fn pop_stack_frame(&mut self, _reply: bool) -> Option<ActivationFrame> {
        if matches!(self.frames.last(), Some(ActivationFrame::Base) | None) {
            return None;
        }
        let frame = self.frames.pop();
        self.refresh_markers();
        frame
    }

    /// Pop and discard frames until depth `n` remains.
    pub fn unwind_to_depth(&mut self, n: usize) {
        while self.frames.len() > n.max(1) {
            if self.pop_stack_frame(false).is_none() {
                break;
            }
        }
    }

    /// Pop and discard frames above the given index, inclusive.
    pub fn unwind_to_frame(&mut self, index: usize) {
        self.unwind_to_depth(index);
    }

    /// The topmost frame.
    #[must_use]
    pub fn top(&self) -> Option<&ActivationFrame> {
        match self.frames.last() {
            Some(ActivationFrame::Base) | None => None,
            frame => frame,
        }
    }

    /// The topmost frame, mutably.
    pub fn top_mut(&mut self) -> Option<&mut ActivationFrame> {
        match self.frames.last_mut() {
            Some(ActivationFrame::Base) | None => None,
            frame => frame,
        }
    }

    /// Index of the topmost frame, if any real frame is on the stack.
    #[must_use]
    pub fn top_index(&self) -> Option<usize> {
        if self.frames.len() > 1 {
            Some(self.frames.len() - 1)
        } else {
            None
        }
    }

    /// The topmost Rexx activation, if one is on the stack.
    #[must_use]
    pub fn current_rexx(&self) -> Option<&RexxActivation> {
        match self.current_rexx.map(|i| &self.frames[i]) {
            Some(ActivationFrame::Rexx(activation)) => Some(activation),
            _ => None,
        }
    }

    /// The topmost Rexx activation, mutably.
    pub fn current_rexx_mut(&mut self) -> Option<&mut RexxActivation> {
        match self.current_rexx.map(|i| &mut self.frames[i]) {
            Some(ActivationFrame::Rexx(activation)) => Some(activation),
            _ => None,
        }
    }

    /// Index of the topmost Rexx activation.
    #[must_use]
    pub const fn current_rexx_index(&self) -> Option<usize> {
        self.current_rexx
    }

    /// Borrow a frame by index.
    #[must_use]
    pub fn frame_at(&self, index: usize) -> Option<&ActivationFrame> {
        self.frames.get(index)
    }

    /// Mutably borrow a frame by index.
    pub fn frame_at_mut(&mut self, index: usize) -> Option<&mut ActivationFrame> {
        self.frames.get_mut(index)
    }

    /// Iterate frames from the top outward, skipping the base marker.
    pub fn frames_top_down(&self) -> impl Iterator<Item = (usize, &ActivationFrame)> {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, f)| !matches!(f, ActivationFrame::Base))
    }

    /// The numeric settings of the topmost Rexx frame, for the activity
    /// cache refresh on push/pop.
    #[must_use]
    pub fn top_settings(&self) -> Option<NumericSettings> {
        self.current_rexx().map(|activation| activation.settings)
    }

    /// Report every object reference held by any frame.
    pub fn for_each_ref(&self, visit: &mut dyn FnMut(ObjRef)) {
        for frame in &self.frames {
            frame.for_each_ref(visit);
        }
    }

    fn refresh_markers(&mut self) {
        self.current_rexx = self
            .frames
            .iter()
            .rposition(|f| matches!(f, ActivationFrame::Rexx(_)));
    }
}
