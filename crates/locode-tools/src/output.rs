//! Output sink for the agent transcript.
//!
//! The gateway and the conversation loop report what they are doing through
//! an [`OutputSink`] instead of printing. The binary renders events on the
//! terminal; tests capture them.

use crate::gateway::ToolStatus;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};

/// Something worth showing to the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// A new instruction was accepted.
    Instruction(String),
    /// A fragment of model text as it streams in.
    TextDelta(String),
    /// The model's reasoning for the current step.
    Thinking(String),
    /// A tool is about to run.
    ToolCall { name: String, args: Value },
    /// Unified diff for a proposed overwrite.
    Diff { path: String, diff: String },
    /// Preview of a file about to be created.
    Preview { path: String, preview: String },
    /// A shell command awaiting approval.
    Command(String),
    /// A tool finished.
    ToolResult {
        name: String,
        status: ToolStatus,
        content: String,
    },
    /// The run finished with this answer.
    FinalAnswer(String),
    /// Informational message (retries, cancellations).
    Notice(String),
    /// A failure that ended the run.
    Error(String),
}

/// Receives transcript events.
pub trait OutputSink: Send + Sync {
    fn emit(&self, event: OutputEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn emit(&self, _event: OutputEvent) {}
}

/// Records events in order.
#[derive(Debug, Default)]
pub struct CapturingSink {
    events: Mutex<Vec<OutputEvent>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<OutputEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything emitted so far.
    pub fn take(&self) -> Vec<OutputEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Streamed text joined together.
    pub fn streamed_text(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                OutputEvent::TextDelta(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl OutputSink for CapturingSink {
    fn emit(&self, event: OutputEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
