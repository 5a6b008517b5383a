//! Streaming response types.

use serde::{Deserialize, Serialize};

/// A chunk from a model response.
///
/// Non-streaming completions are delivered as the same sequence, so
/// consumers handle one shape.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content is starting.
    TextStart,
    /// Text content delta.
    TextDelta(String),
    /// Text content ended.
    TextEnd,

    /// A tool call is starting.
    ToolCallStart {
        /// Tool call ID.
        id: String,
        /// Tool name.
        name: String,
    },
    /// Tool call completed.
    ToolCall {
        /// Tool call ID.
        id: String,
        /// Tool name.
        name: String,
        /// Complete arguments JSON.
        arguments: String,
    },

    /// A step in the response is finishing.
    FinishStep {
        /// Reason for finishing.
        finish_reason: FinishReason,
    },

    /// The backend reported an error inside the stream.
    Error(String),
}

impl StreamChunk {
    /// Create a text delta chunk.
    pub fn text(delta: impl Into<String>) -> Self {
        Self::TextDelta(delta.into())
    }

    /// Create a tool call start chunk.
    pub fn tool_call_start(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ToolCallStart {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Create a tool call completed chunk.
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Reason for finishing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Normal completion (end of turn).
    #[default]
    EndTurn,
    /// Stopped due to max tokens.
    MaxTokens,
    /// Stopped for tool use.
    ToolUse,
    /// Content was filtered.
    ContentFilter,
    /// Unknown or other reason.
    Other,
}

impl FinishReason {
    /// Parse from OpenAI's finish_reason.
    pub fn from_openai(reason: &str) -> Self {
        match reason {
            "stop" => Self::EndTurn,
            "length" => Self::MaxTokens,
            "tool_calls" | "function_call" => Self::ToolUse,
            "content_filter" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}
