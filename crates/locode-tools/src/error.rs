//! Tool error types.
//!
//! The `Display` form of each variant is exactly what the model is shown.

use std::time::Duration;
use thiserror::Error;

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The path resolved outside the trusted root.
    #[error("Error: Access denied. Cannot {action} file outside of {root}")]
    AccessDenied { action: &'static str, root: String },

    /// The operator rejected the side effect.
    #[error("Declined: user cancelled {0}")]
    Declined(String),

    /// The tool name is not one of the known tools.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments did not match the tool's shape.
    #[error("Error: invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// Reading failed.
    #[error("Error reading file: {0}")]
    Read(String),

    /// Writing failed.
    #[error("Error writing file: {0}")]
    Write(String),

    /// The command could not be started or waited on.
    #[error("Error running command: {0}")]
    ExecutionFailed(String),

    /// Operation timed out.
    #[error("Error: command timed out after {0:?}")]
    Timeout(Duration),
}

impl ToolError {
    /// Create an access denied error.
    pub fn access_denied(action: &'static str, root: impl ToString) -> Self {
        Self::AccessDenied {
            action,
            root: root.to_string(),
        }
    }

    /// Create a declined error.
    pub fn declined(what: impl Into<String>) -> Self {
        Self::Declined(what.into())
    }

    /// Create an invalid arguments error.
    pub fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Create a read error.
    pub fn read(reason: impl ToString) -> Self {
        Self::Read(reason.to_string())
    }

    /// Create a write error.
    pub fn write(reason: impl ToString) -> Self {
        Self::Write(reason.to_string())
    }

    /// Create an execution failed error.
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }
}
