//! Error types for the core crate.
//!
//! Only failures that end a run live here. Schema violations, tool failures
//! and rejected confirmations are fed back to the model as conversation
//! content and never become an [`AgentError`].

use crate::action::SchemaError;
use locode_provider::ProviderError;
use thiserror::Error;

/// Why a run ended without a final answer.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model backend could not be reached or broke mid-stream.
    #[error("model backend error: {0}")]
    Transport(#[from] ProviderError),

    /// The model kept producing responses that could not be parsed.
    #[error("model produced {attempts} invalid responses in a row (last error: {last})")]
    RetriesExhausted { attempts: u32, last: SchemaError },

    /// The run took more model calls than allowed.
    #[error("step limit of {limit} reached without a final answer")]
    StepLimit { limit: u32 },

    /// The run was cancelled by the driver.
    #[error("run cancelled")]
    Cancelled,
}

impl AgentError {
    /// Whether the backend was at fault.
    pub fn is_transport(&self) -> bool {
        matches!(self, AgentError::Transport(_))
    }

    /// A hint for the operator, if there is a likely fix.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            AgentError::Transport(_) => Some(
                "Ensure the backend is running (e.g. `ollama serve`) and the model is pulled.",
            ),
            AgentError::RetriesExhausted { .. } => {
                Some("The model may not follow the action format; try --protocol native.")
            }
            _ => None,
        }
    }
}

/// Result type for agent runs.
pub type AgentResult<T> = Result<T, AgentError>;

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config validation failed.
    #[error("config validation failed: {message}")]
    Validation { message: String },

    /// Environment variable not found during substitution.
    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    /// File reference not found during substitution.
    #[error("file reference not found: {path}")]
    FileRefNotFound { path: String },

    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
