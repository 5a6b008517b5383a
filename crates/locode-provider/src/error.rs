//! Provider error types.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur while talking to the model backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed (connection refused, DNS, TLS, ...).
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Invalid API response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid API key.
    #[error("Invalid API key for provider: {0}")]
    InvalidApiKey(String),

    /// Operation cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error (for streaming).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal provider error.
    #[error("Provider error: {message}")]
    Internal { message: String },

    /// API error with status code.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
}

impl ProviderError {
    /// Create an invalid API key error.
    pub fn invalid_api_key(provider: impl Into<String>) -> Self {
        Self::InvalidApiKey(provider.into())
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an API error.
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Whether the backend could not be reached at all.
    pub fn is_connection_error(&self) -> bool {
        match self {
            ProviderError::RequestFailed(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ProviderError::api_error(404, "model 'llama9' not found");
        assert_eq!(err.to_string(), "API error (404): model 'llama9' not found");
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_internal_error_display() {
        let err = ProviderError::internal("boom");
        assert_eq!(err.to_string(), "Provider error: boom");
    }
}
