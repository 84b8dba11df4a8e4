//! Error types for language-model calls.

use thiserror::Error;

/// Result type alias for language-model operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur while talking to a language model.
#[derive(Error, Debug)]
pub enum LlmError {
    /// No API key or endpoint configured.
    #[error("language model not configured")]
    NotConfigured,

    /// Connection or transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call exceeded its deadline.
    #[error("language model timed out after {0} ms")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The API answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The completion did not contain the requested JSON.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Content problems are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) | LlmError::Timeout(_) | LlmError::RateLimited => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::NotConfigured
            | LlmError::InvalidResponse(_)
            | LlmError::MalformedOutput(_)
            | LlmError::Serialization(_) => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(0)
        } else if err.is_decode() {
            LlmError::InvalidResponse(err.to_string())
        } else {
            LlmError::Transport(err.to_string())
        }
    }
}
