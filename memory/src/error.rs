//! Error types for customer memory.

use thiserror::Error;

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors that can occur while reading or recording customer memory.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),

    /// Another writer saved the record first.
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    /// A fact rule pattern did not compile.
    #[error("invalid rule for {field}: {message}")]
    InvalidRule { field: String, message: String },

    /// Language model error.
    #[error("language model error: {0}")]
    Llm(#[from] chatrag_llm::LlmError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
