//! Error types for knowledge retrieval.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors raised inside retrieval tiers. They never escape the cascade.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Knowledge store error.
    #[error("knowledge store error: {0}")]
    Knowledge(#[from] chatrag_knowledge::KnowledgeError),

    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] chatrag_embeddings::EmbeddingError),

    /// Vector of the wrong length for the index.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The vector index cannot serve this bot.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),
}
