//! Error types for knowledge ingestion and storage.

use thiserror::Error;

/// Result type alias for knowledge operations.
pub type Result<T> = std::result::Result<T, KnowledgeError>;

/// Errors that can occur while building or reading a knowledge base.
#[derive(Error, Debug)]
pub enum KnowledgeError {
    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),

    /// Embedding generation error.
    #[error("embedding error: {0}")]
    Embedding(#[from] chatrag_embeddings::EmbeddingError),

    /// Language model error.
    #[error("language model error: {0}")]
    Llm(#[from] chatrag_llm::LlmError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
