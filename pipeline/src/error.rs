//! Error types for the chat pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline operation.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No bot is registered under the code.
    #[error("unknown bot: {0}")]
    UnknownBot(String),

    /// The primary read of bot or customer data failed.
    #[error("store unavailable: {0}")]
    Store(String),

    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Language model error.
    #[error("language model error: {0}")]
    Llm(#[from] chatrag_llm::LlmError),

    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] chatrag_embeddings::EmbeddingError),

    /// Knowledge ingestion error.
    #[error("knowledge error: {0}")]
    Knowledge(#[from] chatrag_knowledge::KnowledgeError),

    /// Customer memory error.
    #[error("memory error: {0}")]
    Memory(#[from] chatrag_memory::MemoryError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
