//! # Embeddings
//!
//! Turns text into fixed-dimension vectors for knowledge retrieval.
//!
//! ## Features
//!
//! - **Neural embeddings** through any [`EmbeddingProvider`] (OpenAI-compatible HTTP by default)
//! - **Hashing fallback**: a bag-of-tokens vector used when no model can be reached
//! - **Similarity**: zero-padded, non-negative cosine similarity and top-k selection
//! - **Caching**: an explicit [`TtlCache`] service shared by whoever needs it
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Embedder                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  initialize() ──probe──► EmbeddingProvider ──ok──► Neural mode  │
//! │       │                                                         │
//! │       └──────failure──► HashingEmbedder ────────► Hashing mode  │
//! │                                                                 │
//! │  embed(text) ──► truncate ──► TtlCache ──miss──► active provider│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod embedder;
pub mod error;
pub mod hashing;
pub mod provider;
pub mod similarity;

pub use cache::{CacheStats, EmbeddingCache, TtlCache};
pub use embedder::{Embedder, EmbedderConfig, EmbeddingMode};
pub use error::{EmbeddingError, Result};
pub use hashing::HashingEmbedder;
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider};
pub use similarity::{SimilarityResult, cosine_similarity, find_top_k, normalize};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of the hashing fallback vectors.
pub const HASHING_DIMENSION: usize = 300;
