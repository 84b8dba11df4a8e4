//! # Knowledge Retrieval
//!
//! Answers "what does this bot know about X" with a cascade of retrieval
//! tiers, then merges the raw candidates into one item per fact.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Retriever                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  query ──► Embedder (neural only) ──► candidate cache           │
//! │                                            │ miss               │
//! │                                            ▼                    │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │ Vector index │──►│ Precomputed  │──►│   Keyword    │         │
//! │  │  (optional)  │   │    cosine    │   │ text search  │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │     failed / empty demotes to the next tier                     │
//! │                          │                                      │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │ merge/cluster│ ──► MergedKnowledgeItem       │
//! │                  └──────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chatrag_retrieval::{RetrieveOptions, Retriever};
//!
//! let retriever = Retriever::builder(embedder, store).build();
//! let items = retriever
//!     .retrieve_context(&bot, "how much is the basic plan?", RetrieveOptions::default())
//!     .await;
//! ```

pub mod candidate;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod merge;
pub mod strategy;

pub use candidate::{MergedKnowledgeItem, RetrievalCandidate, ScoreBreakdown, Tier};
pub use config::{RetrievalConfig, RetrieveOptions};
pub use engine::{CandidateCache, Retriever, RetrieverBuilder};
pub use error::{Result, RetrievalError};
pub use index::{InMemoryVectorIndex, VectorHit, VectorIndex};
pub use merge::merge;
pub use strategy::{
    KeywordStrategy, PrecomputedStrategy, RetrievalStrategy, TierOutcome, TierQuery,
    VectorIndexStrategy,
};
