//! # Knowledge
//!
//! Turns raw document text into searchable knowledge fragments.
//!
//! ## Pipeline
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          Ingestor                                 │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  raw text ──► Chunker ──► FragmentDraft ──► KnowledgeExtractor?   │
//! │                 │                                │                │
//! │   boilerplate ──┘                      entity-tagged items        │
//! │   noise, sections,                               │                │
//! │   sliding window                                 ▼                │
//! │                                 Embedder ──► KnowledgeStore       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Extraction is optional. Without it every draft becomes one fragment with
//! frequency-derived keywords.

pub mod chunker;
pub mod error;
pub mod extraction;
pub mod fragment;
pub mod ingest;
pub mod keywords;
pub mod store;

pub use chunker::{Chunker, ChunkerConfig};
pub use error::{KnowledgeError, Result};
pub use extraction::{ExtractedItem, ItemKind, KnowledgeExtractor, merge_extracted};
pub use fragment::{BotScope, FragmentDraft, KnowledgeFragment, SourceMeta, TextHit};
pub use ingest::{IngestReport, Ingestor};
pub use keywords::derive_keywords;
pub use store::{InMemoryKnowledgeStore, KnowledgeStore};
