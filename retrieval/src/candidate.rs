//! Retrieval result types.

use std::collections::BTreeSet;
use std::fmt;

use chatrag_embeddings::Embedding;
use serde::{Deserialize, Serialize};

/// Which tier of the cascade produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Native nearest-neighbor search in a vector index.
    VectorIndex,
    /// Cosine over embeddings stored with the fragments.
    Precomputed,
    /// Full-text search in the knowledge store.
    Keyword,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::VectorIndex => "vector-index",
            Tier::Precomputed => "precomputed",
            Tier::Keyword => "keyword",
        };
        f.write_str(name)
    }
}

/// Where a candidate's score came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub semantic: Option<f32>,
    pub keyword: Option<f32>,
}

impl ScoreBreakdown {
    pub fn semantic(score: f32) -> Self {
        Self {
            semantic: Some(score),
            keyword: None,
        }
    }

    pub fn keyword(score: f32) -> Self {
        Self {
            semantic: None,
            keyword: Some(score),
        }
    }
}

/// A fragment matched by one query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub chunk_id: String,
    pub content: String,
    pub keywords: BTreeSet<String>,
    pub entity_id: Option<String>,
    pub score: f32,
    pub scores: ScoreBreakdown,
    /// Carried through for clustering.
    pub embedding: Option<Embedding>,
    pub tier: Tier,
}

impl RetrievalCandidate {
    /// Entity id normalized for grouping, if it carries a usable one.
    pub fn entity_key(&self) -> Option<String> {
        self.entity_id
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
    }
}

/// What callers get back: one item per logical piece of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedKnowledgeItem {
    pub entity_id: Option<String>,
    pub content: String,
    pub keywords: BTreeSet<String>,
    /// Mean score of the contributing candidates.
    pub score: f32,
    /// Chunk ids of the contributing candidates.
    pub provenance: Vec<String>,
}
