//! Retrieval tiers as interchangeable strategies.
//!
//! Each strategy reports a tagged [`TierOutcome`] instead of an error, so the
//! cascade in [`crate::Retriever`] is a plain loop over an ordered list.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatrag_embeddings::{Embedding, find_top_k};
use chatrag_knowledge::{BotScope, KnowledgeFragment, KnowledgeStore};

use crate::candidate::{RetrievalCandidate, ScoreBreakdown, Tier};
use crate::index::VectorIndex;

/// Result of one tier.
#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    /// The tier answered with at least one candidate.
    Hits(Vec<RetrievalCandidate>),
    /// The tier answered but found nothing.
    Empty,
    /// The tier could not answer.
    Failed(String),
}

impl TierOutcome {
    fn from_candidates(candidates: Vec<RetrievalCandidate>) -> Self {
        if candidates.is_empty() {
            TierOutcome::Empty
        } else {
            TierOutcome::Hits(candidates)
        }
    }
}

/// Everything a tier needs to answer one query.
#[derive(Debug, Clone, Copy)]
pub struct TierQuery<'a> {
    pub bot: &'a BotScope,
    pub text: &'a str,
    /// Present only when a neural model embedded the query.
    pub embedding: Option<&'a [f32]>,
    /// Model that produced `embedding`.
    pub model: &'a str,
    /// Merged items the caller wants; tiers over-fetch from this.
    pub limit: usize,
}

/// One tier of the retrieval cascade.
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    fn tier(&self) -> Tier;

    /// Whether the tier needs a neural query embedding to run.
    fn requires_embedding(&self) -> bool;

    /// Whether scores are similarities that the threshold applies to.
    fn scored_by_similarity(&self) -> bool;

    async fn search(&self, query: &TierQuery<'_>) -> TierOutcome;
}

/// Tier 1: nearest-neighbor search in the vector index.
pub struct VectorIndexStrategy {
    index: Arc<dyn VectorIndex>,
    timeout: Duration,
    candidate_multiplier: usize,
}

impl VectorIndexStrategy {
    pub fn new(index: Arc<dyn VectorIndex>, timeout: Duration, candidate_multiplier: usize) -> Self {
        Self {
            index,
            timeout,
            candidate_multiplier,
        }
    }
}

#[async_trait]
impl RetrievalStrategy for VectorIndexStrategy {
    fn tier(&self) -> Tier {
        Tier::VectorIndex
    }

    fn requires_embedding(&self) -> bool {
        true
    }

    fn scored_by_similarity(&self) -> bool {
        true
    }

    async fn search(&self, query: &TierQuery<'_>) -> TierOutcome {
        let Some(vector) = query.embedding else {
            return TierOutcome::Failed("no query embedding".to_string());
        };

        let candidates = query.limit * self.candidate_multiplier.max(1);
        let search = self
            .index
            .nearest_neighbors(query.bot, vector, candidates, candidates);

        match tokio::time::timeout(self.timeout, search).await {
            Err(_) => TierOutcome::Failed(format!(
                "vector index timed out after {} ms",
                self.timeout.as_millis()
            )),
            Ok(Err(e)) => TierOutcome::Failed(e.to_string()),
            Ok(Ok(hits)) => TierOutcome::from_candidates(
                hits.into_iter()
                    .map(|hit| RetrievalCandidate {
                        chunk_id: hit.chunk_id,
                        content: hit.content,
                        keywords: hit.keywords,
                        entity_id: hit.entity_id,
                        score: hit.score,
                        scores: ScoreBreakdown::semantic(hit.score),
                        embedding: hit.embedding,
                        tier: Tier::VectorIndex,
                    })
                    .collect(),
            ),
        }
    }
}

/// Tier 2: cosine over embeddings stored alongside the fragments.
pub struct PrecomputedStrategy {
    store: Arc<dyn KnowledgeStore>,
    candidate_multiplier: usize,
}

impl PrecomputedStrategy {
    pub fn new(store: Arc<dyn KnowledgeStore>, candidate_multiplier: usize) -> Self {
        Self {
            store,
            candidate_multiplier,
        }
    }
}

#[async_trait]
impl RetrievalStrategy for PrecomputedStrategy {
    fn tier(&self) -> Tier {
        Tier::Precomputed
    }

    fn requires_embedding(&self) -> bool {
        true
    }

    fn scored_by_similarity(&self) -> bool {
        true
    }

    async fn search(&self, query: &TierQuery<'_>) -> TierOutcome {
        let Some(vector) = query.embedding else {
            return TierOutcome::Failed("no query embedding".to_string());
        };

        let fragments = match self.store.find_fragments_with_embedding(query.bot).await {
            Ok(fragments) => fragments,
            Err(e) => return TierOutcome::Failed(e.to_string()),
        };

        // Vectors from another model live in a different space.
        let fragments: Vec<KnowledgeFragment> = fragments
            .into_iter()
            .filter(|f| f.embedding_model.as_deref().is_none_or(|m| m == query.model))
            .collect();

        let candidates: Vec<(String, Embedding)> = fragments
            .iter()
            .filter_map(|f| Some((f.chunk_id.clone(), f.embedding.clone()?)))
            .collect();

        let k = query.limit * self.candidate_multiplier.max(1);
        let top = find_top_k(vector, &candidates, k, 0.0);

        TierOutcome::from_candidates(
            top.into_iter()
                .filter_map(|result| {
                    let fragment = fragments.iter().find(|f| f.chunk_id == result.id)?;
                    Some(RetrievalCandidate {
                        chunk_id: fragment.chunk_id.clone(),
                        content: fragment.content.clone(),
                        keywords: fragment.keywords.clone(),
                        entity_id: fragment.entity_id.clone(),
                        score: result.score,
                        scores: ScoreBreakdown::semantic(result.score),
                        embedding: fragment.embedding.clone(),
                        tier: Tier::Precomputed,
                    })
                })
                .collect(),
        )
    }
}

/// Tier 3: the store's full-text search. Always available.
pub struct KeywordStrategy {
    store: Arc<dyn KnowledgeStore>,
    keyword_multiplier: usize,
}

impl KeywordStrategy {
    pub fn new(store: Arc<dyn KnowledgeStore>, keyword_multiplier: usize) -> Self {
        Self {
            store,
            keyword_multiplier,
        }
    }
}

#[async_trait]
impl RetrievalStrategy for KeywordStrategy {
    fn tier(&self) -> Tier {
        Tier::Keyword
    }

    fn requires_embedding(&self) -> bool {
        false
    }

    fn scored_by_similarity(&self) -> bool {
        false
    }

    async fn search(&self, query: &TierQuery<'_>) -> TierOutcome {
        let limit = query.limit * self.keyword_multiplier.max(1);
        match self.store.text_search(query.bot, query.text, limit).await {
            Err(e) => TierOutcome::Failed(e.to_string()),
            Ok(hits) => TierOutcome::from_candidates(
                hits.into_iter()
                    .map(|hit| RetrievalCandidate {
                        chunk_id: hit.chunk_id,
                        content: hit.content,
                        keywords: hit.keywords,
                        entity_id: hit.entity_id,
                        score: hit.score,
                        scores: ScoreBreakdown::keyword(hit.score),
                        embedding: None,
                        tier: Tier::Keyword,
                    })
                    .collect(),
            ),
        }
    }
}
