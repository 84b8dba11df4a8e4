//! Vector index collaborator.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chatrag_embeddings::{Embedding, find_top_k, normalize};
use chatrag_knowledge::{BotScope, KnowledgeFragment};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, RetrievalError};

/// A nearest-neighbor match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub chunk_id: String,
    pub content: String,
    pub keywords: BTreeSet<String>,
    pub entity_id: Option<String>,
    /// Index-native similarity.
    pub score: f32,
    pub embedding: Option<Embedding>,
}

/// A vector-search capable index scoped by bot.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Consider `num_candidates` neighbors and return the best `limit`.
    async fn nearest_neighbors(
        &self,
        bot: &BotScope,
        query_vector: &[f32],
        num_candidates: usize,
        limit: usize,
    ) -> Result<Vec<VectorHit>>;
}

/// An entry in the in-memory index.
#[derive(Debug, Clone)]
struct IndexEntry {
    fragment: KnowledgeFragment,
    /// Normalized copy of the fragment's vector.
    embedding: Embedding,
}

#[derive(Default)]
struct BotIndex {
    entries: HashMap<String, IndexEntry>,
    dimension: Option<usize>,
}

/// Exhaustive-scan vector index held in memory.
///
/// Each bot's index fixes its dimension with the first vector it receives.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    bots: RwLock<HashMap<BotScope, BotIndex>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every embedded fragment, replacing entries with the same chunk id.
    ///
    /// Returns how many fragments were indexed.
    pub async fn add_fragments(&self, bot: &BotScope, fragments: &[KnowledgeFragment]) -> Result<usize> {
        let mut bots = self.bots.write().await;
        let index = bots.entry(bot.clone()).or_default();

        let mut added = 0;
        for fragment in fragments {
            let Some(vector) = fragment.embedding.as_ref().filter(|v| !v.is_empty()) else {
                continue;
            };

            let dimension = *index.dimension.get_or_insert(vector.len());
            if vector.len() != dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }

            let mut embedding = vector.clone();
            normalize(&mut embedding);
            index.entries.insert(
                fragment.chunk_id.clone(),
                IndexEntry {
                    fragment: fragment.clone(),
                    embedding,
                },
            );
            added += 1;
        }

        debug!("Indexed {added} fragments for {bot}");
        Ok(added)
    }

    /// Remove one fragment from a bot's index.
    pub async fn remove(&self, bot: &BotScope, chunk_id: &str) -> bool {
        self.bots
            .write()
            .await
            .get_mut(bot)
            .is_some_and(|index| index.entries.remove(chunk_id).is_some())
    }

    pub async fn len(&self, bot: &BotScope) -> usize {
        self.bots
            .read()
            .await
            .get(bot)
            .map_or(0, |index| index.entries.len())
    }

    pub async fn is_empty(&self, bot: &BotScope) -> bool {
        self.len(bot).await == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn nearest_neighbors(
        &self,
        bot: &BotScope,
        query_vector: &[f32],
        num_candidates: usize,
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let bots = self.bots.read().await;
        let Some(index) = bots.get(bot) else {
            return Err(RetrievalError::IndexUnavailable(format!("no index for {bot}")));
        };

        if let Some(dimension) = index.dimension {
            if query_vector.len() != dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dimension,
                    actual: query_vector.len(),
                });
            }
        }

        let candidates: Vec<(String, Embedding)> = index
            .entries
            .values()
            .map(|e| (e.fragment.chunk_id.clone(), e.embedding.clone()))
            .collect();

        let k = num_candidates.min(limit.max(1)).max(1);
        let hits = find_top_k(query_vector, &candidates, k, 0.0)
            .into_iter()
            .filter_map(|result| {
                let entry = index.entries.get(&result.id)?;
                Some(VectorHit {
                    chunk_id: entry.fragment.chunk_id.clone(),
                    content: entry.fragment.content.clone(),
                    keywords: entry.fragment.keywords.clone(),
                    entity_id: entry.fragment.entity_id.clone(),
                    score: result.score,
                    embedding: Some(entry.embedding.clone()),
                })
            })
            .collect();

        Ok(hits)
    }
}
