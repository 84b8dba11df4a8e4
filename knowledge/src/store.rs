//! Knowledge store collaborator.
//!
//! Production deployments back this with a document database; the
//! in-memory store serves tests, the CLI, and single-process setups.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::fragment::{BotScope, KnowledgeFragment, TextHit};
use crate::keywords::content_tokens;

/// Read/write contract for a bot's knowledge fragments.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Every fragment of the bot.
    async fn find_fragments(&self, bot: &BotScope) -> Result<Vec<KnowledgeFragment>>;

    /// Fragments that already carry a stored embedding.
    async fn find_fragments_with_embedding(&self, bot: &BotScope) -> Result<Vec<KnowledgeFragment>>;

    /// Keyword search scored by the store's own relevance metric.
    async fn text_search(&self, bot: &BotScope, query: &str, limit: usize) -> Result<Vec<TextHit>>;

    /// Insert or replace fragments by `chunk_id`.
    async fn upsert_fragments(&self, bot: &BotScope, fragments: Vec<KnowledgeFragment>)
    -> Result<()>;
}

/// Process-local knowledge store.
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    fragments: RwLock<HashMap<BotScope, IndexMap<String, KnowledgeFragment>>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fragments stored for `bot`.
    pub async fn len(&self, bot: &BotScope) -> usize {
        self.fragments
            .read()
            .await
            .get(bot)
            .map_or(0, IndexMap::len)
    }

    pub async fn is_empty(&self, bot: &BotScope) -> bool {
        self.len(bot).await == 0
    }
}

/// Fraction of query terms found, with keyword hits weighted double.
fn relevance(query_terms: &[String], fragment: &KnowledgeFragment) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_terms: Vec<String> = content_tokens(&fragment.content);

    let mut score = 0.0;
    for term in query_terms {
        if fragment.keywords.contains(term) {
            score += 2.0;
        }
        if content_terms.contains(term) {
            score += 1.0;
        }
    }
    score / (3.0 * query_terms.len() as f32)
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn find_fragments(&self, bot: &BotScope) -> Result<Vec<KnowledgeFragment>> {
        let fragments = self.fragments.read().await;
        Ok(fragments
            .get(bot)
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_fragments_with_embedding(&self, bot: &BotScope) -> Result<Vec<KnowledgeFragment>> {
        let fragments = self.fragments.read().await;
        Ok(fragments
            .get(bot)
            .map(|map| {
                map.values()
                    .filter(|f| f.has_embedding())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn text_search(&self, bot: &BotScope, query: &str, limit: usize) -> Result<Vec<TextHit>> {
        let mut query_terms = content_tokens(query);
        query_terms.sort();
        query_terms.dedup();

        let fragments = self.fragments.read().await;
        let Some(map) = fragments.get(bot) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<TextHit> = map
            .values()
            .filter_map(|fragment| {
                let score = relevance(&query_terms, fragment);
                (score > 0.0).then(|| TextHit {
                    chunk_id: fragment.chunk_id.clone(),
                    content: fragment.content.clone(),
                    keywords: fragment.keywords.clone(),
                    entity_id: fragment.entity_id.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);

        debug!("Text search in {bot} matched {} fragments", hits.len());
        Ok(hits)
    }

    async fn upsert_fragments(
        &self,
        bot: &BotScope,
        fragments: Vec<KnowledgeFragment>,
    ) -> Result<()> {
        let mut store = self.fragments.write().await;
        let map = store.entry(bot.clone()).or_default();
        for fragment in fragments {
            map.insert(fragment.chunk_id.clone(), fragment);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{FragmentDraft, SourceMeta};
    use pretty_assertions::assert_eq;

    fn fragment(id: &str, content: &str, keywords: &[&str]) -> KnowledgeFragment {
        let draft = FragmentDraft {
            chunk_id: id.to_string(),
            chunk_index: 0,
            content: content.to_string(),
            start_offset: 0,
            end_offset: content.chars().count(),
            heading: None,
            source: SourceMeta::default(),
        };
        KnowledgeFragment::from_draft(draft, keywords.iter().map(|k| k.to_string()).collect())
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_chunk_id() {
        let store = InMemoryKnowledgeStore::new();
        let bot = BotScope::new("shop");

        store
            .upsert_fragments(&bot, vec![fragment("a", "old", &[]), fragment("b", "other", &[])])
            .await
            .unwrap();
        store
            .upsert_fragments(&bot, vec![fragment("a", "new", &[])])
            .await
            .unwrap();

        let all = store.find_fragments(&bot).await.unwrap();
        let contents: Vec<&str> = all.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["new", "other"]);
        assert!(store.find_fragments(&BotScope::new("other")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_embedded_fragments_are_returned() {
        let store = InMemoryKnowledgeStore::new();
        let bot = BotScope::new("shop");
        store
            .upsert_fragments(
                &bot,
                vec![
                    fragment("a", "with vector", &[]).with_embedding(vec![1.0], "m"),
                    fragment("b", "without vector", &[]),
                ],
            )
            .await
            .unwrap();

        let embedded = store.find_fragments_with_embedding(&bot).await.unwrap();
        assert_eq!(embedded.len(), 1);
        assert_eq!(embedded[0].chunk_id, "a");
    }

    #[tokio::test]
    async fn test_text_search_ranks_keyword_hits_first() {
        let store = InMemoryKnowledgeStore::new();
        let bot = BotScope::new("shop");
        store
            .upsert_fragments(
                &bot,
                vec![
                    fragment("a", "We deliver nationwide.", &["delivery"]),
                    fragment("b", "Pricing starts at 200k.", &["pricing"]),
                    fragment("c", "Our pricing page lists discounts.", &[]),
                ],
            )
            .await
            .unwrap();

        let hits = store.text_search(&bot, "pricing", 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);

        assert!(store.text_search(&bot, "the", 10).await.unwrap().is_empty());
    }
}
