//! The tiered retrieval engine.

use std::sync::Arc;

use chatrag_embeddings::{CacheStats, Embedder, TtlCache};
use chatrag_knowledge::{BotScope, KnowledgeStore};
use tracing::{debug, info, warn};

use crate::candidate::{MergedKnowledgeItem, RetrievalCandidate, Tier};
use crate::config::{RetrievalConfig, RetrieveOptions};
use crate::index::VectorIndex;
use crate::merge::merge;
use crate::strategy::{
    KeywordStrategy, PrecomputedStrategy, RetrievalStrategy, TierOutcome, TierQuery,
    VectorIndexStrategy,
};

/// Process-wide cache of tier results, keyed by bot, query, and parameters.
pub type CandidateCache = TtlCache<Vec<RetrievalCandidate>>;

/// Answers knowledge queries for any bot.
///
/// Tiers are tried in order until one produces candidates. A tier that fails
/// or comes back empty hands over to the next one; callers only ever see an
/// empty result, never a tier error.
pub struct Retriever {
    embedder: Arc<Embedder>,
    strategies: Vec<Arc<dyn RetrievalStrategy>>,
    config: RetrievalConfig,
    cache: Arc<CandidateCache>,
}

impl Retriever {
    pub fn builder(embedder: Arc<Embedder>, store: Arc<dyn KnowledgeStore>) -> RetrieverBuilder {
        RetrieverBuilder::new(embedder, store)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Tiers in the order they are tried.
    pub fn tiers(&self) -> Vec<Tier> {
        self.strategies.iter().map(|s| s.tier()).collect()
    }

    /// Raw candidates for `query`, from the first tier that has any.
    pub async fn retrieve(
        &self,
        bot: &BotScope,
        query: &str,
        limit: usize,
        similarity_threshold: f32,
    ) -> Vec<RetrievalCandidate> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let limit = limit.max(1);

        let key = format!("{bot}|{limit}|{similarity_threshold:.3}|{query}");
        if let Some(candidates) = self.cache.get(&key).await {
            debug!("Retrieval cache hit for {bot}");
            return candidates;
        }

        let query_embedding = self.embed_query(query).await;
        let tier_query = TierQuery {
            bot,
            text: query,
            embedding: query_embedding.as_deref(),
            model: self.embedder.model_name(),
            limit,
        };

        for strategy in &self.strategies {
            let tier = strategy.tier();
            if strategy.requires_embedding() && tier_query.embedding.is_none() {
                debug!("Skipping {tier} tier: no neural query embedding");
                continue;
            }

            let candidates = match strategy.search(&tier_query).await {
                TierOutcome::Hits(candidates) => candidates,
                TierOutcome::Empty => {
                    debug!("{tier} tier found nothing for {bot}");
                    continue;
                }
                TierOutcome::Failed(reason) => {
                    warn!("{tier} tier failed for {bot}, falling back: {reason}");
                    continue;
                }
            };

            let candidates = if strategy.scored_by_similarity() {
                self.above_threshold(candidates, similarity_threshold)
            } else {
                candidates
            };
            if candidates.is_empty() {
                debug!("{tier} tier had no candidates above threshold for {bot}");
                continue;
            }

            info!("Retrieved {} candidates for {bot} via {tier}", candidates.len());
            self.cache.insert(key, candidates.clone()).await;
            return candidates;
        }

        debug!("No tier produced candidates for {bot}");
        Vec::new()
    }

    /// Retrieve and merge: what prompt assembly consumes.
    pub async fn retrieve_context(
        &self,
        bot: &BotScope,
        query: &str,
        options: RetrieveOptions,
    ) -> Vec<MergedKnowledgeItem> {
        let (limit, threshold) = options.resolve(&self.config);
        let candidates = self.retrieve(bot, query, limit, threshold).await;
        merge(
            candidates,
            limit,
            threshold,
            self.config.cluster_similarity_floor,
        )
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Neural query vector, or `None` in hashing mode or on failure.
    ///
    /// Hashing vectors are never compared against a neural index.
    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        if !self.embedder.mode().is_neural() {
            return None;
        }
        match self.embedder.embed(query).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!("Query embedding failed, using keyword search only: {e}");
                None
            }
        }
    }

    /// Keep candidates at or above `threshold`, retrying once at the floor.
    fn above_threshold(
        &self,
        candidates: Vec<RetrievalCandidate>,
        threshold: f32,
    ) -> Vec<RetrievalCandidate> {
        let passing: Vec<RetrievalCandidate> = candidates
            .iter()
            .filter(|c| c.score >= threshold)
            .cloned()
            .collect();
        if !passing.is_empty() || threshold <= self.config.threshold_floor {
            return passing;
        }

        let floor = self.config.threshold_floor;
        debug!("Nothing above {threshold:.2}, retrying at floor {floor:.2}");
        candidates.into_iter().filter(|c| c.score >= floor).collect()
    }
}

/// Builder for [`Retriever`].
pub struct RetrieverBuilder {
    embedder: Arc<Embedder>,
    store: Arc<dyn KnowledgeStore>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    config: RetrievalConfig,
    cache: Option<Arc<CandidateCache>>,
    strategies: Option<Vec<Arc<dyn RetrievalStrategy>>>,
}

impl RetrieverBuilder {
    pub fn new(embedder: Arc<Embedder>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            embedder,
            store,
            vector_index: None,
            config: RetrievalConfig::default(),
            cache: None,
            strategies: None,
        }
    }

    /// Enable the nearest-neighbor tier.
    pub fn with_vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a candidate cache constructed elsewhere.
    pub fn with_cache(mut self, cache: Arc<CandidateCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the default tier list.
    pub fn with_strategies(mut self, strategies: Vec<Arc<dyn RetrievalStrategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn build(self) -> Retriever {
        let config = self.config;
        let strategies = self.strategies.unwrap_or_else(|| {
            let mut strategies: Vec<Arc<dyn RetrievalStrategy>> = Vec::new();
            if let Some(index) = self.vector_index {
                strategies.push(Arc::new(VectorIndexStrategy::new(
                    index,
                    config.vector_timeout(),
                    config.candidate_multiplier,
                )));
            }
            strategies.push(Arc::new(PrecomputedStrategy::new(
                Arc::clone(&self.store),
                config.candidate_multiplier,
            )));
            strategies.push(Arc::new(KeywordStrategy::new(
                Arc::clone(&self.store),
                config.keyword_multiplier,
            )));
            strategies
        });
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(TtlCache::new(
                "retrieval",
                config.cache_ttl(),
                config.cache_max_entries,
            ))
        });

        Retriever {
            embedder: self.embedder,
            strategies,
            config,
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ScoreBreakdown;
    use async_trait::async_trait;
    use chatrag_embeddings::cache::DEFAULT_TTL;
    use chatrag_embeddings::{
        EmbedderConfig, EmbeddingError, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
    };
    use chatrag_knowledge::InMemoryKnowledgeStore;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always embeds to the same unit vector.
    struct UnitProvider;

    #[async_trait]
    impl EmbeddingProvider for UnitProvider {
        fn name(&self) -> &str {
            "unit"
        }

        fn default_model(&self) -> &str {
            "unit-v1"
        }

        fn default_dimension(&self) -> usize {
            2
        }

        async fn embed(
            &self,
            _request: EmbeddingRequest,
        ) -> std::result::Result<EmbeddingResponse, EmbeddingError> {
            Ok(EmbeddingResponse {
                embedding: vec![1.0, 0.0],
                model: "unit-v1".to_string(),
                dimension: 2,
                tokens_used: None,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    /// Replays a fixed outcome and counts calls.
    struct Scripted {
        tier: Tier,
        needs_embedding: bool,
        outcome: TierOutcome,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(tier: Tier, needs_embedding: bool, outcome: TierOutcome) -> Arc<Self> {
            Arc::new(Self {
                tier,
                needs_embedding,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RetrievalStrategy for Scripted {
        fn tier(&self) -> Tier {
            self.tier
        }

        fn requires_embedding(&self) -> bool {
            self.needs_embedding
        }

        fn scored_by_similarity(&self) -> bool {
            self.tier != Tier::Keyword
        }

        async fn search(&self, _query: &TierQuery<'_>) -> TierOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn candidate(id: &str, score: f32, tier: Tier) -> RetrievalCandidate {
        RetrievalCandidate {
            chunk_id: id.to_string(),
            content: format!("content {id}"),
            keywords: BTreeSet::new(),
            entity_id: None,
            score,
            scores: ScoreBreakdown::semantic(score),
            embedding: None,
            tier,
        }
    }

    fn cache() -> Arc<chatrag_embeddings::EmbeddingCache> {
        Arc::new(TtlCache::new("test", DEFAULT_TTL, 100))
    }

    async fn neural_embedder() -> Arc<Embedder> {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(UnitProvider);
        Arc::new(Embedder::initialize(Some(provider), cache(), EmbedderConfig::default()).await)
    }

    fn hashing_embedder() -> Arc<Embedder> {
        Arc::new(Embedder::hashing(cache(), EmbedderConfig::default()))
    }

    fn retriever(embedder: Arc<Embedder>, strategies: Vec<Arc<dyn RetrievalStrategy>>) -> Retriever {
        Retriever::builder(embedder, Arc::new(InMemoryKnowledgeStore::new()))
            .with_strategies(strategies)
            .build()
    }

    #[tokio::test]
    async fn test_failure_then_empty_then_hits() {
        let vector = Scripted::new(
            Tier::VectorIndex,
            true,
            TierOutcome::Failed("index offline".to_string()),
        );
        let precomputed = Scripted::new(Tier::Precomputed, true, TierOutcome::Empty);
        let keyword = Scripted::new(
            Tier::Keyword,
            false,
            TierOutcome::Hits(vec![candidate("k", 0.1, Tier::Keyword)]),
        );

        let retriever = retriever(
            neural_embedder().await,
            vec![vector.clone(), precomputed.clone(), keyword.clone()],
        );
        let results = retriever.retrieve(&BotScope::new("shop"), "price", 5, 0.65).await;

        assert_eq!((vector.calls(), precomputed.calls(), keyword.calls()), (1, 1, 1));
        // Keyword scores are not similarities and skip the threshold.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tier, Tier::Keyword);
    }

    #[tokio::test]
    async fn test_first_tier_with_hits_wins() {
        let vector = Scripted::new(
            Tier::VectorIndex,
            true,
            TierOutcome::Hits(vec![candidate("v", 0.9, Tier::VectorIndex)]),
        );
        let keyword = Scripted::new(Tier::Keyword, false, TierOutcome::Empty);

        let retriever = retriever(neural_embedder().await, vec![vector.clone(), keyword.clone()]);
        let results = retriever.retrieve(&BotScope::new("shop"), "price", 5, 0.65).await;

        assert_eq!(results[0].chunk_id, "v");
        assert_eq!(keyword.calls(), 0);
    }

    #[tokio::test]
    async fn test_hashing_mode_skips_semantic_tiers() {
        let vector = Scripted::new(
            Tier::VectorIndex,
            true,
            TierOutcome::Hits(vec![candidate("v", 0.9, Tier::VectorIndex)]),
        );
        let keyword = Scripted::new(
            Tier::Keyword,
            false,
            TierOutcome::Hits(vec![candidate("k", 0.4, Tier::Keyword)]),
        );

        let retriever = retriever(hashing_embedder(), vec![vector.clone(), keyword.clone()]);
        let results = retriever.retrieve(&BotScope::new("shop"), "price", 5, 0.65).await;

        assert_eq!(vector.calls(), 0);
        assert_eq!(results[0].chunk_id, "k");
    }

    #[tokio::test]
    async fn test_threshold_retries_at_floor() {
        let precomputed = Scripted::new(
            Tier::Precomputed,
            true,
            TierOutcome::Hits(vec![
                candidate("a", 0.5, Tier::Precomputed),
                candidate("b", 0.1, Tier::Precomputed),
            ]),
        );
        let keyword = Scripted::new(Tier::Keyword, false, TierOutcome::Empty);

        let retriever = retriever(neural_embedder().await, vec![precomputed, keyword.clone()]);
        let results = retriever.retrieve(&BotScope::new("shop"), "price", 5, 0.65).await;

        let ids: Vec<&str> = results.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(keyword.calls(), 0);
    }

    #[tokio::test]
    async fn test_nothing_above_floor_falls_through() {
        let precomputed = Scripted::new(
            Tier::Precomputed,
            true,
            TierOutcome::Hits(vec![candidate("a", 0.1, Tier::Precomputed)]),
        );
        let keyword = Scripted::new(
            Tier::Keyword,
            false,
            TierOutcome::Hits(vec![candidate("k", 0.2, Tier::Keyword)]),
        );

        let retriever = retriever(neural_embedder().await, vec![precomputed, keyword.clone()]);
        let results = retriever.retrieve(&BotScope::new("shop"), "price", 5, 0.65).await;

        assert_eq!(keyword.calls(), 1);
        assert_eq!(results[0].chunk_id, "k");
    }

    #[tokio::test]
    async fn test_results_are_cached() {
        let keyword = Scripted::new(
            Tier::Keyword,
            false,
            TierOutcome::Hits(vec![candidate("k", 0.4, Tier::Keyword)]),
        );
        let retriever = retriever(hashing_embedder(), vec![keyword.clone()]);
        let bot = BotScope::new("shop");

        retriever.retrieve(&bot, "price", 5, 0.65).await;
        retriever.retrieve(&bot, "price", 5, 0.65).await;
        assert_eq!(keyword.calls(), 1);

        retriever.clear_cache().await;
        retriever.retrieve(&bot, "price", 5, 0.65).await;
        assert_eq!(keyword.calls(), 2);
    }

    #[tokio::test]
    async fn test_all_tiers_empty_is_empty() {
        let keyword = Scripted::new(Tier::Keyword, false, TierOutcome::Failed("down".into()));
        let retriever = retriever(hashing_embedder(), vec![keyword]);

        let items = retriever
            .retrieve_context(&BotScope::new("shop"), "price", RetrieveOptions::default())
            .await;
        assert!(items.is_empty());
        assert_eq!(retriever.cache_stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_default_tier_order() {
        let store: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());
        let plain = Retriever::builder(hashing_embedder(), Arc::clone(&store)).build();
        assert_eq!(plain.tiers(), vec![Tier::Precomputed, Tier::Keyword]);

        let indexed = Retriever::builder(hashing_embedder(), store)
            .with_vector_index(Arc::new(crate::index::InMemoryVectorIndex::new()))
            .build();
        assert_eq!(
            indexed.tiers(),
            vec![Tier::VectorIndex, Tier::Precomputed, Tier::Keyword]
        );
    }
}
