//! End-to-end tests of the retrieval cascade over real stores.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatrag_embeddings::cache::{DEFAULT_TTL, TtlCache};
use chatrag_embeddings::{
    Embedder, EmbedderConfig, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
    Result as EmbeddingResult,
};
use chatrag_knowledge::{
    BotScope, Chunker, FragmentDraft, InMemoryKnowledgeStore, Ingestor, KnowledgeFragment,
    KnowledgeStore, SourceMeta,
};
use chatrag_retrieval::{
    InMemoryVectorIndex, RetrievalConfig, RetrieveOptions, Retriever, Tier, VectorHit, VectorIndex,
};
use pretty_assertions::assert_eq;

/// Embeds every query to the x axis.
struct AxisProvider;

#[async_trait]
impl EmbeddingProvider for AxisProvider {
    fn name(&self) -> &str {
        "axis"
    }

    fn default_model(&self) -> &str {
        "axis-v1"
    }

    fn default_dimension(&self) -> usize {
        2
    }

    async fn embed(&self, _request: EmbeddingRequest) -> EmbeddingResult<EmbeddingResponse> {
        Ok(EmbeddingResponse {
            embedding: vec![1.0, 0.0],
            model: "axis-v1".to_string(),
            dimension: 2,
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// An index that never answers in time.
struct StalledIndex;

#[async_trait]
impl VectorIndex for StalledIndex {
    async fn nearest_neighbors(
        &self,
        _bot: &BotScope,
        _query_vector: &[f32],
        _num_candidates: usize,
        _limit: usize,
    ) -> chatrag_retrieval::Result<Vec<VectorHit>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

fn cache() -> Arc<TtlCache<Vec<f32>>> {
    Arc::new(TtlCache::new("embedding", DEFAULT_TTL, 100))
}

async fn neural_embedder() -> Arc<Embedder> {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(AxisProvider);
    Arc::new(Embedder::initialize(Some(provider), cache(), EmbedderConfig::default()).await)
}

fn fragment(id: &str, content: &str, embedding: Vec<f32>) -> KnowledgeFragment {
    let draft = FragmentDraft {
        chunk_id: id.to_string(),
        chunk_index: 0,
        content: content.to_string(),
        start_offset: 0,
        end_offset: content.chars().count(),
        heading: None,
        source: SourceMeta::from_filename("faq.txt"),
    };
    KnowledgeFragment::from_draft(draft, BTreeSet::new()).with_embedding(embedding, "axis-v1")
}

async fn seeded_store(bot: &BotScope) -> Arc<InMemoryKnowledgeStore> {
    let store = Arc::new(InMemoryKnowledgeStore::new());
    store
        .upsert_fragments(
            bot,
            vec![
                fragment("close", "Shipping is free above 500k.", vec![0.9, 0.43589]),
                fragment("far", "Our office cat is called Miso.", vec![0.2, 0.9798]),
            ],
        )
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_threshold_keeps_only_the_close_fragment() {
    let bot = BotScope::new("shop");
    let store = seeded_store(&bot).await;
    let retriever = Retriever::builder(neural_embedder().await, store).build();

    let items = retriever
        .retrieve_context(
            &bot,
            "is shipping free?",
            RetrieveOptions::default().with_similarity_threshold(0.3),
        )
        .await;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].provenance, vec!["close".to_string()]);
    assert!((items[0].score - 0.9).abs() < 1e-3);
}

#[tokio::test]
async fn test_vector_index_answers_first() {
    let bot = BotScope::new("shop");
    let store = seeded_store(&bot).await;
    let index = Arc::new(InMemoryVectorIndex::new());
    index
        .add_fragments(&bot, &store.find_fragments(&bot).await.unwrap())
        .await
        .unwrap();

    let retriever = Retriever::builder(neural_embedder().await, store)
        .with_vector_index(index)
        .build();
    let candidates = retriever.retrieve(&bot, "is shipping free?", 5, 0.3).await;

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].tier, Tier::VectorIndex);
    assert_eq!(candidates[0].chunk_id, "close");
}

#[tokio::test]
async fn test_stalled_index_demotes_to_precomputed() {
    let bot = BotScope::new("shop");
    let store = seeded_store(&bot).await;
    let config = RetrievalConfig::default().with_vector_timeout(Duration::from_millis(50));

    let retriever = Retriever::builder(neural_embedder().await, store)
        .with_vector_index(Arc::new(StalledIndex))
        .with_config(config)
        .build();
    let candidates = retriever.retrieve(&bot, "is shipping free?", 5, 0.3).await;

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].tier, Tier::Precomputed);
}

#[tokio::test]
async fn test_missing_index_demotes_to_precomputed() {
    let bot = BotScope::new("shop");
    let store = seeded_store(&bot).await;

    // The index has never seen this bot.
    let retriever = Retriever::builder(neural_embedder().await, store)
        .with_vector_index(Arc::new(InMemoryVectorIndex::new()))
        .build();
    let candidates = retriever.retrieve(&bot, "is shipping free?", 5, 0.3).await;

    assert_eq!(candidates[0].tier, Tier::Precomputed);
}

#[tokio::test]
async fn test_empty_knowledge_base_returns_nothing() {
    let retriever = Retriever::builder(
        neural_embedder().await,
        Arc::new(InMemoryKnowledgeStore::new()),
    )
    .with_vector_index(Arc::new(InMemoryVectorIndex::new()))
    .build();

    let items = retriever
        .retrieve_context(&BotScope::new("empty"), "anything at all", RetrieveOptions::default())
        .await;
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_hashing_mode_uses_keyword_search() {
    let bot = BotScope::new("shop");
    let store: Arc<InMemoryKnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());
    let embedder = Arc::new(Embedder::hashing(cache(), EmbedderConfig::default()));

    let text = "# Pricing\n\
The Pro plan costs 500k per month and includes priority support for every store.\n\
The Basic plan costs 200k per month and covers a single store location.\n\n\
# Support\n\
Our support team answers chats from 8am to 10pm every day, including holidays.\n";
    Ingestor::new(
        Chunker::default(),
        Arc::clone(&embedder),
        Arc::clone(&store) as Arc<dyn KnowledgeStore>,
    )
    .ingest(&bot, text, &SourceMeta::from_filename("catalog.md"))
    .await
    .unwrap();

    let retriever = Retriever::builder(embedder, store).build();
    let candidates = retriever.retrieve(&bot, "basic plan price", 5, 0.65).await;

    assert!(!candidates.is_empty());
    assert!(candidates.iter().all(|c| c.tier == Tier::Keyword));
    assert!(candidates[0].content.contains("Basic plan"));
}
