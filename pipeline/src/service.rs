//! Composition root.
//!
//! [`RagService`] wires every component from a [`RagConfig`] and exposes the
//! four public operations: chunking, embedding, context retrieval, and turn
//! recording. Collaborators default to in-process adapters and can be
//! replaced through [`RagServiceBuilder`].

use std::sync::Arc;
use std::time::Duration;

use chatrag_embeddings::cache::DEFAULT_TTL;
use chatrag_embeddings::{
    Embedder, EmbeddingCache, EmbeddingMode, EmbeddingProvider, OpenAIProvider,
};
use chatrag_knowledge::{
    BotScope, Chunker, FragmentDraft, InMemoryKnowledgeStore, IngestReport, Ingestor,
    KnowledgeExtractor, KnowledgeStore, SourceMeta,
};
use chatrag_llm::{LanguageModel, OpenAiChatModel, ResilientModel};
use chatrag_memory::{
    FactRuleSet, InMemoryMemoryStore, MemoryEngine, MemoryStore, TurnInput, TurnRecorder,
};
use chatrag_retrieval::{MergedKnowledgeItem, RetrieveOptions, Retriever, VectorIndex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::bots::{BotDirectory, CachedBotDirectory, InMemoryBotDirectory};
use crate::chat::{ChatPipeline, ChatTurn};
use crate::config::RagConfig;
use crate::error::{PipelineError, Result};
use crate::prompt::PromptBuilder;

/// Every component, wired.
pub struct RagService {
    embedder: Arc<Embedder>,
    ingestor: Ingestor,
    retriever: Arc<Retriever>,
    recorder: Arc<TurnRecorder>,
    chat: Option<ChatPipeline>,
}

impl RagService {
    pub fn builder(config: RagConfig) -> RagServiceBuilder {
        RagServiceBuilder::new(config)
    }

    /// Split raw text into unembedded drafts.
    pub fn chunk_document(&self, raw_text: &str, source: &SourceMeta) -> Vec<FragmentDraft> {
        self.ingestor.chunker().chunk(raw_text, source)
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embedder.embed(text).await?)
    }

    pub fn embedding_mode(&self) -> &EmbeddingMode {
        self.embedder.mode()
    }

    /// Chunk, embed, and store a document for `bot`.
    pub async fn ingest(
        &self,
        bot: &BotScope,
        raw_text: &str,
        source: &SourceMeta,
    ) -> Result<IngestReport> {
        let report = self.ingestor.ingest(bot, raw_text, source).await?;
        // Cached candidates predate the new fragments.
        self.retriever.clear_cache().await;
        Ok(report)
    }

    /// Re-embed fragments left over from a previous embedding model.
    pub async fn reembed_stale(&self, bot: &BotScope) -> Result<usize> {
        let updated = self.ingestor.reembed_stale(bot).await?;
        if updated > 0 {
            self.retriever.clear_cache().await;
        }
        Ok(updated)
    }

    pub async fn retrieve_context(
        &self,
        bot: &BotScope,
        query: &str,
        options: RetrieveOptions,
    ) -> Vec<MergedKnowledgeItem> {
        self.retriever.retrieve_context(bot, query, options).await
    }

    /// Record a finished turn in the background.
    ///
    /// `derived_facts` are stored as direct evidence.
    pub fn record_turn(
        &self,
        customer_id: &str,
        bot: &BotScope,
        user_message: &str,
        bot_message: &str,
        derived_facts: Vec<(String, String)>,
    ) -> JoinHandle<()> {
        let mut input = TurnInput::new(user_message, bot_message);
        input.direct_facts = derived_facts;
        self.recorder
            .record_detached(customer_id.to_string(), bot.clone(), input)
    }

    /// Answer a chat message. Requires a language model.
    pub async fn handle_turn(
        &self,
        bot_code: &str,
        customer_id: &str,
        message: &str,
    ) -> Result<ChatTurn> {
        let chat = self.chat.as_ref().ok_or_else(|| {
            PipelineError::Config("no language model configured for chat".to_string())
        })?;
        chat.handle_turn(bot_code, customer_id, message).await
    }
}

/// Assembles a [`RagService`].
pub struct RagServiceBuilder {
    config: RagConfig,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    model: Option<Arc<dyn LanguageModel>>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    memories: Option<Arc<dyn MemoryStore>>,
    bots: Option<Arc<dyn BotDirectory>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    skip_default_clients: bool,
}

impl RagServiceBuilder {
    pub fn new(config: RagConfig) -> Self {
        Self {
            config,
            embedding_provider: None,
            model: None,
            knowledge: None,
            memories: None,
            bots: None,
            vector_index: None,
            skip_default_clients: false,
        }
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_knowledge_store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(store);
        self
    }

    pub fn with_memory_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memories = Some(store);
        self
    }

    pub fn with_bot_directory(mut self, bots: Arc<dyn BotDirectory>) -> Self {
        self.bots = Some(bots);
        self
    }

    pub fn with_vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Do not build HTTP clients from configuration. Collaborators not set
    /// explicitly are then absent.
    pub fn offline(mut self) -> Self {
        self.skip_default_clients = true;
        self
    }

    pub async fn build(self) -> Result<RagService> {
        let config = self.config;

        let provider = match self.embedding_provider {
            Some(provider) => Some(provider),
            None if !self.skip_default_clients && config.embedding_provider.enabled => {
                Some(default_embedding_provider(&config))
            }
            None => None,
        };
        let model = match self.model {
            Some(model) => Some(model),
            None if !self.skip_default_clients => default_model(&config),
            None => None,
        };

        let cache = Arc::new(EmbeddingCache::new("embeddings", DEFAULT_TTL, 10_000));
        let embedder =
            Arc::new(Embedder::initialize(provider, cache, config.embedder.clone()).await);

        let knowledge: Arc<dyn KnowledgeStore> = self
            .knowledge
            .unwrap_or_else(|| Arc::new(InMemoryKnowledgeStore::new()));
        let mut ingestor = Ingestor::new(
            Chunker::new(config.chunker.clone()),
            embedder.clone(),
            knowledge.clone(),
        );
        if config.chat.extract_knowledge {
            if let Some(model) = &model {
                ingestor = ingestor.with_extractor(KnowledgeExtractor::new(model.clone()));
            }
        }

        let mut retriever = Retriever::builder(embedder.clone(), knowledge)
            .with_config(config.retrieval.clone());
        if let Some(index) = self.vector_index {
            retriever = retriever.with_vector_index(index);
        }
        let retriever = Arc::new(retriever.build());

        let mut engine = MemoryEngine::new(config.memory.clone(), FactRuleSet::standard()?);
        if let Some(model) = &model {
            engine = engine.with_consolidation(model.clone());
        }
        let memories: Arc<dyn MemoryStore> = self
            .memories
            .unwrap_or_else(|| Arc::new(InMemoryMemoryStore::new()));
        let recorder = Arc::new(TurnRecorder::new(Arc::new(engine), memories.clone()));

        let bots = self
            .bots
            .unwrap_or_else(|| Arc::new(InMemoryBotDirectory::new(config.bots.clone())));
        let bots: Arc<dyn BotDirectory> = Arc::new(CachedBotDirectory::new(
            bots,
            Duration::from_secs(config.chat.bot_cache_ttl_secs),
        ));

        let chat = model.map(|model| {
            ChatPipeline::new(bots, memories, retriever.clone(), model, recorder.clone())
                .with_prompt(PromptBuilder::new(config.chat.history_turns))
                .with_temperature(config.chat.temperature)
        });

        info!(
            "Service ready: {:?} embeddings, retrieval tiers {:?}, chat {}",
            embedder.mode(),
            retriever.tiers(),
            if chat.is_some() { "enabled" } else { "disabled" }
        );

        Ok(RagService {
            embedder,
            ingestor,
            retriever,
            recorder,
            chat,
        })
    }
}

fn default_embedding_provider(config: &RagConfig) -> Arc<dyn EmbeddingProvider> {
    let settings = &config.embedding_provider;
    let mut provider = OpenAIProvider::new()
        .with_api_key_env(&settings.api_key_env)
        .with_base_url(&settings.base_url)
        .with_model(&settings.model);
    if let Some(dimensions) = settings.dimensions {
        provider = provider.with_dimensions(dimensions);
    }
    Arc::new(provider)
}

fn default_model(config: &RagConfig) -> Option<Arc<dyn LanguageModel>> {
    let settings = &config.model;
    let client = OpenAiChatModel::new()
        .with_api_key_env(&settings.api_key_env)
        .with_base_url(&settings.base_url)
        .with_model(&settings.model);
    if !client.is_configured() {
        info!(
            "{} is not set, chat and consolidation are disabled",
            settings.api_key_env
        );
        return None;
    }
    Some(Arc::new(ResilientModel::new(
        Arc::new(client),
        settings.retry.clone(),
    )))
}
