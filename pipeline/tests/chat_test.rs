//! Chat turns through a fully wired service with scripted collaborators.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chatrag_knowledge::{BotScope, SourceMeta};
use chatrag_llm::{ChatMessage, GenerateOptions, LanguageModel, LlmError, Result as LlmResult};
use chatrag_memory::{
    CustomerMemory, FactSource, InMemoryMemoryStore, Intent, MemoryError, MemoryStore,
    Result as MemoryResult,
};
use chatrag_pipeline::{
    BotProfile, CustomerField, FieldType, PipelineError, RagConfig, RagService,
};
use pretty_assertions::assert_eq;

const CATALOG: &str = "# Pricing\n\
The Pro plan costs 500k per month and includes priority support for every store.\n\
The Basic plan costs 200k per month and covers a single store location.\n\n\
# Support\n\
Our support team answers chats from 8am to 10pm every day, including holidays.\n";

/// Replies with a fixed text and keeps every prompt it was sent.
struct ScriptedModel {
    reply: Option<String>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn down() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_system_prompt(&self) -> String {
        let prompts = self.prompts.lock().unwrap();
        prompts.last().unwrap()[0].content.clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: &[ChatMessage], _: GenerateOptions) -> LlmResult<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.reply
            .clone()
            .ok_or_else(|| LlmError::Transport("connection refused".to_string()))
    }
}

struct UnreachableStore;

#[async_trait]
impl MemoryStore for UnreachableStore {
    async fn get_customer_memory(&self, _: &str, _: &BotScope) -> MemoryResult<Option<CustomerMemory>> {
        Err(MemoryError::Store("connection refused".to_string()))
    }

    async fn upsert_customer_memory(&self, _: &CustomerMemory) -> MemoryResult<u64> {
        Err(MemoryError::Store("connection refused".to_string()))
    }
}

fn config() -> RagConfig {
    let mut config = RagConfig::default();
    config.bots.push(
        BotProfile::new("shop", "Shop", "You sell store plans.")
            .with_field(CustomerField::new("phone", FieldType::Phone))
            .with_product("Pro plan"),
    );
    config.bots.push(
        BotProfile::new("clinic", "Clinic", "You book appointments.")
            .with_fallback_message("Sorry, please try again in a minute."),
    );
    config
}

async fn service(
    model: Arc<ScriptedModel>,
    memories: Arc<dyn MemoryStore>,
) -> RagService {
    let service = RagService::builder(config())
        .offline()
        .with_model(model)
        .with_memory_store(memories)
        .build()
        .await
        .unwrap();
    service
        .ingest(&BotScope::new("shop"), CATALOG, &SourceMeta::from_filename("catalog.md"))
        .await
        .unwrap();
    service
}

#[tokio::test]
async fn test_turn_replies_then_records() {
    let model = ScriptedModel::replying("The Pro plan is 500k a month. [SAVE:phone=0912345678]");
    let memories = Arc::new(InMemoryMemoryStore::new());
    let service = service(model.clone(), memories.clone()).await;

    let turn = service
        .handle_turn("shop", "c1", "What is the Pro plan price? My number is 0912345678")
        .await
        .unwrap();

    assert_eq!(turn.reply, "The Pro plan is 500k a month.");
    assert_eq!(turn.intent, Intent::PriceInquiry);
    assert!(!turn.knowledge.is_empty());
    assert!(model.last_system_prompt().contains("500k per month"));

    turn.persistence.await.unwrap();
    let memory = memories
        .get_customer_memory("c1", &BotScope::new("shop"))
        .await
        .unwrap()
        .unwrap();
    let phone = memory.fact("phone").unwrap();
    assert_eq!(phone.field_value, "0912345678");
    assert_eq!(phone.source, FactSource::Direct);
    assert_eq!(memory.turn_count, 1);
    assert_eq!(memory.preferences.product_interests, vec!["Pro plan".to_string()]);
    assert_eq!(
        memory.last_turn().unwrap().bot_response,
        "The Pro plan is 500k a month."
    );
}

#[tokio::test]
async fn test_second_turn_sees_first() {
    let model = ScriptedModel::replying("Noted.");
    let memories = Arc::new(InMemoryMemoryStore::new());
    let service = service(model.clone(), memories).await;

    let first = service.handle_turn("shop", "c1", "my email is an@shop.vn").await.unwrap();
    first.persistence.await.unwrap();
    service.handle_turn("shop", "c1", "thanks").await.unwrap();

    let prompts = model.prompts.lock().unwrap();
    let second = prompts.last().unwrap();
    assert!(second[0].content.contains("- email: an@shop.vn (conversation)"));
    assert_eq!(second[1].content, "my email is an@shop.vn");
    assert_eq!(second[2].content, "Noted.");
}

#[tokio::test]
async fn test_greeting_skips_retrieval() {
    let model = ScriptedModel::replying("Hello!");
    let service = service(model.clone(), Arc::new(InMemoryMemoryStore::new())).await;

    let turn = service.handle_turn("shop", "c1", "hello").await.unwrap();

    assert_eq!(turn.intent, Intent::Greeting);
    assert!(turn.knowledge.is_empty());
    assert!(model.last_system_prompt().contains("- None for this message."));
}

#[tokio::test]
async fn test_unknown_bot_is_fatal() {
    let service = service(ScriptedModel::replying("hi"), Arc::new(InMemoryMemoryStore::new())).await;
    let err = service.handle_turn("nope", "c1", "hello").await.unwrap_err();
    assert!(matches!(err, PipelineError::UnknownBot(code) if code == "nope"));
}

#[tokio::test]
async fn test_unreadable_memory_is_fatal() {
    let service = service(ScriptedModel::replying("hi"), Arc::new(UnreachableStore)).await;
    let err = service.handle_turn("shop", "c1", "hello").await.unwrap_err();
    assert!(matches!(err, PipelineError::Store(_)));
}

#[tokio::test]
async fn test_model_failure_uses_fallback_when_configured() {
    let memories = Arc::new(InMemoryMemoryStore::new());
    let service = service(ScriptedModel::down(), memories.clone()).await;

    let turn = service.handle_turn("clinic", "c1", "Book me for Monday").await.unwrap();
    assert_eq!(turn.reply, "Sorry, please try again in a minute.");
    turn.persistence.await.unwrap();
    assert!(
        memories
            .get_customer_memory("c1", &BotScope::new("clinic"))
            .await
            .unwrap()
            .is_some()
    );

    let err = service.handle_turn("shop", "c1", "Pro plan price?").await.unwrap_err();
    assert!(matches!(err, PipelineError::Llm(_)));
}

#[tokio::test]
async fn test_record_turn_without_chat() {
    let memories = Arc::new(InMemoryMemoryStore::new());
    let service = RagService::builder(RagConfig::default())
        .offline()
        .with_memory_store(memories.clone())
        .build()
        .await
        .unwrap();

    let err = service.handle_turn("shop", "c1", "hello").await.unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));

    let bot = BotScope::new("shop");
    service
        .record_turn("c1", &bot, "hi", "hello", vec![("name".to_string(), "Lan".to_string())])
        .await
        .unwrap();

    let memory = memories.get_customer_memory("c1", &bot).await.unwrap().unwrap();
    assert_eq!(memory.fact("name").unwrap().field_value, "Lan");
}

#[tokio::test]
async fn test_exposed_chunk_and_embed() {
    let service = RagService::builder(RagConfig::default())
        .offline()
        .build()
        .await
        .unwrap();

    let drafts = service.chunk_document(CATALOG, &SourceMeta::from_filename("catalog.md"));
    assert!(!drafts.is_empty());
    assert!(drafts[0].chunk_id.starts_with("catalog.md-0-0-"));

    assert!(!service.embedding_mode().is_neural());
    let vector = service.embed("Pro plan price").await.unwrap();
    assert_eq!(vector.len(), chatrag_embeddings::HASHING_DIMENSION);
    assert_eq!(service.embed("Pro plan price").await.unwrap(), vector);
}
