//! One chat turn, end to end.
//!
//! Bot profile, customer memory, and knowledge are read concurrently. The
//! reply goes back to the caller as soon as the model answers; recording the
//! turn runs in the background.

use std::sync::Arc;

use chatrag_knowledge::BotScope;
use chatrag_llm::{GenerateOptions, LanguageModel};
use chatrag_memory::{
    AttributeValue, CustomerMemory, Intent, MemoryStore, TurnInput, TurnRecorder, detect_intent,
};
use chatrag_retrieval::{MergedKnowledgeItem, RetrieveOptions, Retriever};
use chrono::Utc;
use indexmap::IndexMap;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bots::BotDirectory;
use crate::error::{PipelineError, Result};
use crate::prompt::PromptBuilder;
use crate::response::{ParsedReply, parse_reply};

/// The outcome of [`ChatPipeline::handle_turn`].
#[derive(Debug)]
pub struct ChatTurn {
    /// Reply text for the customer, with save commands removed.
    pub reply: String,
    pub intent: Intent,
    /// Known attributes merged with anything captured this turn.
    pub captured: IndexMap<String, AttributeValue>,
    pub direct_facts: Vec<(String, String)>,
    pub knowledge: Vec<MergedKnowledgeItem>,
    /// Background recording of the turn. Dropping it does not cancel it.
    pub persistence: JoinHandle<()>,
}

/// Answers customer messages for any registered bot.
pub struct ChatPipeline {
    bots: Arc<dyn BotDirectory>,
    memories: Arc<dyn MemoryStore>,
    retriever: Arc<Retriever>,
    model: Arc<dyn LanguageModel>,
    recorder: Arc<TurnRecorder>,
    prompt: PromptBuilder,
    temperature: f32,
    retrieve_options: RetrieveOptions,
}

impl ChatPipeline {
    /// `memories` must be the store `recorder` writes to.
    pub fn new(
        bots: Arc<dyn BotDirectory>,
        memories: Arc<dyn MemoryStore>,
        retriever: Arc<Retriever>,
        model: Arc<dyn LanguageModel>,
        recorder: Arc<TurnRecorder>,
    ) -> Self {
        Self {
            bots,
            memories,
            retriever,
            model,
            recorder,
            prompt: PromptBuilder::default(),
            temperature: 0.7,
            retrieve_options: RetrieveOptions::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retrieve_options(mut self, options: RetrieveOptions) -> Self {
        self.retrieve_options = options;
        self
    }

    /// Answer `message` from `customer_id` to the bot `bot_code`.
    ///
    /// Fails only for an unknown bot, an unreadable customer record, or a
    /// model failure when the bot has no fallback message.
    pub async fn handle_turn(
        &self,
        bot_code: &str,
        customer_id: &str,
        message: &str,
    ) -> Result<ChatTurn> {
        let scope = BotScope::new(bot_code);
        let message = message.trim();
        let intent = detect_intent(message);

        let knowledge = async {
            if intent.wants_knowledge() {
                self.retriever
                    .retrieve_context(&scope, message, self.retrieve_options)
                    .await
            } else {
                Vec::new()
            }
        };
        let (bot, memory, knowledge) = tokio::join!(
            self.bots.find_bot(bot_code),
            self.memories.get_customer_memory(customer_id, &scope),
            knowledge,
        );

        let bot = bot?.ok_or_else(|| PipelineError::UnknownBot(bot_code.to_string()))?;
        let memory = memory
            .map_err(|e| PipelineError::Store(e.to_string()))?
            .unwrap_or_else(|| CustomerMemory::new(customer_id, scope.clone(), Utc::now()));

        let messages = self.prompt.build(&bot, &memory, &knowledge, message);
        let options = GenerateOptions::new(self.temperature, bot.max_response_tokens);
        let parsed = match self.model.generate(&messages, options).await {
            Ok(raw) => parse_reply(&raw, &bot),
            Err(e) => match &bot.fallback_message {
                Some(fallback) => {
                    warn!("Model failed for bot {bot_code}, sending fallback reply: {e}");
                    ParsedReply {
                        text: fallback.clone(),
                        ..Default::default()
                    }
                }
                None => return Err(e.into()),
            },
        };

        let mut captured = memory.attributes;
        captured.extend(parsed.data.iter().map(|(k, v)| (k.clone(), v.clone())));

        let input = TurnInput {
            user_message: message.to_string(),
            bot_response: parsed.text.clone(),
            intent: Some(intent),
            direct_facts: parsed.direct_facts.clone(),
            attributes: parsed.data.into_iter().collect(),
            product_interests: bot.mentioned_products(message),
        };
        let persistence =
            self.recorder
                .record_detached(customer_id.to_string(), scope, input);

        info!(
            "Answered {customer_id} on {bot_code} ({intent}, {} knowledge items, {} saved fields)",
            knowledge.len(),
            parsed.direct_facts.len()
        );
        Ok(ChatTurn {
            reply: parsed.text,
            intent,
            captured,
            direct_facts: parsed.direct_facts,
            knowledge,
            persistence,
        })
    }
}
