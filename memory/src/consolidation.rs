//! Periodic summary and profile consolidation.

use std::sync::Arc;
use std::time::Duration;

use chatrag_llm::json::parse_first_object;
use chatrag_llm::{ChatMessage, GenerateOptions, LanguageModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{ConversationTurn, CustomerMemory};

const CONSOLIDATION_PROMPT: &str = "You maintain a customer record for a sales and support chat bot. \
Update it from the latest exchange. Reply with one JSON object and nothing else: \
{\"summary\": \"what has happened in the conversation so far, under 100 words\", \
\"profile\": \"the customer's personality, needs and attitude, under 50 words\"}. \
Write in the language the customer uses.";

/// What the model returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consolidation {
    pub summary: String,
    #[serde(default)]
    pub profile: String,
}

impl Consolidation {
    /// Replace the stored summary and profile.
    pub fn apply_to(&self, memory: &mut CustomerMemory) {
        memory.context_summary = Some(self.summary.clone());
        if !self.profile.is_empty() {
            memory.profile = Some(self.profile.clone());
        }
    }
}

/// Asks the language model to fold the latest turn into the summary.
pub struct Consolidator {
    model: Arc<dyn LanguageModel>,
    options: GenerateOptions,
    timeout: Duration,
    max_summary_chars: usize,
    max_profile_chars: usize,
}

impl Consolidator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            options: GenerateOptions::new(0.2, 500),
            timeout: Duration::from_secs(30),
            max_summary_chars: 800,
            max_profile_chars: 400,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_limits(mut self, max_summary_chars: usize, max_profile_chars: usize) -> Self {
        self.max_summary_chars = max_summary_chars;
        self.max_profile_chars = max_profile_chars;
        self
    }

    /// A new summary and profile, or `None` when the model fails, times out,
    /// or answers with something unusable. The caller then keeps the old ones.
    pub async fn consolidate(
        &self,
        memory: &CustomerMemory,
        latest: &ConversationTurn,
    ) -> Option<Consolidation> {
        let messages = [
            ChatMessage::system(CONSOLIDATION_PROMPT),
            ChatMessage::user(render_request(memory, latest)),
        ];

        let reply = match tokio::time::timeout(
            self.timeout,
            self.model.generate(&messages, self.options),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("Skipping consolidation for {}: {e}", memory.customer_id);
                return None;
            }
            Err(_) => {
                warn!(
                    "Skipping consolidation for {}: model timed out",
                    memory.customer_id
                );
                return None;
            }
        };

        let parsed: Consolidation = match parse_first_object(&reply) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Discarding consolidation output for {}: {e}", memory.customer_id);
                return None;
            }
        };

        let summary = bounded(&parsed.summary, self.max_summary_chars);
        if summary.is_empty() {
            debug!("Consolidation returned an empty summary, keeping the old one");
            return None;
        }
        Some(Consolidation {
            summary,
            profile: bounded(&parsed.profile, self.max_profile_chars),
        })
    }
}

fn render_request(memory: &CustomerMemory, latest: &ConversationTurn) -> String {
    format!(
        "Previous summary: {}\nPrevious profile: {}\n\nLatest exchange:\nCustomer: {}\nBot: {}",
        memory.context_summary.as_deref().unwrap_or("(none)"),
        memory.profile.as_deref().unwrap_or("(none)"),
        latest.user_message,
        latest.bot_response,
    )
}

fn bounded(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect::<String>().trim_end().to_string()
}
