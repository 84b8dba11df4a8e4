//! Per-turn memory updates.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consolidation::{Consolidation, Consolidator};
use crate::model::{AttributeValue, ConversationTurn, CustomerMemory, MemoryFact, remember_recent};
use crate::rules::FactRuleSet;
use crate::topics::{GENERAL_TOPIC, Intent, derive_topics, detect_intent};

/// Configuration for the [`MemoryEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Conversation turns kept per customer.
    pub history_cap: usize,

    /// Entries kept in each preference list.
    pub preference_cap: usize,

    /// Consolidate on every Nth recorded turn. Zero disables it.
    pub consolidation_every: u64,

    /// A fact at or above this confidence is not replaced by inference.
    pub direct_evidence_threshold: f32,

    /// Confidence given to rule-matched facts.
    pub rule_confidence: f32,

    /// Upper bound on one consolidation call.
    pub consolidation_timeout_ms: u64,

    pub max_summary_chars: usize,
    pub max_profile_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            history_cap: 20,
            preference_cap: 5,
            consolidation_every: 4,
            direct_evidence_threshold: 0.8,
            rule_confidence: 0.7,
            consolidation_timeout_ms: 30_000,
            max_summary_chars: 800,
            max_profile_chars: 400,
        }
    }
}

impl MemoryConfig {
    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }

    pub fn with_consolidation_every(mut self, turns: u64) -> Self {
        self.consolidation_every = turns;
        self
    }

    pub fn consolidation_timeout(&self) -> Duration {
        Duration::from_millis(self.consolidation_timeout_ms)
    }

    /// Whether the turn with this 1-based number triggers consolidation.
    pub fn consolidates_on(&self, turn_number: u64) -> bool {
        self.consolidation_every > 0 && turn_number > 0 && turn_number % self.consolidation_every == 0
    }
}

/// One exchange to record, plus whatever the pipeline derived from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    pub user_message: String,
    pub bot_response: String,
    /// Intent already derived upstream. Detected from the message if absent.
    pub intent: Option<Intent>,
    /// Fields the customer gave explicitly, e.g. through save commands.
    pub direct_facts: Vec<(String, String)>,
    /// Structured values captured alongside the reply.
    pub attributes: Vec<(String, AttributeValue)>,
    pub product_interests: Vec<String>,
}

impl TurnInput {
    pub fn new(user_message: impl Into<String>, bot_response: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            bot_response: bot_response.into(),
            ..Default::default()
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_direct_fact(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.direct_facts.push((field.into(), value.into()));
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.push((key.into(), value));
        self
    }

    pub fn with_product_interest(mut self, product: impl Into<String>) -> Self {
        self.product_interests.push(product.into());
        self
    }
}

/// What applying a turn changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnReport {
    /// Fields whose fact was added or replaced.
    pub updated_fields: Vec<String>,
    /// Whether this turn is due for consolidation.
    pub consolidation_due: bool,
}

/// Applies turns to customer memory.
pub struct MemoryEngine {
    config: MemoryConfig,
    rules: FactRuleSet,
    consolidator: Option<Consolidator>,
}

impl MemoryEngine {
    pub fn new(config: MemoryConfig, rules: FactRuleSet) -> Self {
        Self {
            config,
            rules,
            consolidator: None,
        }
    }

    /// Enable periodic consolidation through `model`.
    pub fn with_consolidation(mut self, model: Arc<dyn chatrag_llm::LanguageModel>) -> Self {
        self.consolidator = Some(
            Consolidator::new(model)
                .with_timeout(self.config.consolidation_timeout())
                .with_limits(self.config.max_summary_chars, self.config.max_profile_chars),
        );
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Apply one turn without any model call.
    ///
    /// The turn is appended to the bounded history, rule-matched facts are
    /// proposed, then direct facts overwrite whatever is there.
    pub fn apply_turn(
        &self,
        memory: &mut CustomerMemory,
        input: &TurnInput,
        now: DateTime<Utc>,
    ) -> TurnReport {
        let intent = input
            .intent
            .unwrap_or_else(|| detect_intent(&input.user_message));
        let topics = derive_topics(&input.user_message);

        memory.push_turn(
            ConversationTurn {
                timestamp: now,
                user_message: input.user_message.clone(),
                bot_response: input.bot_response.clone(),
                topics: topics.clone(),
                intent,
            },
            self.config.history_cap,
        );

        let mut report = TurnReport::default();
        for proposal in self.rules.extract(&input.user_message) {
            let fact = MemoryFact::conversation(
                &proposal.field_name,
                proposal.field_value,
                self.config.rule_confidence,
                now,
            );
            if memory.propose_fact(fact, self.config.direct_evidence_threshold) {
                report.updated_fields.push(proposal.field_name);
            }
        }

        for (field, value) in &input.direct_facts {
            let value = value.trim();
            if field.trim().is_empty() || value.is_empty() {
                continue;
            }
            memory.propose_fact(
                MemoryFact::direct(field.trim(), value, now),
                self.config.direct_evidence_threshold,
            );
            if !report.updated_fields.iter().any(|f| f == field.trim()) {
                report.updated_fields.push(field.trim().to_string());
            }
        }

        for (key, value) in &input.attributes {
            memory.attributes.insert(key.clone(), value.clone());
        }

        let interesting: Vec<String> = topics.into_iter().filter(|t| t != GENERAL_TOPIC).collect();
        remember_recent(
            &mut memory.preferences.topics_of_interest,
            &interesting,
            self.config.preference_cap,
        );
        remember_recent(
            &mut memory.preferences.product_interests,
            &input.product_interests,
            self.config.preference_cap,
        );

        memory.turn_count += 1;
        memory.last_updated = now;
        report.consolidation_due =
            self.consolidator.is_some() && self.config.consolidates_on(memory.turn_count);

        if !report.updated_fields.is_empty() {
            debug!(
                "Updated facts {:?} for {} on {}",
                report.updated_fields, memory.customer_id, memory.bot
            );
        }
        report
    }

    /// Ask the model for a new summary of `memory`. `None` leaves it as is.
    pub async fn consolidate(&self, memory: &CustomerMemory) -> Option<Consolidation> {
        let consolidator = self.consolidator.as_ref()?;
        let latest = memory.last_turn()?;
        consolidator.consolidate(memory, latest).await
    }

    /// Apply a turn and, when due, consolidate.
    pub async fn record_turn(
        &self,
        memory: &mut CustomerMemory,
        input: &TurnInput,
        now: DateTime<Utc>,
    ) -> TurnReport {
        let report = self.apply_turn(memory, input, now);
        if report.consolidation_due {
            if let Some(outcome) = self.consolidate(memory).await {
                outcome.apply_to(memory);
            }
        }
        report
    }
}
