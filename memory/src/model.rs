//! Customer memory data model.

use std::fmt;

use chatrag_knowledge::BotScope;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::topics::{GENERAL_TOPIC, Intent};

/// How a fact was learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    /// The customer stated it and the bot saved it explicitly.
    Direct,
    /// Derived by an analysis step.
    Inferred,
    /// Matched by a rule against a chat message.
    Conversation,
}

impl fmt::Display for FactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FactSource::Direct => "direct",
            FactSource::Inferred => "inferred",
            FactSource::Conversation => "conversation",
        };
        f.write_str(name)
    }
}

/// One thing known about a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFact {
    pub field_name: String,
    pub field_value: String,
    /// Trust in the value, 0 to 1.
    pub confidence: f32,
    pub last_confirmed: DateTime<Utc>,
    pub source: FactSource,
}

impl MemoryFact {
    /// A fact the customer gave directly. Always fully trusted.
    pub fn direct(
        field_name: impl Into<String>,
        field_value: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            field_value: field_value.into(),
            confidence: 1.0,
            last_confirmed: now,
            source: FactSource::Direct,
        }
    }

    /// A fact matched in conversation text.
    pub fn conversation(
        field_name: impl Into<String>,
        field_value: impl Into<String>,
        confidence: f32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            field_value: field_value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            last_confirmed: now,
            source: FactSource::Conversation,
        }
    }
}

/// One exchange between customer and bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub timestamp: DateTime<Utc>,
    pub user_message: String,
    pub bot_response: String,
    pub topics: Vec<String>,
    pub intent: Intent,
}

/// Bounded interest lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub communication_style: String,
    pub topics_of_interest: Vec<String>,
    pub pain_points: Vec<String>,
    pub product_interests: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            communication_style: "friendly".to_string(),
            topics_of_interest: Vec::new(),
            pain_points: Vec::new(),
            product_interests: Vec::new(),
        }
    }
}

/// Append `values` to `list`, moving repeats to the end and keeping the
/// most recent `cap`.
pub(crate) fn remember_recent(list: &mut Vec<String>, values: &[String], cap: usize) {
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        list.retain(|existing| existing != value);
        list.push(value.to_string());
    }
    if list.len() > cap {
        list.drain(..list.len() - cap);
    }
}

/// A captured attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
}

impl AttributeValue {
    /// Convert a JSON scalar. Arrays, objects, and null are not attributes.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) => Some(
                s.parse::<DateTime<Utc>>()
                    .map_or_else(|_| Self::Text(s.clone()), Self::Date),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

/// Everything a bot remembers about one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMemory {
    pub customer_id: String,
    pub bot: BotScope,
    /// At most one fact per field.
    pub facts: Vec<MemoryFact>,
    /// Oldest first, bounded.
    pub conversation_history: Vec<ConversationTurn>,
    pub preferences: Preferences,
    /// Values captured from structured reply data, in arrival order.
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeValue>,
    pub context_summary: Option<String>,
    pub profile: Option<String>,
    /// Turns recorded over the memory's lifetime. Drives consolidation.
    pub turn_count: u64,
    /// Bumped by the store on every successful save.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl CustomerMemory {
    pub fn new(customer_id: impl Into<String>, bot: BotScope, now: DateTime<Utc>) -> Self {
        Self {
            customer_id: customer_id.into(),
            bot,
            facts: Vec::new(),
            conversation_history: Vec::new(),
            preferences: Preferences::default(),
            attributes: IndexMap::new(),
            context_summary: None,
            profile: None,
            turn_count: 0,
            version: 0,
            created_at: now,
            last_updated: now,
        }
    }

    pub fn fact(&self, field_name: &str) -> Option<&MemoryFact> {
        self.facts.iter().find(|f| f.field_name == field_name)
    }

    /// Apply a fact under the overwrite rules and report whether it was kept.
    ///
    /// Direct facts always win. Any other proposal is kept only when the
    /// field is unknown or its current confidence is below `trusted_at`.
    pub fn propose_fact(&mut self, fact: MemoryFact, trusted_at: f32) -> bool {
        match self.facts.iter_mut().find(|f| f.field_name == fact.field_name) {
            None => {
                self.facts.push(fact);
                true
            }
            Some(existing) => {
                if fact.source == FactSource::Direct || existing.confidence < trusted_at {
                    *existing = fact;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Append a turn, dropping the oldest beyond `cap`.
    pub fn push_turn(&mut self, turn: ConversationTurn, cap: usize) {
        self.conversation_history.push(turn);
        if self.conversation_history.len() > cap {
            let excess = self.conversation_history.len() - cap;
            self.conversation_history.drain(..excess);
        }
    }

    /// Distinct topics across the retained history, excluding the default.
    pub fn known_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for topic in self.conversation_history.iter().flat_map(|t| &t.topics) {
            if topic != GENERAL_TOPIC && !topics.contains(topic) {
                topics.push(topic.clone());
            }
        }
        topics
    }

    pub fn last_turn(&self) -> Option<&ConversationTurn> {
        self.conversation_history.last()
    }
}
