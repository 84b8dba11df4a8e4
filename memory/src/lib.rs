//! # Customer Memory
//!
//! What a bot remembers about each customer between turns: facts, a bounded
//! conversation history, preferences, and a periodically consolidated
//! summary.
//!
//! ## Recording a turn
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        TurnRecorder                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  per-customer lock ──► MemoryStore::get (or new record)      │
//! │                              │                               │
//! │                              ▼                               │
//! │  MemoryEngine::apply_turn                                    │
//! │    intent + topics ──► history (bounded)                     │
//! │    FactRuleSet ──► conversation facts (0.7)                  │
//! │    direct facts (1.0), attributes, preferences               │
//! │                              │ every Nth turn                │
//! │                              ▼                               │
//! │  Consolidator ──► summary + profile                          │
//! │                              │                               │
//! │                              ▼                               │
//! │  MemoryStore::upsert (version checked, one retry)            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chatrag_memory::{FactRuleSet, MemoryConfig, MemoryEngine, TurnInput, TurnRecorder};
//!
//! let engine = MemoryEngine::new(MemoryConfig::default(), FactRuleSet::standard()?)
//!     .with_consolidation(model);
//! let recorder = Arc::new(TurnRecorder::new(Arc::new(engine), store));
//! recorder.record_detached(customer_id, bot, TurnInput::new(message, reply));
//! ```

pub mod consolidation;
pub mod engine;
pub mod error;
pub mod model;
pub mod recorder;
pub mod rules;
pub mod scoring;
pub mod store;
pub mod topics;

pub use consolidation::{Consolidation, Consolidator};
pub use engine::{MemoryConfig, MemoryEngine, TurnInput, TurnReport};
pub use error::{MemoryError, Result};
pub use model::{
    AttributeValue, ConversationTurn, CustomerMemory, FactSource, MemoryFact, Preferences,
};
pub use recorder::TurnRecorder;
pub use rules::{FactProposal, FactRule, FactRuleSet, PatternRule};
pub use scoring::{EngagementTier, PotentialScore};
pub use store::{InMemoryMemoryStore, MemoryStore, NoopMemoryStore};
pub use topics::{GENERAL_TOPIC, Intent, derive_topics, detect_intent};
