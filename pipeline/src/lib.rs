//! # Chat Pipeline
//!
//! Composition root for the RAG support layer: configuration, bot lookup,
//! the per-turn chat flow, and the `chatrag` command line.
//!
//! ## A chat turn
//!
//! ```text
//! message ──► detect_intent
//!                │
//!     ┌──────────┼───────────────────────┐   tokio::join!
//!     ▼          ▼                       ▼
//!  BotDirectory  MemoryStore        Retriever (if the intent wants it)
//!  (cached)      (fatal on error)        │
//!     └──────────┴──────────┬────────────┘
//!                           ▼
//!                  PromptBuilder ──► LanguageModel
//!                                         │
//!                                         ▼
//!                       parse_reply: [SAVE:f=v], DATA block
//!                                         │
//!                  reply ◄────────────────┤
//!                                         ▼
//!                        TurnRecorder (detached task)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chatrag_pipeline::{RagConfig, RagService};
//!
//! let service = RagService::builder(RagConfig::load("chatrag.toml").await?)
//!     .build()
//!     .await?;
//! let turn = service.handle_turn("shop", "customer-1", "Gói Pro giá bao nhiêu?").await?;
//! println!("{}", turn.reply);
//! ```

pub mod bots;
pub mod chat;
pub mod config;
pub mod error;
pub mod prompt;
pub mod response;
pub mod service;

pub use bots::{
    BotDirectory, BotProfile, CachedBotDirectory, CustomerField, FieldType, InMemoryBotDirectory,
};
pub use chat::{ChatPipeline, ChatTurn};
pub use config::{ChatConfig, EmbeddingProviderConfig, ModelConfig, RagConfig};
pub use error::{PipelineError, Result};
pub use prompt::PromptBuilder;
pub use response::{ParsedReply, parse_reply};
pub use service::{RagService, RagServiceBuilder};
