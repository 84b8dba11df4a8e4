//! # LLM
//!
//! The language-model collaborator used for chat replies, per-chunk
//! knowledge extraction, and memory consolidation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  caller ──► ResilientModel ──timeout/retry──► LanguageModel   │
//! │                                                   │          │
//! │                                     OpenAiChatModel (HTTP)   │
//! │                                                              │
//! │  model text ──► json::strip_code_fences ──► first [..]/{..}  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Structured callers never trust the raw completion: they go through
//! [`json::parse_first_array`] or [`json::parse_first_object`].

pub mod client;
pub mod error;
pub mod json;
pub mod openai;
pub mod retry;

pub use client::{ChatMessage, GenerateOptions, LanguageModel, MAX_TOKENS_CAP, Role};
pub use error::{LlmError, Result};
pub use openai::OpenAiChatModel;
pub use retry::{ResilientModel, RetryPolicy};
