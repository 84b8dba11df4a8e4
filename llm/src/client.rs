//! The language-model collaborator contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Largest completion budget any caller may request.
pub const MAX_TOKENS_CAP: u32 = 8000;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling options for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

impl GenerateOptions {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
        .clamped()
    }

    /// Options for deterministic structured output.
    pub fn structured(max_tokens: u32) -> Self {
        Self::new(0.0, max_tokens)
    }

    /// Bring values into the ranges providers accept.
    pub fn clamped(self) -> Self {
        Self {
            temperature: self.temperature.clamp(0.0, 2.0),
            max_tokens: self.max_tokens.clamp(1, MAX_TOKENS_CAP),
        }
    }
}

/// Anything that can turn a chat prompt into text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Generate a completion for `messages`.
    async fn generate(&self, messages: &[ChatMessage], options: GenerateOptions) -> Result<String>;
}
