//! Workspace-wide configuration, loadable from TOML.
//!
//! Every section is optional; a missing section takes its defaults. API keys
//! never live in the file, only the names of the environment variables that
//! hold them.

use std::path::Path;

use chatrag_embeddings::EmbedderConfig;
use chatrag_knowledge::ChunkerConfig;
use chatrag_llm::RetryPolicy;
use chatrag_memory::MemoryConfig;
use chatrag_retrieval::RetrievalConfig;
use serde::{Deserialize, Serialize};

use crate::bots::BotProfile;
use crate::error::{PipelineError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunker: ChunkerConfig,
    pub embedder: EmbedderConfig,
    pub embedding_provider: EmbeddingProviderConfig,
    pub model: ModelConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
    pub chat: ChatConfig,
    /// Bots served by the in-memory directory.
    pub bots: Vec<BotProfile>,
}

impl RagConfig {
    /// Read a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }
}

/// OpenAI-compatible embedding endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingProviderConfig {
    /// When false, hashing embeddings are used without probing.
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub dimensions: Option<usize>,
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimensions: None,
        }
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub retry: RetryPolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Chat turn settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub temperature: f32,

    /// Earlier turns replayed to the model as messages.
    pub history_turns: usize,

    /// Bot profile cache flush interval.
    pub bot_cache_ttl_secs: u64,

    /// Run model extraction over chunks during ingestion.
    pub extract_knowledge: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            history_turns: 4,
            bot_cache_ttl_secs: 60 * 60,
            extract_knowledge: false,
        }
    }
}
