//! Bot profiles and their lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatrag_embeddings::TtlCache;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// Kind of value a customer field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Email,
    Phone,
    Date,
    Enum,
}

/// A piece of customer information the bot collects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerField {
    pub field_name: String,
    #[serde(default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl CustomerField {
    pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field_name: field_name.into(),
            field_type,
            description: None,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

fn default_max_response_tokens() -> u32 {
    500
}

/// Everything the pipeline needs to know about one bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotProfile {
    pub code: String,
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub customer_fields: Vec<CustomerField>,
    /// Products the bot sells. Mentions are tracked as customer interests.
    #[serde(default)]
    pub product_focus: Vec<String>,
    /// Reply used when the model cannot be reached.
    #[serde(default)]
    pub fallback_message: Option<String>,
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,
}

impl BotProfile {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            system_prompt: system_prompt.into(),
            customer_fields: Vec::new(),
            product_focus: Vec::new(),
            fallback_message: None,
            max_response_tokens: default_max_response_tokens(),
        }
    }

    pub fn with_field(mut self, field: CustomerField) -> Self {
        self.customer_fields.push(field);
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product_focus.push(product.into());
        self
    }

    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = Some(message.into());
        self
    }

    pub fn collects(&self, field_name: &str) -> bool {
        self.customer_fields
            .iter()
            .any(|f| f.field_name == field_name)
    }

    /// Products named in `message`, case-insensitively.
    pub fn mentioned_products(&self, message: &str) -> Vec<String> {
        let lower = message.to_lowercase();
        self.product_focus
            .iter()
            .filter(|p| !p.trim().is_empty() && lower.contains(&p.to_lowercase()))
            .cloned()
            .collect()
    }
}

/// Looks bots up by code.
#[async_trait]
pub trait BotDirectory: Send + Sync {
    async fn find_bot(&self, code: &str) -> Result<Option<BotProfile>>;
}

/// Bots held in process memory, typically loaded from configuration.
#[derive(Default)]
pub struct InMemoryBotDirectory {
    bots: RwLock<HashMap<String, BotProfile>>,
}

impl InMemoryBotDirectory {
    pub fn new(bots: impl IntoIterator<Item = BotProfile>) -> Self {
        Self {
            bots: RwLock::new(bots.into_iter().map(|b| (b.code.clone(), b)).collect()),
        }
    }

    pub async fn register(&self, bot: BotProfile) {
        self.bots.write().await.insert(bot.code.clone(), bot);
    }
}

#[async_trait]
impl BotDirectory for InMemoryBotDirectory {
    async fn find_bot(&self, code: &str) -> Result<Option<BotProfile>> {
        Ok(self.bots.read().await.get(code).cloned())
    }
}

/// Caches another directory's hits. Misses are not cached.
pub struct CachedBotDirectory {
    inner: Arc<dyn BotDirectory>,
    cache: TtlCache<BotProfile>,
}

impl CachedBotDirectory {
    pub fn new(inner: Arc<dyn BotDirectory>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new("bots", ttl, 1_000),
        }
    }

    pub async fn invalidate(&self) {
        self.cache.clear().await;
    }
}

#[async_trait]
impl BotDirectory for CachedBotDirectory {
    async fn find_bot(&self, code: &str) -> Result<Option<BotProfile>> {
        if let Some(bot) = self.cache.get(code).await {
            return Ok(Some(bot));
        }
        let found = self.inner.find_bot(code).await?;
        if let Some(bot) = &found {
            debug!("Caching profile for bot {code}");
            self.cache.insert(code, bot.clone()).await;
        }
        Ok(found)
    }
}
