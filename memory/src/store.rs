//! Customer memory persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chatrag_knowledge::BotScope;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{MemoryError, Result};
use crate::model::CustomerMemory;

/// Storage for [`CustomerMemory`] records, one per customer and bot.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get_customer_memory(
        &self,
        customer_id: &str,
        bot: &BotScope,
    ) -> Result<Option<CustomerMemory>>;

    /// Save `memory` if the stored version still equals `memory.version`
    /// (or nothing is stored and the version is 0). Returns the new version.
    async fn upsert_customer_memory(&self, memory: &CustomerMemory) -> Result<u64>;
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    records: RwLock<HashMap<(BotScope, String), CustomerMemory>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn get_customer_memory(
        &self,
        customer_id: &str,
        bot: &BotScope,
    ) -> Result<Option<CustomerMemory>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(bot.clone(), customer_id.to_string()))
            .cloned())
    }

    async fn upsert_customer_memory(&self, memory: &CustomerMemory) -> Result<u64> {
        let key = (memory.bot.clone(), memory.customer_id.clone());
        let mut records = self.records.write().await;

        let found = records.get(&key).map_or(0, |stored| stored.version);
        if found != memory.version {
            return Err(MemoryError::VersionConflict {
                expected: memory.version,
                found,
            });
        }

        let mut saved = memory.clone();
        saved.version = memory.version + 1;
        let version = saved.version;
        records.insert(key, saved);
        debug!(
            "Saved memory for {} on {} at version {version}",
            memory.customer_id, memory.bot
        );
        Ok(version)
    }
}

/// Store that keeps nothing. Every turn starts from an empty memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMemoryStore;

#[async_trait]
impl MemoryStore for NoopMemoryStore {
    async fn get_customer_memory(&self, _: &str, _: &BotScope) -> Result<Option<CustomerMemory>> {
        Ok(None)
    }

    async fn upsert_customer_memory(&self, memory: &CustomerMemory) -> Result<u64> {
        Ok(memory.version + 1)
    }
}
