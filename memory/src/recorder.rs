//! Serialized turn recording.
//!
//! Turns for the same customer and bot are applied one at a time inside the
//! process. Writers in other processes are caught by the store's version
//! check, in which case the turn is reapplied to the fresh record once.

use std::collections::HashMap;
use std::sync::Arc;

use chatrag_knowledge::BotScope;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::consolidation::Consolidation;
use crate::engine::{MemoryEngine, TurnInput};
use crate::error::{MemoryError, Result};
use crate::model::CustomerMemory;
use crate::store::MemoryStore;

type RecordKey = (BotScope, String);

/// Loads, updates, and saves customer memory for each finished turn.
pub struct TurnRecorder {
    engine: Arc<MemoryEngine>,
    store: Arc<dyn MemoryStore>,
    locks: Mutex<HashMap<RecordKey, Arc<Mutex<()>>>>,
}

impl TurnRecorder {
    pub fn new(engine: Arc<MemoryEngine>, store: Arc<dyn MemoryStore>) -> Self {
        Self {
            engine,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// Record one turn and return the memory as saved.
    pub async fn record(
        &self,
        customer_id: &str,
        bot: &BotScope,
        input: &TurnInput,
    ) -> Result<CustomerMemory> {
        let key = (bot.clone(), customer_id.to_string());
        let lock = self.lock_for(&key).await;

        let result = {
            let _guard = lock.lock().await;
            self.record_locked(customer_id, bot, input, Utc::now()).await
        };

        drop(lock);
        self.release(&key).await;
        result
    }

    /// Record in the background. Failures are logged, never returned.
    pub fn record_detached(
        self: &Arc<Self>,
        customer_id: String,
        bot: BotScope,
        input: TurnInput,
    ) -> JoinHandle<()> {
        let recorder = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = recorder.record(&customer_id, &bot, &input).await {
                warn!("Failed to record turn for {customer_id} on {bot}: {e}");
            }
        })
    }

    async fn record_locked(
        &self,
        customer_id: &str,
        bot: &BotScope,
        input: &TurnInput,
        now: DateTime<Utc>,
    ) -> Result<CustomerMemory> {
        let mut memory = self.load(customer_id, bot, now).await?;
        let report = self.engine.apply_turn(&mut memory, input, now);

        // Computed once and reused if the save has to be retried.
        let consolidation = if report.consolidation_due {
            self.engine.consolidate(&memory).await
        } else {
            None
        };
        apply_consolidation(&mut memory, consolidation.as_ref());

        match self.store.upsert_customer_memory(&memory).await {
            Ok(version) => {
                memory.version = version;
                Ok(memory)
            }
            Err(MemoryError::VersionConflict { expected, found }) => {
                info!(
                    "Memory for {customer_id} on {bot} moved from version {expected} to {found}, reapplying turn"
                );
                let mut fresh = self.load(customer_id, bot, now).await?;
                self.engine.apply_turn(&mut fresh, input, now);
                apply_consolidation(&mut fresh, consolidation.as_ref());
                fresh.version = self.store.upsert_customer_memory(&fresh).await?;
                Ok(fresh)
            }
            Err(e) => Err(e),
        }
    }

    async fn load(
        &self,
        customer_id: &str,
        bot: &BotScope,
        now: DateTime<Utc>,
    ) -> Result<CustomerMemory> {
        Ok(self
            .store
            .get_customer_memory(customer_id, bot)
            .await?
            .unwrap_or_else(|| CustomerMemory::new(customer_id, bot.clone(), now)))
    }

    async fn lock_for(&self, key: &RecordKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Forget the lock once no other task holds a handle to it.
    async fn release(&self, key: &RecordKey) {
        let mut locks = self.locks.lock().await;
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.locks.lock().await.len()
    }
}

fn apply_consolidation(memory: &mut CustomerMemory, consolidation: Option<&Consolidation>) {
    if let Some(consolidation) = consolidation {
        consolidation.apply_to(memory);
    }
}
