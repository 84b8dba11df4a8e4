//! Time-bounded caches.
//!
//! A [`TtlCache`] is constructed once at startup and handed to every
//! component that needs it. The whole map is flushed when its TTL elapses;
//! `max_entries` only bounds memory and evicts the oldest insert.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::Embedding;

/// Default flush interval for process-wide caches.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Cache of embeddings keyed by model and text prefix.
pub type EmbeddingCache = TtlCache<Embedding>;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    flushed_at: Instant,
}

/// A string-keyed cache with a full-flush TTL.
pub struct TtlCache<V> {
    state: Arc<RwLock<CacheState<V>>>,
    ttl: Duration,
    max_entries: usize,
    name: &'static str,
}

impl<V: Clone + Send + Sync> TtlCache<V> {
    /// Create a cache that flushes every `ttl` and holds at most `max_entries`.
    pub fn new(name: &'static str, ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState {
                entries: HashMap::new(),
                flushed_at: Instant::now(),
            })),
            ttl,
            max_entries: max_entries.max(1),
            name,
        }
    }

    /// Get a value, flushing first if the TTL has elapsed.
    pub async fn get(&self, key: &str) -> Option<V> {
        {
            let state = self.state.read().await;
            if state.flushed_at.elapsed() < self.ttl {
                return state.entries.get(key).map(|e| e.value.clone());
            }
        }

        self.flush_if_expired(&mut *self.state.write().await);
        None
    }

    /// Put a value in the cache.
    pub async fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut state = self.state.write().await;
        self.flush_if_expired(&mut state);

        // Evict if at capacity
        if state.entries.len() >= self.max_entries && !state.entries.contains_key(&key) {
            let oldest_key = state
                .entries
                .iter()
                .min_by_key(|(_, v)| v.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest_key) = oldest_key {
                state.entries.remove(&oldest_key);
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.flushed_at = Instant::now();
        info!("Cleared {} cache", self.name);
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            entries: state.entries.len(),
            max_entries: self.max_entries,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    fn flush_if_expired(&self, state: &mut CacheState<V>) {
        if state.flushed_at.elapsed() >= self.ttl {
            if !state.entries.is_empty() {
                debug!(
                    "Flushing {} cache ({} entries)",
                    self.name,
                    state.entries.len()
                );
            }
            state.entries.clear();
            state.flushed_at = Instant::now();
        }
    }
}

/// Statistics about a cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: usize,

    /// Flush interval.
    pub ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache: EmbeddingCache = TtlCache::new("embedding", DEFAULT_TTL, 100);
        let embedding = vec![1.0, 2.0, 3.0];

        cache.insert("hello", embedding.clone()).await;

        assert_eq!(cache.get("hello").await, Some(embedding));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache: TtlCache<String> = TtlCache::new("test", DEFAULT_TTL, 100);
        assert!(cache.get("not cached").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_eviction() {
        let cache: TtlCache<u32> = TtlCache::new("test", DEFAULT_TTL, 2);

        cache.insert("a", 1).await;
        cache.insert("b", 2).await;
        cache.insert("c", 3).await;

        // One entry should have been evicted
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test]
    async fn test_expired_cache_is_flushed() {
        let cache: TtlCache<u32> = TtlCache::new("test", Duration::ZERO, 10);

        cache.insert("a", 1).await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache: TtlCache<u32> = TtlCache::new("test", DEFAULT_TTL, 10);
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;

        cache.clear().await;

        assert_eq!(cache.stats().await.entries, 0);
    }
}
