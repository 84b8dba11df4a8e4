//! Mode-selecting embedder.
//!
//! The mode is decided once by [`Embedder::initialize`]. In neural mode a
//! provider error is returned to the caller rather than silently replaced by
//! a hashing vector, so one index never mixes vector spaces.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::cache::EmbeddingCache;
use crate::error::{EmbeddingError, Result};
use crate::hashing::HashingEmbedder;
use crate::provider::{EmbeddingProvider, EmbeddingRequest};
use crate::similarity::normalize;
use crate::{Embedding, HASHING_DIMENSION};

/// Configuration for the [`Embedder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Input is truncated to this many characters before encoding.
    pub max_input_chars: usize,

    /// Leading characters kept readable in cache keys.
    pub cache_key_chars: usize,

    /// Texts sent per provider call by [`Embedder::embed_batch`].
    pub batch_size: usize,

    /// Bucket count of the hashing fallback.
    pub hashing_dimension: usize,

    /// Upper bound on one provider call.
    pub timeout_ms: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 512,
            cache_key_chars: 48,
            batch_size: 64,
            hashing_dimension: HASHING_DIMENSION,
            timeout_ms: 10_000,
        }
    }
}

impl EmbedderConfig {
    pub fn with_max_input_chars(mut self, chars: usize) -> Self {
        self.max_input_chars = chars;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Which vector space the embedder produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EmbeddingMode {
    /// A neural model is loaded.
    Neural { model: String, dimension: usize },

    /// Degraded bag-of-tokens vectors.
    Hashing { dimension: usize },
}

impl EmbeddingMode {
    pub fn is_neural(&self) -> bool {
        matches!(self, EmbeddingMode::Neural { .. })
    }

    pub fn dimension(&self) -> usize {
        match self {
            EmbeddingMode::Neural { dimension, .. } | EmbeddingMode::Hashing { dimension } => {
                *dimension
            }
        }
    }
}

/// Embeds text with whichever provider won at startup.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    mode: EmbeddingMode,
    model_name: String,
    cache: Arc<EmbeddingCache>,
    config: EmbedderConfig,
}

impl Embedder {
    /// Probe `provider` once and pick the mode.
    ///
    /// Falls back to hashing when there is no provider, it reports itself
    /// unavailable, or the probe fails or times out.
    pub async fn initialize(
        provider: Option<Arc<dyn EmbeddingProvider>>,
        cache: Arc<EmbeddingCache>,
        config: EmbedderConfig,
    ) -> Self {
        let Some(provider) = provider else {
            info!("No embedding provider configured, using hashing embeddings");
            return Self::hashing(cache, config);
        };

        if !provider.is_available() {
            warn!(
                "Embedding provider {} is not available, using hashing embeddings",
                provider.name()
            );
            return Self::hashing(cache, config);
        }

        let probe = EmbeddingRequest::new("health check");
        match tokio::time::timeout(config.timeout(), provider.embed(probe)).await {
            Ok(Ok(response)) if !response.embedding.is_empty() => {
                info!(
                    "Using neural embeddings: {} ({} dimensions)",
                    response.model, response.dimension
                );
                let mode = EmbeddingMode::Neural {
                    model: response.model.clone(),
                    dimension: response.embedding.len(),
                };
                Self {
                    provider,
                    mode,
                    model_name: response.model,
                    cache,
                    config,
                }
            }
            Ok(Ok(_)) => {
                warn!("Embedding provider returned an empty vector, using hashing embeddings");
                Self::hashing(cache, config)
            }
            Ok(Err(e)) => {
                warn!("Embedding model failed to load ({e}), using hashing embeddings");
                Self::hashing(cache, config)
            }
            Err(_) => {
                warn!(
                    "Embedding model probe timed out after {} ms, using hashing embeddings",
                    config.timeout_ms
                );
                Self::hashing(cache, config)
            }
        }
    }

    /// Build an embedder that always uses the hashing fallback.
    pub fn hashing(cache: Arc<EmbeddingCache>, config: EmbedderConfig) -> Self {
        let hashing = HashingEmbedder::new(config.hashing_dimension);
        let mode = EmbeddingMode::Hashing {
            dimension: hashing.default_dimension(),
        };
        Self {
            model_name: hashing.model_name(),
            provider: Arc::new(hashing),
            mode,
            cache,
            config,
        }
    }

    pub fn mode(&self) -> &EmbeddingMode {
        &self.mode
    }

    /// Name stored alongside vectors so stale ones can be re-embedded.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Embed `text`, consulting the shared cache first.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let input = self.truncate(text);
        let key = self.cache_key(&input);

        if let Some(embedding) = self.cache.get(&key).await {
            debug!("Cache hit for embedding");
            return Ok(embedding);
        }

        let request = EmbeddingRequest::new(input);
        let response = tokio::time::timeout(self.config.timeout(), self.provider.embed(request))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.config.timeout_ms))??;

        let embedding = self.accept(response.embedding)?;
        self.cache.insert(key, embedding.clone()).await;
        Ok(embedding)
    }

    /// Embed many texts, answering in input order.
    ///
    /// Cached texts are served from the cache. The rest go to the provider in
    /// calls of at most `batch_size` texts. Any failed call fails the batch.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut vectors: Vec<Option<Embedding>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<(usize, String, String)> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let input = self.truncate(text);
            let key = self.cache_key(&input);
            let cached = self.cache.get(&key).await;
            if cached.is_none() {
                misses.push((i, key, input));
            }
            vectors.push(cached);
        }
        debug!(
            "Embedding batch of {}: {} cached",
            texts.len(),
            texts.len() - misses.len()
        );

        for group in misses.chunks(self.config.batch_size.max(1)) {
            let requests: Vec<EmbeddingRequest> = group
                .iter()
                .map(|(_, _, input)| EmbeddingRequest::new(input.as_str()))
                .collect();
            let responses =
                tokio::time::timeout(self.config.timeout(), self.provider.embed_batch(requests))
                    .await
                    .map_err(|_| EmbeddingError::Timeout(self.config.timeout_ms))??;
            if responses.len() != group.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "asked for {} embeddings, got {}",
                    group.len(),
                    responses.len()
                )));
            }

            for ((i, key, _), response) in group.iter().zip(responses) {
                let embedding = self.accept(response.embedding)?;
                self.cache.insert(key.clone(), embedding.clone()).await;
                vectors[*i] = Some(embedding);
            }
        }

        vectors
            .into_iter()
            .map(|v| v.ok_or_else(|| EmbeddingError::InvalidResponse("missing embedding".into())))
            .collect()
    }

    fn truncate(&self, text: &str) -> String {
        text.chars().take(self.config.max_input_chars).collect()
    }

    /// Check the dimension against the active mode, then normalize.
    fn accept(&self, mut embedding: Embedding) -> Result<Embedding> {
        let expected = self.mode.dimension();
        if embedding.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }
        normalize(&mut embedding);
        Ok(embedding)
    }

    /// Model, a short readable prefix, and a digest of the whole input.
    fn cache_key(&self, input: &str) -> String {
        let prefix: String = input.chars().take(self.config.cache_key_chars).collect();
        let digest = Sha256::digest(input.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("{}:{prefix}:{hex}", self.model_name)
    }
}
