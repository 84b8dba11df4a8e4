//! Configuration for knowledge retrieval.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the [`crate::Retriever`].
///
/// Thresholds differ between deployments, so all of them are tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Merged items returned when the caller does not say.
    pub limit: usize,

    /// Minimum similarity for semantic tiers when the caller does not say.
    pub similarity_threshold: f32,

    /// A semantic tier with nothing above the threshold is retried once here.
    pub threshold_floor: f32,

    /// Semantic tiers fetch `limit * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,

    /// The keyword tier fetches `limit * keyword_multiplier` hits.
    pub keyword_multiplier: usize,

    /// Entity-less candidates cluster at `max(this, similarity_threshold)`.
    pub cluster_similarity_floor: f32,

    /// Upper bound on one vector index query.
    pub vector_timeout_ms: u64,

    /// Candidate cache flush interval.
    pub cache_ttl_secs: u64,

    /// Candidate cache size bound.
    pub cache_max_entries: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            similarity_threshold: 0.65,
            threshold_floor: 0.3,
            candidate_multiplier: 10,
            keyword_multiplier: 5,
            cluster_similarity_floor: 0.8,
            vector_timeout_ms: 5_000,
            cache_ttl_secs: 60 * 60,
            cache_max_entries: 1_000,
        }
    }
}

impl RetrievalConfig {
    /// Set the default result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the default similarity threshold.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the threshold floor.
    pub fn with_threshold_floor(mut self, floor: f32) -> Self {
        self.threshold_floor = floor;
        self
    }

    /// Set the vector index timeout.
    pub fn with_vector_timeout(mut self, timeout: Duration) -> Self {
        self.vector_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn vector_timeout(&self) -> Duration {
        Duration::from_millis(self.vector_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Per-call overrides for [`crate::Retriever::retrieve_context`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieveOptions {
    pub limit: Option<usize>,
    pub similarity_threshold: Option<f32>,
}

impl RetrieveOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    /// Fill unset values from `config`.
    pub fn resolve(&self, config: &RetrievalConfig) -> (usize, f32) {
        (
            self.limit.unwrap_or(config.limit).max(1),
            self.similarity_threshold
                .unwrap_or(config.similarity_threshold)
                .clamp(0.0, 1.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_options_fall_back_to_config() {
        let config = RetrievalConfig::default();
        assert_eq!(RetrieveOptions::default().resolve(&config), (5, 0.65));
        assert_eq!(
            RetrieveOptions::default()
                .with_limit(0)
                .with_similarity_threshold(1.7)
                .resolve(&config),
            (1, 1.0)
        );
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: RetrievalConfig =
            serde_json::from_str(r#"{"similarity_threshold": 0.3}"#).unwrap();
        assert_eq!(config.similarity_threshold, 0.3);
        assert_eq!(config.limit, 5);
    }
}
