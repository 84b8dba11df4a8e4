//! Hashing-trick embeddings.
//!
//! Used when no neural model is reachable. The vectors only capture token
//! overlap, so they are never mixed with neural vectors in one index.

use async_trait::async_trait;

use crate::error::Result;
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use crate::similarity::normalize;
use crate::{Embedding, HASHING_DIMENSION};

/// Shortest token that contributes to a hashing vector.
pub const MIN_TOKEN_CHARS: usize = 2;

/// Longest token that contributes to a hashing vector.
pub const MAX_TOKEN_CHARS: usize = 20;

/// Split text into lower-cased alphanumeric tokens.
///
/// Every character that is not a Unicode letter or digit acts as a separator,
/// and tokens outside `MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS` are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| {
            let len = token.chars().count();
            (MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS).contains(&len)
        })
        .map(str::to_string)
        .collect()
}

/// Stable 31-multiplier string hash over UTF-16 code units.
///
/// Matches the hash used by vectors persisted by earlier deployments, so
/// stored hashing vectors stay comparable.
pub fn hash_token(token: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in token.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    hash.unsigned_abs()
}

/// Bag-of-tokens embedder with a fixed number of buckets.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Create an embedder with `dimension` buckets (at least one).
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Model name recorded on fragments embedded in this mode.
    pub fn model_name(&self) -> String {
        format!("hashing-{}", self.dimension)
    }

    /// Embed text synchronously. Empty or token-less text yields a zero vector.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let bucket = hash_token(&token) as usize % self.dimension;
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn default_model(&self) -> &str {
        "hashing"
    }

    fn default_dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let embedding = self.embed_text(&request.text);
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: self.model_name(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokenize_strips_punctuation_and_filters_length() {
        let tokens = tokenize("Giá gói PRO: 500k/tháng! a x-ray supercalifragilisticexpialidocious");
        assert_eq!(
            tokens,
            vec!["giá", "gói", "pro", "500k", "tháng", "ray"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_hash_token_is_stable() {
        // Reference values of the 31-multiplier hash.
        assert_eq!(hash_token("ab"), 3105);
        assert_eq!(hash_token("hello"), 99_162_322);
        assert_eq!(hash_token("hello"), hash_token("hello"));
    }

    #[test]
    fn test_embedding_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_text("pricing plans for the pro tier");
        let b = embedder.embed_text("pricing plans for the pro tier");

        assert_eq!(a.len(), HASHING_DIMENSION);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let v = embedder.embed_text("  ?! a  ");
        assert_eq!(v, vec![0.0; 16]);
    }

    #[test]
    fn test_overlapping_text_is_more_similar() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_text("how much does the pro plan cost");
        let related = embedder.embed_text("the pro plan cost is 500k per month");
        let unrelated = embedder.embed_text("our office opens at nine in hanoi");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }
}
