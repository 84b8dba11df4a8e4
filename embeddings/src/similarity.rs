//! Similarity computation for embeddings.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::Embedding;

/// Compute the cosine similarity between two embeddings.
///
/// Vectors of different lengths are compared as if the shorter one were
/// padded with zeros. The result lies in `[0.0, 1.0]`:
/// - 1.0 means the vectors point the same way
/// - 0.0 means orthogonal, opposite, or either vector is all zeros
///
/// Anything that is not a finite number collapses to 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    // Components past the shorter length multiply against implicit zeros,
    // so they only contribute to the magnitudes.
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (magnitude_a * magnitude_b);
    if !similarity.is_finite() {
        return 0.0;
    }

    similarity.clamp(0.0, 1.0)
}

/// A similarity search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityResult {
    /// ID of the matched item.
    pub id: String,

    /// Similarity score.
    pub score: f32,
}

impl SimilarityResult {
    /// Create a new similarity result.
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Find the top-k most similar embeddings.
///
/// Ties keep the order of `candidates`.
pub fn find_top_k(
    query: &[f32],
    candidates: &[(String, Embedding)],
    k: usize,
    min_score: f32,
) -> Vec<SimilarityResult> {
    let mut scores: Vec<(OrderedFloat<f32>, &str)> = candidates
        .iter()
        .map(|(id, embedding)| (OrderedFloat(cosine_similarity(query, embedding)), id.as_str()))
        .filter(|(score, _)| score.0 >= min_score)
        .collect();

    // Stable sort, descending.
    scores.sort_by(|a, b| b.0.cmp(&a.0));

    scores
        .into_iter()
        .take(k)
        .map(|(score, id)| SimilarityResult::new(id, score.0))
        .collect()
}

/// Normalize an embedding to unit length. A zero vector is left untouched.
pub fn normalize(embedding: &mut Embedding) {
    let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}
