//! Vector index abstraction for knowledge snippets.
//!
//! Defines a trait for provider-agnostic vector storage and retrieval.

use crate::types::{KnowledgeSnippet, SearchHit, SnippetId};
use consilium_core::config::DistanceMetric;
use consilium_core::{AppError, AppResult};

/// Trait for vector index backends.
///
/// Implementations must support:
/// - Inserting snippets (an identical id overwrites)
/// - k-nearest search, ascending by distance, ties broken by snippet id
/// - Removal and lookup by id
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    /// Insert or replace a snippet.
    fn insert(&mut self, snippet: KnowledgeSnippet) -> AppResult<()>;

    /// Return at most `k` hits ordered by ascending distance.
    ///
    /// An empty index or `k == 0` yields an empty vector.
    fn search(&self, query_vector: &[f32], k: usize) -> AppResult<Vec<SearchHit>>;

    /// Remove a snippet, returning it if it was present.
    fn remove(&mut self, id: &str) -> Option<KnowledgeSnippet>;

    /// Look up a snippet by id.
    fn get(&self, id: &str) -> Option<&KnowledgeSnippet>;

    /// All snippet ids, sorted.
    fn ids(&self) -> Vec<SnippetId>;

    /// Number of stored snippets.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector length accepted by this index.
    fn dimensions(&self) -> usize;

    /// Distance metric fixed at construction.
    fn metric(&self) -> DistanceMetric;
}

/// Distance between two vectors of equal length under `metric`.
pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
    }
}

/// Calculate cosine similarity between two vectors.
///
/// Zero vectors and mismatched lengths score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Reject vectors whose length differs from the index dimensions.
pub(crate) fn check_dimensions(expected: usize, actual: usize, what: &str) -> AppResult<()> {
    if expected != actual {
        return Err(AppError::Knowledge(format!(
            "Dimension mismatch on {}: index expects {}, got {}",
            what, expected, actual
        )));
    }
    Ok(())
}
