//! In-memory brute-force vector index.

use crate::types::{KnowledgeSnippet, SearchHit, SnippetId};
use crate::vector_index::{check_dimensions, distance, VectorIndex};
use consilium_core::config::DistanceMetric;
use consilium_core::AppResult;
use std::collections::BTreeMap;

/// Exact nearest-neighbour index that scans every stored vector.
///
/// Snippets are kept in a `BTreeMap` so iteration order, and therefore
/// tie-breaking, is deterministic.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    metric: DistanceMetric,
    snippets: BTreeMap<SnippetId, KnowledgeSnippet>,
}

impl FlatIndex {
    /// Create an empty index for vectors of length `dimensions`.
    pub fn new(dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            dimensions,
            metric,
            snippets: BTreeMap::new(),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&mut self, snippet: KnowledgeSnippet) -> AppResult<()> {
        check_dimensions(self.dimensions, snippet.vector.len(), "insert")?;

        if self.snippets.insert(snippet.id.clone(), snippet).is_some() {
            tracing::trace!("Replaced existing snippet");
        }
        Ok(())
    }

    fn search(&self, query_vector: &[f32], k: usize) -> AppResult<Vec<SearchHit>> {
        check_dimensions(self.dimensions, query_vector.len(), "search")?;

        if k == 0 || self.snippets.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .snippets
            .values()
            .map(|snippet| SearchHit {
                snippet_id: snippet.id.clone(),
                distance: distance(self.metric, query_vector, &snippet.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.snippet_id.cmp(&b.snippet_id))
        });
        hits.truncate(k);

        tracing::trace!(
            "Flat scan over {} snippets returned {} hits (k={})",
            self.snippets.len(),
            hits.len(),
            k
        );

        Ok(hits)
    }

    fn remove(&mut self, id: &str) -> Option<KnowledgeSnippet> {
        self.snippets.remove(id)
    }

    fn get(&self, id: &str) -> Option<&KnowledgeSnippet> {
        self.snippets.get(id)
    }

    fn ids(&self) -> Vec<SnippetId> {
        self.snippets.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.snippets.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
