//! Retrieval layer: embed a query, search a domain's index, resolve snippets.

use crate::chunker::chunk_text;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::store::KnowledgeStore;
use crate::types::{KnowledgeSnippet, SnippetId};
use chrono::Utc;
use consilium_core::{AppError, AppResult, ConsiliumConfig, Domain};
use std::sync::Arc;
use tracing::instrument;

const DEFAULT_CHUNK_SIZE: usize = 512;
const DEFAULT_CHUNK_OVERLAP: usize = 64;

/// Retrieval and ingestion over a shared knowledge store.
///
/// Cheap to clone; clones share the store and the embedding provider.
#[derive(Debug, Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<KnowledgeStore>,
    max_distance: Option<f32>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<KnowledgeStore>) -> Self {
        if embedder.dimensions() != store.dimensions() {
            tracing::warn!(
                "Embedding provider '{}' yields {} dimensions but the store expects {}",
                embedder.provider_name(),
                embedder.dimensions(),
                store.dimensions()
            );
        }

        Self {
            embedder,
            store,
            max_distance: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }

    /// Build the embedding provider and one index per configured domain.
    pub fn from_config(config: &ConsiliumConfig) -> AppResult<Self> {
        let embedder = create_provider(&config.embedding)?;
        let store = Arc::new(KnowledgeStore::new(
            config.domains.iter().cloned(),
            config.embedding.dimensions,
            config.retrieval.metric,
        ));

        tracing::info!(
            "Retriever ready: {} domains, embeddings via {} ({})",
            config.domains.len(),
            embedder.provider_name(),
            embedder.model_name()
        );

        Ok(Self::new(embedder, store)
            .with_max_distance(config.retrieval.max_distance)
            .with_chunking(config.retrieval.chunk_size, config.retrieval.chunk_overlap))
    }

    /// Drop hits farther than `max_distance`.
    pub fn with_max_distance(mut self, max_distance: Option<f32>) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Up to `k` snippets of `domain` nearest to `query_text`, closest first.
    ///
    /// Fails with `RetrievalUnavailable` when the embedding provider errors or
    /// the domain's index is detached.
    #[instrument(skip(self, query_text), fields(domain = %domain, k = k))]
    pub async fn retrieve(
        &self,
        query_text: &str,
        domain: &Domain,
        k: usize,
    ) -> AppResult<Vec<KnowledgeSnippet>> {
        if !self.store.has_domain(domain) {
            return Err(AppError::Knowledge(format!("Unknown domain: '{}'", domain)));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query_text).await.map_err(|e| {
            AppError::RetrievalUnavailable(format!("Failed to embed query: {}", e))
        })?;

        let hits = self
            .store
            .search_snippets(domain, &query_vector, k, self.max_distance)?;

        tracing::debug!(
            "Retrieved {} snippets (requested top-{})",
            hits.len(),
            k
        );

        Ok(hits.into_iter().map(|(snippet, _)| snippet).collect())
    }

    /// Embed `text` and insert it into `domain` under a fresh id.
    pub async fn ingest(
        &self,
        domain: &Domain,
        text: &str,
        metadata: serde_json::Value,
    ) -> AppResult<SnippetId> {
        let id = uuid::Uuid::new_v4().to_string();
        self.ingest_with_id(domain, &id, text, metadata).await?;
        Ok(id)
    }

    /// Embed `text` and insert it under `id`, replacing any snippet with that id.
    pub async fn ingest_with_id(
        &self,
        domain: &Domain,
        id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> AppResult<()> {
        self.check_ingestible(domain, text)?;

        let vector = self.embedder.embed(text).await?;
        self.store.insert(KnowledgeSnippet {
            id: id.to_string(),
            domain: domain.clone(),
            text: text.to_string(),
            vector,
            metadata,
            ingested_at: Utc::now(),
        })?;

        tracing::debug!("Ingested snippet {} into '{}'", id, domain);
        Ok(())
    }

    /// Split long text into overlapping chunks and ingest each one.
    ///
    /// Every chunk's metadata is `metadata` plus `source`, `position` and
    /// byte offsets.
    pub async fn ingest_chunked(
        &self,
        domain: &Domain,
        source_id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> AppResult<Vec<SnippetId>> {
        self.check_ingestible(domain, text)?;

        let candidates = chunk_text(source_id, text, self.chunk_size, self.chunk_overlap);
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        if vectors.len() != candidates.len() {
            return Err(AppError::Embedding(format!(
                "Provider returned {} embeddings for {} chunks",
                vectors.len(),
                candidates.len()
            )));
        }

        let mut ids = Vec::with_capacity(candidates.len());
        for (candidate, vector) in candidates.into_iter().zip(vectors) {
            let mut chunk_metadata = match metadata {
                serde_json::Value::Object(ref map) => map.clone(),
                serde_json::Value::Null => serde_json::Map::new(),
                ref other => {
                    let mut map = serde_json::Map::new();
                    map.insert("meta".to_string(), other.clone());
                    map
                }
            };
            chunk_metadata.insert("source".to_string(), candidate.source_id.clone().into());
            chunk_metadata.insert("position".to_string(), candidate.position.into());
            if let serde_json::Value::Object(offsets) = candidate.metadata {
                chunk_metadata.extend(offsets);
            }

            let id = uuid::Uuid::new_v4().to_string();
            self.store.insert(KnowledgeSnippet {
                id: id.clone(),
                domain: domain.clone(),
                text: candidate.text,
                vector,
                metadata: serde_json::Value::Object(chunk_metadata),
                ingested_at: Utc::now(),
            })?;
            ids.push(id);
        }

        tracing::debug!(
            "Ingested {} chunks from '{}' into '{}'",
            ids.len(),
            source_id,
            domain
        );

        Ok(ids)
    }

    /// Remove a snippet. Returns whether it existed.
    pub fn evict(&self, domain: &Domain, id: &str) -> AppResult<bool> {
        let removed = self.store.remove(domain, id)?.is_some();
        if removed {
            tracing::debug!("Evicted snippet {} from '{}'", id, domain);
        }
        Ok(removed)
    }

    fn check_ingestible(&self, domain: &Domain, text: &str) -> AppResult<()> {
        if !self.store.has_domain(domain) {
            return Err(AppError::Knowledge(format!("Unknown domain: '{}'", domain)));
        }
        if text.trim().is_empty() {
            return Err(AppError::Knowledge("Cannot ingest empty text".to_string()));
        }
        Ok(())
    }
}
