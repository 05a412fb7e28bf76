//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use consilium_core::Domain;
use serde::{Deserialize, Serialize};

/// Identifier of a snippet within its domain index.
pub type SnippetId = String;

/// A unit of retrievable text in one domain's corpus.
///
/// Owned by the index it was inserted into. Snippets are never mutated in
/// place: re-inserting an id replaces the stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    /// Unique snippet identifier
    pub id: SnippetId,

    /// Domain the snippet belongs to
    pub domain: Domain,

    /// Snippet text as injected into prompts
    pub text: String,

    /// Embedding vector (length fixed per index)
    pub vector: Vec<f32>,

    /// Free-form metadata (source path, chunk offsets, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,

    /// When the snippet was ingested
    #[serde(rename = "ingestedAt")]
    pub ingested_at: DateTime<Utc>,
}

/// A single nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "snippetId")]
    pub snippet_id: SnippetId,

    /// Distance to the query under the index metric (smaller is closer)
    pub distance: f32,
}

/// A chunk candidate before embedding.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    /// Source identifier (file path or caller label)
    pub source_id: String,

    /// Position within the source
    pub position: u32,

    /// Text content
    pub text: String,

    /// Metadata (byte offsets)
    pub metadata: serde_json::Value,
}

/// Statistics from a corpus ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    /// Number of source files read
    #[serde(rename = "sourcesCount")]
    pub sources_count: u32,

    /// Number of snippets inserted
    #[serde(rename = "snippetsCount")]
    pub snippets_count: u32,

    /// Files skipped because they could not be read
    #[serde(rename = "skippedCount")]
    pub skipped_count: u32,

    /// Bytes of text processed
    #[serde(rename = "bytesProcessed")]
    pub bytes_processed: u64,

    /// Time taken in seconds
    #[serde(rename = "durationSecs")]
    pub duration_secs: f64,
}

/// Per-domain index statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainStats {
    pub domain: Domain,

    #[serde(rename = "snippetsCount")]
    pub snippets_count: usize,

    /// False while the index is detached
    pub online: bool,
}
