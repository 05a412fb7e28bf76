//! Per-domain knowledge stores for Consilium experts.
//!
//! Provides in-memory vector indices, an embedding capability, and the
//! retrieval layer that turns a query into context snippets.

pub mod chunker;
pub mod corpus;
pub mod embeddings;
pub mod flat_index;
pub mod retrieval;
pub mod store;
pub mod types;
pub mod vector_index;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider, TrigramProvider};
pub use flat_index::FlatIndex;
pub use retrieval::Retriever;
pub use store::KnowledgeStore;
pub use types::{ChunkCandidate, DomainStats, IngestStats, KnowledgeSnippet, SearchHit, SnippetId};
pub use vector_index::{cosine_similarity, VectorIndex};
