//! Answer similarity functions used for clustering and quality estimates.

use async_trait::async_trait;
use consilium_knowledge::{cosine_similarity, EmbeddingProvider};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

/// Similarity between two answer texts, in `[0, 1]`.
#[async_trait]
pub trait AnswerSimilarity: Send + Sync + Debug {
    fn name(&self) -> &str;

    async fn similarity(&self, a: &str, b: &str) -> f32;
}

/// Jaccard overlap of lowercase alphanumeric tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalSimilarity;

impl LexicalSimilarity {
    pub fn score(a: &str, b: &str) -> f32 {
        let ta = tokens(a);
        let tb = tokens(b);

        if ta.is_empty() && tb.is_empty() {
            return 1.0;
        }

        let intersection = ta.intersection(&tb).count();
        let union = ta.union(&tb).count();
        intersection as f32 / union as f32
    }
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl AnswerSimilarity for LexicalSimilarity {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn similarity(&self, a: &str, b: &str) -> f32 {
        Self::score(a, b)
    }
}

/// Cosine similarity of answer embeddings, floored at zero.
///
/// Falls back to lexical overlap when the provider errors.
#[derive(Debug, Clone)]
pub struct EmbeddingSimilarity {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingSimilarity {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AnswerSimilarity for EmbeddingSimilarity {
    fn name(&self) -> &str {
        "embedding"
    }

    async fn similarity(&self, a: &str, b: &str) -> f32 {
        if a == b {
            return 1.0;
        }

        let texts = [a.to_string(), b.to_string()];
        match self.provider.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == 2 => {
                cosine_similarity(&vectors[0], &vectors[1]).clamp(0.0, 1.0)
            }
            Ok(_) => LexicalSimilarity::score(a, b),
            Err(e) => {
                tracing::warn!("Embedding similarity unavailable, using lexical: {}", e);
                LexicalSimilarity::score(a, b)
            }
        }
    }
}

/// Build the similarity function named in configuration.
pub fn create_similarity(
    name: &str,
    provider: &Arc<dyn EmbeddingProvider>,
) -> Arc<dyn AnswerSimilarity> {
    match name {
        "embedding" => Arc::new(EmbeddingSimilarity::new(Arc::clone(provider))),
        _ => Arc::new(LexicalSimilarity),
    }
}
