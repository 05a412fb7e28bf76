//! Embedding capability for knowledge snippets and queries.
//!
//! Provider-agnostic `text -> vector` generation. The trigram provider is
//! deterministic and offline; the Ollama provider calls a local server.

pub mod providers;

pub use consilium_core::config::EmbeddingConfig;
pub use providers::{OllamaEmbeddingProvider, TrigramProvider};

use consilium_core::{AppError, AppResult};
use std::sync::Arc;

/// Turns text into fixed-length vectors for the domain indexes.
///
/// Every vector a provider returns has exactly [`dimensions`](Self::dimensions)
/// components. A provider that cannot be reached reports
/// [`AppError::Embedding`]; the retriever maps that to an outage.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// e.g. "trigram", "ollama"
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AppError::Embedding(format!("{} returned no vector", self.provider_name())))
    }
}

/// Provider named by `config.provider`. `mock` is an alias for `trigram`.
pub fn create_provider(config: &EmbeddingConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    if config.dimensions == 0 {
        return Err(AppError::Config(
            "Embedding dimensions must be greater than zero".to_string(),
        ));
    }

    match config.provider.as_str() {
        "trigram" | "mock" => {
            let provider =
                TrigramProvider::new(config.dimensions).with_normalize(config.normalize);
            Ok(Arc::new(provider))
        }

        "ollama" => Ok(Arc::new(OllamaEmbeddingProvider::new(config)?)),

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: trigram, ollama",
            config.provider
        ))),
    }
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
