//! Embeddings from a local Ollama server (`POST /api/embeddings`).

use crate::embeddings::{normalize, EmbeddingConfig, EmbeddingProvider};
use async_trait::async_trait;
use consilium_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts per text and the delay before the first retry; the delay doubles
/// on each further attempt.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    attempts: u32,
    first_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 3,
            first_delay: Duration::from_millis(200),
        }
    }
}

impl Backoff {
    fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.first_delay * 2u32.pow(failed_attempt.saturating_sub(1))
    }
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedReply {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ServerError {
    error: String,
}

/// Semantic embeddings from a model such as `nomic-embed-text`.
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingProvider {
    http: Client,
    url: String,
    model: String,
    dimensions: usize,
    normalize: bool,
    backoff: Backoff,
}

impl OllamaEmbeddingProvider {
    /// Endpoint precedence: `config.endpoint`, `OLLAMA_URL`, local default.
    /// Nothing is sent until the first embedding.
    pub fn new(config: &EmbeddingConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Embedding(format!("Ollama HTTP client: {}", e)))?;

        let endpoint = config
            .endpoint
            .clone()
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            http,
            url: format!("{}/api/embeddings", endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
            normalize: config.normalize,
            backoff: Backoff::default(),
        })
    }

    async fn request_once(&self, text: &str) -> AppResult<Vec<f32>> {
        debug!("POST {}", self.url);
        let response = self
            .http
            .post(&self.url)
            .json(&EmbedBody {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Ollama unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ServerError>(&raw)
                .map(|e| e.error)
                .unwrap_or(raw);
            return Err(AppError::Embedding(format!("Ollama returned {}: {}", status, message)));
        }

        let reply: EmbedReply = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("Malformed Ollama reply: {}", e)))?;
        self.finish(reply.embedding)
    }

    fn finish(&self, mut embedding: Vec<f32>) -> AppResult<Vec<f32>> {
        if embedding.len() != self.dimensions {
            return Err(AppError::Embedding(format!(
                "Model '{}' produced {} dimensions, configured for {}",
                self.model,
                embedding.len(),
                self.dimensions
            )));
        }
        if self.normalize {
            normalize(&mut embedding);
        }
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip_all, fields(model = %self.model, text_len = text.len()))]
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::Embedding("Refusing to embed blank text".to_string()));
        }

        let mut attempt = 1;
        loop {
            match self.request_once(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if attempt < self.backoff.attempts => {
                    let delay = self.backoff.delay_after(attempt);
                    warn!("Embedding attempt {} failed, retrying in {:?}: {}", attempt, delay, e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sequential; the endpoint takes one text per call.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
