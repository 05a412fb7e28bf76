//! Generation through a local Ollama server (`POST /api/generate`).

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use consilium_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<SamplingOptions>,
    stream: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl<'a> From<&'a LlmRequest> for GenerateBody<'a> {
    fn from(request: &'a LlmRequest) -> Self {
        let options = (request.temperature.is_some() || request.max_tokens.is_some()).then(|| {
            SamplingOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            }
        });

        Self {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            options,
            stream: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    model: String,
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl From<GenerateReply> for LlmResponse {
    fn from(reply: GenerateReply) -> Self {
        // No confidence field on this API; experts read the trailer instead.
        Self {
            usage: LlmUsage::new(
                reply.prompt_eval_count.unwrap_or_default(),
                reply.eval_count.unwrap_or_default(),
            ),
            content: reply.response,
            model: reply.model,
            confidence: None,
        }
    }
}

/// Client for one Ollama endpoint.
pub struct OllamaClient {
    endpoint: String,
    http: reqwest::Client,
}

impl OllamaClient {
    /// Client for the default local endpoint.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_ENDPOINT)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let endpoint = base_url.into().trim_end_matches('/').to_string();
        Self {
            endpoint,
            http: reqwest::Client::new(),
        }
    }

    /// Bound every call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| llm_error("building HTTP client", e))?;
        Ok(self)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn llm_error(action: &str, err: impl std::fmt::Display) -> AppError {
    AppError::Llm(format!("Ollama {}: {}", action, err))
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let url = format!("{}/api/generate", self.endpoint);
        tracing::debug!("Ollama generate at {} (model: {})", url, request.model);

        let reply = self
            .http
            .post(&url)
            .json(&GenerateBody::from(request))
            .send()
            .await
            .map_err(|e| llm_error("request failed", e))?;

        let status = reply.status();
        if !status.is_success() {
            let body = reply.text().await.unwrap_or_default();
            return Err(llm_error(&format!("returned {}", status), body));
        }

        let reply: GenerateReply = reply
            .json()
            .await
            .map_err(|e| llm_error("response malformed", e))?;
        tracing::debug!("Ollama answered with {} bytes", reply.response.len());

        Ok(reply.into())
    }
}
