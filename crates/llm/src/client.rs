//! Answer-generation capability.
//!
//! Experts see generation as a black box: a rendered prompt goes in, text and
//! an optional raw confidence come out.

use consilium_core::AppResult;
use serde::{Deserialize, Serialize};

/// One completion call made on behalf of an expert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Rendered user prompt
    pub prompt: String,

    pub model: String,

    /// Expert persona and answering rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Sampling temperature; tuned per expert by fine-tuning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Generated answer text plus what the provider reported about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,

    /// Model that actually served the call
    pub model: String,

    /// Raw self-reported confidence, when the provider has a channel for it.
    ///
    /// When absent, experts look for a `Confidence:` trailer in `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    #[serde(default)]
    pub usage: LlmUsage,
}

/// Token accounting for one call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,

    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A backend that turns prompts into answers.
///
/// Shared by every expert, so implementations must tolerate concurrent calls.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Short backend name used in logs, e.g. `ollama` or `scripted`.
    fn provider_name(&self) -> &str;

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new("Question: What is pH?", "llama3.2")
            .with_system("You are the chemistry expert")
            .with_temperature(0.3)
            .with_max_tokens(256);

        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, Some(256));
        assert_eq!(request.system.as_deref(), Some("You are the chemistry expert"));
    }

    #[test]
    fn test_usage_totals() {
        assert_eq!(LlmUsage::new(10, 5).total_tokens, 15);
    }

    #[test]
    fn test_response_without_confidence_deserializes() {
        let json = r#"{"content": "Acids donate protons.", "model": "m"}"#;
        let response: LlmResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.confidence, None);
        assert_eq!(response.usage, LlmUsage::default());
    }
}
