//! Scripted answer-generation provider.
//!
//! Answers by matching the prompt against an ordered list of rules. Fully
//! deterministic, so it backs offline development setups and every ensemble
//! test in the workspace.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use consilium_core::{AppError, AppResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const DEFAULT_REPLY: &str = "I do not have enough information to answer.";

/// A single prompt-matching rule.
#[derive(Debug, Clone)]
pub struct ScriptedRule {
    /// Substring the prompt must contain (case-insensitive)
    pub pattern: String,

    /// Text returned when the rule matches
    pub reply: String,

    /// Confidence reported with the reply
    pub confidence: Option<f32>,
}

/// Deterministic rule-based LLM client.
///
/// Rules are tried in insertion order; the first match wins. Unmatched
/// prompts get the default reply.
#[derive(Debug)]
pub struct ScriptedClient {
    rules: Vec<ScriptedRule>,
    default_reply: String,
    default_confidence: Option<f32>,
    delay: Option<Duration>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    /// Create a client with no rules.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_reply: DEFAULT_REPLY.to_string(),
            default_confidence: None,
            delay: None,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Add a rule answering prompts containing `pattern`.
    pub fn with_rule(
        mut self,
        pattern: impl Into<String>,
        reply: impl Into<String>,
        confidence: f32,
    ) -> Self {
        self.rules.push(ScriptedRule {
            pattern: pattern.into().to_lowercase(),
            reply: reply.into(),
            confidence: Some(confidence),
        });
        self
    }

    /// Add a rule whose reply carries no confidence channel.
    pub fn with_plain_rule(mut self, pattern: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push(ScriptedRule {
            pattern: pattern.into().to_lowercase(),
            reply: reply.into(),
            confidence: None,
        });
        self
    }

    /// Set the reply for prompts no rule matches.
    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Set the confidence reported when a rule (or the default) has none.
    pub fn with_default_confidence(mut self, confidence: f32) -> Self {
        self.default_confidence = Some(confidence);
        self
    }

    /// Delay every completion, simulating a slow backend.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every completion fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of completions served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn match_rule(&self, prompt: &str) -> Option<&ScriptedRule> {
        let lower = prompt.to_lowercase();
        self.rules.iter().find(|rule| lower.contains(&rule.pattern))
    }
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(ref message) = self.failure {
            return Err(AppError::Llm(message.clone()));
        }

        let (content, confidence) = match self.match_rule(&request.prompt) {
            Some(rule) => {
                tracing::trace!("Scripted rule '{}' matched", rule.pattern);
                (
                    rule.reply.clone(),
                    rule.confidence.or(self.default_confidence),
                )
            }
            None => (self.default_reply.clone(), self.default_confidence),
        };

        let prompt_tokens = request.prompt.split_whitespace().count() as u32;
        let completion_tokens = content.split_whitespace().count() as u32;

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            confidence,
            usage: LlmUsage::new(prompt_tokens, completion_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let client = ScriptedClient::new()
            .with_rule("chemical bond", "A shared electron pair.", 0.9)
            .with_rule("bond", "A financial instrument.", 0.4);

        let response = client
            .complete(&LlmRequest::new("What is a Chemical Bond?", "m"))
            .await
            .unwrap();

        assert_eq!(response.content, "A shared electron pair.");
        assert_eq!(response.confidence, Some(0.9));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_default_reply() {
        let client = ScriptedClient::new().with_default_confidence(0.2);
        let response = client
            .complete(&LlmRequest::new("unmatched", "m"))
            .await
            .unwrap();

        assert_eq!(response.content, DEFAULT_REPLY);
        assert_eq!(response.confidence, Some(0.2));
    }

    #[tokio::test]
    async fn test_plain_rule_has_no_confidence() {
        let client = ScriptedClient::new().with_plain_rule("q", "answer\nConfidence: 0.7");
        let response = client.complete(&LlmRequest::new("q", "m")).await.unwrap();
        assert_eq!(response.confidence, None);
    }

    #[tokio::test]
    async fn test_failing_client() {
        let client = ScriptedClient::new().failing("backend down");
        let result = client.complete(&LlmRequest::new("q", "m")).await;
        assert!(matches!(result, Err(AppError::Llm(msg)) if msg == "backend down"));
    }
}
