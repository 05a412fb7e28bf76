//! LLM provider factory.
//!
//! This module creates answer-generation clients from configuration.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, ScriptedClient};
use crate::types::ProviderType;
use consilium_core::config::{LlmConfig, ProviderConfig};
use consilium_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "scripted")
/// * `endpoint` - Optional custom endpoint URL
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown.
pub fn create_client(provider: &str, endpoint: Option<&str>) -> AppResult<Arc<dyn LlmClient>> {
    match ProviderType::parse(provider) {
        Some(ProviderType::Ollama) => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        Some(ProviderType::Scripted) => Ok(Arc::new(ScriptedClient::new())),
        None => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}

/// Create the active client described by an [`LlmConfig`].
///
/// Returns the client together with the model name requests should use.
pub fn create_from_config(config: &LlmConfig) -> AppResult<(Arc<dyn LlmClient>, String)> {
    let provider = config.active_provider.as_str();

    match config.active() {
        Some(ProviderConfig::Ollama {
            endpoint,
            model,
            timeout,
        }) => {
            let mut client = OllamaClient::with_base_url(endpoint.as_str());
            if let Some(secs) = timeout {
                client = client.with_timeout(Duration::from_secs(*secs))?;
            }
            tracing::debug!("Created Ollama client at {} (model: {})", endpoint, model);
            Ok((Arc::new(client), model.clone()))
        }
        Some(ProviderConfig::Scripted {
            model,
            default_confidence,
        }) => {
            let mut client = ScriptedClient::new();
            if let Some(confidence) = default_confidence {
                client = client.with_default_confidence(*confidence);
            }
            Ok((Arc::new(client), model.clone()))
        }
        None => {
            tracing::debug!(
                "No provider configuration for '{}', using defaults",
                provider
            );
            let client = create_client(provider, None)?;
            Ok((client, "llama3.2".to_string()))
        }
    }
}
