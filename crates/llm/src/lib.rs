//! Answer-generation integration for Consilium.
//!
//! Experts treat answer generation as a black box: a prompt goes in, text
//! and an optional raw confidence come out. This crate provides the
//! provider-agnostic trait for that capability and the concrete providers.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Scripted**: Deterministic rule-based responder for offline use and tests
//!
//! # Example
//! ```no_run
//! use consilium_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("What is a chemical bond?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::{create_client, create_from_config};
pub use providers::{OllamaClient, ScriptedClient};
pub use types::ProviderType;
