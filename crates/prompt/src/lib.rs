//! Expert prompt system for Consilium.
//!
//! Experts of different domains share one answering contract and differ
//! only in their knowledge store and prompt template. This crate provides:
//! - YAML-based prompt definitions
//! - Handlebars template rendering
//! - Retrieved-context and few-shot exemplar injection
//! - A built-in default template per domain

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use defaults::default_definition;
pub use loader::{list_prompts, load_or_default, load_prompt};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, ContextSnippet, ContrastPair, Exemplar, PromptBehavior,
    PromptContextConfig, PromptDefinition, PromptInputs, PromptOutputSpec,
};
