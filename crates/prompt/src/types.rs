//! Prompt types for Consilium experts.
//!
//! This module defines the domain entities for the prompt system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier (e.g., "expert.chemistry")
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// Behavioral settings
    pub behavior: PromptBehavior,

    /// Context injection settings
    #[serde(default)]
    pub context: PromptContextConfig,

    /// Optional system message template (Handlebars)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// User message template with Handlebars syntax
    pub template: String,

    /// Expected output shape
    pub output: PromptOutputSpec,
}

/// Behavioral settings for prompt execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBehavior {
    /// Tone (e.g., "professional", "technical")
    pub tone: String,

    /// Style (e.g., "concise", "detailed")
    pub style: String,
}

/// Context injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContextConfig {
    /// Include retrieved knowledge snippets
    #[serde(rename = "includeKnowledge", default = "default_true")]
    pub include_knowledge: bool,

    /// Cap on injected snippets (all when absent)
    #[serde(rename = "maxSnippets", skip_serializing_if = "Option::is_none")]
    pub max_snippets: Option<usize>,

    /// Include few-shot exemplars from the expert's tuned state
    #[serde(rename = "includeExemplars", default = "default_true")]
    pub include_exemplars: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PromptContextConfig {
    fn default() -> Self {
        Self {
            include_knowledge: true,
            max_snippets: None,
            include_exemplars: true,
        }
    }
}

/// Expected output shape for the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// Output format (e.g., "text", "markdown")
    pub format: String,

    /// Ask the model to end with a `Confidence: <0..1>` line
    #[serde(rename = "confidenceTrailer", default = "default_true")]
    pub confidence_trailer: bool,
}

/// A retrieved snippet as seen by the template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSnippet {
    pub id: String,
    pub text: String,
}

/// A worked example injected as few-shot guidance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exemplar {
    pub input: String,
    pub output: String,
}

/// A preferred/avoided answer pair learned by contrastive tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContrastPair {
    pub prefer: String,
    pub avoid: String,
}

/// Everything a template can reference for one expert call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptInputs {
    /// The caller's question
    pub question: String,

    /// Domain the answering expert is tagged with
    pub domain: String,

    /// Retrieved knowledge snippets, most relevant first
    pub snippets: Vec<ContextSnippet>,

    /// Few-shot exemplars
    pub exemplars: Vec<Exemplar>,

    /// Contrastive guidance
    pub contrasts: Vec<ContrastPair>,

    /// Caller-supplied key-value context
    pub extra: BTreeMap<String, String>,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Ids of the snippets injected into the prompt
    #[serde(rename = "snippetIds")]
    pub snippet_ids: Vec<String>,

    /// Number of exemplars injected
    #[serde(rename = "exemplarCount")]
    pub exemplar_count: usize,
}
