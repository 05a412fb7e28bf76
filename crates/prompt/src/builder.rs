//! Prompt builder for rendering expert templates.

use crate::types::{
    BuiltPrompt, BuiltPromptMetadata, ContextSnippet, ContrastPair, Exemplar, PromptDefinition,
    PromptInputs,
};
use consilium_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::BTreeMap;

/// Variables visible to a template.
#[derive(Serialize)]
struct RenderContext<'a> {
    question: &'a str,
    domain: &'a str,
    tone: &'a str,
    style: &'a str,
    snippets: &'a [ContextSnippet],
    exemplars: &'a [Exemplar],
    contrasts: &'a [ContrastPair],
    extra: &'a BTreeMap<String, String>,
    confidence_trailer: bool,
}

/// Build a prompt from a definition and the inputs of one expert call.
///
/// This function:
/// 1. Applies the definition's context settings (snippet cap, exemplar toggle)
/// 2. Renders the system and user templates with Handlebars
/// 3. Returns a `BuiltPrompt` ready for LLM execution
///
/// # Example
/// ```
/// use consilium_prompt::{build_prompt, default_definition, PromptInputs};
///
/// let def = default_definition("chemistry");
/// let inputs = PromptInputs {
///     question: "What is a chemical bond?".to_string(),
///     domain: "chemistry".to_string(),
///     ..Default::default()
/// };
/// let built = build_prompt(&def, &inputs).unwrap();
/// assert!(built.user.contains("What is a chemical bond?"));
/// ```
pub fn build_prompt(definition: &PromptDefinition, inputs: &PromptInputs) -> AppResult<BuiltPrompt> {
    tracing::trace!("Building prompt: {}", definition.id);

    let snippets: &[ContextSnippet] = if definition.context.include_knowledge {
        match definition.context.max_snippets {
            Some(max) if max < inputs.snippets.len() => &inputs.snippets[..max],
            _ => &inputs.snippets,
        }
    } else {
        &[]
    };

    let exemplars: &[Exemplar] = if definition.context.include_exemplars {
        &inputs.exemplars
    } else {
        &[]
    };

    let context = RenderContext {
        question: &inputs.question,
        domain: &inputs.domain,
        tone: &definition.behavior.tone,
        style: &definition.behavior.style,
        snippets,
        exemplars,
        contrasts: &inputs.contrasts,
        extra: &inputs.extra,
        confidence_trailer: definition.output.confidence_trailer,
    };

    let user = render_template(&definition.template, &context)?;
    let system = match definition.system {
        Some(ref template) => Some(render_template(template, &context)?),
        None => None,
    };

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            snippet_ids: snippets.iter().map(|s| s.id.clone()).collect(),
            exemplar_count: exemplars.len(),
        },
    })
}

/// Render a Handlebars template with a serializable context.
fn render_template<T: Serialize>(template: &str, context: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output, no HTML escaping
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", context)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
