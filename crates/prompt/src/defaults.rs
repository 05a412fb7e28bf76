//! Built-in expert prompt used when no YAML definition exists.

use crate::types::{PromptBehavior, PromptContextConfig, PromptDefinition, PromptOutputSpec};

const DEFAULT_SYSTEM: &str = "You are the {{domain}} expert on a panel of specialists. \
Answer in a {{tone}}, {{style}} manner. Say so plainly when the question is outside {{domain}}.";

const DEFAULT_TEMPLATE: &str = r#"{{#if exemplars}}Worked examples:
{{#each exemplars}}Q: {{this.input}}
A: {{this.output}}
{{/each}}
{{/if}}{{#if contrasts}}Prefer answers like the first of each pair and avoid the second:
{{#each contrasts}}Prefer: {{this.prefer}}
Avoid: {{this.avoid}}
{{/each}}
{{/if}}{{#if snippets}}Reference material:
{{#each snippets}}[{{this.id}}] {{this.text}}
{{/each}}
{{/if}}{{#each extra}}{{@key}}: {{this}}
{{/each}}Question: {{question}}
{{#if confidence_trailer}}
End your answer with a final line of the form "Confidence: <number between 0 and 1>".
{{/if}}"#;

/// The default prompt definition for `domain`.
pub fn default_definition(domain: &str) -> PromptDefinition {
    PromptDefinition {
        id: format!("expert.{}", domain),
        title: format!("{} expert", domain),
        api_version: "1.0".to_string(),
        created_by: "consilium".to_string(),
        behavior: PromptBehavior {
            tone: "professional".to_string(),
            style: "concise".to_string(),
        },
        context: PromptContextConfig::default(),
        system: Some(DEFAULT_SYSTEM.to_string()),
        template: DEFAULT_TEMPLATE.to_string(),
        output: PromptOutputSpec {
            format: "text".to_string(),
            confidence_trailer: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_definition_ids() {
        let def = default_definition("biology");
        assert_eq!(def.id, "expert.biology");
        assert!(def.output.confidence_trailer);
    }
}
