//! Expert prompt files: `<prompts_dir>/<id>.yml`.

use crate::defaults::default_definition;
use crate::types::PromptDefinition;
use consilium_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

const EXTENSION: &str = "yml";

fn prompt_path(prompts_dir: &Path, prompt_id: &str) -> PathBuf {
    prompts_dir.join(format!("{}.{}", prompt_id, EXTENSION))
}

fn prompt_error(path: &Path, what: &str, err: impl std::fmt::Display) -> AppError {
    AppError::Prompt(format!("{} {}: {}", what, path.display(), err))
}

/// Read and validate the prompt `prompt_id`.
///
/// # Example
/// ```no_run
/// use consilium_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new(".consilium/prompts"), "expert.chemistry")?;
/// assert!(prompt.template.contains("{{question}}"));
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(prompts_dir: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let path = prompt_path(prompts_dir, prompt_id);
    if !path.is_file() {
        return Err(AppError::Prompt(format!(
            "No prompt '{}' at {}",
            prompt_id,
            path.display()
        )));
    }

    let raw = std::fs::read_to_string(&path).map_err(|e| prompt_error(&path, "Cannot read", e))?;
    let definition: PromptDefinition =
        serde_yaml::from_str(&raw).map_err(|e| prompt_error(&path, "Invalid YAML in", e))?;
    check_definition(&definition)?;

    tracing::debug!("Loaded prompt '{}' from {}", definition.id, path.display());
    Ok(definition)
}

/// `expert.<domain>` from `prompts_dir`, or the built-in template when no
/// file exists. A file that exists but is invalid is still an error.
pub fn load_or_default(prompts_dir: &Path, domain: &str) -> AppResult<PromptDefinition> {
    let prompt_id = format!("expert.{}", domain);
    if prompt_path(prompts_dir, &prompt_id).is_file() {
        return load_prompt(prompts_dir, &prompt_id);
    }
    tracing::debug!("Using built-in template for '{}'", prompt_id);
    Ok(default_definition(domain))
}

/// Sorted ids of the prompt files directly under `prompts_dir`.
pub fn list_prompts(prompts_dir: &Path) -> AppResult<Vec<String>> {
    if !prompts_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut ids: Vec<String> = walkdir::WalkDir::new(prompts_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some(EXTENSION))
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .collect();

    ids.sort();
    Ok(ids)
}

fn check_definition(def: &PromptDefinition) -> AppResult<()> {
    let missing = [
        ("id", def.id.trim().is_empty()),
        ("title", def.title.trim().is_empty()),
        ("template", def.template.trim().is_empty()),
    ]
    .into_iter()
    .find_map(|(field, empty)| empty.then_some(field));

    if let Some(field) = missing {
        return Err(AppError::Prompt(format!("Prompt {} must not be empty", field)));
    }

    if !def.template.contains("{{question}}") {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' never places {{{{question}}}} in its template",
            def.id
        )));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' has apiVersion '{}', expected 'major.minor'",
            def.id, def.api_version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, template: &str) {
        let body = format!(
            r#"
id: {id}
title: "Chemistry specialist"
apiVersion: "1.0"
behavior:
  tone: technical
  style: concise
template: "{template}"
output:
  format: text
"#
        );
        fs::write(dir.join(format!("{}.yml", id)), body).unwrap();
    }

    #[test]
    fn test_load_prompt_from_file() {
        let dir = TempDir::new().unwrap();
        write_prompt(dir.path(), "expert.chemistry", "As a chemist: {{question}}");

        let prompt = load_prompt(dir.path(), "expert.chemistry").unwrap();
        assert_eq!(prompt.id, "expert.chemistry");
        assert_eq!(prompt.title, "Chemistry specialist");
    }

    #[test]
    fn test_missing_and_malformed_files_fail() {
        let dir = TempDir::new().unwrap();
        assert!(load_prompt(dir.path(), "expert.physics").is_err());

        fs::write(dir.path().join("broken.yml"), "id: [unclosed").unwrap();
        assert!(load_prompt(dir.path(), "broken").is_err());
    }

    #[test]
    fn test_template_must_place_question() {
        let dir = TempDir::new().unwrap();
        write_prompt(dir.path(), "expert.chemistry", "Say something clever");

        let err = load_prompt(dir.path(), "expert.chemistry").unwrap_err();
        assert!(err.to_string().contains("question"));
    }

    #[test]
    fn test_load_or_default_prefers_file() {
        let dir = TempDir::new().unwrap();
        write_prompt(dir.path(), "expert.chemistry", "As a chemist: {{question}}");

        let custom = load_or_default(dir.path(), "chemistry").unwrap();
        assert_eq!(custom.title, "Chemistry specialist");

        let fallback = load_or_default(dir.path(), "biology").unwrap();
        assert_eq!(fallback.id, "expert.biology");
    }

    #[test]
    fn test_list_prompts_sorted() {
        let dir = TempDir::new().unwrap();
        write_prompt(dir.path(), "expert.geology", "{{question}}");
        write_prompt(dir.path(), "expert.biology", "{{question}}");
        fs::write(dir.path().join("notes.txt"), "not a prompt").unwrap();

        assert_eq!(
            list_prompts(dir.path()).unwrap(),
            vec!["expert.biology".to_string(), "expert.geology".to_string()]
        );
        assert!(list_prompts(&dir.path().join("absent")).unwrap().is_empty());
    }
}
