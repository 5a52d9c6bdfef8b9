//! Prompt loader for workspace template overrides.

use crate::templates::PromptTemplates;
use pulse_core::{AppError, AppResult};
use std::path::Path;

/// Override file, relative to the workspace root.
pub const PROMPTS_FILE: &str = ".pulse/prompts.yaml";

/// Load the template set for a workspace.
///
/// Templates missing from `.pulse/prompts.yaml` (or the whole file) keep
/// their built-in text.
///
/// # Example
/// ```no_run
/// use pulse_prompt::{load_templates, PromptRenderer};
/// use std::path::Path;
///
/// # fn example() -> pulse_core::AppResult<()> {
/// let templates = load_templates(Path::new("."))?;
/// let renderer = PromptRenderer::new(&templates)?;
/// println!("{}", renderer.rag_system()?);
/// # Ok(())
/// # }
/// ```
pub fn load_templates(workspace_path: &Path) -> AppResult<PromptTemplates> {
    let prompt_file = workspace_path.join(PROMPTS_FILE);

    if !prompt_file.exists() {
        tracing::debug!("No prompt overrides at {:?}, using built-in templates", prompt_file);
        return Ok(PromptTemplates::default());
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Config(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    // An empty file deserializes to null; treat it as "no overrides"
    if contents.trim().is_empty() {
        return Ok(PromptTemplates::default());
    }

    let templates: PromptTemplates = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Config(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    tracing::info!("Loaded prompt overrides from {:?}", prompt_file);

    Ok(templates)
}
