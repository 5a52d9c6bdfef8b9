//! Prompt system for Pulse.
//!
//! This crate provides the prompts sent to LLM providers:
//! - Handlebars templates for grounded, ungrounded, agent and web answers
//! - Optional YAML overrides loaded from the workspace
//! - Retrieved-document context formatting

pub mod context;
pub mod loader;
pub mod templates;

// Re-export main types
pub use context::{format_document_context, ContextDocument};
pub use loader::{load_templates, PROMPTS_FILE};
pub use templates::{AgentPrompt, PromptRenderer, PromptTemplates};
