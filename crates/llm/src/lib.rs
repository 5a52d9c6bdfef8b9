//! LLM integration crate for Pulse.
//!
//! This crate provides a provider-agnostic abstraction for interacting with
//! Large Language Models (LLMs). Every backend implements [`LlmProvider`]:
//! completion, chat, their streaming twins and embeddings.
//!
//! # Providers
//! - **OpenAI**: chat completions and embeddings over HTTP (default)
//! - **Ollama**: local LLM runtime
//! - **Mock**: deterministic, network-free provider for tests and offline use
//!
//! # Example
//! ```no_run
//! use pulse_llm::{GenerationOptions, LlmProvider, LlmRegistry};
//! use pulse_core::{AppConfig, TenantConfig};
//!
//! # async fn example() -> pulse_core::AppResult<()> {
//! let registry = LlmRegistry::with_builtin_providers();
//! let tenant = TenantConfig::defaults_for(&AppConfig::default(), "acme");
//! let llm = registry.resolve(&tenant)?;
//! let answer = llm.generate("Hello, world!", None, &GenerationOptions::default()).await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod providers;
pub mod registry;
pub mod transport;

// Re-export main types
pub use client::{
    collect_stream, prompt_messages, ChatMessage, GenerationOptions, LlmProvider, Role, TextStream,
};
pub use providers::{MockProvider, OllamaProvider, OpenAiProvider};
pub use registry::{LlmRegistry, DEFAULT_LLM_PROVIDER};
