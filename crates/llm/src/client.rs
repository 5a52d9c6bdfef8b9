//! LLM provider abstraction and request types.
//!
//! This module defines the capability every LLM backend implements:
//! completion, chat, their streaming twins, and batch embeddings.

use futures::{Stream, StreamExt};
use pulse_core::AppResult;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Parse a role name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message of a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling options shared by completion and chat calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for sampling (0.0 = deterministic)
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sequences where generation should stop
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
            stop: Vec::new(),
        }
    }
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the stop sequences.
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }
}

/// Ordered stream of generated text fragments.
///
/// A backend failure after the stream started arrives as a terminal `Err`.
/// Dropping the stream releases the underlying connection.
pub type TextStream = Pin<Box<dyn Stream<Item = AppResult<String>> + Send>>;

/// Build the `[system?, user]` history used to express completion as chat.
pub fn prompt_messages(prompt: &str, system_message: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_message {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));
    messages
}

/// Drain a text stream into one string, stopping at the first error.
pub async fn collect_stream(mut stream: TextStream) -> AppResult<String> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

/// Trait for LLM providers.
///
/// Implementations are tenant-scoped: a provider instance is built from one
/// organization's configuration and cached by the [`crate::LlmRegistry`].
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "openai", "ollama").
    fn provider_name(&self) -> &str;

    /// Model used for completion and chat.
    fn model_name(&self) -> &str;

    /// Generate text from a prompt.
    ///
    /// The default sends `[system?, user]` through [`LlmProvider::chat`].
    async fn generate(
        &self,
        prompt: &str,
        system_message: Option<&str>,
        options: &GenerationOptions,
    ) -> AppResult<String> {
        self.chat(&prompt_messages(prompt, system_message), options)
            .await
    }

    /// Streaming version of [`LlmProvider::generate`].
    async fn generate_stream(
        &self,
        prompt: &str,
        system_message: Option<&str>,
        options: &GenerationOptions,
    ) -> AppResult<TextStream> {
        self.chat_stream(&prompt_messages(prompt, system_message), options)
            .await
    }

    /// Generate the next assistant message for a conversation.
    async fn chat(&self, messages: &[ChatMessage], options: &GenerationOptions)
        -> AppResult<String>;

    /// Streaming version of [`LlmProvider::chat`].
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> AppResult<TextStream>;

    /// Embed texts. Output order always matches input order.
    async fn get_embeddings(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::AppError;

    #[test]
    fn test_prompt_messages() {
        let messages = prompt_messages("What is Rust?", Some("Be brief"));
        assert_eq!(
            messages,
            vec![
                ChatMessage::system("Be brief"),
                ChatMessage::user("What is Rust?")
            ]
        );

        let messages = prompt_messages("Hi", None);
        assert_eq!(messages, vec![ChatMessage::user("Hi")]);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::parse("User"), Some(Role::User));
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("tool"), None);
        assert_eq!(Role::System.as_str(), "system");
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "ok"}));
    }

    #[test]
    fn test_options_builder() {
        let options = GenerationOptions::new()
            .with_temperature(0.2)
            .with_max_tokens(64)
            .with_stop(vec!["\n\n".to_string()]);

        assert_eq!(options.temperature, 0.2);
        assert_eq!(options.max_tokens, Some(64));
        assert_eq!(options.stop, vec!["\n\n"]);
        assert_eq!(GenerationOptions::default().temperature, 0.7);
    }

    #[tokio::test]
    async fn test_collect_stream_stops_at_error() {
        let ok: TextStream = Box::pin(futures::stream::iter(vec![
            Ok("Hello".to_string()),
            Ok(", world".to_string()),
        ]));
        assert_eq!(collect_stream(ok).await.unwrap(), "Hello, world");

        let failing: TextStream = Box::pin(futures::stream::iter(vec![
            Ok("partial".to_string()),
            Err(AppError::provider("mock", "m", None, "connection reset")),
        ]));
        assert!(collect_stream(failing).await.is_err());
    }
}
