//! Ollama LLM provider implementation.
//!
//! This module provides integration with Ollama, a local LLM runtime.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md
//!
//! Completion uses the native `/api/generate` endpoint, chat uses `/api/chat`
//! with the system message lifted into the `system` field, and streaming
//! responses are newline-delimited JSON.

use crate::client::{ChatMessage, GenerationOptions, LlmProvider, Role, TextStream};
use crate::transport::{http_client, LineBuffer, ProviderContext};
use futures::StreamExt;
use pulse_core::config::OllamaSettings;
use pulse_core::AppResult;
use serde::{Deserialize, Serialize};

/// Sampling options in Ollama's request format.
#[derive(Debug, Serialize)]
struct OllamaOptions<'a> {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "no_stop")]
    stop: &'a [String],
}

fn no_stop(stop: &&[String]) -> bool {
    stop.is_empty()
}

impl<'a> From<&'a GenerationOptions> for OllamaOptions<'a> {
    fn from(options: &'a GenerationOptions) -> Self {
        Self {
            temperature: options.temperature,
            num_predict: options.max_tokens,
            stop: &options.stop,
        }
    }
}

/// Ollama `/api/generate` request format.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions<'a>,
}

/// Ollama `/api/chat` request format.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions<'a>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// One response object (or one NDJSON line when streaming).
///
/// `/api/generate` fills `response`, `/api/chat` fills `message`.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

impl OllamaResponse {
    fn text(self) -> String {
        match (self.response, self.message) {
            (Some(text), _) => text,
            (None, Some(message)) => message.content,
            (None, None) => String::new(),
        }
    }
}

/// Ollama LLM client.
pub struct OllamaProvider {
    /// Base URL for Ollama API (without `/api`)
    base_url: String,

    /// HTTP client
    client: reqwest::Client,

    /// Model used for `/api/embeddings`
    embedding_model: String,

    context: ProviderContext,
}

impl OllamaProvider {
    /// Create a provider from settings.
    pub fn new(settings: &OllamaSettings, organization: Option<&str>) -> AppResult<Self> {
        let base_url = settings
            .endpoint
            .trim_end_matches('/')
            .trim_end_matches("/api")
            .to_string();

        Ok(Self {
            base_url,
            client: http_client(settings.timeout, "Ollama")?,
            embedding_model: settings
                .embedding_model
                .clone()
                .unwrap_or_else(|| settings.model.clone()),
            context: ProviderContext::new("ollama", settings.model.as_str(), organization),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.base_url, endpoint)
    }

    /// Split a chat history into Ollama's `system` field and the remaining messages.
    fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let rest = messages.iter().filter(|m| m.role != Role::System).collect();
        let system = (!system.is_empty()).then(|| system.join("\n\n"));
        (system, rest)
    }

    async fn post_single<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> AppResult<String> {
        let response = self
            .context
            .send(self.client.post(self.url(endpoint)).json(body))
            .await?;

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| self.context.error(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(self.context.error(error));
        }

        Ok(parsed.text())
    }

    async fn post_stream<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> AppResult<TextStream> {
        let response = self
            .context
            .send(self.client.post(self.url(endpoint)).json(body))
            .await?;

        let context = self.context.clone();
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = LineBuffer::default();
            let mut exhausted = false;

            while !exhausted {
                let batch = match bytes.next().await {
                    Some(Ok(chunk)) => lines.push(&chunk),
                    Some(Err(e)) => {
                        yield Err(context.error(format!("Stream read error: {}", e)));
                        return;
                    }
                    None => {
                        exhausted = true;
                        lines.finish().into_iter().collect()
                    }
                };

                for line in batch {
                    match serde_json::from_str::<OllamaResponse>(&line) {
                        Ok(parsed) => {
                            if let Some(error) = parsed.error {
                                yield Err(context.error(error));
                                return;
                            }
                            let done = parsed.done;
                            let text = parsed.text();
                            if !text.is_empty() {
                                yield Ok(text);
                            }
                            if done {
                                return;
                            }
                        }
                        Err(e) => {
                            yield Err(context.error(format!("Failed to parse chunk: {}", e)));
                            return;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.context.model
    }

    async fn generate(
        &self,
        prompt: &str,
        system_message: Option<&str>,
        options: &GenerationOptions,
    ) -> AppResult<String> {
        tracing::debug!(provider = "ollama", model = %self.context.model, "Sending completion request");

        let request = GenerateRequest {
            model: &self.context.model,
            prompt,
            system: system_message,
            stream: false,
            options: options.into(),
        };
        self.post_single("generate", &request).await
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system_message: Option<&str>,
        options: &GenerationOptions,
    ) -> AppResult<TextStream> {
        tracing::debug!(provider = "ollama", model = %self.context.model, "Starting streaming completion");

        let request = GenerateRequest {
            model: &self.context.model,
            prompt,
            system: system_message,
            stream: true,
            options: options.into(),
        };
        self.post_stream("generate", &request).await
    }

    async fn chat(&self, messages: &[ChatMessage], options: &GenerationOptions) -> AppResult<String> {
        tracing::debug!(provider = "ollama", model = %self.context.model, messages = messages.len(), "Sending chat request");

        let (system, messages) = Self::split_system(messages);
        let request = ChatRequest {
            model: &self.context.model,
            messages,
            system,
            stream: false,
            options: options.into(),
        };
        self.post_single("chat", &request).await
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> AppResult<TextStream> {
        tracing::debug!(provider = "ollama", model = %self.context.model, messages = messages.len(), "Starting streaming chat");

        let (system, messages) = Self::split_system(messages);
        let request = ChatRequest {
            model: &self.context.model,
            messages,
            system,
            stream: true,
            options: options.into(),
        };
        self.post_stream("chat", &request).await
    }

    async fn get_embeddings(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        // One request per text keeps the output aligned with the input order
        let mut embeddings = Vec::with_capacity(texts.len());

        for text in texts {
            let request = EmbeddingRequest {
                model: &self.embedding_model,
                prompt: text,
            };

            let response = self
                .context
                .send(self.client.post(self.url("embeddings")).json(&request))
                .await?;

            let parsed: EmbeddingResponse = response
                .json()
                .await
                .map_err(|e| self.context.error(format!("Failed to parse embedding: {}", e)))?;

            if parsed.embedding.is_empty() {
                return Err(self.context.error(format!(
                    "Model '{}' returned an empty embedding",
                    self.embedding_model
                )));
            }

            embeddings.push(parsed.embedding);
        }

        Ok(embeddings)
    }
}
