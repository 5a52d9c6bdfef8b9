//! OpenAI LLM provider implementation.
//!
//! Chat and completion go through `/chat/completions` (completion is sent as
//! a two-message chat). Streaming uses server-sent events. Embeddings use
//! `/embeddings` in batches and are re-ordered by the returned `index`.

use crate::client::{ChatMessage, GenerationOptions, LlmProvider, TextStream};
use crate::transport::{http_client, parse_sse_line, LineBuffer, ProviderContext, SseLine};
use futures::StreamExt;
use pulse_core::config::OpenAiSettings;
use pulse_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Maximum number of inputs per embeddings request.
const EMBEDDING_BATCH_SIZE: usize = 100;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "no_stop")]
    stop: &'a [String],
    stream: bool,
}

fn no_stop(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI chat-completions client.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    embedding_model: String,
    context: ProviderContext,
}

impl OpenAiProvider {
    /// Create a provider from settings.
    ///
    /// Fails with a configuration error when no API key can be resolved.
    pub fn new(settings: &OpenAiSettings, organization: Option<&str>) -> AppResult<Self> {
        let api_key = settings.resolve_api_key().ok_or_else(|| {
            AppError::Config(format!(
                "OpenAI provider requires an API key (set {} or openai.apiKey)",
                settings.api_key_env
            ))
        })?;

        Ok(Self {
            client: http_client(settings.timeout, "OpenAI")?,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: settings.embedding_model.clone(),
            context: ProviderContext::new("openai", settings.model.as_str(), organization),
        })
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/{}", self.endpoint, path))
            .bearer_auth(&self.api_key)
    }

    fn chat_request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        options: &'a GenerationOptions,
        stream: bool,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.context.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stop: &options.stop,
            stream,
        }
    }

    async fn embed_batch(&self, batch: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: batch,
        };

        let response = self
            .context
            .send(self.post("embeddings").json(&request))
            .await?;

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| self.context.error(format!("Failed to parse embeddings: {}", e)))?;

        if parsed.data.len() != batch.len() {
            return Err(self.context.error(format!(
                "Expected {} embeddings, received {}",
                batch.len(),
                parsed.data.len()
            )));
        }

        // The API may return items out of order; `index` is authoritative
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.context.model
    }

    async fn chat(&self, messages: &[ChatMessage], options: &GenerationOptions) -> AppResult<String> {
        tracing::debug!(
            provider = "openai",
            model = %self.context.model,
            messages = messages.len(),
            "Sending chat completion request"
        );

        let request = self.chat_request(messages, options, false);
        let response = self
            .context
            .send(self.post("chat/completions").json(&request))
            .await?;

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| self.context.error(format!("Failed to parse completion: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| self.context.error("Completion returned no choices"))
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> AppResult<TextStream> {
        tracing::debug!(
            provider = "openai",
            model = %self.context.model,
            messages = messages.len(),
            "Starting streaming chat completion"
        );

        let request = self.chat_request(messages, options, true);
        let response = self
            .context
            .send(self.post("chat/completions").json(&request))
            .await?;

        let context = self.context.clone();
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = LineBuffer::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(context.error(format!("Stream read error: {}", e)));
                        return;
                    }
                };

                for line in lines.push(&chunk) {
                    match parse_sse_line(&line) {
                        SseLine::Done => return,
                        SseLine::Ignored => {}
                        SseLine::Data(data) => match serde_json::from_str::<ChatCompletionChunk>(data) {
                            Ok(parsed) => {
                                let content = parsed
                                    .choices
                                    .into_iter()
                                    .next()
                                    .and_then(|choice| choice.delta.content)
                                    .unwrap_or_default();
                                if !content.is_empty() {
                                    yield Ok(content);
                                }
                            }
                            Err(e) => {
                                yield Err(context.error(format!("Failed to parse stream chunk: {}", e)));
                                return;
                            }
                        },
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn get_embeddings(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            embeddings.extend(self.embed_batch(batch).await?);
        }

        tracing::debug!(
            provider = "openai",
            model = %self.embedding_model,
            count = embeddings.len(),
            "Generated embeddings"
        );

        Ok(embeddings)
    }
}
