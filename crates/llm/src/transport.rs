//! HTTP plumbing shared by the network-backed providers.

use pulse_core::{AppError, AppResult};
use std::time::Duration;

/// Identity of a provider instance, attached to every error it raises.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub provider: &'static str,
    pub model: String,
    pub organization: Option<String>,
}

impl ProviderContext {
    pub fn new(provider: &'static str, model: impl Into<String>, organization: Option<&str>) -> Self {
        Self {
            provider,
            model: model.into(),
            organization: organization.map(str::to_string),
        }
    }

    /// Build a typed provider error carrying this context.
    pub fn error(&self, message: impl Into<String>) -> AppError {
        AppError::provider(
            self.provider,
            self.model.as_str(),
            self.organization.as_deref(),
            message,
        )
    }

    /// Send a request and reject non-success statuses with the response body.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> AppResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| self.error(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(self.error(format!("API error ({}): {}", status, error_text)));
        }

        Ok(response)
    }
}

/// Build an HTTP client that gives up when connecting, or any single read,
/// takes longer than `timeout_secs`.
///
/// There is no cap on the whole request, so a stream that keeps producing
/// tokens runs to completion.
pub fn http_client(timeout_secs: u64, provider: &str) -> AppResult<reqwest::Client> {
    let timeout = Duration::from_secs(timeout_secs);
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| {
            AppError::Config(format!("Failed to create HTTP client for {}: {}", provider, e))
        })
}

/// Reassembles newline-delimited records from arbitrary byte chunks.
///
/// Network reads split records anywhere, including inside multi-byte UTF-8
/// sequences, so bytes are buffered until a full line is available.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every complete, non-empty line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// Return the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// A parsed server-sent-events line.
#[derive(Debug, PartialEq)]
pub enum SseLine<'a> {
    Data(&'a str),
    Done,
    Ignored,
}

/// Classify one SSE line (`data: ...`, `data: [DONE]`, comments, other fields).
pub fn parse_sse_line(line: &str) -> SseLine<'_> {
    match line.strip_prefix("data:") {
        Some(data) => {
            let data = data.trim();
            if data == "[DONE]" {
                SseLine::Done
            } else if data.is_empty() {
                SseLine::Ignored
            } else {
                SseLine::Data(data)
            }
        }
        None => SseLine::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_client_times_out_stalled_reads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client = http_client(1, "Test").unwrap();
        assert!(client.get(server.uri()).send().await.is_err());
    }

    #[tokio::test]
    async fn test_http_client_allows_responses_within_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("ok")
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let client = http_client(1, "Test").unwrap();
        let response = client.get(server.uri()).send().await.unwrap();
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[test]
    fn test_line_buffer_reassembles_split_lines() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"{\"a\":").is_empty());
        assert_eq!(buffer.push(b"1}\n{\"b\""), vec!["{\"a\":1}"]);
        assert_eq!(buffer.push(b":2}\n\n"), vec!["{\"b\":2}"]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_split_utf8() {
        let text = "caf\u{e9}\n".as_bytes();
        let mut buffer = LineBuffer::default();
        // Split inside the two-byte 'é'
        assert!(buffer.push(&text[..4]).is_empty());
        assert_eq!(buffer.push(&text[4..]), vec!["café"]);
    }

    #[test]
    fn test_line_buffer_finish_returns_remainder() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"{\"done\":true}");
        assert_eq!(buffer.finish().as_deref(), Some("{\"done\":true}"));
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: {\"x\":1}"), SseLine::Data("{\"x\":1}"));
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Ignored);
        assert_eq!(parse_sse_line("event: message"), SseLine::Ignored);
    }

    #[test]
    fn test_context_error() {
        let ctx = ProviderContext::new("openai", "gpt-4o", Some("org1"));
        match ctx.error("boom") {
            AppError::Provider {
                provider,
                model,
                organization,
                message,
            } => {
                assert_eq!(provider, "openai");
                assert_eq!(model, "gpt-4o");
                assert_eq!(organization.as_deref(), Some("org1"));
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
