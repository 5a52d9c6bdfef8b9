//! Command handlers for the Pulse CLI.
//!
//! Every command except `config` runs as one principal through a [`Session`].

pub mod agent;
pub mod chat;
pub mod config;
pub mod documents;
pub mod generate;
pub mod rag;
pub mod web;

pub use agent::AgentCommand;
pub use chat::ChatCommand;
pub use config::ConfigCommand;
pub use documents::DocumentsCommand;
pub use generate::GenerateCommand;
pub use rag::RagCommand;
pub use web::WebCommand;

use futures::StreamExt;
use pulse_core::{AppError, AppResult, RequestContext};
use pulse_knowledge::{Filter, Metadata, ServiceContext};
use pulse_llm::{GenerationOptions, TextStream};
use serde::Serialize;
use std::io::Write;

/// Services plus the principal a command runs as.
pub struct Session {
    pub services: ServiceContext,
    pub ctx: RequestContext,
}

/// Sampling flags shared by the generating commands.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SamplingArgs {
    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum tokens in the response
    #[arg(long)]
    pub max_tokens: Option<u32>,
}

impl SamplingArgs {
    pub fn options(&self) -> GenerationOptions {
        let mut options = GenerationOptions::default();
        if let Some(temperature) = self.temperature {
            options = options.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }
        options
    }
}

/// Parse an optional JSON filter flag.
pub(crate) fn parse_filter(json: Option<&str>) -> AppResult<Option<Filter>> {
    json.map(Filter::parse).transpose()
}

/// Parse an optional JSON object flag; absent means empty.
pub(crate) fn parse_metadata(json: Option<&str>) -> AppResult<Metadata> {
    let Some(json) = json else {
        return Ok(Metadata::new());
    };
    match serde_json::from_str(json)
        .map_err(|e| AppError::Validation(format!("Invalid metadata JSON: {}", e)))?
    {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(AppError::Validation(format!(
            "Metadata must be a JSON object, got: {}",
            other
        ))),
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print fragments as they arrive. A failure mid-stream is reported on
/// stderr and returned.
pub(crate) async fn print_stream(mut stream: TextStream) -> AppResult<()> {
    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(text) => {
                print!("{}", text);
                stdout.flush()?;
            }
            Err(e) => {
                println!();
                eprintln!("Stream failed: {}", e);
                return Err(e);
            }
        }
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata() {
        assert!(parse_metadata(None).unwrap().is_empty());

        let metadata = parse_metadata(Some(r#"{"title": "Guide", "visibility": "public"}"#)).unwrap();
        assert_eq!(metadata["title"], "Guide");

        assert!(matches!(parse_metadata(Some("[1, 2]")), Err(AppError::Validation(_))));
        assert!(matches!(parse_metadata(Some("{")), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_parse_filter() {
        assert!(parse_filter(None).unwrap().is_none());
        let filter = parse_filter(Some(r#"{"category": "faq"}"#)).unwrap().unwrap();
        assert_eq!(filter, Filter::eq("category", "faq"));
    }

    #[test]
    fn test_sampling_options() {
        let options = SamplingArgs {
            temperature: Some(0.2),
            max_tokens: Some(64),
        }
        .options();
        assert_eq!(options.temperature, 0.2);
        assert_eq!(options.max_tokens, Some(64));

        assert_eq!(SamplingArgs::default().options().temperature, 0.7);
    }
}
