//! Search-augmented answers.
//!
//! Runs a web search, renders the hits into the web prompt and asks the
//! caller's tenant LLM for an answer.

use crate::provider::{SearchOptions, WebSearchProvider, WebSearchResult};
use crate::registry::SearchRegistry;
use pulse_core::{AppResult, RequestContext};
use pulse_knowledge::ServiceContext;
use pulse_llm::{GenerationOptions, TextStream};
use std::sync::Arc;

/// Answer given when the search comes back empty.
pub const NO_RESULTS_ANSWER: &str = "I couldn't find any relevant information for your query.";

/// Render results as numbered context blocks joined by a newline.
pub fn format_search_results(results: &[WebSearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            format!(
                "Result {}:\nTitle: {}\nURL: {}\nSnippet: {}\n",
                i + 1,
                result.title,
                result.url,
                result.snippet.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Generated answer with the results it was based on.
#[derive(Debug, Clone)]
pub struct WebAnswer {
    pub answer: String,
    pub results: Vec<WebSearchResult>,
}

/// Streamed answer; `results` is known before the first fragment.
pub struct WebAnswerStream {
    pub stream: TextStream,
    pub results: Vec<WebSearchResult>,
}

/// Web search paired with tenant LLMs.
pub struct WebSearchService {
    services: ServiceContext,
    providers: SearchRegistry,
}

impl WebSearchService {
    pub fn new(services: ServiceContext, providers: SearchRegistry) -> Self {
        Self { services, providers }
    }

    /// Service with the built-in providers, configured from the services' config.
    pub fn from_services(services: ServiceContext) -> Self {
        let config = services.config();
        let providers = SearchRegistry::with_builtin_providers(
            config.serpapi.clone(),
            config.defaults.web_search_provider.clone(),
        );
        Self::new(services, providers)
    }

    pub fn providers(&self) -> &SearchRegistry {
        &self.providers
    }

    fn provider(&self, name: Option<&str>) -> AppResult<Arc<dyn WebSearchProvider>> {
        self.providers.resolve(name)
    }

    /// Plain web search.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        options: &SearchOptions,
        provider: Option<&str>,
    ) -> AppResult<Vec<WebSearchResult>> {
        let provider = self.provider(provider)?;
        let results = provider.search(query, options).await?;

        tracing::info!(
            organization_id = ctx.organization_id(),
            user_id = ctx.user_id(),
            provider = provider.provider_name(),
            result_count = results.len(),
            "Web search completed"
        );
        Ok(results)
    }

    /// System message and prompt for a non-empty result list.
    fn prompt(&self, query: &str, results: &[WebSearchResult], system_message: Option<&str>) -> AppResult<(String, String)> {
        let prompts = self.services.prompts();
        let system = match system_message {
            Some(system) => system.to_string(),
            None => prompts.web_system()?,
        };
        let prompt = prompts.web_prompt(query, &format_search_results(results))?;
        Ok((system, prompt))
    }

    /// Search the web and answer from the results.
    pub async fn search_and_generate(
        &self,
        ctx: &RequestContext,
        query: &str,
        options: &SearchOptions,
        system_message: Option<&str>,
        generation: &GenerationOptions,
        provider: Option<&str>,
    ) -> AppResult<WebAnswer> {
        let results = self.search(ctx, query, options, provider).await?;
        if results.is_empty() {
            return Ok(WebAnswer {
                answer: NO_RESULTS_ANSWER.to_string(),
                results,
            });
        }

        let (system, prompt) = self.prompt(query, &results, system_message)?;
        let llm = self.services.llm(ctx.organization_id())?;
        let answer = llm.generate(&prompt, Some(&system), generation).await?;

        tracing::info!(
            organization_id = ctx.organization_id(),
            user_id = ctx.user_id(),
            result_count = results.len(),
            "Generated web search enhanced answer"
        );
        Ok(WebAnswer { answer, results })
    }

    /// Streaming version of [`WebSearchService::search_and_generate`].
    pub async fn search_and_generate_stream(
        &self,
        ctx: &RequestContext,
        query: &str,
        options: &SearchOptions,
        system_message: Option<&str>,
        generation: &GenerationOptions,
        provider: Option<&str>,
    ) -> AppResult<WebAnswerStream> {
        let results = self.search(ctx, query, options, provider).await?;
        if results.is_empty() {
            let stream: TextStream = Box::pin(single_fragment(NO_RESULTS_ANSWER));
            return Ok(WebAnswerStream { stream, results });
        }

        let (system, prompt) = self.prompt(query, &results, system_message)?;
        let llm = self.services.llm(ctx.organization_id())?;
        let stream = llm.generate_stream(&prompt, Some(&system), generation).await?;

        Ok(WebAnswerStream { stream, results })
    }
}

fn single_fragment(text: &'static str) -> impl futures::Stream<Item = AppResult<String>> + Send {
    futures::stream::once(async move { Ok(text.to_string()) })
}
