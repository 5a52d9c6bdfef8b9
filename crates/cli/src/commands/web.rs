//! Web command handler.
//!
//! Web search and search-augmented answers.

use super::{print_json, print_stream, SamplingArgs, Session};
use clap::{Args, Subcommand};
use pulse_core::AppResult;
use pulse_search::{SearchOptions, WebSearchResult, WebSearchService};

/// Web search
#[derive(Args, Debug)]
pub struct WebCommand {
    #[command(subcommand)]
    pub action: WebAction,
}

#[derive(Subcommand, Debug)]
pub enum WebAction {
    /// Search the web
    Search(WebSearchCommand),
    /// Search the web and answer from the results
    Answer(WebAnswerCommand),
}

/// Search flags shared by both subcommands.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Query text
    pub query: String,

    /// Number of results
    #[arg(short = 'n', long, default_value_t = 5)]
    pub num_results: usize,

    /// Search provider (default from config)
    #[arg(long)]
    pub search_provider: Option<String>,

    /// Engine (e.g. google, bing)
    #[arg(long)]
    pub engine: Option<String>,

    /// Country code (us, uk, ...)
    #[arg(long)]
    pub country: Option<String>,

    /// Language code (en, fr, ...)
    #[arg(long)]
    pub language: Option<String>,

    /// Safe search (active, off)
    #[arg(long)]
    pub safe: Option<String>,

    /// last_hour, last_day, last_week, last_month or last_year
    #[arg(long)]
    pub time_period: Option<String>,
}

impl SearchArgs {
    pub fn options(&self) -> SearchOptions {
        let mut options = SearchOptions::new(self.num_results);
        options.engine = self.engine.clone();
        options.country = self.country.clone();
        options.language = self.language.clone();
        options.safe = self.safe.clone();
        options.time_period = self.time_period.clone();
        options
    }
}

/// Search the web
#[derive(Args, Debug)]
pub struct WebSearchCommand {
    #[command(flatten)]
    pub search: SearchArgs,
}

impl WebSearchCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing web search command");

        let service = WebSearchService::from_services(session.services.clone());
        let results = service
            .search(
                &session.ctx,
                &self.search.query,
                &self.search.options(),
                self.search.search_provider.as_deref(),
            )
            .await?;
        print_json(&results)
    }
}

/// Search the web and answer from the results
#[derive(Args, Debug)]
pub struct WebAnswerCommand {
    #[command(flatten)]
    pub search: SearchArgs,

    /// Replace the default system message
    #[arg(long)]
    pub system: Option<String>,

    /// Print the answer as it is generated
    #[arg(long, conflicts_with = "json")]
    pub stream: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub sampling: SamplingArgs,
}

impl WebAnswerCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing web answer command");

        let service = WebSearchService::from_services(session.services.clone());
        let options = self.search.options();
        let generation = self.sampling.options();
        let provider = self.search.search_provider.as_deref();
        let system = self.system.as_deref();

        if self.stream {
            let answer = service
                .search_and_generate_stream(
                    &session.ctx,
                    &self.search.query,
                    &options,
                    system,
                    &generation,
                    provider,
                )
                .await?;
            print_stream(answer.stream).await?;
            print_results(&answer.results);
            return Ok(());
        }

        let answer = service
            .search_and_generate(&session.ctx, &self.search.query, &options, system, &generation, provider)
            .await?;
        if self.json {
            return print_json(&serde_json::json!({
                "answer": answer.answer,
                "results": answer.results,
            }));
        }

        println!("{}", answer.answer);
        print_results(&answer.results);
        Ok(())
    }
}

fn print_results(results: &[WebSearchResult]) {
    if results.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for result in results {
        println!("{}. {} ({})", result.position, result.title, result.url);
    }
}

impl WebCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        match &self.action {
            WebAction::Search(cmd) => cmd.execute(session).await,
            WebAction::Answer(cmd) => cmd.execute(session).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_options_from_flags() {
        let args = SearchArgs {
            query: "rust".to_string(),
            num_results: 3,
            search_provider: None,
            engine: Some("bing".to_string()),
            country: None,
            language: Some("de".to_string()),
            safe: None,
            time_period: Some("last_week".to_string()),
        };
        let options = args.options();
        assert_eq!(options.num_results, 3);
        assert_eq!(options.engine.as_deref(), Some("bing"));
        assert_eq!(options.language.as_deref(), Some("de"));
        assert!(options.country.is_none());
        assert_eq!(options.time_period.as_deref(), Some("last_week"));
    }
}
