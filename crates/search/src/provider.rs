//! Web search capability and result types.

use pulse_core::AppResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Engine that produced the hit (e.g., "Google")
    pub source: String,
    /// 1-based rank
    pub position: usize,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_info: Map<String, Value>,
}

/// Search parameters. Unset fields use the provider's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub num_results: usize,
    pub engine: Option<String>,
    /// Country code (us, uk, ...)
    pub country: Option<String>,
    /// Language code (en, fr, ...)
    pub language: Option<String>,
    /// Safe search (active, off)
    pub safe: Option<String>,
    /// last_day, last_week, last_month or last_year
    pub time_period: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            num_results: 5,
            engine: None,
            country: None,
            language: None,
            safe: None,
            time_period: None,
        }
    }
}

impl SearchOptions {
    pub fn new(num_results: usize) -> Self {
        Self {
            num_results,
            ..Default::default()
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_safe(mut self, safe: impl Into<String>) -> Self {
        self.safe = Some(safe.into());
        self
    }

    pub fn with_time_period(mut self, time_period: impl Into<String>) -> Self {
        self.time_period = Some(time_period.into());
        self
    }
}

/// Trait for web search backends.
///
/// Failures surface as [`pulse_core::AppError::Search`]; a search that
/// succeeds with no hits returns an empty list.
#[async_trait::async_trait]
pub trait WebSearchProvider: Send + Sync {
    /// Provider name (e.g., "serpapi").
    fn provider_name(&self) -> &str;

    /// Ranked results for `query`, at most `options.num_results`.
    async fn search(&self, query: &str, options: &SearchOptions) -> AppResult<Vec<WebSearchResult>>;
}
