//! SerpAPI web search provider.
//!
//! Queries `GET {endpoint}?q=..&api_key=..&engine=..` and maps
//! `organic_results` to [`WebSearchResult`]s. Twice the requested number of
//! results is asked for (capped at 100) and the list is cut back locally.

use crate::provider::{SearchOptions, WebSearchProvider, WebSearchResult};
use pulse_core::config::SerpApiSettings;
use pulse_core::{AppError, AppResult};
use pulse_llm::transport::http_client;
use serde::Deserialize;
use serde_json::{Map, Value};

const DEFAULT_COUNTRY: &str = "us";
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_SAFE: &str = "active";
const MAX_NUM: usize = 100;

#[derive(Debug, Default, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    displayed_link: Option<String>,
    #[serde(default)]
    position: Option<Value>,
    #[serde(default)]
    sitelinks: Option<Value>,
}

/// Google's `tbs` value for a named time period; unknown names pass through.
fn time_period_param(period: &str) -> String {
    match period {
        "last_hour" => "qdr:h".to_string(),
        "last_day" => "qdr:d".to_string(),
        "last_week" => "qdr:w".to_string(),
        "last_month" => "qdr:m".to_string(),
        "last_year" => "qdr:y".to_string(),
        other => other.to_string(),
    }
}

/// SerpAPI client.
pub struct SerpApiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    default_engine: String,
}

impl SerpApiProvider {
    /// Fails with a configuration error when no API key can be resolved.
    pub fn new(settings: &SerpApiSettings) -> AppResult<Self> {
        let api_key = settings.resolve_api_key().ok_or_else(|| {
            AppError::Config(format!(
                "SerpAPI provider requires an API key (set {} or serpapi.apiKey)",
                settings.api_key_env
            ))
        })?;

        Ok(Self {
            client: http_client(settings.timeout, "SerpAPI")?,
            endpoint: settings.endpoint.clone(),
            api_key,
            default_engine: settings.engine.clone(),
        })
    }

    fn params(&self, query: &str, options: &SearchOptions) -> Vec<(&'static str, String)> {
        let engine = options
            .engine
            .clone()
            .unwrap_or_else(|| self.default_engine.clone());

        let mut params = vec![
            ("q", query.to_string()),
            ("api_key", self.api_key.clone()),
            ("engine", engine),
            ("num", options.num_results.saturating_mul(2).min(MAX_NUM).to_string()),
            (
                "gl",
                options.country.clone().unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            ),
            (
                "hl",
                options.language.clone().unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            ),
            (
                "safe",
                options.safe.clone().unwrap_or_else(|| DEFAULT_SAFE.to_string()),
            ),
        ];
        if let Some(ref period) = options.time_period {
            params.push(("tbs", time_period_param(period)));
        }
        params
    }

    fn to_result(index: usize, organic: OrganicResult) -> WebSearchResult {
        let mut additional_info = Map::new();
        if let Some(displayed_link) = organic.displayed_link {
            additional_info.insert("displayed_link".to_string(), Value::String(displayed_link));
        }
        if let Some(position) = organic.position {
            additional_info.insert("position".to_string(), position);
        }
        if let Some(sitelinks) = organic.sitelinks {
            additional_info.insert("sitelinks".to_string(), sitelinks);
        }

        WebSearchResult {
            title: organic.title,
            url: organic.link,
            snippet: organic.snippet,
            source: "Google".to_string(),
            position: index + 1,
            additional_info,
        }
    }
}

#[async_trait::async_trait]
impl WebSearchProvider for SerpApiProvider {
    fn provider_name(&self) -> &str {
        "serpapi"
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> AppResult<Vec<WebSearchResult>> {
        let params = self.params(query, options);
        let engine = params
            .iter()
            .find(|(key, _)| *key == "engine")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::Search(format!("SerpAPI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status_code = status.as_u16(), query, "SerpAPI error: {}", error_text);
            return Err(AppError::Search(format!("SerpAPI error ({}): {}", status, error_text)));
        }

        let body: SerpApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Search(format!("Failed to parse SerpAPI response: {}", e)))?;

        if let Some(error) = body.error {
            return Err(AppError::Search(format!("SerpAPI error: {}", error)));
        }

        let results: Vec<WebSearchResult> = body
            .organic_results
            .into_iter()
            .take(options.num_results)
            .enumerate()
            .map(|(i, organic)| Self::to_result(i, organic))
            .collect();

        tracing::info!(query, engine = %engine, result_count = results.len(), "SerpAPI search completed");
        Ok(results)
    }
}
