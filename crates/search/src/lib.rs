//! Web search for Pulse.
//!
//! Every search backend implements [`WebSearchProvider`]. Backends are
//! shared by all tenants; [`WebSearchService`] pairs them with a tenant's
//! LLM to answer questions from live search results.
//!
//! # Providers
//! - **SerpAPI**: Google (and other engines) through serpapi.com

pub mod answer;
pub mod provider;
pub mod registry;
pub mod serpapi;

pub use answer::{format_search_results, WebAnswer, WebAnswerStream, WebSearchService, NO_RESULTS_ANSWER};
pub use provider::{SearchOptions, WebSearchProvider, WebSearchResult};
pub use registry::{SearchRegistry, DEFAULT_SEARCH_PROVIDER};
pub use serpapi::SerpApiProvider;
