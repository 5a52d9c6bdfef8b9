//! Web search provider resolution.
//!
//! Search backends hold no tenant state, so one instance per provider is
//! cached under `"shared:{provider}"` and serves every organization.

use crate::provider::WebSearchProvider;
use crate::serpapi::SerpApiProvider;
use pulse_core::config::SerpApiSettings;
use pulse_core::{AppResult, ProviderRegistry, SHARED_SCOPE};
use std::sync::Arc;

/// Provider used when the requested one is not registered.
pub const DEFAULT_SEARCH_PROVIDER: &str = "serpapi";

/// Registry of web search factories and their shared instances.
pub struct SearchRegistry {
    inner: ProviderRegistry<dyn WebSearchProvider, SerpApiSettings>,
    settings: SerpApiSettings,
    default_provider: String,
}

impl SearchRegistry {
    /// Registry with no providers. `default_provider` is used when a call names none.
    pub fn empty(settings: SerpApiSettings, default_provider: impl Into<String>) -> Self {
        Self {
            inner: ProviderRegistry::new("web_search", DEFAULT_SEARCH_PROVIDER),
            settings,
            default_provider: default_provider.into(),
        }
    }

    /// Registry with `serpapi` registered.
    pub fn with_builtin_providers(settings: SerpApiSettings, default_provider: impl Into<String>) -> Self {
        let registry = Self::empty(settings, default_provider);
        registry.register("serpapi", |settings: &SerpApiSettings| {
            let provider = SerpApiProvider::new(settings)?;
            Ok(Arc::new(provider) as Arc<dyn WebSearchProvider>)
        });
        registry
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&SerpApiSettings) -> AppResult<Arc<dyn WebSearchProvider>> + Send + Sync + 'static,
    {
        self.inner.register(name, factory);
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    /// The named provider, or the configured default when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> AppResult<Arc<dyn WebSearchProvider>> {
        let requested = name.unwrap_or(&self.default_provider);
        self.inner.resolve(SHARED_SCOPE, requested, &self.settings)
    }

    pub fn clear_cache(&self) {
        self.inner.clear_cache();
    }

    pub fn cached_keys(&self) -> Vec<String> {
        self.inner.cached_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{SearchOptions, WebSearchResult};

    struct Canned;

    #[async_trait::async_trait]
    impl WebSearchProvider for Canned {
        fn provider_name(&self) -> &str {
            "canned"
        }

        async fn search(&self, _query: &str, _options: &SearchOptions) -> AppResult<Vec<WebSearchResult>> {
            Ok(Vec::new())
        }
    }

    fn settings() -> SerpApiSettings {
        SerpApiSettings {
            api_key: Some("serp-test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_instances_are_shared() {
        let registry = SearchRegistry::with_builtin_providers(settings(), "serpapi");
        let a = registry.resolve(None).unwrap();
        let b = registry.resolve(Some("serpapi")).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.cached_keys(), vec!["shared:serpapi"]);
    }

    #[test]
    fn test_unknown_provider_falls_back() {
        let registry = SearchRegistry::with_builtin_providers(settings(), "serpapi");
        registry.register("canned", |_: &SerpApiSettings| Ok(Arc::new(Canned) as Arc<dyn WebSearchProvider>));

        assert_eq!(registry.resolve(Some("canned")).unwrap().provider_name(), "canned");
        assert_eq!(registry.resolve(Some("bing")).unwrap().provider_name(), "serpapi");
    }

    #[test]
    fn test_missing_key_is_not_cached() {
        let settings = SerpApiSettings {
            api_key_env: "PULSE_TEST_NO_SUCH_SERPAPI_KEY".to_string(),
            ..Default::default()
        };
        let registry = SearchRegistry::with_builtin_providers(settings, "serpapi");

        assert!(registry.resolve(None).is_err());
        assert!(registry.cached_keys().is_empty());
    }
}
