//! Tenant-scoped LLM provider resolution.
//!
//! Provider instances are cached per organization under `"{org}:{provider}"`,
//! so two tenants never share a client built from each other's credentials.

use crate::client::LlmProvider;
use crate::providers::{MockProvider, OllamaProvider, OpenAiProvider};
use pulse_core::{AppResult, ProviderRegistry, TenantConfig};
use std::sync::Arc;

/// Provider used when a tenant names one that is not registered.
pub const DEFAULT_LLM_PROVIDER: &str = "openai";

/// Registry of LLM provider factories and their per-tenant instances.
pub struct LlmRegistry {
    inner: ProviderRegistry<dyn LlmProvider, TenantConfig>,
}

impl LlmRegistry {
    /// Registry with no providers registered.
    pub fn empty() -> Self {
        Self {
            inner: ProviderRegistry::new("llm", DEFAULT_LLM_PROVIDER),
        }
    }

    /// Registry with `openai`, `ollama` and `mock` registered.
    pub fn with_builtin_providers() -> Self {
        let registry = Self::empty();

        registry.register("openai", |tenant: &TenantConfig| {
            let provider = OpenAiProvider::new(&tenant.openai, Some(&tenant.organization_id))?;
            Ok(Arc::new(provider) as Arc<dyn LlmProvider>)
        });
        registry.register("ollama", |tenant: &TenantConfig| {
            let provider = OllamaProvider::new(&tenant.ollama, Some(&tenant.organization_id))?;
            Ok(Arc::new(provider) as Arc<dyn LlmProvider>)
        });
        registry.register("mock", |tenant: &TenantConfig| {
            let provider = MockProvider::new("mock", tenant.vector_store.metadata_dimension);
            Ok(Arc::new(provider) as Arc<dyn LlmProvider>)
        });

        registry
    }

    /// Register (or replace) a provider factory.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TenantConfig) -> AppResult<Arc<dyn LlmProvider>> + Send + Sync + 'static,
    {
        self.inner.register(name, factory);
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    /// Provider for a tenant, built on first use and cached afterwards.
    pub fn resolve(&self, tenant: &TenantConfig) -> AppResult<Arc<dyn LlmProvider>> {
        self.inner
            .resolve(&tenant.organization_id, &tenant.llm_provider, tenant)
    }

    pub fn clear_cache(&self) {
        self.inner.clear_cache();
    }

    pub fn cached_keys(&self) -> Vec<String> {
        self.inner.cached_keys()
    }
}

impl Default for LlmRegistry {
    fn default() -> Self {
        Self::with_builtin_providers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{AppConfig, AppError};

    fn tenant(org: &str, provider: &str) -> TenantConfig {
        let mut config = TenantConfig::defaults_for(&AppConfig::default(), org);
        config.llm_provider = provider.to_string();
        config
    }

    #[test]
    fn test_builtin_names() {
        let registry = LlmRegistry::with_builtin_providers();
        assert_eq!(registry.names(), vec!["mock", "ollama", "openai"]);
    }

    #[test]
    fn test_instances_cached_per_organization() {
        let registry = LlmRegistry::with_builtin_providers();

        let a1 = registry.resolve(&tenant("org-a", "mock")).unwrap();
        let a2 = registry.resolve(&tenant("org-a", "mock")).unwrap();
        let b = registry.resolve(&tenant("org-b", "mock")).unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(registry.cached_keys(), vec!["org-a:mock", "org-b:mock"]);
    }

    #[test]
    fn test_unknown_provider_falls_back_to_default() {
        let registry = LlmRegistry::with_builtin_providers();
        let mut config = tenant("org-a", "does-not-exist");
        config.openai.api_key = Some("sk-test".to_string());

        let provider = registry.resolve(&config).unwrap();
        assert_eq!(provider.provider_name(), "openai");
    }

    #[test]
    fn test_missing_credentials_are_config_errors() {
        let registry = LlmRegistry::with_builtin_providers();
        let mut config = tenant("org-a", "openai");
        config.openai.api_key = None;
        config.openai.api_key_env = "PULSE_TEST_UNSET_OPENAI_KEY".to_string();

        assert!(matches!(registry.resolve(&config), Err(AppError::Config(_))));
        assert!(registry.cached_keys().is_empty());
    }

    #[test]
    fn test_clear_cache() {
        let registry = LlmRegistry::with_builtin_providers();
        let first = registry.resolve(&tenant("org-a", "ollama")).unwrap();
        registry.clear_cache();
        let second = registry.resolve(&tenant("org-a", "ollama")).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
    }
}
