//! Process-wide services shared by the pipelines.

use crate::agents::AgentCache;
use crate::registry::VectorDbRegistry;
use crate::vectordb::VectorDatabase;
use pulse_core::{AppConfig, AppResult, TenantConfig, TenantDirectory, TenantOverrides};
use pulse_llm::{LlmProvider, LlmRegistry};
use pulse_prompt::PromptRenderer;
use std::sync::Arc;

struct Services {
    config: AppConfig,
    tenants: TenantDirectory,
    llms: LlmRegistry,
    vector_dbs: VectorDbRegistry,
    prompts: PromptRenderer,
    agents: AgentCache,
}

/// Handle to the configuration, registries, prompts and agent cache.
///
/// Cheap to clone; every clone shares the same caches.
#[derive(Clone)]
pub struct ServiceContext {
    inner: Arc<Services>,
}

impl ServiceContext {
    /// Build services from configuration, loading prompt overrides from the workspace.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let templates = pulse_prompt::load_templates(&config.workspace)?;
        let prompts = PromptRenderer::new(&templates)?;

        Ok(Self::with_parts(
            config,
            LlmRegistry::with_builtin_providers(),
            VectorDbRegistry::with_builtin_providers(),
            prompts,
        ))
    }

    /// Assemble services from explicit registries.
    pub fn with_parts(
        config: AppConfig,
        llms: LlmRegistry,
        vector_dbs: VectorDbRegistry,
        prompts: PromptRenderer,
    ) -> Self {
        let tenants = TenantDirectory::from_config(&config);
        Self {
            inner: Arc::new(Services {
                config,
                tenants,
                llms,
                vector_dbs,
                prompts,
                agents: AgentCache::new(),
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn tenants(&self) -> &TenantDirectory {
        &self.inner.tenants
    }

    /// Resolved configuration for an organization.
    pub fn tenant(&self, organization_id: &str) -> TenantConfig {
        self.inner.tenants.get(organization_id)
    }

    /// Merge overrides into a tenant's configuration.
    ///
    /// Instances already cached for the tenant are kept until
    /// [`ServiceContext::clear_caches`].
    pub fn update_tenant(&self, organization_id: &str, overrides: TenantOverrides) {
        self.inner.tenants.update(organization_id, overrides);
    }

    /// The organization's LLM provider.
    pub fn llm(&self, organization_id: &str) -> AppResult<Arc<dyn LlmProvider>> {
        self.inner.llms.resolve(&self.tenant(organization_id))
    }

    /// The organization's vector database.
    pub fn vector_db(&self, organization_id: &str) -> AppResult<Arc<dyn VectorDatabase>> {
        self.inner.vector_dbs.resolve(&self.tenant(organization_id))
    }

    pub fn llm_registry(&self) -> &LlmRegistry {
        &self.inner.llms
    }

    pub fn vector_db_registry(&self) -> &VectorDbRegistry {
        &self.inner.vector_dbs
    }

    pub fn prompts(&self) -> &PromptRenderer {
        &self.inner.prompts
    }

    pub fn agent_cache(&self) -> &AgentCache {
        &self.inner.agents
    }

    /// Drop every cached provider, backend and agent.
    pub fn clear_caches(&self) {
        tracing::info!("Clearing provider and agent caches");
        self.inner.llms.clear_cache();
        self.inner.vector_dbs.clear_cache();
        self.inner.agents.clear();
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("workspace", &self.inner.config.workspace)
            .field("llm_providers", &self.inner.llms.names())
            .field("vector_dbs", &self.inner.vector_dbs.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_prompt::PromptTemplates;

    fn services() -> ServiceContext {
        let mut config = AppConfig::default();
        config.defaults.llm_provider = "mock".to_string();
        ServiceContext::with_parts(
            config,
            LlmRegistry::with_builtin_providers(),
            VectorDbRegistry::with_builtin_providers(),
            PromptRenderer::new(&PromptTemplates::default()).unwrap(),
        )
    }

    #[test]
    fn test_resolution_is_cached_per_tenant() {
        let services = services();
        let a = services.llm("org-a").unwrap();
        let again = services.clone().llm("org-a").unwrap();

        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(a.provider_name(), "mock");
        assert_eq!(services.llm_registry().cached_keys(), vec!["org-a:mock"]);
    }

    #[test]
    fn test_tenant_override_selects_backend() {
        let services = services();
        services.update_tenant(
            "org-b",
            TenantOverrides {
                vector_db: Some("local".to_string()),
                shared_vector_db: Some(false),
                ..Default::default()
            },
        );

        assert_eq!(services.vector_db("org-a").unwrap().provider_name(), "memory");
        assert_eq!(services.vector_db("org-b").unwrap().provider_name(), "local");
        assert_eq!(services.tenants().tenants(), vec!["org-b"]);
    }

    #[test]
    fn test_clear_caches() {
        let services = services();
        services.llm("org-a").unwrap();
        services.vector_db("org-a").unwrap();

        services.clear_caches();
        assert!(services.llm_registry().cached_keys().is_empty());
        assert!(services.vector_db_registry().cached_keys().is_empty());
    }
}
