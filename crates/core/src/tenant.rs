//! Per-tenant configuration resolution.
//!
//! Every request resolves its organization to a [`TenantConfig`]: the
//! process-wide defaults with that organization's overrides applied.
//! Overrides can be changed at runtime through [`TenantDirectory::update`];
//! cached provider instances are not refreshed automatically.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::{AppConfig, OllamaSettings, OpenAiSettings, TenantOverrides, VectorStoreSettings};

/// Fully resolved configuration for one organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantConfig {
    pub organization_id: String,
    pub llm_provider: String,
    pub vector_db: String,
    pub shared_vector_db: bool,
    pub openai: OpenAiSettings,
    pub ollama: OllamaSettings,
    pub vector_store: VectorStoreSettings,
}

impl TenantConfig {
    /// Default configuration applied to `organization_id` with no overrides.
    pub fn defaults_for(config: &AppConfig, organization_id: &str) -> Self {
        let mut vector_store = config.vector_store.clone();
        vector_store.data_dir = config.vector_data_dir();

        Self {
            organization_id: organization_id.to_string(),
            llm_provider: config.defaults.llm_provider.clone(),
            vector_db: config.defaults.vector_db.clone(),
            shared_vector_db: config.defaults.shared_vector_db,
            openai: config.openai.clone(),
            ollama: config.ollama.clone(),
            vector_store,
        }
    }

    fn apply(&mut self, overrides: &TenantOverrides) {
        if let Some(ref provider) = overrides.llm_provider {
            self.llm_provider = provider.clone();
        }
        if let Some(ref vector_db) = overrides.vector_db {
            self.vector_db = vector_db.clone();
        }
        if let Some(shared) = overrides.shared_vector_db {
            self.shared_vector_db = shared;
        }
        if let Some(ref model) = overrides.openai_model {
            self.openai.model = model.clone();
        }
        if let Some(ref model) = overrides.openai_embedding_model {
            self.openai.embedding_model = model.clone();
        }
        if let Some(ref key) = overrides.openai_api_key {
            self.openai.api_key = Some(key.clone());
        }
        if let Some(ref endpoint) = overrides.openai_endpoint {
            self.openai.endpoint = endpoint.clone();
        }
        if let Some(ref model) = overrides.ollama_model {
            self.ollama.model = model.clone();
        }
        if let Some(ref model) = overrides.ollama_embedding_model {
            self.ollama.embedding_model = Some(model.clone());
        }
        if let Some(ref endpoint) = overrides.ollama_endpoint {
            self.ollama.endpoint = endpoint.clone();
        }
        if let Some(ref name) = overrides.collection_name {
            self.vector_store.collection_name = name.clone();
        }
    }
}

/// Lookup table from organization id to its configuration.
#[derive(Debug)]
pub struct TenantDirectory {
    base: TenantConfig,
    overrides: RwLock<HashMap<String, TenantOverrides>>,
}

impl TenantDirectory {
    /// Build the directory from the loaded application config.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base: TenantConfig::defaults_for(config, ""),
            overrides: RwLock::new(config.tenants.clone()),
        }
    }

    /// Resolve the configuration for an organization.
    ///
    /// Organizations without overrides receive the defaults unchanged.
    pub fn get(&self, organization_id: &str) -> TenantConfig {
        let mut resolved = self.base.clone();
        resolved.organization_id = organization_id.to_string();

        if let Some(overrides) = self.overrides.read().get(organization_id) {
            resolved.apply(overrides);
        }

        resolved
    }

    /// Merge new overrides into an organization's configuration.
    pub fn update(&self, organization_id: &str, overrides: TenantOverrides) {
        tracing::info!(organization_id, "Updating tenant configuration");
        self.overrides
            .write()
            .entry(organization_id.to_string())
            .or_default()
            .merge(overrides);
    }

    /// Current overrides for an organization, if any.
    pub fn overrides(&self, organization_id: &str) -> Option<TenantOverrides> {
        self.overrides.read().get(organization_id).cloned()
    }

    /// Organizations with explicit overrides.
    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.overrides.read().keys().cloned().collect();
        tenants.sort();
        tenants
    }
}
