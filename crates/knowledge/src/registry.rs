//! Vector database resolution.
//!
//! In shared mode every tenant resolves to one instance cached under
//! `"shared:{backend}"`; otherwise each organization gets its own instance
//! under `"{org}:{backend}"`.

use crate::vectordb::{LocalVectorDb, MemoryVectorDb, TenancyMode, VectorDatabase};
use pulse_core::{AppResult, ProviderRegistry, TenantConfig, SHARED_SCOPE};
use std::sync::Arc;

/// Backend used when a tenant names one that is not registered.
pub const DEFAULT_VECTOR_DB: &str = "memory";

/// Registry of vector database factories and their instances.
pub struct VectorDbRegistry {
    inner: ProviderRegistry<dyn VectorDatabase, TenantConfig>,
}

impl VectorDbRegistry {
    pub fn empty() -> Self {
        Self {
            inner: ProviderRegistry::new("vector_db", DEFAULT_VECTOR_DB),
        }
    }

    /// Registry with `memory` and `local` registered.
    pub fn with_builtin_providers() -> Self {
        let registry = Self::empty();

        registry.register("memory", |tenant: &TenantConfig| {
            let db = MemoryVectorDb::new(
                TenancyMode::from_shared(tenant.shared_vector_db),
                tenant.vector_store.collection_name.as_str(),
            );
            Ok(Arc::new(db) as Arc<dyn VectorDatabase>)
        });
        registry.register("local", |tenant: &TenantConfig| {
            let db = LocalVectorDb::new(
                TenancyMode::from_shared(tenant.shared_vector_db),
                tenant.vector_store.collection_name.as_str(),
                tenant.vector_store.data_dir.clone(),
            );
            Ok(Arc::new(db) as Arc<dyn VectorDatabase>)
        });

        registry
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TenantConfig) -> AppResult<Arc<dyn VectorDatabase>> + Send + Sync + 'static,
    {
        self.inner.register(name, factory);
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    /// Cache scope for a tenant.
    pub fn scope(tenant: &TenantConfig) -> &str {
        if tenant.shared_vector_db {
            SHARED_SCOPE
        } else {
            &tenant.organization_id
        }
    }

    pub fn resolve(&self, tenant: &TenantConfig) -> AppResult<Arc<dyn VectorDatabase>> {
        self.inner.resolve(Self::scope(tenant), &tenant.vector_db, tenant)
    }

    pub fn clear_cache(&self) {
        self.inner.clear_cache();
    }

    pub fn cached_keys(&self) -> Vec<String> {
        self.inner.cached_keys()
    }
}

impl Default for VectorDbRegistry {
    fn default() -> Self {
        Self::with_builtin_providers()
    }
}
