//! Generic provider registry with a tenant-scoped instance cache.
//!
//! A registry maps provider names to factories and caches the instances
//! they build under `"{scope}:{name}"`. The scope is an organization id for
//! tenant-bound resources or [`SHARED_SCOPE`] for resources shared by all
//! tenants. Cached instances live until [`ProviderRegistry::clear_cache`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, AppResult};

/// Scope used for instances shared across all organizations.
pub const SHARED_SCOPE: &str = "shared";

/// Builds a provider instance from a construction context.
pub type Factory<T, C> = Arc<dyn Fn(&C) -> AppResult<Arc<T>> + Send + Sync>;

/// Named factories plus an instance cache.
pub struct ProviderRegistry<T: ?Sized, C> {
    kind: &'static str,
    default_name: String,
    factories: RwLock<HashMap<String, Factory<T, C>>>,
    instances: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized + Send + Sync, C> ProviderRegistry<T, C> {
    /// Create an empty registry.
    ///
    /// `kind` names the registry in logs (e.g. "llm"), `default_name` is the
    /// fallback used when a requested provider is not registered.
    pub fn new(kind: &'static str, default_name: impl Into<String>) -> Self {
        Self {
            kind,
            default_name: default_name.into(),
            factories: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) a named factory.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&C) -> AppResult<Arc<T>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(registry = self.kind, provider = %name, "Registering provider");
        self.factories.write().insert(name, Arc::new(factory));
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Name that `requested` resolves to after the default fallback.
    pub fn effective_name(&self, requested: &str) -> AppResult<String> {
        if self.is_registered(requested) {
            return Ok(requested.to_string());
        }

        if !self.is_registered(&self.default_name) {
            return Err(AppError::Config(format!(
                "No {} provider registered for '{}' and default '{}' is not registered either",
                self.kind, requested, self.default_name
            )));
        }

        tracing::warn!(
            registry = self.kind,
            requested,
            fallback = %self.default_name,
            "Provider not registered, falling back to default"
        );
        Ok(self.default_name.clone())
    }

    /// Build or fetch the cached instance for `(scope, requested)`.
    ///
    /// Unregistered names fall back to the default provider. Factory errors
    /// propagate unchanged and nothing is cached for them.
    pub fn resolve(&self, scope: &str, requested: &str, ctx: &C) -> AppResult<Arc<T>> {
        let name = self.effective_name(requested)?;
        let key = cache_key(scope, &name);

        if let Some(instance) = self.instances.read().get(&key) {
            return Ok(Arc::clone(instance));
        }

        let factory = self
            .factories
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| AppError::Config(format!("{} provider '{}' vanished", self.kind, name)))?;

        tracing::debug!(registry = self.kind, key = %key, "Creating provider instance");
        let created = factory(ctx)?;

        // A concurrent miss may have inserted first; keep whichever landed first.
        let mut instances = self.instances.write();
        let instance = instances.entry(key).or_insert(created);
        Ok(Arc::clone(instance))
    }

    /// Drop every cached instance.
    pub fn clear_cache(&self) {
        let mut instances = self.instances.write();
        tracing::info!(
            registry = self.kind,
            cleared = instances.len(),
            "Clearing provider cache"
        );
        instances.clear();
    }

    /// Keys currently cached, sorted.
    pub fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.instances.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Composite cache key for a scoped provider instance.
pub fn cache_key(scope: &str, name: &str) -> String {
    format!("{}:{}", scope, name)
}
