//! Cache of loaded agent definitions.

use super::types::AgentDefinition;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Agent definitions keyed by `"{organization_id}:{agent_id}"`.
///
/// Entries carry no requesting user; the caller is supplied on every chat.
#[derive(Debug, Default)]
pub struct AgentCache {
    entries: RwLock<HashMap<String, Arc<AgentDefinition>>>,
}

impl AgentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(organization_id: &str, agent_id: &str) -> String {
        format!("{}:{}", organization_id, agent_id)
    }

    pub fn get(&self, organization_id: &str, agent_id: &str) -> Option<Arc<AgentDefinition>> {
        self.entries
            .read()
            .get(&Self::key(organization_id, agent_id))
            .cloned()
    }

    pub fn insert(&self, definition: AgentDefinition) -> Arc<AgentDefinition> {
        let key = Self::key(&definition.organization_id, &definition.agent_id);
        let definition = Arc::new(definition);
        self.entries.write().insert(key, Arc::clone(&definition));
        definition
    }

    /// Drop one agent; true when it was cached.
    pub fn invalidate(&self, organization_id: &str, agent_id: &str) -> bool {
        let removed = self
            .entries
            .write()
            .remove(&Self::key(organization_id, agent_id))
            .is_some();
        if removed {
            tracing::debug!(organization_id, agent_id, "Evicted agent from cache");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::NewAgent;

    fn definition(org: &str, id: &str) -> AgentDefinition {
        let mut def = AgentDefinition::new(org, "alice", NewAgent::new("Helper", "Be useful"));
        def.agent_id = id.to_string();
        def
    }

    #[test]
    fn test_cache_keyed_by_org_and_agent() {
        let cache = AgentCache::new();
        cache.insert(definition("org1", "a1"));
        cache.insert(definition("org2", "a1"));

        assert_eq!(cache.keys(), vec!["org1:a1", "org2:a1"]);
        assert_eq!(cache.get("org1", "a1").unwrap().organization_id, "org1");
        assert!(cache.get("org3", "a1").is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache = AgentCache::new();
        cache.insert(definition("org1", "a1"));

        assert!(cache.invalidate("org1", "a1"));
        assert!(!cache.invalidate("org1", "a1"));
        assert!(cache.keys().is_empty());
    }
}
