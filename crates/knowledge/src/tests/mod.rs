//! Cross-module scenarios over the mock LLM and the in-memory backend.

mod scenarios;

use crate::registry::VectorDbRegistry;
use crate::service::ServiceContext;
use crate::types::Metadata;
use pulse_core::{AppConfig, Principal, RequestContext};
use pulse_llm::LlmRegistry;
use pulse_prompt::{PromptRenderer, PromptTemplates};

/// Services using the `mock` LLM and a shared in-memory collection.
pub(crate) fn mock_services() -> ServiceContext {
    services_with(mock_config())
}

pub(crate) fn mock_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.defaults.llm_provider = "mock".to_string();
    config.defaults.vector_db = "memory".to_string();
    config.vector_store.metadata_dimension = 256;
    config
}

pub(crate) fn services_with(config: AppConfig) -> ServiceContext {
    ServiceContext::with_parts(
        config,
        LlmRegistry::with_builtin_providers(),
        VectorDbRegistry::with_builtin_providers(),
        PromptRenderer::new(&PromptTemplates::default()).unwrap(),
    )
}

pub(crate) fn context(organization_id: &str, user_id: &str) -> RequestContext {
    RequestContext::new(Principal::new(organization_id, user_id, None).unwrap())
}

pub(crate) fn meta(value: serde_json::Value) -> Metadata {
    value.as_object().cloned().unwrap()
}
