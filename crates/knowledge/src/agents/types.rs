//! Agent records and request types.

use crate::types::Metadata;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value of the `type` field on every agent record.
pub const AGENT_TYPE: &str = "rag_agent";

/// `document_type` of the storage row holding an agent record.
pub const AGENT_DOCUMENT_TYPE: &str = "agent_metadata";

/// Keys owned by the agent record; custom metadata never sets these.
pub const RESERVED_KEYS: [&str; 9] = [
    "agent_id",
    "name",
    "description",
    "instructions",
    "created_at",
    "updated_at",
    "created_by",
    "organization_id",
    "type",
];

const DOCUMENT_FILTER: &str = "document_filter";

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key) || key == DOCUMENT_FILTER
}

/// Agent record, stored as JSON text of its metadata row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: String,
    pub created_by: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub organization_id: String,
    #[serde(rename = "type", default = "default_agent_type")]
    pub agent_type: String,
    /// Extra metadata conditions on the documents the agent draws on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_filter: Option<Metadata>,
    /// Custom metadata
    #[serde(flatten)]
    pub metadata: Metadata,
}

fn default_agent_type() -> String {
    AGENT_TYPE.to_string()
}

impl AgentDefinition {
    /// Fresh record with a new id, owned by `user_id`.
    pub fn new(organization_id: &str, user_id: &str, request: NewAgent) -> Self {
        let mut definition = Self {
            agent_id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            description: request.description,
            instructions: request.instructions,
            created_by: user_id.to_string(),
            created_at: Utc::now().to_rfc3339(),
            updated_at: None,
            organization_id: organization_id.to_string(),
            agent_type: default_agent_type(),
            document_filter: request.document_filter,
            metadata: Metadata::new(),
        };
        definition.merge_metadata(request.metadata);
        definition
    }

    /// Merge custom metadata, skipping reserved keys. Returns true if anything changed.
    pub fn merge_metadata(&mut self, metadata: Metadata) -> bool {
        let mut changed = false;
        for (key, value) in metadata {
            if is_reserved(&key) {
                tracing::debug!(key = %key, "Ignoring reserved agent metadata key");
                continue;
            }
            self.metadata.insert(key, value);
            changed = true;
        }
        changed
    }

    /// Apply the record fields of an update. Returns true if anything changed.
    ///
    /// `document_ids` is left to the caller.
    pub fn apply_update(&mut self, update: &AgentUpdate) -> bool {
        let mut changed = false;
        if let Some(ref name) = update.name {
            self.name = name.clone();
            changed = true;
        }
        if let Some(ref instructions) = update.instructions {
            self.instructions = instructions.clone();
            changed = true;
        }
        if let Some(ref description) = update.description {
            self.description = Some(description.clone());
            changed = true;
        }
        if let Some(ref filter) = update.document_filter {
            self.document_filter = Some(filter.clone());
            changed = true;
        }
        if let Some(ref metadata) = update.metadata {
            changed |= self.merge_metadata(metadata.clone());
        }
        if changed {
            self.updated_at = Some(Utc::now().to_rfc3339());
        }
        changed
    }

    /// Metadata shown to callers: custom keys plus the document filter.
    pub fn public_metadata(&self) -> Metadata {
        let mut metadata = self.metadata.clone();
        if let Some(ref filter) = self.document_filter {
            metadata.insert(DOCUMENT_FILTER.to_string(), Value::Object(filter.clone()));
        }
        metadata
    }
}

/// External view of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub instructions: String,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub created_by: String,
    pub metadata: Metadata,
    pub document_count: usize,
}

impl AgentView {
    pub fn new(definition: &AgentDefinition, document_count: usize) -> Self {
        Self {
            id: definition.agent_id.clone(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            instructions: definition.instructions.clone(),
            created_at: definition.created_at.clone(),
            updated_at: definition.updated_at.clone(),
            created_by: definition.created_by.clone(),
            metadata: definition.public_metadata(),
            document_count,
        }
    }
}

/// Request to create an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub instructions: String,
    /// Documents to associate on creation
    #[serde(default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub document_filter: Option<Metadata>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewAgent {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_documents(mut self, document_ids: Vec<String>) -> Self {
        self.document_ids = document_ids;
        self
    }

    pub fn with_document_filter(mut self, filter: Metadata) -> Self {
        self.document_filter = Some(filter);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Partial update of an agent. Unset fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    /// Replaces every association when set
    pub document_ids: Option<Vec<String>>,
    pub document_filter: Option<Metadata>,
    pub metadata: Option<Metadata>,
}
