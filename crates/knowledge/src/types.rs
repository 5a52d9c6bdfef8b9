//! Core types for the knowledge store.

use pulse_prompt::ContextDocument;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form document metadata.
pub type Metadata = Map<String, Value>;

/// Metadata key holding the owning organization.
pub const ORGANIZATION_ID: &str = "organization_id";

/// Metadata key holding the owning user.
pub const USER_ID: &str = "user_id";

/// Metadata key holding the document visibility.
pub const VISIBILITY: &str = "visibility";

/// Metadata key holding the creation timestamp (RFC 3339).
pub const TIMESTAMP: &str = "timestamp";

/// Metadata key listing the agents a document is attached to.
pub const ASSOCIATED_AGENTS: &str = "associated_agents";

/// Metadata key marking internal rows such as agent records.
pub const DOCUMENT_TYPE: &str = "document_type";

/// A document as held by a vector database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl StoredDocument {
    /// String value of a metadata key, if present.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// A search hit. Higher `score` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

impl ContextDocument for ScoredDocument {
    fn text(&self) -> &str {
        &self.text
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Text plus caller metadata, before sanitizing and embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}
