//! Vector database abstraction.
//!
//! A [`VectorDatabase`] stores texts with embeddings and metadata and answers
//! similarity searches. Every data call names the organization it runs for:
//! in [`TenancyMode::SharedCollection`] one collection holds every tenant and
//! rows are separated by their `organization_id`, in
//! [`TenancyMode::PerTenant`] each organization gets its own collection.

mod collection;
pub mod local;
pub mod memory;

pub use collection::{cosine_similarity, Collection};
pub use local::LocalVectorDb;
pub use memory::MemoryVectorDb;

use crate::filter::Filter;
use crate::types::{Metadata, ScoredDocument, StoredDocument, ORGANIZATION_ID};
use pulse_core::{AppError, AppResult};
use serde_json::Value;

/// How tenants are separated inside a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenancyMode {
    /// One collection; rows carry `organization_id`
    SharedCollection,
    /// One collection per organization, named `{base}_{organization_id}`
    PerTenant,
}

impl TenancyMode {
    pub fn from_shared(shared: bool) -> Self {
        if shared {
            Self::SharedCollection
        } else {
            Self::PerTenant
        }
    }
}

/// Tenant scoping rules shared by the built-in backends.
#[derive(Debug, Clone)]
pub struct Tenancy {
    mode: TenancyMode,
    base_collection: String,
}

impl Tenancy {
    pub fn new(mode: TenancyMode, base_collection: impl Into<String>) -> Self {
        Self {
            mode,
            base_collection: base_collection.into(),
        }
    }

    pub fn mode(&self) -> TenancyMode {
        self.mode
    }

    /// Collection holding `organization_id`'s documents.
    pub fn collection_name(&self, organization_id: &str) -> String {
        match self.mode {
            TenancyMode::SharedCollection => self.base_collection.clone(),
            TenancyMode::PerTenant => format!("{}_{}", self.base_collection, organization_id),
        }
    }

    /// Caller filter narrowed to the organization when rows are shared.
    pub fn scope_filter(&self, organization_id: &str, filter: Option<&Filter>) -> Option<Filter> {
        match self.mode {
            TenancyMode::SharedCollection => {
                let org = Filter::eq(ORGANIZATION_ID, organization_id);
                Some(match filter {
                    Some(filter) => org.and(filter.clone()),
                    None => org,
                })
            }
            TenancyMode::PerTenant => filter.cloned(),
        }
    }

    /// Record the owning organization on a row about to be written.
    pub fn stamp(&self, organization_id: &str, metadata: &mut Metadata) {
        if self.mode == TenancyMode::SharedCollection {
            metadata.insert(ORGANIZATION_ID.to_string(), Value::from(organization_id));
        }
    }

    /// Whether a stored row belongs to `organization_id`.
    ///
    /// Mismatches are logged; per-tenant collections own every row.
    pub fn owns(&self, organization_id: &str, document: &StoredDocument) -> bool {
        if self.mode == TenancyMode::PerTenant {
            return true;
        }

        let owner = document.metadata_str(ORGANIZATION_ID);
        if owner == Some(organization_id) {
            return true;
        }

        tracing::warn!(
            organization_id,
            document_id = %document.id,
            document_organization = ?owner,
            "Cross-organization access to document refused"
        );
        false
    }
}

/// Check the parallel inputs of an `add` call.
pub fn check_batch(texts: &[String], embeddings: &[Vec<f32>], metadatas: &[Metadata]) -> AppResult<()> {
    if texts.len() != embeddings.len() || texts.len() != metadatas.len() {
        return Err(AppError::Validation(format!(
            "Mismatched batch: {} texts, {} embeddings, {} metadata entries",
            texts.len(),
            embeddings.len(),
            metadatas.len()
        )));
    }
    Ok(())
}

/// Trait for vector database backends.
///
/// Implementations must:
/// - Keep one organization's documents invisible to every other organization
/// - Return search hits ordered by descending score
/// - Treat ids owned by another organization as absent
#[async_trait::async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Backend name (e.g., "memory", "local").
    fn provider_name(&self) -> &str;

    fn tenancy_mode(&self) -> TenancyMode;

    /// Collection that holds `organization_id`'s documents.
    fn collection_name(&self, organization_id: &str) -> String;

    /// Store documents and return their generated ids, in input order.
    async fn add(
        &self,
        organization_id: &str,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: Vec<Metadata>,
    ) -> AppResult<Vec<String>>;

    /// Top `limit` documents most similar to `embedding`.
    async fn search(
        &self,
        organization_id: &str,
        embedding: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> AppResult<Vec<ScoredDocument>>;

    async fn get(&self, organization_id: &str, id: &str) -> AppResult<Option<StoredDocument>>;

    /// Replace text or embedding and merge metadata. A `null` metadata
    /// value removes that key. Returns false when the id is absent.
    async fn update(
        &self,
        organization_id: &str,
        id: &str,
        text: Option<String>,
        embedding: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> AppResult<bool>;

    /// Delete documents; true when at least one was removed.
    async fn delete(&self, organization_id: &str, ids: &[String]) -> AppResult<bool>;

    /// Matching documents in insertion order, paginated.
    async fn list(
        &self,
        organization_id: &str,
        filter: Option<&Filter>,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<StoredDocument>>;

    async fn count(&self, organization_id: &str, filter: Option<&Filter>) -> AppResult<usize>;

    async fn create_collection(&self, name: &str, dimension: usize) -> AppResult<()>;

    /// Drop a collection; false when it did not exist.
    async fn delete_collection(&self, name: &str) -> AppResult<bool>;

    async fn list_collections(&self) -> AppResult<Vec<String>>;
}
