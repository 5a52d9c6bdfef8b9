//! In-memory vector database.
//!
//! Collections live only as long as the instance. Search scores are the
//! cosine similarity to the query, in `[-1, 1]`.

use super::{Collection, Tenancy, TenancyMode, VectorDatabase};
use crate::filter::Filter;
use crate::types::{Metadata, ScoredDocument, StoredDocument};
use parking_lot::RwLock;
use pulse_core::AppResult;
use std::collections::HashMap;

/// Process-local vector database.
pub struct MemoryVectorDb {
    tenancy: Tenancy,
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorDb {
    pub fn new(mode: TenancyMode, base_collection: impl Into<String>) -> Self {
        Self {
            tenancy: Tenancy::new(mode, base_collection),
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read<R>(&self, organization_id: &str, f: impl FnOnce(&Collection) -> R) -> Option<R> {
        let name = self.tenancy.collection_name(organization_id);
        self.collections.read().get(&name).map(f)
    }

    fn write<R>(&self, organization_id: &str, f: impl FnOnce(&mut Collection) -> R) -> R {
        let name = self.tenancy.collection_name(organization_id);
        let mut collections = self.collections.write();
        let collection = collections
            .entry(name.clone())
            .or_insert_with(|| Collection::new(name, None));
        f(collection)
    }
}

#[async_trait::async_trait]
impl VectorDatabase for MemoryVectorDb {
    fn provider_name(&self) -> &str {
        "memory"
    }

    fn tenancy_mode(&self) -> TenancyMode {
        self.tenancy.mode()
    }

    fn collection_name(&self, organization_id: &str) -> String {
        self.tenancy.collection_name(organization_id)
    }

    async fn add(
        &self,
        organization_id: &str,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: Vec<Metadata>,
    ) -> AppResult<Vec<String>> {
        let ids = self.write(organization_id, |collection| {
            collection.insert_batch(&self.tenancy, organization_id, texts, embeddings, metadatas)
        })?;

        tracing::debug!(organization_id, count = ids.len(), "Added documents to memory store");
        Ok(ids)
    }

    async fn search(
        &self,
        organization_id: &str,
        embedding: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> AppResult<Vec<ScoredDocument>> {
        let scoped = self.tenancy.scope_filter(organization_id, filter);

        let hits = self.read(organization_id, |collection| {
            collection
                .ranked(embedding, scoped.as_ref(), limit)
                .into_iter()
                .map(|(doc, similarity)| ScoredDocument {
                    id: doc.id.clone(),
                    text: doc.text.clone(),
                    metadata: doc.metadata.clone(),
                    score: similarity,
                })
                .collect()
        });

        Ok(hits.unwrap_or_default())
    }

    async fn get(&self, organization_id: &str, id: &str) -> AppResult<Option<StoredDocument>> {
        Ok(self
            .read(organization_id, |collection| {
                collection.get_owned(&self.tenancy, organization_id, id)
            })
            .flatten())
    }

    async fn update(
        &self,
        organization_id: &str,
        id: &str,
        text: Option<String>,
        embedding: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> AppResult<bool> {
        let name = self.tenancy.collection_name(organization_id);
        let mut collections = self.collections.write();
        Ok(collections.get_mut(&name).is_some_and(|collection| {
            collection.update_owned(&self.tenancy, organization_id, id, text, embedding, metadata)
        }))
    }

    async fn delete(&self, organization_id: &str, ids: &[String]) -> AppResult<bool> {
        let name = self.tenancy.collection_name(organization_id);
        let mut collections = self.collections.write();
        Ok(collections
            .get_mut(&name)
            .is_some_and(|collection| collection.delete_owned(&self.tenancy, organization_id, ids)))
    }

    async fn list(
        &self,
        organization_id: &str,
        filter: Option<&Filter>,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<StoredDocument>> {
        let scoped = self.tenancy.scope_filter(organization_id, filter);
        Ok(self
            .read(organization_id, |collection| {
                collection.page(scoped.as_ref(), limit, offset)
            })
            .unwrap_or_default())
    }

    async fn count(&self, organization_id: &str, filter: Option<&Filter>) -> AppResult<usize> {
        let scoped = self.tenancy.scope_filter(organization_id, filter);
        Ok(self
            .read(organization_id, |collection| collection.count(scoped.as_ref()))
            .unwrap_or(0))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> AppResult<()> {
        self.collections
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Collection::new(name, Some(dimension)));
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> AppResult<bool> {
        Ok(self.collections.write().remove(name).is_some())
    }

    async fn list_collections(&self) -> AppResult<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
