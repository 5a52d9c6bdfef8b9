//! File-backed vector database.
//!
//! Each collection is one JSON file under the data directory. Files are
//! loaded on first use and rewritten after every mutation, so documents
//! survive between CLI runs.

use super::{Collection, Tenancy, TenancyMode, VectorDatabase};
use crate::filter::Filter;
use crate::types::{Metadata, ScoredDocument, StoredDocument};
use pulse_core::{AppError, AppResult};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Persistent vector database storing collections as JSON files.
pub struct LocalVectorDb {
    tenancy: Tenancy,
    data_dir: PathBuf,
    collections: Mutex<HashMap<String, Collection>>,
}

/// File name for a collection.
///
/// `[A-Za-z0-9._-]` is kept and every other byte is written as `%XX`, so
/// distinct collection names always get distinct files.
fn file_name(collection: &str) -> String {
    let mut name = String::with_capacity(collection.len() + 5);
    for byte in collection.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            name.push(char::from(byte));
        } else {
            let _ = write!(name, "%{:02X}", byte);
        }
    }
    name.push_str(".json");
    name
}

impl LocalVectorDb {
    pub fn new(mode: TenancyMode, base_collection: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            tenancy: Tenancy::new(mode, base_collection),
            data_dir: data_dir.into(),
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, collection: &str) -> PathBuf {
        self.data_dir.join(file_name(collection))
    }

    async fn read_file(path: &Path) -> AppResult<Option<Collection>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let collection: Collection = serde_json::from_str(&contents).map_err(|e| {
                    AppError::Serialization(format!("Corrupt collection file {:?}: {}", path, e))
                })?;
                Ok(Some(collection))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ensure `name` is loaded into the map, reading its file if present.
    async fn load<'a>(
        &self,
        collections: &'a mut HashMap<String, Collection>,
        name: &str,
        create: bool,
    ) -> AppResult<Option<&'a mut Collection>> {
        if !collections.contains_key(name) {
            let loaded = match Self::read_file(&self.path_for(name)).await? {
                Some(collection) => {
                    tracing::debug!(collection = name, documents = collection.documents.len(), "Loaded collection");
                    collection
                }
                None if create => Collection::new(name, None),
                None => return Ok(None),
            };
            collections.insert(name.to_string(), loaded);
        }
        Ok(collections.get_mut(name))
    }

    /// Write a collection to disk via a temporary file and rename.
    async fn persist(&self, collection: &Collection) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let path = self.path_for(&collection.name);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_vec(collection)?;
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorDatabase for LocalVectorDb {
    fn provider_name(&self) -> &str {
        "local"
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
        let name = self.tenancy.collection_name(organization_id);
        let mut collections = self.collections.lock().await;
        let Some(collection) = self.load(&mut collections, &name, true).await? else {
            return Err(AppError::NotFound(format!("Collection '{}' unavailable", name)));
        };

        let ids = collection.insert_batch(&self.tenancy, organization_id, texts, embeddings, metadatas)?;
        self.persist(collection).await?;

        tracing::debug!(organization_id, collection = %name, count = ids.len(), "Added documents to local store");
        Ok(ids)
    }

    async fn search(
        &self,
        organization_id: &str,
        embedding: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> AppResult<Vec<ScoredDocument>> {
        let name = self.tenancy.collection_name(organization_id);
        let scoped = self.tenancy.scope_filter(organization_id, filter);
        let mut collections = self.collections.lock().await;
        let Some(collection) = self.load(&mut collections, &name, false).await? else {
            return Ok(Vec::new());
        };

        Ok(collection
            .ranked(embedding, scoped.as_ref(), limit)
            .into_iter()
            .map(|(doc, similarity)| ScoredDocument {
                id: doc.id.clone(),
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                score: similarity,
            })
            .collect())
    }

    async fn get(&self, organization_id: &str, id: &str) -> AppResult<Option<StoredDocument>> {
        let name = self.tenancy.collection_name(organization_id);
        let mut collections = self.collections.lock().await;
        Ok(self
            .load(&mut collections, &name, false)
            .await?
            .and_then(|collection| collection.get_owned(&self.tenancy, organization_id, id)))
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
        let mut collections = self.collections.lock().await;
        let Some(collection) = self.load(&mut collections, &name, false).await? else {
            return Ok(false);
        };

        let updated = collection.update_owned(&self.tenancy, organization_id, id, text, embedding, metadata);
        if updated {
            self.persist(collection).await?;
        }
        Ok(updated)
    }

    async fn delete(&self, organization_id: &str, ids: &[String]) -> AppResult<bool> {
        let name = self.tenancy.collection_name(organization_id);
        let mut collections = self.collections.lock().await;
        let Some(collection) = self.load(&mut collections, &name, false).await? else {
            return Ok(false);
        };

        let removed = collection.delete_owned(&self.tenancy, organization_id, ids);
        if removed {
            self.persist(collection).await?;
        }
        Ok(removed)
    }

    async fn list(
        &self,
        organization_id: &str,
        filter: Option<&Filter>,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<StoredDocument>> {
        let name = self.tenancy.collection_name(organization_id);
        let scoped = self.tenancy.scope_filter(organization_id, filter);
        let mut collections = self.collections.lock().await;
        Ok(self
            .load(&mut collections, &name, false)
            .await?
            .map(|collection| collection.page(scoped.as_ref(), limit, offset))
            .unwrap_or_default())
    }

    async fn count(&self, organization_id: &str, filter: Option<&Filter>) -> AppResult<usize> {
        let name = self.tenancy.collection_name(organization_id);
        let scoped = self.tenancy.scope_filter(organization_id, filter);
        let mut collections = self.collections.lock().await;
        Ok(self
            .load(&mut collections, &name, false)
            .await?
            .map_or(0, |collection| collection.count(scoped.as_ref())))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> AppResult<()> {
        let mut collections = self.collections.lock().await;
        if self.load(&mut collections, name, false).await?.is_some() {
            return Ok(());
        }

        let collection = Collection::new(name, Some(dimension));
        self.persist(&collection).await?;
        collections.insert(name.to_string(), collection);
        tracing::info!(collection = name, dimension, "Created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> AppResult<bool> {
        let mut collections = self.collections.lock().await;
        let cached = collections.remove(name).is_some();

        let removed = match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        Ok(cached || removed)
    }

    async fn list_collections(&self) -> AppResult<Vec<String>> {
        let mut names: Vec<String> = self.collections.lock().await.keys().cloned().collect();

        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(entries) = entries.as_mut() {
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("json") {
                    continue;
                }
                if let Some(collection) = Self::read_file(&path).await? {
                    names.push(collection.name);
                }
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn meta(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_file_name_sanitized() {
        assert_eq!(file_name("kb_org-1"), "kb_org-1.json");
        assert_eq!(file_name("kb_../etc"), "kb_..%2Fetc.json");
        assert_eq!(file_name("kb_acme x"), "kb_acme%20x.json");
        assert_eq!(file_name("kb_100%"), "kb_100%25.json");
    }

    #[test]
    fn test_file_names_are_distinct() {
        let names = ["kb_acme_x", "kb_acme x", "kb_acme/x", "kb_acme%20x", "kb_acmé"];
        let mut files: Vec<String> = names.iter().map(|name| file_name(name)).collect();
        files.sort();
        files.dedup();
        assert_eq!(files.len(), names.len());
    }

    #[tokio::test]
    async fn test_per_tenant_orgs_with_similar_names_stay_apart() {
        let temp_dir = TempDir::new().unwrap();
        {
            let db = LocalVectorDb::new(TenancyMode::PerTenant, "kb", temp_dir.path());
            db.add("acme_x", &["underscore".to_string()], &[vec![1.0, 0.0]], vec![Metadata::new()])
                .await
                .unwrap();
            db.add("acme x", &["space".to_string()], &[vec![1.0, 0.0]], vec![Metadata::new()])
                .await
                .unwrap();
        }

        let reopened = LocalVectorDb::new(TenancyMode::PerTenant, "kb", temp_dir.path());
        let underscore = reopened.list("acme_x", None, 10, 0).await.unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].text, "underscore");

        let space = reopened.search("acme x", &[1.0, 0.0], None, 10).await.unwrap();
        assert_eq!(space.len(), 1);
        assert_eq!(space[0].text, "space");
    }

    #[tokio::test]
    async fn test_documents_persist_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let id = {
            let db = LocalVectorDb::new(TenancyMode::SharedCollection, "kb", temp_dir.path());
            db.add("org1", &["persisted".to_string()], &[vec![1.0, 0.0]], vec![meta(json!({"k": "v"}))])
                .await
                .unwrap()
                .remove(0)
        };

        let reopened = LocalVectorDb::new(TenancyMode::SharedCollection, "kb", temp_dir.path());
        let doc = reopened.get("org1", &id).await.unwrap().unwrap();
        assert_eq!(doc.text, "persisted");
        assert_eq!(doc.metadata["organization_id"], "org1");
        assert!(reopened.get("org2", &id).await.unwrap().is_none());

        let hits = reopened.search("org1", &[1.0, 0.0], None, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_mutations_write_through() {
        let temp_dir = TempDir::new().unwrap();
        let db = LocalVectorDb::new(TenancyMode::PerTenant, "kb", temp_dir.path());
        let ids = db
            .add(
                "org1",
                &["a".to_string(), "b".to_string()],
                &[vec![1.0], vec![1.0]],
                vec![Metadata::new(), Metadata::new()],
            )
            .await
            .unwrap();

        assert!(db.update("org1", &ids[0], Some("a2".to_string()), None, None).await.unwrap());
        assert!(db.delete("org1", &ids[1..]).await.unwrap());

        let reopened = LocalVectorDb::new(TenancyMode::PerTenant, "kb", temp_dir.path());
        let docs = reopened.list("org1", None, 10, 0).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "a2");
        assert!(temp_dir.path().join("kb_org1.json").exists());
    }

    #[tokio::test]
    async fn test_missing_collection_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let db = LocalVectorDb::new(TenancyMode::PerTenant, "kb", temp_dir.path().join("absent"));

        assert!(db.search("org1", &[1.0], None, 5).await.unwrap().is_empty());
        assert_eq!(db.count("org1", None).await.unwrap(), 0);
        assert!(db.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collection_management() {
        let temp_dir = TempDir::new().unwrap();
        let db = LocalVectorDb::new(TenancyMode::SharedCollection, "kb", temp_dir.path());

        db.create_collection("kb", 4).await.unwrap();
        db.create_collection("archive", 4).await.unwrap();
        assert_eq!(db.list_collections().await.unwrap(), vec!["archive", "kb"]);

        assert!(db.delete_collection("archive").await.unwrap());
        assert!(!temp_dir.path().join("archive.json").exists());
        assert_eq!(db.list_collections().await.unwrap(), vec!["kb"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("kb.json"), "{broken").unwrap();
        let db = LocalVectorDb::new(TenancyMode::SharedCollection, "kb", temp_dir.path());

        assert!(matches!(db.count("org1", None).await, Err(AppError::Serialization(_))));
    }
}
