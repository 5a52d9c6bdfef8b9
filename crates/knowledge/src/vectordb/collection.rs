//! In-process document collection used by the built-in backends.

use super::{check_batch, Tenancy};
use crate::filter::Filter;
use crate::types::{Metadata, StoredDocument};
use pulse_core::AppResult;
use serde::{Deserialize, Serialize};

/// Cosine similarity in `[-1, 1]`.
///
/// Vectors of different length, or with zero norm, score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

fn is_match(doc: &StoredDocument, filter: Option<&Filter>) -> bool {
    filter.map_or(true, |f| f.matches(&doc.metadata))
}

/// Documents of one collection, in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub documents: Vec<StoredDocument>,
}

impl Collection {
    pub fn new(name: impl Into<String>, dimension: Option<usize>) -> Self {
        Self {
            name: name.into(),
            dimension,
            documents: Vec::new(),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|doc| doc.id == id)
    }

    /// Append documents owned by `organization_id`, returning new ids.
    pub fn insert_batch(
        &mut self,
        tenancy: &Tenancy,
        organization_id: &str,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: Vec<Metadata>,
    ) -> AppResult<Vec<String>> {
        check_batch(texts, embeddings, &metadatas)?;

        if self.dimension.is_none() {
            self.dimension = embeddings.first().map(Vec::len);
        }

        let mut ids = Vec::with_capacity(texts.len());
        for ((text, embedding), mut metadata) in texts.iter().zip(embeddings).zip(metadatas) {
            tenancy.stamp(organization_id, &mut metadata);
            let id = uuid::Uuid::new_v4().to_string();
            self.documents.push(StoredDocument {
                id: id.clone(),
                text: text.clone(),
                embedding: Some(embedding.clone()),
                metadata,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    /// Document `id` when it belongs to `organization_id`.
    pub fn get_owned(&self, tenancy: &Tenancy, organization_id: &str, id: &str) -> Option<StoredDocument> {
        self.documents
            .iter()
            .find(|doc| doc.id == id)
            .filter(|doc| tenancy.owns(organization_id, doc))
            .cloned()
    }

    /// Apply an update to an owned document. Null metadata values remove keys.
    pub fn update_owned(
        &mut self,
        tenancy: &Tenancy,
        organization_id: &str,
        id: &str,
        text: Option<String>,
        embedding: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        if !tenancy.owns(organization_id, &self.documents[pos]) {
            return false;
        }

        let doc = &mut self.documents[pos];
        if let Some(text) = text {
            doc.text = text;
        }
        if let Some(embedding) = embedding {
            doc.embedding = Some(embedding);
        }
        if let Some(metadata) = metadata {
            for (key, value) in metadata {
                if value.is_null() {
                    doc.metadata.remove(&key);
                } else {
                    doc.metadata.insert(key, value);
                }
            }
            tenancy.stamp(organization_id, &mut doc.metadata);
        }
        true
    }

    /// Remove owned documents; true when any was removed.
    pub fn delete_owned(&mut self, tenancy: &Tenancy, organization_id: &str, ids: &[String]) -> bool {
        let before = self.documents.len();
        self.documents
            .retain(|doc| !(ids.contains(&doc.id) && tenancy.owns(organization_id, doc)));
        self.documents.len() < before
    }

    /// The first `offset + limit` matches, sliced to the requested page.
    pub fn page(&self, filter: Option<&Filter>, limit: usize, offset: usize) -> Vec<StoredDocument> {
        let fetched: Vec<&StoredDocument> = self
            .documents
            .iter()
            .filter(|doc| is_match(doc, filter))
            .take(offset.saturating_add(limit))
            .collect();
        fetched.into_iter().skip(offset).cloned().collect()
    }

    pub fn count(&self, filter: Option<&Filter>) -> usize {
        self.documents.iter().filter(|doc| is_match(doc, filter)).count()
    }

    /// Matches ranked by cosine similarity to `embedding`, best first.
    pub fn ranked(&self, embedding: &[f32], filter: Option<&Filter>, limit: usize) -> Vec<(&StoredDocument, f32)> {
        let mut hits: Vec<(&StoredDocument, f32)> = self
            .documents
            .iter()
            .filter(|doc| is_match(doc, filter))
            .map(|doc| {
                let similarity = doc
                    .embedding
                    .as_deref()
                    .map_or(0.0, |stored| cosine_similarity(embedding, stored));
                (doc, similarity)
            })
            .collect();

        // Stable sort keeps insertion order between equal scores
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(limit);
        hits
    }
}
