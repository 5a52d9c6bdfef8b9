//! Tenant-scoped document storage and retrieval.
//!
//! Every operation runs for the principal of a [`RequestContext`]: writes are
//! stamped with its organization and user, reads go through the access
//! filter built for it.

use crate::access::{access_filter, document_access_check, is_admin, sanitize_metadata};
use crate::agents::AGENT_DOCUMENT_TYPE;
use crate::chunker::chunk_text;
use crate::filter::Filter;
use crate::service::ServiceContext;
use crate::types::{
    Metadata, NewDocument, ScoredDocument, StoredDocument, DOCUMENT_TYPE, ORGANIZATION_ID,
    USER_ID,
};
use pulse_core::{AppError, AppResult, RequestContext};
use pulse_llm::LlmProvider;
use serde_json::Value;

/// Embed one text with the tenant's model.
pub(crate) async fn embed_one(llm: &dyn LlmProvider, organization_id: &str, text: &str) -> AppResult<Vec<f32>> {
    llm.get_embeddings(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            AppError::provider(
                llm.provider_name(),
                llm.model_name(),
                Some(organization_id),
                "Embedding response was empty",
            )
        })
}

/// Document store and retriever bound to the shared services.
#[derive(Debug, Clone)]
pub struct Retriever {
    services: ServiceContext,
}

impl Retriever {
    pub fn new(services: ServiceContext) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &ServiceContext {
        &self.services
    }

    /// Documents most similar to `query` that the caller may read.
    ///
    /// With `rerank`, twice `limit` candidates are fetched and cut back to
    /// `limit`, keeping the backend's order.
    pub async fn retrieve(
        &self,
        ctx: &RequestContext,
        query: &str,
        filter: Option<&Filter>,
        limit: usize,
        rerank: bool,
    ) -> AppResult<Vec<ScoredDocument>> {
        let security = access_filter(ctx.organization_id(), ctx.user_id(), None, filter);
        self.retrieve_with_filter(ctx, query, &security, limit, rerank)
            .await
    }

    /// Like [`Retriever::retrieve`], with a security filter the caller built.
    ///
    /// Agent records never come back as documents.
    pub async fn retrieve_with_filter(
        &self,
        ctx: &RequestContext,
        query: &str,
        filter: &Filter,
        limit: usize,
        rerank: bool,
    ) -> AppResult<Vec<ScoredDocument>> {
        let org = ctx.organization_id();
        let llm = self.services.llm(org)?;
        let db = self.services.vector_db(org)?;

        let embedding = embed_one(llm.as_ref(), org, query).await?;
        let candidates = if rerank { limit.saturating_mul(2) } else { limit };

        let filter = filter
            .clone()
            .and(Filter::ne(DOCUMENT_TYPE, AGENT_DOCUMENT_TYPE));

        let mut documents = db.search(org, &embedding, Some(&filter), candidates).await?;
        documents.truncate(limit);

        tracing::info!(
            organization_id = org,
            user_id = ctx.user_id(),
            request_id = %ctx.request_id,
            count = documents.len(),
            "Retrieved documents"
        );
        Ok(documents)
    }

    /// Store one document; returns its id.
    pub async fn store_document(
        &self,
        ctx: &RequestContext,
        text: &str,
        metadata: Metadata,
    ) -> AppResult<String> {
        let mut ids = self
            .store_documents(ctx, vec![NewDocument::new(text).with_metadata(metadata)])
            .await?;
        ids.pop()
            .ok_or_else(|| AppError::Validation("No document was stored".to_string()))
    }

    /// Store a batch of documents; ids come back in input order.
    pub async fn store_documents(
        &self,
        ctx: &RequestContext,
        documents: Vec<NewDocument>,
    ) -> AppResult<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let org = ctx.organization_id();
        let llm = self.services.llm(org)?;
        let db = self.services.vector_db(org)?;

        let (texts, metadatas): (Vec<String>, Vec<Metadata>) = documents
            .into_iter()
            .map(|doc| (doc.text, sanitize_metadata(doc.metadata, org, ctx.user_id())))
            .unzip();

        let embeddings = llm.get_embeddings(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(AppError::provider(
                llm.provider_name(),
                llm.model_name(),
                Some(org),
                format!("Expected {} embeddings, got {}", texts.len(), embeddings.len()),
            ));
        }

        let ids = db.add(org, &texts, &embeddings, metadatas).await?;
        tracing::info!(
            organization_id = org,
            user_id = ctx.user_id(),
            count = ids.len(),
            provider = db.provider_name(),
            "Stored documents"
        );
        Ok(ids)
    }

    /// Split `text` into chunks and store each one.
    ///
    /// Every chunk carries `chunk_index`, `chunk_count`, `is_chunk` and a
    /// `parent_id` shared by the whole document.
    pub async fn store_chunked(
        &self,
        ctx: &RequestContext,
        text: &str,
        metadata: Metadata,
        chunk_size: usize,
        overlap: usize,
    ) -> AppResult<Vec<String>> {
        let chunks = chunk_text(text, chunk_size, overlap);
        let parent_id = uuid::Uuid::new_v4().to_string();
        let count = chunks.len();

        let documents = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut chunk_metadata = metadata.clone();
                chunk_metadata.insert("chunk_index".to_string(), Value::from(index));
                chunk_metadata.insert("chunk_count".to_string(), Value::from(count));
                chunk_metadata.insert("is_chunk".to_string(), Value::Bool(true));
                chunk_metadata.insert("parent_id".to_string(), Value::from(parent_id.as_str()));
                NewDocument::new(chunk).with_metadata(chunk_metadata)
            })
            .collect();

        self.store_documents(ctx, documents).await
    }

    /// A document the caller may read, if it exists.
    pub async fn get_document(
        &self,
        ctx: &RequestContext,
        document_id: &str,
    ) -> AppResult<Option<StoredDocument>> {
        let org = ctx.organization_id();
        let db = self.services.vector_db(org)?;

        let Some(document) = db.get(org, document_id).await? else {
            return Ok(None);
        };

        if !document_access_check(&document.metadata, org, ctx.user_id()) {
            tracing::warn!(
                organization_id = org,
                user_id = ctx.user_id(),
                document_id,
                "Document access denied"
            );
            return Ok(None);
        }

        Ok(Some(document))
    }

    /// A page of the documents the caller may read and the total match count.
    ///
    /// Uses the same access filter as [`Retriever::retrieve`], so caller
    /// conditions on `organization_id` or `user_id` are ignored.
    pub async fn list_documents(
        &self,
        ctx: &RequestContext,
        filter: Option<&Filter>,
        limit: usize,
        offset: usize,
    ) -> AppResult<(Vec<StoredDocument>, usize)> {
        let org = ctx.organization_id();
        let db = self.services.vector_db(org)?;

        let scoped = access_filter(org, ctx.user_id(), None, filter);

        let total = db.count(org, Some(&scoped)).await?;
        let documents = db.list(org, Some(&scoped), limit, offset).await?;
        Ok((documents, total))
    }

    /// Delete a document owned by the caller.
    ///
    /// Missing documents, documents of another organization and documents of
    /// another user all yield `false`.
    pub async fn delete_document(&self, ctx: &RequestContext, document_id: &str) -> AppResult<bool> {
        let org = ctx.organization_id();
        let user = ctx.user_id();
        let db = self.services.vector_db(org)?;

        let Some(document) = db.get(org, document_id).await? else {
            tracing::info!(organization_id = org, document_id, "Document not found for deletion");
            return Ok(false);
        };

        let owner_org = document.metadata_str(ORGANIZATION_ID);
        if owner_org != Some(org) {
            tracing::warn!(
                organization_id = org,
                user_id = user,
                document_id,
                document_organization = ?owner_org,
                "Attempt to delete document of another organization"
            );
            return Ok(false);
        }

        let owner = document.metadata_str(USER_ID);
        if owner != Some(user) && !is_admin(&ctx.principal) {
            tracing::warn!(
                organization_id = org,
                user_id = user,
                document_id,
                owner = ?owner,
                "Unauthorized attempt to delete document"
            );
            return Ok(false);
        }

        let deleted = db.delete(org, &[document_id.to_string()]).await?;
        if deleted {
            tracing::info!(organization_id = org, user_id = user, document_id, "Deleted document");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{context, meta, mock_services};
    use serde_json::json;

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let retriever = Retriever::new(mock_services());
        let ctx = context("org1", "alice");

        retriever
            .store_document(&ctx, "Rust ownership and borrowing rules", Metadata::new())
            .await
            .unwrap();
        retriever
            .store_document(&ctx, "Baking sourdough bread at home", Metadata::new())
            .await
            .unwrap();

        let hits = retriever
            .retrieve(&ctx, "ownership rules in Rust", None, 1, true)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Rust ownership and borrowing rules");
        assert_eq!(hits[0].metadata["organization_id"], "org1");
        assert_eq!(hits[0].metadata["user_id"], "alice");
        assert_eq!(hits[0].metadata["visibility"], "private");
    }

    #[tokio::test]
    async fn test_store_forces_ownership() {
        let retriever = Retriever::new(mock_services());
        let ctx = context("org1", "alice");

        let id = retriever
            .store_document(
                &ctx,
                "text",
                meta(json!({"organization_id": "org2", "user_id": "mallory", "visibility": "bogus"})),
            )
            .await
            .unwrap();

        let doc = retriever.get_document(&ctx, &id).await.unwrap().unwrap();
        assert_eq!(doc.metadata["organization_id"], "org1");
        assert_eq!(doc.metadata["user_id"], "alice");
        assert_eq!(doc.metadata["visibility"], "private");
        assert!(doc.metadata.contains_key("timestamp"));
    }

    #[tokio::test]
    async fn test_store_chunked_adds_chunk_metadata() {
        let retriever = Retriever::new(mock_services());
        let ctx = context("org1", "alice");
        let text = (0..6)
            .map(|i| format!("Paragraph {} {}", i, "words ".repeat(30)))
            .collect::<Vec<_>>()
            .join("\n\n");

        let ids = retriever
            .store_chunked(&ctx, &text, meta(json!({"title": "Guide"})), 400, 50)
            .await
            .unwrap();
        assert!(ids.len() > 1);

        let (docs, total) = retriever
            .list_documents(&ctx, Some(&Filter::eq("is_chunk", true)), 100, 0)
            .await
            .unwrap();
        assert_eq!(total, ids.len());
        let parent = docs[0].metadata["parent_id"].clone();
        for doc in &docs {
            assert_eq!(doc.metadata["parent_id"], parent);
            assert_eq!(doc.metadata["chunk_count"], ids.len());
            assert_eq!(doc.metadata["title"], "Guide");
        }
    }

    #[tokio::test]
    async fn test_get_document_respects_visibility() {
        let retriever = Retriever::new(mock_services());
        let alice = context("org1", "alice");
        let bob = context("org1", "bob");

        let private = retriever
            .store_document(&alice, "alice private", Metadata::new())
            .await
            .unwrap();
        let shared = retriever
            .store_document(&alice, "alice shared", meta(json!({"visibility": "shared"})))
            .await
            .unwrap();

        assert!(retriever.get_document(&bob, &private).await.unwrap().is_none());
        assert!(retriever.get_document(&bob, &shared).await.unwrap().is_some());
        assert!(retriever.get_document(&context("org2", "bob"), &shared).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_documents_pins_organization() {
        let retriever = Retriever::new(mock_services());
        let alice = context("org1", "alice");
        retriever.store_document(&alice, "one", Metadata::new()).await.unwrap();
        retriever.store_document(&alice, "two", Metadata::new()).await.unwrap();
        retriever
            .store_document(&context("org2", "eve"), "other", Metadata::new())
            .await
            .unwrap();

        let escape = Filter::eq("organization_id", "org2");
        let (docs, total) = retriever.list_documents(&alice, Some(&escape), 1, 0).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata["organization_id"], "org1");
    }

    #[tokio::test]
    async fn test_list_documents_hides_private_documents_of_others() {
        let retriever = Retriever::new(mock_services());
        let alice = context("org1", "alice");
        let bob = context("org1", "bob");
        let private = retriever
            .store_document(&alice, "alice private", Metadata::new())
            .await
            .unwrap();
        let shared = retriever
            .store_document(&alice, "alice shared", meta(json!({"visibility": "shared"})))
            .await
            .unwrap();

        let (docs, total) = retriever.list_documents(&bob, None, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, shared);

        let widen = Filter::eq("user_id", "alice");
        let (docs, total) = retriever.list_documents(&bob, Some(&widen), 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert!(docs.iter().all(|doc| doc.id != private));

        let (_, total) = retriever.list_documents(&alice, None, 10, 0).await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_delete_document_requires_owner() {
        let retriever = Retriever::new(mock_services());
        let alice = context("org1", "alice");
        let id = retriever
            .store_document(&alice, "alice doc", meta(json!({"visibility": "shared"})))
            .await
            .unwrap();

        assert!(!retriever.delete_document(&context("org1", "bob"), &id).await.unwrap());
        assert!(!retriever.delete_document(&context("org2", "alice"), &id).await.unwrap());
        assert!(!retriever.delete_document(&alice, "missing").await.unwrap());
        assert!(retriever.delete_document(&alice, &id).await.unwrap());
        assert!(retriever.get_document(&alice, &id).await.unwrap().is_none());
    }
}
