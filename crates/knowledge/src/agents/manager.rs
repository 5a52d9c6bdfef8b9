//! Agent lifecycle and chat.
//!
//! An agent is a JSON record stored as a document of its organization, with
//! a zero placeholder embedding. Documents are attached to an agent by
//! listing its id in their `associated_agents` metadata.

use super::types::{AgentDefinition, AgentUpdate, AgentView, NewAgent, AGENT_DOCUMENT_TYPE};
use crate::access::{agent_scope_filter, is_admin, sanitize_metadata};
use crate::filter::Filter;
use crate::retriever::Retriever;
use crate::service::ServiceContext;
use crate::types::{Metadata, StoredDocument, ASSOCIATED_AGENTS, DOCUMENT_TYPE, ORGANIZATION_ID};
use crate::vectordb::VectorDatabase;
use pulse_core::{AppError, AppResult, RequestContext};
use pulse_llm::{ChatMessage, GenerationOptions, Role, TextStream};
use pulse_prompt::{format_document_context, AgentPrompt};
use serde_json::Value;
use std::sync::Arc;

/// Reply when a conversation has no user message.
pub const NO_QUESTION_REPLY: &str = "I need a question to assist you.";

/// Documents retrieved per agent turn.
const AGENT_RETRIEVAL_LIMIT: usize = 5;

const AGENT_ID: &str = "agent_id";

/// Streamed agent reply.
pub type AgentStream = TextStream;

fn associated_with(organization_id: &str, agent_id: &str) -> Filter {
    Filter::all([
        Filter::eq(ASSOCIATED_AGENTS, agent_id),
        Filter::eq(ORGANIZATION_ID, organization_id),
    ])
}

fn associated_ids(metadata: &Metadata) -> Vec<Value> {
    match metadata.get(ASSOCIATED_AGENTS) {
        Some(Value::Array(ids)) => ids.clone(),
        Some(Value::String(id)) => vec![Value::from(id.as_str())],
        _ => Vec::new(),
    }
}

/// Creates, updates, deletes and chats with agents.
#[derive(Debug, Clone)]
pub struct AgentManager {
    services: ServiceContext,
    retriever: Retriever,
}

impl AgentManager {
    pub fn new(services: ServiceContext) -> Self {
        let retriever = Retriever::new(services.clone());
        Self { services, retriever }
    }

    /// The metadata row of an agent and its parsed record.
    async fn find_record(
        &self,
        db: &dyn VectorDatabase,
        organization_id: &str,
        agent_id: &str,
    ) -> AppResult<Option<(StoredDocument, AgentDefinition)>> {
        let filter = Filter::all([
            Filter::eq(AGENT_ID, agent_id),
            Filter::eq(ORGANIZATION_ID, organization_id),
            Filter::eq(DOCUMENT_TYPE, AGENT_DOCUMENT_TYPE),
        ]);

        let Some(document) = db
            .list(organization_id, Some(&filter), 1, 0)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let definition: AgentDefinition = serde_json::from_str(&document.text)?;
        Ok(Some((document, definition)))
    }

    async fn document_count(&self, db: &dyn VectorDatabase, organization_id: &str, agent_id: &str) -> AppResult<usize> {
        db.count(organization_id, Some(&associated_with(organization_id, agent_id)))
            .await
    }

    /// Attach documents of the same organization; returns how many were attached.
    async fn associate(
        &self,
        db: &dyn VectorDatabase,
        organization_id: &str,
        agent_id: &str,
        document_ids: &[String],
    ) -> AppResult<usize> {
        let mut attached = 0;

        for document_id in document_ids {
            let Some(document) = db.get(organization_id, document_id).await? else {
                tracing::warn!(organization_id, agent_id, document_id = %document_id, "Document not found");
                continue;
            };

            let owner = document.metadata_str(ORGANIZATION_ID);
            if owner != Some(organization_id) {
                tracing::warn!(
                    organization_id,
                    agent_id,
                    document_id = %document_id,
                    document_organization = ?owner,
                    "Attempted to associate document from another organization"
                );
                continue;
            }

            let mut agents = associated_ids(&document.metadata);
            if !agents.iter().any(|id| id.as_str() == Some(agent_id)) {
                agents.push(Value::from(agent_id));
            }

            let mut patch = Metadata::new();
            patch.insert(ASSOCIATED_AGENTS.to_string(), Value::Array(agents));
            if db.update(organization_id, document_id, None, None, Some(patch)).await? {
                attached += 1;
            }
        }

        Ok(attached)
    }

    /// Detach the agent from every document; the documents themselves stay.
    async fn dissociate_all(&self, db: &dyn VectorDatabase, organization_id: &str, agent_id: &str) -> AppResult<usize> {
        let filter = associated_with(organization_id, agent_id);
        let total = db.count(organization_id, Some(&filter)).await?;
        let documents = db.list(organization_id, Some(&filter), total, 0).await?;

        for document in &documents {
            let remaining: Vec<Value> = associated_ids(&document.metadata)
                .into_iter()
                .filter(|id| id.as_str() != Some(agent_id))
                .collect();

            let mut patch = Metadata::new();
            let value = if remaining.is_empty() {
                Value::Null
            } else {
                Value::Array(remaining)
            };
            patch.insert(ASSOCIATED_AGENTS.to_string(), value);
            db.update(organization_id, &document.id, None, None, Some(patch))
                .await?;
        }

        Ok(documents.len())
    }

    fn may_modify(ctx: &RequestContext, definition: &AgentDefinition) -> bool {
        definition.created_by == ctx.user_id() || is_admin(&ctx.principal)
    }

    /// Create an agent owned by the caller.
    pub async fn create(&self, ctx: &RequestContext, mut request: NewAgent) -> AppResult<AgentView> {
        if request.name.trim().is_empty() {
            return Err(AppError::Validation("Agent name must not be empty".to_string()));
        }

        let org = ctx.organization_id();
        let user = ctx.user_id();
        let db = self.services.vector_db(org)?;
        let dimension = self.services.tenant(org).vector_store.metadata_dimension;

        let document_ids = std::mem::take(&mut request.document_ids);
        let definition = AgentDefinition::new(org, user, request);

        let mut storage = Metadata::new();
        storage.insert(AGENT_ID.to_string(), Value::from(definition.agent_id.as_str()));
        storage.insert(DOCUMENT_TYPE.to_string(), Value::from(AGENT_DOCUMENT_TYPE));
        let storage = sanitize_metadata(storage, org, user);

        db.add(
            org,
            &[serde_json::to_string(&definition)?],
            &[vec![0.0; dimension]],
            vec![storage],
        )
        .await?;

        let attached = self
            .associate(db.as_ref(), org, &definition.agent_id, &document_ids)
            .await?;

        tracing::info!(
            organization_id = org,
            user_id = user,
            agent_id = %definition.agent_id,
            document_count = attached,
            "Created agent: {}",
            definition.name
        );

        Ok(AgentView::new(&definition, attached))
    }

    /// An agent of the caller's organization.
    pub async fn get(&self, ctx: &RequestContext, agent_id: &str) -> AppResult<Option<AgentView>> {
        let org = ctx.organization_id();
        let db = self.services.vector_db(org)?;

        let Some((_, definition)) = self.find_record(db.as_ref(), org, agent_id).await? else {
            tracing::warn!(organization_id = org, user_id = ctx.user_id(), agent_id, "Agent not found");
            return Ok(None);
        };

        let count = self.document_count(db.as_ref(), org, agent_id).await?;
        Ok(Some(AgentView::new(&definition, count)))
    }

    /// A page of the organization's agents and the total match count.
    ///
    /// Caller conditions on `organization_id` or `document_type` are ignored.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        filter: Option<&Filter>,
        limit: usize,
        offset: usize,
    ) -> AppResult<(Vec<AgentView>, usize)> {
        let org = ctx.organization_id();
        let db = self.services.vector_db(org)?;

        let mut conjuncts = vec![
            Filter::eq(ORGANIZATION_ID, org),
            Filter::eq(DOCUMENT_TYPE, AGENT_DOCUMENT_TYPE),
        ];
        if let Some(filter) = filter {
            conjuncts.extend(filter.clone().into_conjuncts().into_iter().filter(|conjunct| {
                !conjunct.references(ORGANIZATION_ID) && !conjunct.references(DOCUMENT_TYPE)
            }));
        }
        let scoped = Filter::all(conjuncts);

        let total = db.count(org, Some(&scoped)).await?;
        let documents = db.list(org, Some(&scoped), limit, offset).await?;

        let mut agents = Vec::with_capacity(documents.len());
        for document in documents {
            let definition: AgentDefinition = match serde_json::from_str(&document.text) {
                Ok(definition) => definition,
                Err(e) => {
                    tracing::error!(
                        organization_id = org,
                        document_id = %document.id,
                        "Error processing agent document: {}",
                        e
                    );
                    continue;
                }
            };
            let count = self
                .document_count(db.as_ref(), org, &definition.agent_id)
                .await?;
            agents.push(AgentView::new(&definition, count));
        }

        Ok((agents, total))
    }

    /// Update an agent created by the caller.
    ///
    /// `None` when the agent does not exist or belongs to another user.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        agent_id: &str,
        update: AgentUpdate,
    ) -> AppResult<Option<AgentView>> {
        let org = ctx.organization_id();
        let user = ctx.user_id();
        let db = self.services.vector_db(org)?;

        let Some((document, mut definition)) = self.find_record(db.as_ref(), org, agent_id).await? else {
            tracing::warn!(organization_id = org, user_id = user, agent_id, "Agent not found for update");
            return Ok(None);
        };

        if !Self::may_modify(ctx, &definition) {
            tracing::warn!(
                organization_id = org,
                user_id = user,
                agent_id,
                created_by = %definition.created_by,
                "Unauthorized attempt to update agent"
            );
            return Ok(None);
        }

        if definition.apply_update(&update) {
            let text = serde_json::to_string(&definition)?;
            db.update(org, &document.id, Some(text), None, None).await?;
        }

        if let Some(ref document_ids) = update.document_ids {
            self.dissociate_all(db.as_ref(), org, agent_id).await?;
            self.associate(db.as_ref(), org, agent_id, document_ids)
                .await?;
        }

        self.services.agent_cache().invalidate(org, agent_id);
        tracing::info!(organization_id = org, user_id = user, agent_id, "Updated agent");

        self.get(ctx, agent_id).await
    }

    /// Delete an agent created by the caller, detaching its documents.
    pub async fn delete(&self, ctx: &RequestContext, agent_id: &str) -> AppResult<bool> {
        let org = ctx.organization_id();
        let user = ctx.user_id();
        let db = self.services.vector_db(org)?;

        let Some((document, definition)) = self.find_record(db.as_ref(), org, agent_id).await? else {
            tracing::warn!(organization_id = org, user_id = user, agent_id, "Agent not found for deletion");
            return Ok(false);
        };

        if !Self::may_modify(ctx, &definition) {
            tracing::warn!(
                organization_id = org,
                user_id = user,
                agent_id,
                created_by = %definition.created_by,
                "Unauthorized attempt to delete agent"
            );
            return Ok(false);
        }

        if !db.delete(org, &[document.id.clone()]).await? {
            tracing::error!(
                organization_id = org,
                agent_id,
                document_id = %document.id,
                "Failed to delete agent metadata document"
            );
            return Ok(false);
        }

        let detached = self.dissociate_all(db.as_ref(), org, agent_id).await?;
        self.services.agent_cache().invalidate(org, agent_id);

        tracing::info!(
            organization_id = org,
            user_id = user,
            agent_id,
            associated_docs_updated = detached,
            "Deleted agent"
        );
        Ok(true)
    }

    /// Cached agent record, loading it on a miss.
    async fn load(&self, ctx: &RequestContext, agent_id: &str) -> AppResult<Option<Arc<AgentDefinition>>> {
        let org = ctx.organization_id();
        let cache = self.services.agent_cache();
        if let Some(definition) = cache.get(org, agent_id) {
            return Ok(Some(definition));
        }

        let db = self.services.vector_db(org)?;
        let Some((_, definition)) = self.find_record(db.as_ref(), org, agent_id).await? else {
            tracing::warn!(organization_id = org, user_id = ctx.user_id(), agent_id, "Agent not found for chat");
            return Ok(None);
        };

        Ok(Some(cache.insert(definition)))
    }

    /// System message for one turn, grounded on the agent's documents.
    async fn system_message(
        &self,
        ctx: &RequestContext,
        definition: &AgentDefinition,
        query: &str,
    ) -> AppResult<(String, usize)> {
        let filter = agent_scope_filter(
            ctx.organization_id(),
            ctx.user_id(),
            &definition.agent_id,
            definition.document_filter.as_ref(),
        );
        let documents = self
            .retriever
            .retrieve_with_filter(ctx, query, &filter, AGENT_RETRIEVAL_LIMIT, true)
            .await?;

        let context = format_document_context(&documents);
        let system = self.services.prompts().agent_system(&AgentPrompt {
            name: &definition.name,
            description: definition.description.as_deref().unwrap_or(""),
            instructions: &definition.instructions,
            context: &context,
        })?;

        Ok((system, documents.len()))
    }

    fn last_user_message(messages: &[ChatMessage]) -> Option<&str> {
        messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }

    /// Chat with an agent. `None` when the agent does not exist.
    pub async fn chat(
        &self,
        ctx: &RequestContext,
        agent_id: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> AppResult<Option<String>> {
        let Some(definition) = self.load(ctx, agent_id).await? else {
            return Ok(None);
        };
        let Some(query) = Self::last_user_message(messages) else {
            return Ok(Some(NO_QUESTION_REPLY.to_string()));
        };

        let (system, document_count) = self.system_message(ctx, &definition, query).await?;
        let mut history = Vec::with_capacity(messages.len() + 1);
        history.push(ChatMessage::system(system));
        history.extend_from_slice(messages);

        let llm = self.services.llm(ctx.organization_id())?;
        let reply = llm.chat(&history, options).await?;

        tracing::info!(
            organization_id = ctx.organization_id(),
            user_id = ctx.user_id(),
            agent_id,
            document_count,
            temperature = options.temperature,
            "Agent chat response generated"
        );
        Ok(Some(reply))
    }

    /// Streaming version of [`AgentManager::chat`].
    pub async fn chat_stream(
        &self,
        ctx: &RequestContext,
        agent_id: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> AppResult<Option<AgentStream>> {
        let Some(definition) = self.load(ctx, agent_id).await? else {
            return Ok(None);
        };
        let Some(query) = Self::last_user_message(messages) else {
            let reply: AgentStream = Box::pin(futures::stream::once(async {
                Ok(NO_QUESTION_REPLY.to_string())
            }));
            return Ok(Some(reply));
        };

        let (system, document_count) = self.system_message(ctx, &definition, query).await?;
        let mut history = Vec::with_capacity(messages.len() + 1);
        history.push(ChatMessage::system(system));
        history.extend_from_slice(messages);

        let llm = self.services.llm(ctx.organization_id())?;
        let stream = llm.chat_stream(&history, options).await?;

        tracing::info!(
            organization_id = ctx.organization_id(),
            user_id = ctx.user_id(),
            agent_id,
            document_count,
            "Agent chat stream started"
        );
        Ok(Some(stream))
    }
}
