//! Retrieval-augmented answer generation.
//!
//! Retrieves the caller's documents for a query, renders them into the RAG
//! prompt and asks the tenant's LLM for an answer.

use crate::filter::Filter;
use crate::retriever::Retriever;
use crate::service::ServiceContext;
use crate::types::ScoredDocument;
use pulse_core::{AppResult, RequestContext};
use pulse_llm::{ChatMessage, GenerationOptions, TextStream};
use pulse_prompt::format_document_context;

/// Documents retrieved per answer unless the request says otherwise.
pub const DEFAULT_NUM_DOCUMENTS: usize = 5;

/// A question to answer from the knowledge base.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub query: String,
    pub filter: Option<Filter>,
    /// Replaces the default system message
    pub system_message: Option<String>,
    pub options: GenerationOptions,
    pub num_documents: usize,
}

impl GenerationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filter: None,
            system_message: None,
            options: GenerationOptions::default(),
            num_documents: DEFAULT_NUM_DOCUMENTS,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_num_documents(mut self, num_documents: usize) -> Self {
        self.num_documents = num_documents;
        self
    }
}

/// Generated answer with the documents it was grounded on.
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub documents: Vec<ScoredDocument>,
}

/// Streamed answer; `documents` is known before the first fragment.
pub struct RagStream {
    pub stream: TextStream,
    pub documents: Vec<ScoredDocument>,
}

/// Prompt inputs for one request.
struct PreparedPrompt {
    system_message: String,
    prompt: String,
    documents: Vec<ScoredDocument>,
}

/// Answers questions for a principal from their visible documents.
#[derive(Debug, Clone)]
pub struct Generator {
    services: ServiceContext,
    retriever: Retriever,
}

impl Generator {
    pub fn new(services: ServiceContext) -> Self {
        let retriever = Retriever::new(services.clone());
        Self { services, retriever }
    }

    async fn prepare(&self, ctx: &RequestContext, request: &GenerationRequest) -> AppResult<PreparedPrompt> {
        let documents = self
            .retriever
            .retrieve(
                ctx,
                &request.query,
                request.filter.as_ref(),
                request.num_documents,
                true,
            )
            .await?;

        let prompts = self.services.prompts();
        let (system_message, prompt) = if documents.is_empty() {
            tracing::info!(
                organization_id = ctx.organization_id(),
                user_id = ctx.user_id(),
                "No relevant documents found, answering without context"
            );
            let system = match request.system_message {
                Some(ref system) => system.clone(),
                None => prompts.ungrounded_system()?,
            };
            (system, request.query.clone())
        } else {
            let system = match request.system_message {
                Some(ref system) => system.clone(),
                None => prompts.rag_system()?,
            };
            let context = format_document_context(&documents);
            (system, prompts.rag_prompt(&request.query, &context)?)
        };

        Ok(PreparedPrompt {
            system_message,
            prompt,
            documents,
        })
    }

    /// Answer a question from the caller's documents.
    pub async fn generate_answer(&self, ctx: &RequestContext, request: &GenerationRequest) -> AppResult<RagAnswer> {
        let prepared = self.prepare(ctx, request).await?;
        let llm = self.services.llm(ctx.organization_id())?;

        let answer = llm
            .generate(&prepared.prompt, Some(&prepared.system_message), &request.options)
            .await?;

        tracing::info!(
            organization_id = ctx.organization_id(),
            user_id = ctx.user_id(),
            provider = llm.provider_name(),
            document_count = prepared.documents.len(),
            "Generated RAG answer"
        );

        Ok(RagAnswer {
            answer,
            documents: prepared.documents,
        })
    }

    /// Streaming version of [`Generator::generate_answer`].
    pub async fn generate_answer_stream(
        &self,
        ctx: &RequestContext,
        request: &GenerationRequest,
    ) -> AppResult<RagStream> {
        let prepared = self.prepare(ctx, request).await?;
        let llm = self.services.llm(ctx.organization_id())?;

        let stream = llm
            .generate_stream(&prepared.prompt, Some(&prepared.system_message), &request.options)
            .await?;

        tracing::info!(
            organization_id = ctx.organization_id(),
            user_id = ctx.user_id(),
            provider = llm.provider_name(),
            document_count = prepared.documents.len(),
            "Started RAG answer stream"
        );

        Ok(RagStream {
            stream,
            documents: prepared.documents,
        })
    }

    /// Plain completion on the tenant's LLM.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        prompt: &str,
        system_message: Option<&str>,
        options: &GenerationOptions,
    ) -> AppResult<String> {
        self.services
            .llm(ctx.organization_id())?
            .generate(prompt, system_message, options)
            .await
    }

    pub async fn generate_stream(
        &self,
        ctx: &RequestContext,
        prompt: &str,
        system_message: Option<&str>,
        options: &GenerationOptions,
    ) -> AppResult<TextStream> {
        self.services
            .llm(ctx.organization_id())?
            .generate_stream(prompt, system_message, options)
            .await
    }

    /// Plain chat on the tenant's LLM.
    pub async fn chat(
        &self,
        ctx: &RequestContext,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> AppResult<String> {
        self.services
            .llm(ctx.organization_id())?
            .chat(messages, options)
            .await
    }

    pub async fn chat_stream(
        &self,
        ctx: &RequestContext,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> AppResult<TextStream> {
        self.services
            .llm(ctx.organization_id())?
            .chat_stream(messages, options)
            .await
    }
}
