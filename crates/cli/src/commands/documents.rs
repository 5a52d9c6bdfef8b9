//! Documents command handler.
//!
//! Stores, reads, lists, deletes and searches the principal's documents.

use super::{parse_filter, parse_metadata, print_json, Session};
use clap::{Args, Subcommand};
use pulse_core::{AppError, AppResult};
use pulse_knowledge::{Retriever, StoredDocument, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use std::path::PathBuf;

/// Document management
#[derive(Args, Debug)]
pub struct DocumentsCommand {
    #[command(subcommand)]
    pub action: DocumentsAction,
}

#[derive(Subcommand, Debug)]
pub enum DocumentsAction {
    /// Store a document
    Add(DocumentsAddCommand),
    /// Show a document
    Get(DocumentsGetCommand),
    /// List the organization's documents
    List(DocumentsListCommand),
    /// Delete a document you own
    Delete(DocumentsDeleteCommand),
    /// Similarity search over visible documents
    Search(DocumentsSearchCommand),
}

/// Store a document
#[derive(Args, Debug)]
pub struct DocumentsAddCommand {
    /// Document text
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub text: Option<String>,

    /// Read the document text from a file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Metadata as a JSON object (e.g. '{"title": "Guide", "visibility": "public"}')
    #[arg(short, long)]
    pub metadata: Option<String>,

    /// Split the text into overlapping chunks
    #[arg(long)]
    pub chunk: bool,

    /// Chunk size in characters
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Characters carried over between chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub overlap: usize,
}

impl DocumentsAddCommand {
    fn text(&self) -> AppResult<String> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
            (None, None) => Err(AppError::Validation(
                "Provide the document text or --file".to_string(),
            )),
        }
    }

    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing documents add command");

        let text = self.text()?;
        let metadata = parse_metadata(self.metadata.as_deref())?;
        let retriever = Retriever::new(session.services.clone());

        let ids = if self.chunk {
            retriever
                .store_chunked(&session.ctx, &text, metadata, self.chunk_size, self.overlap)
                .await?
        } else {
            vec![retriever.store_document(&session.ctx, &text, metadata).await?]
        };

        for id in &ids {
            println!("{}", id);
        }
        Ok(())
    }
}

/// Show a document
#[derive(Args, Debug)]
pub struct DocumentsGetCommand {
    /// Document id
    pub id: String,
}

impl DocumentsGetCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing documents get command for '{}'", self.id);

        let retriever = Retriever::new(session.services.clone());
        match retriever.get_document(&session.ctx, &self.id).await? {
            Some(document) => print_json(&without_embedding(document)),
            None => Err(AppError::NotFound(format!("Document {}", self.id))),
        }
    }
}

/// List the organization's documents
#[derive(Args, Debug)]
pub struct DocumentsListCommand {
    /// Metadata filter as JSON
    #[arg(long)]
    pub filter: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

impl DocumentsListCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing documents list command");

        let filter = parse_filter(self.filter.as_deref())?;
        let retriever = Retriever::new(session.services.clone());
        let (documents, total) = retriever
            .list_documents(&session.ctx, filter.as_ref(), self.limit, self.offset)
            .await?;

        let documents: Vec<StoredDocument> = documents.into_iter().map(without_embedding).collect();
        print_json(&serde_json::json!({
            "documents": documents,
            "total": total,
            "limit": self.limit,
            "offset": self.offset,
        }))
    }
}

/// Delete a document you own
#[derive(Args, Debug)]
pub struct DocumentsDeleteCommand {
    /// Document id
    pub id: String,
}

impl DocumentsDeleteCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing documents delete command for '{}'", self.id);

        let retriever = Retriever::new(session.services.clone());
        if retriever.delete_document(&session.ctx, &self.id).await? {
            println!("Deleted document {}", self.id);
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "Document {} (or you may not delete it)",
                self.id
            )))
        }
    }
}

/// Similarity search over visible documents
#[derive(Args, Debug)]
pub struct DocumentsSearchCommand {
    /// Query text
    pub query: String,

    /// Extra metadata filter as JSON
    #[arg(long)]
    pub filter: Option<String>,

    #[arg(short = 'k', long, default_value_t = 5)]
    pub limit: usize,

    /// Fetch extra candidates and cut back to the limit
    #[arg(long)]
    pub rerank: bool,
}

impl DocumentsSearchCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing documents search command");

        let filter = parse_filter(self.filter.as_deref())?;
        let retriever = Retriever::new(session.services.clone());
        let documents = retriever
            .retrieve(
                &session.ctx,
                &self.query,
                filter.as_ref(),
                self.limit,
                self.rerank,
            )
            .await?;
        print_json(&documents)
    }
}

fn without_embedding(mut document: StoredDocument) -> StoredDocument {
    document.embedding = None;
    document
}

impl DocumentsCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        match &self.action {
            DocumentsAction::Add(cmd) => cmd.execute(session).await,
            DocumentsAction::Get(cmd) => cmd.execute(session).await,
            DocumentsAction::List(cmd) => cmd.execute(session).await,
            DocumentsAction::Delete(cmd) => cmd.execute(session).await,
            DocumentsAction::Search(cmd) => cmd.execute(session).await,
        }
    }
}
