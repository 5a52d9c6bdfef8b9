//! Multi-tenant knowledge store.
//!
//! Stores documents per organization in a pluggable vector database and
//! answers questions over them:
//! - Filter expressions and the access filter every read goes through
//! - Vector database capability with in-memory and file-backed backends
//! - Retriever, RAG generator and agent manager built on [`ServiceContext`]

pub mod access;
pub mod agents;
pub mod chunker;
pub mod filter;
pub mod generator;
pub mod registry;
pub mod retriever;
pub mod service;
pub mod types;
pub mod vectordb;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use access::{
    access_filter, agent_scope_filter, document_access_check, is_admin, sanitize_metadata,
    Visibility,
};
pub use agents::{AgentManager, AgentUpdate, AgentView, NewAgent};
pub use chunker::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use filter::Filter;
pub use generator::{GenerationRequest, Generator, RagAnswer, RagStream};
pub use registry::{VectorDbRegistry, DEFAULT_VECTOR_DB};
pub use retriever::Retriever;
pub use service::ServiceContext;
pub use types::{Metadata, NewDocument, ScoredDocument, StoredDocument};
pub use vectordb::{TenancyMode, VectorDatabase};
