//! RAG agents: named personas grounded on a chosen set of documents.

mod cache;
mod manager;
mod types;

pub use cache::AgentCache;
pub use manager::{AgentManager, AgentStream, NO_QUESTION_REPLY};
pub use types::{
    AgentDefinition, AgentUpdate, AgentView, NewAgent, AGENT_DOCUMENT_TYPE, AGENT_TYPE,
    RESERVED_KEYS,
};
