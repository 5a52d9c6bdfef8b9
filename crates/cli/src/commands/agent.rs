//! Agent command handler.
//!
//! Manages RAG agents and chats with them.

use super::chat::parse_messages;
use super::{parse_filter, parse_metadata, print_json, print_stream, SamplingArgs, Session};
use clap::{Args, Subcommand};
use pulse_core::{AppError, AppResult};
use pulse_knowledge::{AgentManager, AgentUpdate, NewAgent};

/// RAG agent management
#[derive(Args, Debug)]
pub struct AgentCommand {
    #[command(subcommand)]
    pub action: AgentAction,
}

#[derive(Subcommand, Debug)]
pub enum AgentAction {
    /// Create an agent
    Create(AgentCreateCommand),
    /// Show an agent
    Get(AgentGetCommand),
    /// List the organization's agents
    List(AgentListCommand),
    /// Update an agent you created
    Update(AgentUpdateCommand),
    /// Delete an agent you created
    Delete(AgentDeleteCommand),
    /// Chat with an agent
    Chat(AgentChatCommand),
}

fn not_found(agent_id: &str) -> AppError {
    AppError::NotFound(format!("Agent {} (or you may not modify it)", agent_id))
}

/// Create an agent
#[derive(Args, Debug)]
pub struct AgentCreateCommand {
    #[arg(long)]
    pub name: String,

    /// Instructions added to the agent's system message
    #[arg(long, default_value = "")]
    pub instructions: String,

    #[arg(long)]
    pub description: Option<String>,

    /// Document to attach; repeatable
    #[arg(long = "document")]
    pub documents: Vec<String>,

    /// Metadata conditions on the documents the agent draws on, as JSON
    #[arg(long)]
    pub document_filter: Option<String>,

    /// Custom metadata as a JSON object
    #[arg(long)]
    pub metadata: Option<String>,
}

impl AgentCreateCommand {
    fn request(&self) -> AppResult<NewAgent> {
        let mut request = NewAgent::new(self.name.clone(), self.instructions.clone())
            .with_documents(self.documents.clone())
            .with_metadata(parse_metadata(self.metadata.as_deref())?);
        if let Some(ref description) = self.description {
            request = request.with_description(description.clone());
        }
        if self.document_filter.is_some() {
            request = request.with_document_filter(parse_metadata(self.document_filter.as_deref())?);
        }
        Ok(request)
    }

    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing agent create command for '{}'", self.name);

        let manager = AgentManager::new(session.services.clone());
        let agent = manager.create(&session.ctx, self.request()?).await?;
        print_json(&agent)
    }
}

/// Show an agent
#[derive(Args, Debug)]
pub struct AgentGetCommand {
    /// Agent id
    pub id: String,
}

impl AgentGetCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        let manager = AgentManager::new(session.services.clone());
        match manager.get(&session.ctx, &self.id).await? {
            Some(agent) => print_json(&agent),
            None => Err(AppError::NotFound(format!("Agent {}", self.id))),
        }
    }
}

/// List the organization's agents
#[derive(Args, Debug)]
pub struct AgentListCommand {
    /// Metadata filter as JSON
    #[arg(long)]
    pub filter: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

impl AgentListCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing agent list command");

        let filter = parse_filter(self.filter.as_deref())?;
        let manager = AgentManager::new(session.services.clone());
        let (agents, total) = manager
            .list(&session.ctx, filter.as_ref(), self.limit, self.offset)
            .await?;

        print_json(&serde_json::json!({
            "agents": agents,
            "total": total,
            "limit": self.limit,
            "offset": self.offset,
        }))
    }
}

/// Update an agent you created
#[derive(Args, Debug)]
pub struct AgentUpdateCommand {
    /// Agent id
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub instructions: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Replace the attached documents; repeatable
    #[arg(long = "document")]
    pub documents: Vec<String>,

    /// Detach every document
    #[arg(long, conflicts_with = "documents")]
    pub clear_documents: bool,

    /// Metadata conditions on the documents the agent draws on, as JSON
    #[arg(long)]
    pub document_filter: Option<String>,

    /// Custom metadata to merge, as a JSON object
    #[arg(long)]
    pub metadata: Option<String>,
}

impl AgentUpdateCommand {
    fn update(&self) -> AppResult<AgentUpdate> {
        let document_ids = if self.clear_documents {
            Some(Vec::new())
        } else if self.documents.is_empty() {
            None
        } else {
            Some(self.documents.clone())
        };

        Ok(AgentUpdate {
            name: self.name.clone(),
            description: self.description.clone(),
            instructions: self.instructions.clone(),
            document_ids,
            document_filter: self
                .document_filter
                .as_deref()
                .map(|json| parse_metadata(Some(json)))
                .transpose()?,
            metadata: self
                .metadata
                .as_deref()
                .map(|json| parse_metadata(Some(json)))
                .transpose()?,
        })
    }

    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing agent update command for '{}'", self.id);

        let manager = AgentManager::new(session.services.clone());
        match manager.update(&session.ctx, &self.id, self.update()?).await? {
            Some(agent) => print_json(&agent),
            None => Err(not_found(&self.id)),
        }
    }
}

/// Delete an agent you created
#[derive(Args, Debug)]
pub struct AgentDeleteCommand {
    /// Agent id
    pub id: String,
}

impl AgentDeleteCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing agent delete command for '{}'", self.id);

        let manager = AgentManager::new(session.services.clone());
        if manager.delete(&session.ctx, &self.id).await? {
            println!("Deleted agent {}", self.id);
            Ok(())
        } else {
            Err(not_found(&self.id))
        }
    }
}

/// Chat with an agent
#[derive(Args, Debug)]
pub struct AgentChatCommand {
    /// Agent id
    pub id: String,

    /// Message as `role:content`; repeatable
    #[arg(short, long = "message", required = true)]
    pub messages: Vec<String>,

    /// Print the reply as it is generated
    #[arg(long)]
    pub stream: bool,

    #[command(flatten)]
    pub sampling: SamplingArgs,
}

impl AgentChatCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing agent chat command for '{}'", self.id);

        let messages = parse_messages(&self.messages)?;
        let manager = AgentManager::new(session.services.clone());
        let options = self.sampling.options();

        if self.stream {
            let stream = manager
                .chat_stream(&session.ctx, &self.id, &messages, &options)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Agent {}", self.id)))?;
            return print_stream(stream).await;
        }

        let reply = manager
            .chat(&session.ctx, &self.id, &messages, &options)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Agent {}", self.id)))?;
        println!("{}", reply);
        Ok(())
    }
}

impl AgentCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        match &self.action {
            AgentAction::Create(cmd) => cmd.execute(session).await,
            AgentAction::Get(cmd) => cmd.execute(session).await,
            AgentAction::List(cmd) => cmd.execute(session).await,
            AgentAction::Update(cmd) => cmd.execute(session).await,
            AgentAction::Delete(cmd) => cmd.execute(session).await,
            AgentAction::Chat(cmd) => cmd.execute(session).await,
        }
    }
}
