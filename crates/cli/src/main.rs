//! Pulse CLI
//!
//! Main entry point for the pulse command-line tool.
//! Runs every knowledge, agent and web search operation as one principal.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    AgentCommand, ChatCommand, ConfigCommand, DocumentsCommand, GenerateCommand, RagCommand,
    Session, WebCommand,
};
use pulse_core::{
    logging, AppConfig, AppError, AppResult, Principal, RequestContext, TenantOverrides,
};
use pulse_knowledge::ServiceContext;
use std::path::PathBuf;
use tracing::Instrument;

/// Pulse - multi-tenant RAG, agents and web search
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(about = "Multi-tenant RAG, agents and web search", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "PULSE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "PULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "PULSE_JSON_LOGS")]
    json_logs: bool,

    /// Organization to act in
    #[arg(long, global = true, env = "PULSE_ORGANIZATION_ID")]
    org: Option<String>,

    /// User to act as
    #[arg(long, global = true, env = "PULSE_USER_ID")]
    user: Option<String>,

    /// Role of the user
    #[arg(long, global = true, env = "PULSE_ROLE")]
    role: Option<String>,

    /// Correlation id for logs (default: random)
    #[arg(long, global = true)]
    request_id: Option<String>,

    /// LLM provider for the organization (openai, ollama, mock)
    #[arg(short, long, global = true, env = "PULSE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Vector database for the organization (memory, local)
    #[arg(long, global = true, env = "PULSE_VECTOR_DB")]
    vector_db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Complete a prompt with the tenant LLM
    Generate(GenerateCommand),

    /// Chat with the tenant LLM
    Chat(ChatCommand),

    /// Answer a question from the knowledge base
    Rag(RagCommand),

    /// Document management
    Documents(DocumentsCommand),

    /// RAG agent management
    Agent(AgentCommand),

    /// Web search
    Web(WebCommand),

    /// Configuration inspection
    Config(ConfigCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Generate(_) => "generate",
            Commands::Chat(_) => "chat",
            Commands::Rag(_) => "rag",
            Commands::Documents(_) => "documents",
            Commands::Agent(_) => "agent",
            Commands::Web(_) => "web",
            Commands::Config(_) => "config",
        }
    }
}

impl Cli {
    /// The principal named by the flags or environment.
    fn principal(&self) -> AppResult<Principal> {
        let organization_id = self.org.clone().ok_or_else(|| {
            AppError::Config(
                "No organization id (set --org or PULSE_ORGANIZATION_ID)".to_string(),
            )
        })?;
        let user_id = self.user.clone().ok_or_else(|| {
            AppError::Config("No user id (set --user or PULSE_USER_ID)".to_string())
        })?;
        Principal::new(organization_id, user_id, self.role.clone())
    }

    /// Services plus request context for the principal.
    fn session(&self, config: AppConfig) -> AppResult<Session> {
        let principal = self.principal()?;
        let services = ServiceContext::new(config)?;

        // Flags also beat per-tenant overrides from the config file.
        if self.provider.is_some() || self.vector_db.is_some() {
            services.update_tenant(
                &principal.organization_id,
                TenantOverrides {
                    llm_provider: self.provider.clone(),
                    vector_db: self.vector_db.clone(),
                    ..Default::default()
                },
            );
        }

        let mut ctx = RequestContext::new(principal);
        if let Some(ref request_id) = self.request_id {
            ctx = ctx.with_request_id(request_id.clone());
        }
        Ok(Session { services, ctx })
    }
}

/// Route to the command handler, inside the request span for principal commands.
async fn run(cli: &Cli, config: AppConfig) -> AppResult<()> {
    let session = match cli.command {
        Commands::Config(ref cmd) => return cmd.execute(&config),
        _ => cli.session(config)?,
    };

    let request_span = session.ctx.span();
    async {
        match cli.command {
            Commands::Generate(ref cmd) => cmd.execute(&session).await,
            Commands::Chat(ref cmd) => cmd.execute(&session).await,
            Commands::Rag(ref cmd) => cmd.execute(&session).await,
            Commands::Documents(ref cmd) => cmd.execute(&session).await,
            Commands::Agent(ref cmd) => cmd.execute(&session).await,
            Commands::Web(ref cmd) => cmd.execute(&session).await,
            Commands::Config(ref cmd) => cmd.execute(session.services.config()),
        }
    }
    .instrument(request_span)
    .await
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load configuration from file and environment, then apply CLI overrides
    let config = AppConfig::load_with(cli.workspace.clone(), cli.config.clone())?.with_overrides(
        cli.provider.clone(),
        cli.vector_db.clone(),
        cli.log_level.clone(),
        cli.verbose,
        cli.no_color,
        cli.json_logs,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.json_logs)?;

    tracing::info!("Pulse CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("LLM provider: {}", config.defaults.llm_provider);
    tracing::debug!("Vector database: {}", config.defaults.vector_db);

    config.ensure_pulse_dir()?;

    let command_span = tracing::info_span!("command", name = cli.command.name());
    let result = run(&cli, config).instrument(command_span).await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_principal_from_flags() {
        let cli = parse(&[
            "pulse", "--org", "acme", "--user", "alice", "--role", "editor", "rag", "hello",
        ]);
        let principal = cli.principal().unwrap();
        assert_eq!(principal.organization_id, "acme");
        assert_eq!(principal.user_id, "alice");
        assert_eq!(principal.role.as_deref(), Some("editor"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["pulse", "generate", "hi", "--org", "acme", "--user", "bob", "--stream"]);
        assert_eq!(cli.org.as_deref(), Some("acme"));
        assert_eq!(cli.command.name(), "generate");
    }

    #[test]
    fn test_nested_subcommands_parse() {
        let cli = parse(&[
            "pulse", "agent", "chat", "agent-1", "-m", "user: hi", "-m", "assistant: hello",
        ]);
        assert_eq!(cli.command.name(), "agent");

        let cli = parse(&["pulse", "documents", "list", "--limit", "3"]);
        assert_eq!(cli.command.name(), "documents");

        let cli = parse(&["pulse", "web", "answer", "rust news", "-n", "3", "--stream"]);
        assert_eq!(cli.command.name(), "web");
    }

    #[test]
    fn test_stream_and_json_conflict() {
        assert!(Cli::try_parse_from(["pulse", "rag", "q", "--stream", "--json"]).is_err());
    }
}
