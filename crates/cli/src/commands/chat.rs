//! Chat command handler.

use super::{print_stream, SamplingArgs, Session};
use clap::Args;
use pulse_core::{AppError, AppResult};
use pulse_knowledge::Generator;
use pulse_llm::{ChatMessage, Role};

/// Chat with the tenant LLM
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Message as `role:content` (system, user or assistant); repeatable
    #[arg(short, long = "message", required = true)]
    pub messages: Vec<String>,

    /// Print the reply as it is generated
    #[arg(long)]
    pub stream: bool,

    #[command(flatten)]
    pub sampling: SamplingArgs,
}

/// Parse `role:content`. Only the first colon separates.
pub(crate) fn parse_message(raw: &str) -> AppResult<ChatMessage> {
    let (role, content) = raw.split_once(':').ok_or_else(|| {
        AppError::Validation(format!("Message must look like role:content, got {:?}", raw))
    })?;
    let role = Role::parse(role.trim())
        .ok_or_else(|| AppError::Validation(format!("Unknown message role {:?}", role)))?;
    Ok(ChatMessage::new(role, content.trim_start()))
}

pub(crate) fn parse_messages(raw: &[String]) -> AppResult<Vec<ChatMessage>> {
    raw.iter().map(|message| parse_message(message)).collect()
}

impl ChatCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing chat command with {} messages", self.messages.len());

        let messages = parse_messages(&self.messages)?;
        let generator = Generator::new(session.services.clone());
        let options = self.sampling.options();

        if self.stream {
            let stream = generator
                .chat_stream(&session.ctx, &messages, &options)
                .await?;
            return print_stream(stream).await;
        }

        let reply = generator.chat(&session.ctx, &messages, &options).await?;
        println!("{}", reply);
        Ok(())
    }
}
