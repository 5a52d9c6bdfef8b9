//! Generate command handler.
//!
//! Plain completion on the principal's tenant LLM.

use super::{print_stream, SamplingArgs, Session};
use clap::Args;
use pulse_core::AppResult;
use pulse_knowledge::Generator;

/// Complete a prompt with the tenant LLM
#[derive(Args, Debug)]
pub struct GenerateCommand {
    /// Prompt text
    pub prompt: String,

    /// System message
    #[arg(long)]
    pub system: Option<String>,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,

    #[command(flatten)]
    pub sampling: SamplingArgs,
}

impl GenerateCommand {
    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing generate command");
        tracing::debug!("Generate options: {:?}", self);

        let generator = Generator::new(session.services.clone());
        let options = self.sampling.options();
        let system = self.system.as_deref();

        if self.stream {
            let stream = generator
                .generate_stream(&session.ctx, &self.prompt, system, &options)
                .await?;
            return print_stream(stream).await;
        }

        let answer = generator
            .generate(&session.ctx, &self.prompt, system, &options)
            .await?;
        println!("{}", answer);
        Ok(())
    }
}
