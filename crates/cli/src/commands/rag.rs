//! RAG command handler.
//!
//! Answers a question from the principal's visible documents.

use super::{parse_filter, print_json, print_stream, SamplingArgs, Session};
use clap::Args;
use pulse_core::AppResult;
use pulse_knowledge::generator::DEFAULT_NUM_DOCUMENTS;
use pulse_knowledge::{GenerationRequest, Generator, ScoredDocument};

/// Answer a question from the knowledge base
#[derive(Args, Debug)]
pub struct RagCommand {
    /// Question text
    pub query: String,

    /// Extra metadata filter as JSON (e.g. '{"category": "faq"}')
    #[arg(long)]
    pub filter: Option<String>,

    /// Number of documents to ground the answer on
    #[arg(short = 'k', long, default_value_t = DEFAULT_NUM_DOCUMENTS)]
    pub num_documents: usize,

    /// Replace the default system message
    #[arg(long)]
    pub system: Option<String>,

    /// Print the answer as it is generated
    #[arg(long, conflicts_with = "json")]
    pub stream: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub sampling: SamplingArgs,
}

impl RagCommand {
    fn request(&self) -> AppResult<GenerationRequest> {
        let mut request = GenerationRequest::new(self.query.clone())
            .with_num_documents(self.num_documents)
            .with_options(self.sampling.options());
        if let Some(filter) = parse_filter(self.filter.as_deref())? {
            request = request.with_filter(filter);
        }
        if let Some(ref system) = self.system {
            request = request.with_system_message(system.clone());
        }
        Ok(request)
    }

    pub async fn execute(&self, session: &Session) -> AppResult<()> {
        tracing::info!("Executing rag command");
        tracing::debug!("Rag options: {:?}", self);

        let request = self.request()?;
        let generator = Generator::new(session.services.clone());

        if self.stream {
            let answer = generator
                .generate_answer_stream(&session.ctx, &request)
                .await?;
            tracing::debug!("Streaming answer over {} documents", answer.documents.len());
            print_stream(answer.stream).await?;
            print_sources(&answer.documents);
            return Ok(());
        }

        let answer = generator.generate_answer(&session.ctx, &request).await?;
        if self.json {
            return print_json(&serde_json::json!({
                "answer": answer.answer,
                "documents": answer.documents,
            }));
        }

        println!("{}", answer.answer);
        print_sources(&answer.documents);
        Ok(())
    }
}

fn print_sources(documents: &[ScoredDocument]) {
    if documents.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for document in documents {
        let title = document
            .metadata
            .get("title")
            .and_then(|title| title.as_str())
            .unwrap_or("untitled");
        println!("- {} ({}, score {:.3})", title, document.id, document.score);
    }
}
