//! Ask command handler.
//!
//! Answers one question. Session memory lives in the process, so a
//! `--session` only accumulates history within `ark chat`; here it labels
//! the exchange that gets indexed under `session:<id>`.

use super::{open_service, print_json, print_sources};
use ark_core::{config::AppConfig, AppError, AppResult};
use ark_knowledge::{AskMetadata, AskRequest, AskStream, HistoryHints, SourceRef, StreamEvent};
use clap::Args;
use futures::StreamExt;
use std::io::Write;

/// Ask a question grounded in indexed chunks
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Session id; generated when absent
    #[arg(long)]
    pub session: Option<String>,

    /// Prior turns to include
    #[arg(long)]
    pub max_history_turns: Option<i64>,

    /// Token budget for prior messages; overrides --max-history-turns
    #[arg(long)]
    pub max_history_tokens: Option<i64>,

    /// Only retrieve from these owners
    #[arg(long)]
    pub owner: Vec<String>,

    /// Disable streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Output as JSON (implies --no-stream)
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let service = open_service(config)?;
        let request = AskRequest {
            question: self.question.clone(),
            hints: HistoryHints {
                session_id: self.session.clone(),
                max_history_turns: self.max_history_turns,
                max_history_tokens: self.max_history_tokens,
            },
            owner_ids: self.owner.clone(),
        };

        if self.json || self.no_stream {
            let response = service.ask(request).await?;
            service.wait_idle().await;

            if self.json {
                return print_json(&response);
            }

            println!("{}", response.answer);
            println!();
            print_sources(&response.sources);
            print_session(&response.metadata);
            return Ok(());
        }

        let stream = service.ask_stream(request).await?;
        let (sources, metadata) = render_stream(stream).await?;
        service.wait_idle().await;

        println!();
        print_sources(&sources);
        print_session(&metadata);
        Ok(())
    }
}

/// Print tokens as they arrive; returns what the final event carried.
pub(crate) async fn render_stream(mut stream: AskStream) -> AppResult<(Vec<SourceRef>, AskMetadata)> {
    let mut stdout = std::io::stdout();

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Token { content } => {
                print!("{}", content);
                stdout.flush().ok();
            }
            StreamEvent::Final {
                content,
                sources,
                metadata,
            } => {
                if content.is_empty() {
                    println!();
                } else {
                    println!("{}", content);
                }
                return Ok((sources, metadata));
            }
        }
    }

    Err(AppError::Llm(
        "Answer stream ended without a final event".to_string(),
    ))
}

fn print_session(metadata: &AskMetadata) {
    println!(
        "Session: {} ({} history turns, {} tokens, via {})",
        metadata.session_id,
        metadata.used_history_turns,
        metadata.used_history_tokens,
        metadata.generator
    );
}
