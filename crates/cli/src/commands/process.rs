//! Process command handler.
//!
//! Feeds one ingestion message through the orchestrator, the way a queue
//! consumer would.

use super::{open_service, print_json};
use ark_core::{config::AppConfig, AppError, AppResult};
use ark_knowledge::{IngestOutcome, IngestionMessage};
use clap::Args;
use std::path::PathBuf;

/// Handle one ingestion message (JSON)
#[derive(Args, Debug)]
pub struct ProcessCommand {
    /// Message JSON, e.g. '{"owner_id":"42","source_locator":"notes/week1.md"}'
    pub message: Option<String>,

    /// Read the message from a file
    #[arg(short, long, conflicts_with = "message")]
    pub file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ProcessCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing process command");

        let raw = match (&self.message, &self.file) {
            (Some(message), _) => message.clone(),
            (None, Some(file)) => std::fs::read_to_string(file)?,
            (None, None) => {
                return Err(AppError::Validation(
                    "No message provided: pass JSON or --file".to_string(),
                ))
            }
        };
        let message: IngestionMessage = serde_json::from_str(&raw)?;

        let service = open_service(config)?;
        let outcome = service.process_ingestion_message(&message).await?;
        service.wait_idle().await;

        if self.json {
            return print_json(&outcome);
        }

        match outcome {
            IngestOutcome::Indexed { chunk_ids } => {
                println!("Indexed {} chunks", chunk_ids.len())
            }
            IngestOutcome::AlreadyIndexed { existing } => {
                println!("Already indexed ({} chunks), nothing to do", existing)
            }
            IngestOutcome::Dropped { reason } => println!("Dropped: {}", reason),
        }

        Ok(())
    }
}
