//! Command handlers for the Ark CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod chat;
pub mod forget;
pub mod ingest;
pub mod process;
pub mod prompts;
pub mod search;

pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use forget::ForgetCommand;
pub use ingest::IngestCommand;
pub use process::ProcessCommand;
pub use prompts::PromptsCommand;
pub use search::SearchCommand;

use ark_core::{config::AppConfig, AppResult};
use ark_knowledge::{RagService, SourceRef};
use serde::Serialize;

/// Build the service for one command run.
pub(crate) fn open_service(config: &AppConfig) -> AppResult<RagService> {
    let service = RagService::from_config(config)?;
    if !service.has_store() {
        tracing::debug!("No store configured; chunks are kept for this run only");
    }
    if !service.has_generator() {
        tracing::debug!("No generation backend configured; answers are placeholders");
    }
    Ok(service)
}

/// Pretty-print a value as JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn print_sources(sources: &[SourceRef]) {
    if sources.is_empty() {
        println!("Sources: (no sources available)");
        return;
    }

    println!("Sources:");
    for source in sources {
        println!(
            "- {} ({:.3}): {}",
            source.owner_id,
            source.relevance_score,
            source.content_snippet.replace('\n', " ")
        );
    }
}
