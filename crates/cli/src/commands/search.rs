//! Search command handler.

use super::{open_service, print_json};
use ark_core::{config::AppConfig, AppResult};
use ark_knowledge::SearchFilters;
use clap::Args;

/// Search indexed chunks
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of results (default from config)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Only search these owners
    #[arg(long)]
    pub owner: Vec<String>,

    /// Only return chunks whose metadata has KEY=VALUE
    #[arg(long, value_name = "KEY=VALUE")]
    pub tag: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");

        let service = open_service(config)?;
        let top_k = self.top_k.unwrap_or(service.settings().search_top_k);

        let mut filters = SearchFilters {
            owner_ids: self.owner.clone(),
            ..Default::default()
        };
        for tag in &self.tag {
            match tag.split_once('=') {
                Some((key, value)) => filters = filters.with_metadata(key, value),
                None => tracing::warn!("Ignoring malformed tag filter '{}'", tag),
            }
        }

        let hits = service.search(&self.query, top_k, &filters).await?;
        tracing::debug!("Search returned {} hits", hits.len());

        if self.json {
            let output: Vec<_> = hits
                .iter()
                .map(|hit| {
                    serde_json::json!({
                        "id": hit.item.id,
                        "ownerId": hit.item.owner_id,
                        "sequenceIndex": hit.item.sequence_index,
                        "score": hit.score,
                        "content": hit.item.content,
                        "metadata": hit.item.metadata,
                    })
                })
                .collect();
            return print_json(&output);
        }

        if hits.is_empty() {
            println!("No results");
        }
        for hit in &hits {
            println!(
                "{:.3}  {}#{}  {}",
                hit.score,
                hit.item.owner_id,
                hit.item.sequence_index,
                hit.item.content.replace('\n', " ")
            );
        }

        Ok(())
    }
}
