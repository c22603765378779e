//! Prompts command handler.

use super::print_json;
use ark_core::{config::AppConfig, AppResult};
use ark_prompt::list_prompts;
use clap::Args;

/// List available prompt definitions
#[derive(Args, Debug)]
pub struct PromptsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PromptsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let prompts = list_prompts(&config.workspace)?;

        if self.json {
            return print_json(&prompts);
        }
        for id in prompts {
            println!("{}", id);
        }
        Ok(())
    }
}
