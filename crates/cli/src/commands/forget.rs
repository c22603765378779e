//! Forget command handler.

use super::{open_service, print_json};
use ark_core::{config::AppConfig, AppResult};
use clap::Args;

/// Remove every chunk of an owner
#[derive(Args, Debug)]
pub struct ForgetCommand {
    /// Owner id, e.g. a document id or "session:<id>"
    pub owner: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ForgetCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing forget command for owner '{}'", self.owner);

        let service = open_service(config)?;
        let report = service.forget_owner(&self.owner).await?;

        if self.json {
            print_json(&report)
        } else {
            println!(
                "Removed {} chunks for '{}'",
                report.in_process + report.persisted,
                self.owner
            );
            Ok(())
        }
    }
}
