//! Chat command handler.
//!
//! A read-eval loop over stdin that keeps one session, so each question
//! sees the history of the previous ones.

use super::ask::render_stream;
use super::{open_service, print_sources};
use ark_core::{config::AppConfig, AppResult};
use ark_knowledge::{AskRequest, HistoryHints};
use clap::Args;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive conversation with session memory
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Session id; generated on the first question when absent
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

    /// Print the sources after each answer
    #[arg(long)]
    pub show_sources: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let service = open_service(config)?;
        let mut session = self.session.clone();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        eprintln!("Type a question, or 'exit' to quit.");
        loop {
            eprint!("> ");
            std::io::stderr().flush().ok();

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if matches!(question, "exit" | "quit") {
                break;
            }

            let request = AskRequest {
                question: question.to_string(),
                hints: HistoryHints {
                    session_id: session.clone(),
                    max_history_turns: self.max_history_turns,
                    max_history_tokens: self.max_history_tokens,
                },
                owner_ids: self.owner.clone(),
            };

            // A failed answer ends the turn, not the conversation
            let stream = match service.ask_stream(request).await {
                Ok(stream) => stream,
                Err(e) => {
                    eprintln!("error: {}", e);
                    continue;
                }
            };
            match render_stream(stream).await {
                Ok((sources, metadata)) => {
                    if self.show_sources {
                        print_sources(&sources);
                    }
                    session.get_or_insert(metadata.session_id);
                }
                Err(e) => eprintln!("\nerror: {}", e),
            }
        }

        service.wait_idle().await;
        if let Some(id) = session {
            eprintln!("Session: {}", id);
        }
        Ok(())
    }
}
