//! Ark Study CLI
//!
//! Main entry point for the `ark` command-line tool: ingest notes, search
//! them, and ask grounded questions with per-session memory.

mod commands;

use ark_core::{config::AppConfig, logging, AppResult};
use clap::{Parser, Subcommand};
use commands::{
    AskCommand, ChatCommand, ForgetCommand, IngestCommand, ProcessCommand, PromptsCommand,
    SearchCommand,
};
use std::path::PathBuf;

/// Ark Study - retrieval-augmented answers over your own notes
#[derive(Parser, Debug)]
#[command(name = "ark")]
#[command(about = "Retrieval-augmented answers over your own notes", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "ARK_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file (default: .ark/config.yaml)
    #[arg(short, long, global = true, env = "ARK_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite store path; without one, indexed chunks live only for this run
    #[arg(short, long, global = true, env = "ARK_STORE_PATH")]
    store: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk, embed and index text
    Ingest(IngestCommand),

    /// Handle one ingestion message (JSON)
    Process(ProcessCommand),

    /// Search indexed chunks
    Search(SearchCommand),

    /// Ask a question grounded in indexed chunks
    Ask(AskCommand),

    /// Interactive conversation with session memory
    Chat(ChatCommand),

    /// Remove every chunk of an owner
    Forget(ForgetCommand),

    /// List available prompt definitions
    Prompts(PromptsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load_with(cli.workspace.clone(), cli.config.clone())?;
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.store,
        cli.log_level,
        cli.verbose,
        cli.no_color,
        cli.log_json,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)?;

    tracing::info!("Ark CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.llm.provider);
    tracing::debug!("Store: {:?}", config.store.path);

    config.validate()?;
    config.ensure_ark_dir()?;

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Process(_) => "process",
        Commands::Search(_) => "search",
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Forget(_) => "forget",
        Commands::Prompts(_) => "prompts",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Process(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::Forget(cmd) => cmd.execute(&config).await,
        Commands::Prompts(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
