//! Ingest command handler.

use super::{open_service, print_json};
use ark_core::{config::AppConfig, AppError, AppResult};
use ark_knowledge::{ChunkOptions, SourceType};
use clap::Args;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Chunk, embed and index text
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Owner id of the chunks; with --dir, a prefix for each file's owner id
    pub owner: String,

    /// Text to ingest
    #[arg(long, conflicts_with_all = ["file", "dir"])]
    pub text: Option<String>,

    /// Text or Markdown file to ingest
    #[arg(short, long, conflicts_with = "dir")]
    pub file: Option<PathBuf>,

    /// Directory whose .txt and .md files are ingested one owner per file
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Token budget per chunk
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Tokens repeated between consecutive chunks
    #[arg(long)]
    pub overlap: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Chunks created for one owner.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestReport {
    owner_id: String,
    chunk_ids: Vec<String>,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command for owner '{}'", self.owner);

        let documents = self.collect_documents()?;
        if documents.is_empty() {
            return Err(AppError::Validation(
                "Nothing to ingest: pass --text, --file or a --dir with .txt/.md files".to_string(),
            ));
        }

        let service = open_service(config)?;
        let defaults = service.chunk_options();
        let options = ChunkOptions::new(
            self.max_tokens.unwrap_or(defaults.max_tokens),
            self.overlap.unwrap_or(defaults.overlap_tokens),
        );

        let mut reports = Vec::with_capacity(documents.len());
        for (owner_id, text, source_type) in documents {
            let tags = BTreeMap::from([(
                "content_type".to_string(),
                source_type.as_str().to_string(),
            )]);
            let chunk_ids = service
                .ingest_document(&owner_id, &text, source_type, options, tags)
                .await?;
            reports.push(IngestReport {
                owner_id,
                chunk_ids,
            });
        }

        // Let the store catch up before the process exits
        service.wait_idle().await;

        if self.json {
            print_json(&reports)?;
        } else {
            for report in &reports {
                println!(
                    "Indexed {} chunks for '{}'",
                    report.chunk_ids.len(),
                    report.owner_id
                );
            }
            if !service.has_store() {
                println!("(no store configured: chunks were not persisted)");
            }
        }

        Ok(())
    }

    /// Owner id, text and format of every document to ingest.
    fn collect_documents(&self) -> AppResult<Vec<Document>> {
        if let Some(text) = &self.text {
            return Ok(vec![(self.owner.clone(), text.clone(), SourceType::Text)]);
        }

        if let Some(file) = &self.file {
            let text = std::fs::read_to_string(file)?;
            let source_type = source_type_of(file).unwrap_or(SourceType::Text);
            return Ok(vec![(self.owner.clone(), text, source_type)]);
        }

        match &self.dir {
            Some(dir) => collect_dir(dir, &self.owner),
            None => Ok(Vec::new()),
        }
    }
}

type Document = (String, String, SourceType);

fn source_type_of(path: &Path) -> Option<SourceType> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(SourceType::parse)
}

fn collect_dir(dir: &Path, prefix: &str) -> AppResult<Vec<Document>> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let Some(source_type) = source_type_of(path) else {
            tracing::debug!("Skipping unsupported file {:?}", path);
            continue;
        };

        let relative = path.strip_prefix(dir).unwrap_or(path);
        let owner_id = format!("{}/{}", prefix, relative.to_string_lossy().replace('\\', "/"));
        documents.push((owner_id, std::fs::read_to_string(path)?, source_type));
    }

    tracing::info!("Found {} documents in {:?}", documents.len(), dir);
    Ok(documents)
}
