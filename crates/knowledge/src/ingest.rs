//! Ingestion messages and content sources.
//!
//! A trigger (queue consumer, CLI) hands over an [`IngestionMessage`]; the
//! orchestrator validates it, resolves its locator through a
//! [`ContentSource`] and indexes the text once per owner.

use ark_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Request to index one source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionMessage {
    #[serde(default, alias = "ownerId", alias = "file_id")]
    pub owner_id: Option<String>,

    #[serde(default, alias = "sourceLocator", alias = "file_path")]
    pub source_locator: Option<String>,

    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,

    /// "txt", "md"...; inferred from the locator's extension when absent
    #[serde(default, alias = "sourceType", alias = "file_type")]
    pub source_type: Option<String>,
}

/// Text formats that can be indexed without a binary parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Markdown,
}

impl SourceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "txt" | "text" | "plain" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
        }
    }
}

/// A message that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidIngestion {
    pub owner_id: String,
    pub source_locator: String,
    pub user_id: Option<String>,
    pub source_type: SourceType,
}

impl IngestionMessage {
    /// Check required fields and resolve the source type.
    pub fn validate(&self) -> AppResult<ValidIngestion> {
        let required = |value: &Option<String>, name: &str| -> AppResult<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| AppError::Validation(format!("Missing {}", name)))
        };

        let owner_id = required(&self.owner_id, "owner_id")?;
        let source_locator = required(&self.source_locator, "source_locator")?;

        let declared = self
            .source_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("unknown"));
        let source_type = match declared {
            Some(t) => SourceType::parse(t)
                .ok_or_else(|| AppError::Validation(format!("Unsupported source type: {}", t)))?,
            None => Path::new(&source_locator)
                .extension()
                .and_then(|e| e.to_str())
                .and_then(SourceType::parse)
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "Cannot infer source type of {}",
                        source_locator
                    ))
                })?,
        };

        Ok(ValidIngestion {
            owner_id,
            source_locator,
            user_id: self.user_id.clone().filter(|u| !u.trim().is_empty()),
            source_type,
        })
    }
}

/// Result of processing one ingestion message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// New chunks were indexed
    Indexed { chunk_ids: Vec<String> },

    /// The owner already had chunks; nothing was done
    AlreadyIndexed { existing: usize },

    /// The message was invalid and is not worth retrying
    Dropped { reason: String },
}

/// Resolves a source locator to text.
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, locator: &str, source_type: SourceType) -> AppResult<String>;
}

/// Reads text files below a root directory.
#[derive(Debug, Clone)]
pub struct FsContentSource {
    root: PathBuf,
}

impl FsContentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join `locator` to the root, refusing paths that escape it.
    fn resolve(&self, locator: &str) -> AppResult<PathBuf> {
        let relative = Path::new(locator);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(AppError::Validation(format!(
                "Source locator must stay inside the content root: {}",
                locator
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl ContentSource for FsContentSource {
    async fn fetch(&self, locator: &str, source_type: SourceType) -> AppResult<String> {
        let path = self.resolve(locator)?;
        tracing::debug!("Reading {} source from {:?}", source_type.as_str(), path);
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}
