//! Request and response types of the orchestrator.

use crate::index::IndexedItem;
use crate::memory::HistoryHints;
use ark_core::AppResult;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;

/// Confidence reported with every answer.
///
/// Generation backends do not expose a calibrated score, so the value is
/// a constant.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// A question plus the hints that control history selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AskRequest {
    pub question: String,

    pub hints: HistoryHints,

    /// Restrict retrieval to these owners; empty searches everything
    pub owner_ids: Vec<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_hints(mut self, hints: HistoryHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_ids.push(owner_id.into());
        self
    }
}

/// Where part of an answer came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub owner_id: String,

    /// Leading characters of the retrieved chunk
    pub content_snippet: String,

    pub relevance_score: f32,
}

impl SourceRef {
    /// Build a reference whose snippet keeps the first `snippet_chars`
    /// characters of the item.
    pub fn from_item(item: &IndexedItem, score: f32, snippet_chars: usize) -> Self {
        Self {
            owner_id: item.owner_id.clone(),
            content_snippet: item.content.chars().take(snippet_chars).collect(),
            relevance_score: score,
        }
    }
}

/// Session bookkeeping returned with an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskMetadata {
    pub session_id: String,

    /// False when the id was generated for this call
    pub session_supplied: bool,

    pub used_history_turns: usize,

    pub used_history_tokens: usize,

    /// Backend that produced the answer, "placeholder" when none is configured
    pub generator: String,
}

impl AskMetadata {
    /// Flatten into the string map exposed to transports.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("session_id".to_string(), self.session_id.clone()),
            (
                "used_history_turns".to_string(),
                self.used_history_turns.to_string(),
            ),
            (
                "used_history_tokens".to_string(),
                self.used_history_tokens.to_string(),
            ),
            ("generator".to_string(), self.generator.clone()),
        ])
    }
}

/// A grounded answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub confidence: f32,
    pub sources: Vec<SourceRef>,
    pub metadata: AskMetadata,
}

/// One event of a streamed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental answer text
    Token { content: String },

    /// Last event of a stream.
    ///
    /// `content` is empty after tokens were streamed and holds the whole
    /// answer when generation fell back to a unary call.
    Final {
        content: String,
        sources: Vec<SourceRef>,
        metadata: AskMetadata,
    },
}

impl StreamEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

/// Stream of answer events. Dropping it cancels generation.
pub type AskStream = Pin<Box<dyn Stream<Item = AppResult<StreamEvent>> + Send>>;

/// A pre-chunked piece of content for [`upsert_chunks`](crate::RagService::upsert_chunks).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInput {
    pub content: String,

    /// Page number in the source document; 0 means unknown
    #[serde(default)]
    pub page: Option<u32>,

    /// Position in an audio or video source, e.g. "00:01:30"
    #[serde(default)]
    pub timecode: Option<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ChunkInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Caller metadata plus `page` and `timecode` when they carry a value.
    pub fn tagged_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = self.metadata.clone();
        if let Some(page) = self.page.filter(|p| *p != 0) {
            metadata.insert("page".to_string(), page.to_string());
        }
        if let Some(timecode) = self.timecode.as_ref().filter(|t| !t.is_empty()) {
            metadata.insert("timecode".to_string(), timecode.clone());
        }
        metadata
    }
}
