//! Vector index abstraction.
//!
//! Two backends share one contract:
//! - [`ExactIndex`]: in-process linear scan, the reference for ranking
//! - [`SqliteIndex`]: the delegated store, adding lexical (FTS5) relevance
//!   for [`VectorIndex::hybrid_search`]

pub mod exact;
pub mod sqlite;

pub use exact::ExactIndex;
pub use sqlite::SqliteIndex;

use ark_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content to be indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Groups chunks from the same document or conversation
    pub owner_id: String,

    pub content: String,

    /// Position of the chunk within its owner
    pub sequence_index: usize,

    pub vector: Vec<f32>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A chunk as stored by an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedItem {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    pub sequence_index: usize,
    pub vector: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl IndexedItem {
    /// Assign a fresh id and timestamp to a chunk.
    pub fn from_chunk(chunk: Chunk) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: chunk.owner_id,
            content: chunk.content,
            sequence_index: chunk.sequence_index,
            vector: chunk.vector,
            metadata: chunk.metadata,
            created_at: Utc::now(),
        }
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub item: IndexedItem,
    pub score: f32,
}

/// Restricts the items eligible for scoring.
///
/// Applied before the top-k cut. Empty filters accept every item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// Accept items owned by any of these ids
    pub owner_ids: Vec<String>,

    /// Exact-match metadata constraints
    pub metadata: BTreeMap<String, String>,
}

impl SearchFilters {
    /// Restrict to a single owner.
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_ids: vec![owner_id.into()],
            metadata: BTreeMap::new(),
        }
    }

    /// Require `metadata[key] == value`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.owner_ids.is_empty() && self.metadata.is_empty()
    }

    /// Whether `item` is eligible.
    pub fn matches(&self, item: &IndexedItem) -> bool {
        if !self.owner_ids.is_empty() && !self.owner_ids.contains(&item.owner_id) {
            return false;
        }
        self.metadata
            .iter()
            .all(|(key, value)| item.metadata.get(key) == Some(value))
    }
}

/// Weights of the two hybrid-search terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub vector: f32,
    pub text: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            vector: 0.7,
            text: 0.3,
        }
    }
}

/// Trait for vector index backends.
///
/// Items are append-only: upserting the same owner twice creates two
/// independent items. Results are ordered by descending score, ties by
/// insertion order.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name used in logs ("exact", "sqlite").
    fn backend_name(&self) -> &str;

    /// Store an item as is, keeping its id and timestamp.
    async fn insert(&self, item: IndexedItem) -> AppResult<()>;

    /// Store a chunk under a newly generated id and return the id.
    async fn upsert(&self, chunk: Chunk) -> AppResult<String> {
        let item = IndexedItem::from_chunk(chunk);
        let id = item.id.clone();
        self.insert(item).await?;
        Ok(id)
    }

    /// Top-k eligible items by dot product with `query`.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<SearchHit>>;

    /// Top-k by a weighted mix of vector similarity and lexical relevance.
    ///
    /// Backends without a lexical signal rank by vector similarity alone.
    async fn hybrid_search(
        &self,
        query: &[f32],
        _query_text: &str,
        top_k: usize,
        _weights: HybridWeights,
        filters: &SearchFilters,
    ) -> AppResult<Vec<SearchHit>> {
        self.search(query, top_k, filters).await
    }

    /// Every item of an owner, in insertion order.
    async fn items_by_owner(&self, owner_id: &str) -> AppResult<Vec<IndexedItem>>;

    /// Remove an owner's items; returns how many were removed.
    async fn delete_by_owner(&self, owner_id: &str) -> AppResult<usize>;

    /// Number of items stored for an owner.
    async fn count_by_owner(&self, owner_id: &str) -> AppResult<usize>;

    /// Total number of items.
    async fn len(&self) -> AppResult<usize>;

    async fn is_empty(&self) -> AppResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Dot product of two equally long vectors.
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; 0 when either vector is zero or lengths differ.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (norm_a * norm_b)
}

/// Sort hits by descending score (stable) and keep the best `top_k`.
pub(crate) fn rank(mut hits: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(top_k);
    hits
}

pub(crate) fn check_dimension(expected: usize, actual: usize, what: &str) -> AppResult<()> {
    if expected != actual {
        return Err(AppError::Knowledge(format!(
            "{} has dimension {}, index expects {}",
            what, actual, expected
        )));
    }
    Ok(())
}
