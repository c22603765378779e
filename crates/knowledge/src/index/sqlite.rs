//! SQLite-backed delegated index with FTS5 lexical relevance.

use super::{
    check_dimension, cosine_similarity, dot, rank, HybridWeights, IndexedItem, SearchFilters,
    SearchHit, VectorIndex,
};
use ark_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS chunks (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        owner_id TEXT NOT NULL,
        sequence_index INTEGER NOT NULL,
        content TEXT NOT NULL,
        vector BLOB NOT NULL,
        metadata TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_owner ON chunks(owner_id);

    CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(content);
"#;

/// Persistent index stored in a single SQLite file.
///
/// Vector similarity is computed in process over the stored vectors;
/// lexical relevance comes from FTS5's BM25 ranking. All SQLite calls run
/// on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    conn: Arc<Mutex<Connection>>,
    dimension: usize,
    location: Option<PathBuf>,
}

impl SqliteIndex {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path, dimension: usize) -> AppResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Storage(format!("Failed to create store directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open SQLite store: {}", e)))?;
        let index = Self::from_connection(conn, dimension, Some(db_path.to_path_buf()))?;

        tracing::debug!("Opened SQLite store at {:?}", db_path);
        Ok(index)
    }

    /// A private store that lives as long as this value.
    pub fn open_in_memory(dimension: usize) -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Storage(format!("Failed to open SQLite store: {}", e)))?;
        Self::from_connection(conn, dimension, None)
    }

    fn from_connection(
        conn: Connection,
        dimension: usize,
        location: Option<PathBuf>,
    ) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension,
            location,
        })
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AppError::Storage("SQLite connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| AppError::Storage(format!("SQLite task failed: {}", e)))?
    }

    async fn try_hybrid(
        &self,
        query: &[f32],
        query_text: &str,
        top_k: usize,
        weights: HybridWeights,
        filters: &SearchFilters,
    ) -> AppResult<Vec<SearchHit>> {
        let fts = fts_query(query_text);
        let (rows, lexical) = self
            .with_conn(move |conn| {
                let rows = load_items(conn, None)?;
                let lexical = match fts {
                    Some(q) => lexical_relevance(conn, &q)?,
                    None => HashMap::new(),
                };
                Ok((rows, lexical))
            })
            .await?;

        let eligible: Vec<(i64, IndexedItem)> = rows
            .into_iter()
            .filter(|(_, item)| filters.matches(item))
            .collect();

        // Normalize BM25 relevance by the best eligible match
        let best = eligible
            .iter()
            .filter_map(|(rowid, _)| lexical.get(rowid))
            .fold(0.0f64, |acc, r| acc.max(*r));

        let hits = eligible
            .into_iter()
            .map(|(rowid, item)| {
                let text_term = match lexical.get(&rowid) {
                    Some(r) if best > 0.0 => (r / best) as f32,
                    _ => 0.0,
                };
                let vector_term = cosine_similarity(query, &item.vector);
                SearchHit {
                    score: weights.vector * vector_term + weights.text * text_term,
                    item,
                }
            })
            .collect();

        Ok(rank(hits, top_k))
    }
}

/// Build an FTS5 query matching any alphanumeric term of `text`.
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();

    (!terms.is_empty()).then(|| terms.join(" OR "))
}

type RawRow = (i64, String, String, i64, String, Vec<u8>, String, String);

/// Load items in insertion order, optionally for one owner.
fn load_items(conn: &Connection, owner_id: Option<&str>) -> AppResult<Vec<(i64, IndexedItem)>> {
    let sql = match owner_id {
        Some(_) => {
            "SELECT seq, id, owner_id, sequence_index, content, vector, metadata, created_at \
             FROM chunks WHERE owner_id = ?1 ORDER BY seq"
        }
        None => {
            "SELECT seq, id, owner_id, sequence_index, content, vector, metadata, created_at \
             FROM chunks ORDER BY seq"
        }
    };

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    };

    let raw: Vec<RawRow> = match owner_id {
        Some(owner) => stmt.query_map(params![owner], map_row),
        None => stmt.query_map([], map_row),
    }
    .and_then(|rows| rows.collect())
    .map_err(|e| AppError::Storage(format!("Failed to query chunks: {}", e)))?;

    raw.into_iter().map(decode_row).collect()
}

fn decode_row(raw: RawRow) -> AppResult<(i64, IndexedItem)> {
    let (rowid, id, owner_id, sequence_index, content, vector, metadata, created_at) = raw;

    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| AppError::Storage(format!("Invalid timestamp for chunk {}: {}", id, e)))?
        .with_timezone(&Utc);

    Ok((
        rowid,
        IndexedItem {
            id,
            owner_id,
            sequence_index: usize::try_from(sequence_index).unwrap_or_default(),
            content,
            vector: bytes_to_vector(&vector)?,
            metadata,
            created_at,
        },
    ))
}

/// BM25 relevance (higher is better) of every row matching `fts`.
fn lexical_relevance(conn: &Connection, fts: &str) -> AppResult<HashMap<i64, f64>> {
    let mut stmt = conn
        .prepare("SELECT rowid, bm25(chunks_fts) FROM chunks_fts WHERE chunks_fts MATCH ?1")
        .map_err(|e| AppError::Storage(format!("Failed to prepare lexical query: {}", e)))?;

    let scores = stmt
        .query_map(params![fts], |row| {
            // bm25() is lower-is-better and negative for matches
            Ok((row.get::<_, i64>(0)?, (-row.get::<_, f64>(1)?).max(0.0)))
        })
        .and_then(|rows| rows.collect::<rusqlite::Result<HashMap<_, _>>>())
        .map_err(|e| AppError::Storage(format!("Lexical query failed: {}", e)))?;

    Ok(scores)
}

fn insert_item(conn: &mut Connection, item: &IndexedItem) -> AppResult<bool> {
    let metadata = serde_json::to_string(&item.metadata)?;
    let tx = conn
        .transaction()
        .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

    let inserted = tx
        .execute(
            "INSERT OR IGNORE INTO chunks \
             (id, owner_id, sequence_index, content, vector, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item.id,
                item.owner_id,
                item.sequence_index as i64,
                item.content,
                vector_to_bytes(&item.vector),
                metadata,
                item.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to insert chunk: {}", e)))?;

    // Already stored under this id
    if inserted == 0 {
        return Ok(false);
    }

    let rowid = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO chunks_fts (rowid, content) VALUES (?1, ?2)",
        params![rowid, item.content],
    )
    .map_err(|e| AppError::Storage(format!("Failed to index chunk text: {}", e)))?;

    tx.commit()
        .map_err(|e| AppError::Storage(format!("Failed to commit chunk: {}", e)))?;
    Ok(true)
}

fn delete_owner(conn: &mut Connection, owner_id: &str) -> AppResult<usize> {
    let tx = conn
        .transaction()
        .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

    tx.execute(
        "DELETE FROM chunks_fts WHERE rowid IN (SELECT seq FROM chunks WHERE owner_id = ?1)",
        params![owner_id],
    )
    .map_err(|e| AppError::Storage(format!("Failed to delete chunk text: {}", e)))?;

    let removed = tx
        .execute("DELETE FROM chunks WHERE owner_id = ?1", params![owner_id])
        .map_err(|e| AppError::Storage(format!("Failed to delete chunks: {}", e)))?;

    tx.commit()
        .map_err(|e| AppError::Storage(format!("Failed to commit delete: {}", e)))?;
    Ok(removed)
}

fn count(conn: &Connection, owner_id: Option<&str>) -> AppResult<usize> {
    let n: Option<i64> = match owner_id {
        Some(owner) => conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE owner_id = ?1",
                params![owner],
                |row| row.get(0),
            )
            .optional(),
        None => conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .optional(),
    }
    .map_err(|e| AppError::Storage(format!("Failed to count chunks: {}", e)))?;

    Ok(n.and_then(|n| usize::try_from(n).ok()).unwrap_or(0))
}

/// Convert a vector to little-endian bytes for storage.
fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert stored bytes back to a vector.
fn bytes_to_vector(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Storage("Invalid vector bytes length".to_string()));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[async_trait::async_trait]
impl VectorIndex for SqliteIndex {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, item: IndexedItem) -> AppResult<()> {
        check_dimension(self.dimension, item.vector.len(), "Vector")?;
        let inserted = self.with_conn(move |conn| insert_item(conn, &item)).await?;
        if !inserted {
            tracing::debug!("Chunk already present in SQLite store, skipped");
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<SearchHit>> {
        check_dimension(self.dimension, query.len(), "Query vector")?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = self.with_conn(|conn| load_items(conn, None)).await?;
        let hits = rows
            .into_iter()
            .map(|(_, item)| item)
            .filter(|item| filters.matches(item))
            .map(|item| SearchHit {
                score: dot(query, &item.vector),
                item,
            })
            .collect();

        Ok(rank(hits, top_k))
    }

    async fn hybrid_search(
        &self,
        query: &[f32],
        query_text: &str,
        top_k: usize,
        weights: HybridWeights,
        filters: &SearchFilters,
    ) -> AppResult<Vec<SearchHit>> {
        check_dimension(self.dimension, query.len(), "Query vector")?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        match self
            .try_hybrid(query, query_text, top_k, weights, filters)
            .await
        {
            Ok(hits) => {
                tracing::debug!("Hybrid search returned {} hits", hits.len());
                Ok(hits)
            }
            Err(e) => {
                tracing::warn!("Hybrid search failed, using vector search: {}", e);
                self.search(query, top_k, filters).await
            }
        }
    }

    async fn items_by_owner(&self, owner_id: &str) -> AppResult<Vec<IndexedItem>> {
        let owner = owner_id.to_string();
        let rows = self
            .with_conn(move |conn| load_items(conn, Some(&owner)))
            .await?;
        Ok(rows.into_iter().map(|(_, item)| item).collect())
    }

    async fn delete_by_owner(&self, owner_id: &str) -> AppResult<usize> {
        let owner = owner_id.to_string();
        let removed = self.with_conn(move |conn| delete_owner(conn, &owner)).await?;
        tracing::info!("Deleted {} chunks of '{}' from SQLite store", removed, owner_id);
        Ok(removed)
    }

    async fn count_by_owner(&self, owner_id: &str) -> AppResult<usize> {
        let owner = owner_id.to_string();
        self.with_conn(move |conn| count(conn, Some(&owner))).await
    }

    async fn len(&self) -> AppResult<usize> {
        self.with_conn(|conn| count(conn, None)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Chunk;
    use tempfile::TempDir;

    fn chunk(owner: &str, content: &str, vector: Vec<f32>) -> Chunk {
        Chunk {
            owner_id: owner.to_string(),
            content: content.to_string(),
            sequence_index: 0,
            vector,
            metadata: BTreeMap::from([("content_type".to_string(), "notes".to_string())]),
        }
    }

    #[test]
    fn test_fts_query() {
        assert_eq!(
            fts_query("What's Rust?").as_deref(),
            Some("\"what\" OR \"s\" OR \"rust\"")
        );
        assert_eq!(fts_query("  ?! "), None);
    }

    #[test]
    fn test_vector_bytes() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(bytes_to_vector(&vector_to_bytes(&v)).unwrap(), v);
        assert!(bytes_to_vector(&[0, 1, 2]).is_err());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store/chunks.db");

        let id = {
            let index = SqliteIndex::open(&path, 2).unwrap();
            index.upsert(chunk("m1", "persisted text", vec![1.0, 0.0])).await.unwrap()
        };

        let index = SqliteIndex::open(&path, 2).unwrap();
        let items = index.items_by_owner("m1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].metadata["content_type"], "notes");
        assert_eq!(index.location(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_vector_search_matches_exact_semantics() {
        let index = SqliteIndex::open_in_memory(2).unwrap();
        index.upsert(chunk("m", "x", vec![1.0, 0.0])).await.unwrap();
        index.upsert(chunk("m", "y", vec![0.0, 1.0])).await.unwrap();
        index.upsert(chunk("m", "xy", vec![0.7, 0.7])).await.unwrap();

        let hits = index
            .search(&[1.0, 0.0], 2, &SearchFilters::default())
            .await
            .unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.item.content.as_str()).collect();
        assert_eq!(names, vec!["x", "xy"]);
    }

    #[tokio::test]
    async fn test_hybrid_lexical_breaks_vector_tie() {
        let index = SqliteIndex::open_in_memory(2).unwrap();
        index
            .upsert(chunk("m", "photosynthesis converts light", vec![0.6, 0.8]))
            .await
            .unwrap();
        index
            .upsert(chunk("m", "mitochondria produce energy", vec![0.6, 0.8]))
            .await
            .unwrap();

        let hits = index
            .hybrid_search(
                &[0.6, 0.8],
                "what does mitochondria do",
                2,
                HybridWeights::default(),
                &SearchFilters::default(),
            )
            .await
            .unwrap();

        assert_eq!(hits[0].item.content, "mitochondria produce energy");
        // Full vector match plus the best lexical match
        assert!((hits[0].score - 1.0).abs() < 1e-4);
        assert!((hits[1].score - 0.7).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_hybrid_respects_filters() {
        let index = SqliteIndex::open_in_memory(2).unwrap();
        index.upsert(chunk("a", "alpha topic", vec![1.0, 0.0])).await.unwrap();
        index.upsert(chunk("b", "alpha topic", vec![1.0, 0.0])).await.unwrap();

        let hits = index
            .hybrid_search(
                &[1.0, 0.0],
                "alpha",
                5,
                HybridWeights::default(),
                &SearchFilters::owner("b"),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.owner_id, "b");
    }

    #[tokio::test]
    async fn test_hybrid_falls_back_to_vector_search() {
        let index = SqliteIndex::open_in_memory(2).unwrap();
        index.upsert(chunk("m", "alpha words", vec![2.0, 0.0])).await.unwrap();
        index.upsert(chunk("m", "beta words", vec![0.5, 0.5])).await.unwrap();

        // Without the lexical table the combined query cannot run
        index
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE chunks_fts")
                    .map_err(|e| AppError::Storage(e.to_string()))
            })
            .await
            .unwrap();

        let hits = index
            .hybrid_search(
                &[1.0, 0.0],
                "alpha",
                5,
                HybridWeights::default(),
                &SearchFilters::default(),
            )
            .await
            .unwrap();

        // Raw dot products, no cosine normalization or lexical term
        let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
        assert_eq!(scores, vec![2.0, 0.5]);
        assert_eq!(hits[0].item.content, "alpha words");
    }

    #[tokio::test]
    async fn test_reinserting_same_item_is_ignored() {
        let index = SqliteIndex::open_in_memory(1).unwrap();
        let item = IndexedItem::from_chunk(chunk("m", "once", vec![1.0]));
        index.insert(item.clone()).await.unwrap();
        index.insert(item).await.unwrap();
        assert_eq!(index.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_owner_clears_lexical_rows() {
        let index = SqliteIndex::open_in_memory(1).unwrap();
        index.upsert(chunk("gone", "vanishing words", vec![1.0])).await.unwrap();
        index.upsert(chunk("kept", "staying words", vec![1.0])).await.unwrap();

        assert_eq!(index.delete_by_owner("gone").await.unwrap(), 1);
        assert_eq!(index.count_by_owner("gone").await.unwrap(), 0);
        assert_eq!(index.len().await.unwrap(), 1);

        let hits = index
            .hybrid_search(&[1.0], "vanishing", 5, HybridWeights::default(), &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.owner_id, "kept");
        // No lexical match left, vector term only
        assert!((hits[0].score - 0.7).abs() < 1e-4);
    }
}
