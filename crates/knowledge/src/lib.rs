//! Retrieval-augmented answering over locally indexed text.
//!
//! The pipeline:
//! - [`chunker`]: token-bounded chunks with overlap, optionally split at headings
//! - [`embeddings`]: deterministic local vectors or a remote embedding model
//! - [`index`]: exact in-process search and a SQLite store with hybrid ranking
//! - [`memory`]: per-session conversation history and its selection policy
//! - [`rag`]: the orchestrator answering questions, unary or streamed
//!
//! ```no_run
//! use ark_core::RagSettings;
//! use ark_knowledge::{AskRequest, RagService};
//!
//! # async fn example() -> ark_core::AppResult<()> {
//! let service = RagService::builder(RagSettings::default()).build();
//! service
//!     .ingest("notes", "Rust has ownership and borrowing.", service.chunk_options())
//!     .await?;
//! let response = service.ask(AskRequest::new("What does Rust have?")).await?;
//! println!("{}", response.answer);
//! service.wait_idle().await;
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod chunker;
pub mod embeddings;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod rag;
pub mod tokens;

#[cfg(test)]
mod tests;

pub use background::BackgroundTasks;
pub use chunker::{chunk_sections, chunk_text, heading_level, ChunkOptions, SectionChunk};
pub use embeddings::{EmbeddingEngine, EmbeddingProvider};
pub use index::{
    Chunk, ExactIndex, HybridWeights, IndexedItem, SearchFilters, SearchHit, SqliteIndex,
    VectorIndex,
};
pub use ingest::{ContentSource, FsContentSource, IngestOutcome, IngestionMessage, SourceType};
pub use memory::{HistoryHints, HistoryPolicy, InMemoryMemoryStore, MemoryMessage, MemoryStore};
pub use rag::{
    AskMetadata, AskRequest, AskResponse, AskStream, ChunkInput, ForgetReport, RagService,
    RagServiceBuilder, SourceRef, StreamEvent,
};
pub use tokens::{HeuristicCounter, TokenCounter, WordCounter};
