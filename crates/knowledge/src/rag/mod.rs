//! Retrieval-augmented answering.
//!
//! [`RagService`] grounds answers in indexed passages and per-session
//! conversation history, unary or streamed.

pub mod service;
pub mod types;

pub use service::{conversation_owner, placeholder_answer, ForgetReport, RagService, RagServiceBuilder};
pub use types::{
    AskMetadata, AskRequest, AskResponse, AskStream, ChunkInput, SourceRef, StreamEvent,
    DEFAULT_CONFIDENCE,
};
