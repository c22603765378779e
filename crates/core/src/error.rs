//! Error types for the Ark Study workspace.
//!
//! One enum covers every failure category the retrieval pipeline can report.
//! The variants follow the taxonomy the orchestrator reasons about:
//! configuration problems, transient backend failures, and invalid input.

use thiserror::Error;

/// Unified error type for the Ark Study crates.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// A required capability (generation backend, persistent store) is not configured
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generation or embedding backend failures
    #[error("LLM error: {0}")]
    Llm(String),

    /// Delegated vector/lexical store failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed input (missing fields, wrong vector dimension, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Knowledge index and orchestration errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the failure came from a backend that may succeed on a later attempt.
    ///
    /// Transient errors are the ones the orchestrator recovers from locally
    /// when a fallback exists.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Llm(_) | AppError::Storage(_) | AppError::Io(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
