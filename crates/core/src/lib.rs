//! Ark Study Core Library
//!
//! This crate provides the foundational utilities shared by the retrieval
//! pipeline and the `ark` CLI:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Layered configuration (defaults, YAML, environment, flags)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, LlmSettings, RagSettings, StoreSettings};
pub use error::{AppError, AppResult};
