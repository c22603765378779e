//! Prompt system for Ark Study.
//!
//! This crate provides chat prompt assembly for grounded answers:
//! - YAML-based prompt definitions with a built-in default
//! - Workspace overrides under `.ark/prompts/`
//! - Handlebars rendering of the final user turn

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_chat_prompt;
pub use loader::{list_prompts, load_prompt, resolve_prompt};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, DEFAULT_ASK_PROMPT_ID};
