//! Generation backend integration for Ark Study.
//!
//! This crate provides a provider-agnostic abstraction over chat-completion
//! and embedding backends. The retrieval pipeline only ever talks to the
//! [`LlmClient`] trait; concrete providers are selected once at startup by
//! [`create_client`].
//!
//! # Providers
//! - **OpenAI-compatible**: OpenAI, vLLM, DeepSeek and other servers that speak
//!   the `/chat/completions` + `/embeddings` API (server-sent events for streaming)
//! - **Ollama**: Local LLM runtime (`/api/chat`, `/api/embeddings`)
//!
//! # Example
//! ```no_run
//! use ark_llm::{ChatMessage, LlmClient, LlmRequest, providers::OpenAiClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenAiClient::new("https://api.openai.com/v1", "sk-...");
//! let request = LlmRequest::new(vec![ChatMessage::user("Hello, world!")]);
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod stream;
pub mod types;

// Re-export main types
pub use client::{
    ChatMessage, ChatRole, LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage,
};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use stream::collect_stream;
pub use types::ProviderType;
