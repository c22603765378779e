//! Session-scoped conversation memory.
//!
//! [`MemoryStore`] keeps the ordered message log per session;
//! [`selection`] decides how much of it goes into the next prompt.

pub mod selection;
pub mod store;

pub use selection::{resolve_session_id, HistoryHints, HistoryPolicy, HistorySelection};
pub use store::{InMemoryMemoryStore, MemoryStore};

use ark_llm::{ChatMessage, ChatRole};
use serde::{Deserialize, Serialize};

/// One stored conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: ChatRole,
    pub content: String,
}

impl MemoryMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<MemoryMessage> for ChatMessage {
    fn from(message: MemoryMessage) -> Self {
        ChatMessage::new(message.role, message.content)
    }
}

impl From<&MemoryMessage> for ChatMessage {
    fn from(message: &MemoryMessage) -> Self {
        ChatMessage::new(message.role, message.content.clone())
    }
}
