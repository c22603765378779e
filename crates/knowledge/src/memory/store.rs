//! Conversation memory storage.

use super::MemoryMessage;
use ark_core::AppResult;
use ark_llm::ChatRole;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// Default soft cap on messages kept per session.
pub const DEFAULT_MAX_MESSAGES: usize = 200;

/// Per-session ordered message log.
#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append one message, dropping the oldest ones beyond the soft cap.
    async fn append(&self, session_id: &str, role: ChatRole, content: &str) -> AppResult<()>;

    /// The last `2 * max_turns` messages in original order.
    ///
    /// `max_turns == 0` returns the whole stored history.
    async fn history(&self, session_id: &str, max_turns: usize) -> AppResult<Vec<MemoryMessage>>;
}

/// Process-local memory store.
///
/// A single lock serializes every read-modify-write, so concurrent appends
/// to one session never interleave.
#[derive(Debug)]
pub struct InMemoryMemoryStore {
    max_messages: usize,
    sessions: Mutex<HashMap<String, VecDeque<MemoryMessage>>>,
}

impl InMemoryMemoryStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of messages stored for a session.
    pub async fn message_count(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map_or(0, VecDeque::len)
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

#[async_trait::async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn append(&self, session_id: &str, role: ChatRole, content: &str) -> AppResult<()> {
        let mut sessions = self.sessions.lock().await;
        let messages = sessions.entry(session_id.to_string()).or_default();
        messages.push_back(MemoryMessage::new(role, content));

        let excess = messages.len().saturating_sub(self.max_messages);
        if excess > 0 {
            messages.drain(..excess);
            tracing::trace!("Trimmed {} old messages from session {}", excess, session_id);
        }
        Ok(())
    }

    async fn history(&self, session_id: &str, max_turns: usize) -> AppResult<Vec<MemoryMessage>> {
        let sessions = self.sessions.lock().await;
        let Some(messages) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };

        let skip = match max_turns {
            0 => 0,
            turns => messages.len().saturating_sub(turns.saturating_mul(2)),
        };
        Ok(messages.iter().skip(skip).cloned().collect())
    }
}
