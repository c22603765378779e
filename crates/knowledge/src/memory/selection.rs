//! History-selection policy.
//!
//! Decides which prior messages accompany a question, from caller hints:
//! a positive token budget wins; otherwise a turn count applies (explicit,
//! clamped, or a default that depends on whether the caller named a
//! session).

use super::MemoryMessage;
use crate::tokens::TokenCounter;
use std::collections::HashMap;

/// Caller-supplied hints, usually parsed from a request context map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryHints {
    pub session_id: Option<String>,
    pub max_history_turns: Option<i64>,
    pub max_history_tokens: Option<i64>,
}

impl HistoryHints {
    /// Read `session_id`, `max_history_turns` and `max_history_tokens`.
    ///
    /// Blank session ids count as absent. A turn count that is present but
    /// not a number reads as 0, which disables history; a non-numeric token
    /// budget is ignored.
    pub fn from_context(context: &HashMap<String, String>) -> Self {
        let number = |key: &str| -> Option<Result<i64, String>> {
            let raw = context.get(key)?.trim();
            Some(raw.parse::<i64>().map_err(|_| raw.to_string()))
        };

        let max_history_turns = number("max_history_turns").map(|parsed| {
            parsed.unwrap_or_else(|raw| {
                tracing::debug!("Non-numeric max_history_turns {:?}, disabling history", raw);
                0
            })
        });
        let max_history_tokens = number("max_history_tokens").and_then(|parsed| match parsed {
            Ok(n) => Some(n),
            Err(raw) => {
                tracing::debug!("Ignoring non-numeric max_history_tokens: {:?}", raw);
                None
            }
        });

        Self {
            session_id: context
                .get("session_id")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            max_history_turns,
            max_history_tokens,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_max_turns(mut self, turns: i64) -> Self {
        self.max_history_turns = Some(turns);
        self
    }

    pub fn with_max_tokens(mut self, tokens: i64) -> Self {
        self.max_history_tokens = Some(tokens);
        self
    }

    /// Positive token budget, if one was given.
    pub fn token_budget(&self) -> Option<usize> {
        self.max_history_tokens
            .filter(|t| *t > 0)
            .and_then(|t| usize::try_from(t).ok())
    }
}

/// Messages chosen for the prompt plus what they cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySelection {
    pub messages: Vec<MemoryMessage>,
    pub turns_used: usize,
    pub tokens_used: usize,
}

/// Limits applied when hints are missing or out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    /// Upper clamp for an explicit turn count
    pub max_turns_cap: usize,

    /// Turns used when the caller named a session but gave no limit
    pub default_session_turns: usize,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            max_turns_cap: 20,
            default_session_turns: 3,
        }
    }
}

impl HistoryPolicy {
    /// Turn count implied by the hints when no token budget applies.
    pub fn nominal_turns(&self, hints: &HistoryHints) -> usize {
        match hints.max_history_turns {
            Some(turns) => usize::try_from(turns.max(0))
                .unwrap_or(usize::MAX)
                .min(self.max_turns_cap),
            None if hints.session_id.is_some() => self.default_session_turns,
            None => 0,
        }
    }

    /// Select from `history` (oldest first).
    pub fn select(
        &self,
        history: &[MemoryMessage],
        hints: &HistoryHints,
        counter: &dyn TokenCounter,
    ) -> HistorySelection {
        if history.is_empty() {
            return HistorySelection::default();
        }

        if let Some(budget) = hints.token_budget() {
            return select_by_tokens(history, budget, counter);
        }

        let turns = self.nominal_turns(hints);
        if turns == 0 {
            return HistorySelection::default();
        }

        let start = history.len().saturating_sub(turns.saturating_mul(2));
        let messages = history[start..].to_vec();
        let tokens_used = messages.iter().map(|m| cost(m, counter)).sum();

        HistorySelection {
            turns_used: messages.len() / 2,
            tokens_used,
            messages,
        }
    }
}

/// Newest-first walk that stops before the budget would be exceeded.
fn select_by_tokens(
    history: &[MemoryMessage],
    budget: usize,
    counter: &dyn TokenCounter,
) -> HistorySelection {
    let mut used = 0usize;
    let mut start = history.len();

    for (i, message) in history.iter().enumerate().rev() {
        let message_cost = cost(message, counter);
        if used + message_cost > budget {
            break;
        }
        used += message_cost;
        start = i;
    }

    let messages = history[start..].to_vec();
    HistorySelection {
        turns_used: messages.len() / 2,
        tokens_used: used,
        messages,
    }
}

fn cost(message: &MemoryMessage, counter: &dyn TokenCounter) -> usize {
    counter.count_message(&message.into())
}

/// The caller's session id, or a fresh one.
///
/// Returns the id and whether the caller supplied it.
pub fn resolve_session_id(hints: &HistoryHints) -> (String, bool) {
    match &hints.session_id {
        Some(id) => (id.clone(), true),
        None => (uuid::Uuid::new_v4().simple().to_string(), false),
    }
}
