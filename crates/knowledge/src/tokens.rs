//! Token counting used for chunk budgets and history budgets.
//!
//! The default [`HeuristicCounter`] needs no tokenizer data. With the
//! `tiktoken` feature, [`TiktokenCounter`] counts with `cl100k_base`.

use ark_llm::ChatMessage;

/// Estimates the token cost of a piece of text.
pub trait TokenCounter: Send + Sync {
    /// Token cost of `text`.
    fn count(&self, text: &str) -> usize;

    /// Token cost of a chat message: role name plus content.
    fn count_message(&self, message: &ChatMessage) -> usize {
        let mut text = String::with_capacity(message.content.len() + 9);
        text.push_str(message.role.as_str());
        text.push_str(&message.content);
        self.count(&text)
    }
}

/// Length-based estimate: `ceil(chars * 0.5)`, at least 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(2).max(1)
    }
}

/// Counts every whitespace-delimited word as one token.
///
/// Makes chunk boundaries easy to predict in tests and fixtures.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count().max(1)
    }
}

#[cfg(feature = "tiktoken")]
pub use self::tiktoken::TiktokenCounter;

#[cfg(feature = "tiktoken")]
mod tiktoken {
    use super::TokenCounter;
    use ark_core::{AppError, AppResult};
    use std::sync::Arc;
    use tiktoken_rs::CoreBPE;

    /// Exact counter wrapping tiktoken's `cl100k_base` tokenizer.
    #[derive(Clone)]
    pub struct TiktokenCounter {
        bpe: Arc<CoreBPE>,
    }

    impl TiktokenCounter {
        /// Load the `cl100k_base` ranks.
        pub fn new() -> AppResult<Self> {
            let bpe = tiktoken_rs::cl100k_base()
                .map_err(|e| AppError::Config(format!("Failed to load cl100k_base: {}", e)))?;
            Ok(Self { bpe: Arc::new(bpe) })
        }
    }

    impl TokenCounter for TiktokenCounter {
        fn count(&self, text: &str) -> usize {
            self.bpe.encode_ordinary(text).len().max(1)
        }
    }
}
