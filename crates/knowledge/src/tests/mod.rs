//! Cross-module tests for the orchestrator.

mod properties;
mod rag_service;

use crate::index::{IndexedItem, SearchFilters, SearchHit, VectorIndex};
use ark_core::{AppError, AppResult};
use futures::StreamExt;
use ark_llm::{
    ChatMessage, LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage,
};
use std::sync::Mutex;

/// How a [`ScriptedClient`] stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    /// Emit the done marker
    Done,
    /// Never finish after the scripted tokens
    Hang,
    /// Fail after the scripted tokens
    Fail,
}

/// Generation backend replaying fixed tokens and recording prompts.
pub(crate) struct ScriptedClient {
    tokens: Vec<String>,
    end: StreamEnd,
    enabled: bool,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedClient {
    pub(crate) fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            end: StreamEnd::Done,
            enabled: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn ending(mut self, end: StreamEnd) -> Self {
        self.end = end;
        self
    }

    pub(crate) fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Prompts received so far, oldest first.
    pub(crate) fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }

    fn record(&self, request: &LlmRequest) {
        self.prompts.lock().unwrap().push(request.messages.clone());
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.record(request);
        Ok(LlmResponse {
            content: self.tokens.concat(),
            model: "scripted".to_string(),
            usage: LlmUsage::default(),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        self.record(request);

        let tokens: Vec<AppResult<LlmStreamChunk>> = self
            .tokens
            .iter()
            .map(|t| Ok(LlmStreamChunk::token(t.clone())))
            .collect();
        let head = futures::stream::iter(tokens);

        let stream: LlmStream = match self.end {
            StreamEnd::Done => {
                Box::pin(head.chain(futures::stream::iter([Ok(LlmStreamChunk::done(None))])))
            }
            StreamEnd::Hang => Box::pin(head.chain(futures::stream::pending())),
            StreamEnd::Fail => Box::pin(head.chain(futures::stream::iter([Err(
                AppError::Llm("connection reset".to_string()),
            )]))),
        };
        Ok(stream)
    }

    async fn embed(&self, _text: &str) -> AppResult<Vec<f32>> {
        Err(AppError::Llm("embeddings not scripted".to_string()))
    }
}

/// Delegated store whose every call fails.
pub(crate) struct UnreachableStore;

impl UnreachableStore {
    fn error() -> AppError {
        AppError::Storage("store unreachable".to_string())
    }
}

#[async_trait::async_trait]
impl VectorIndex for UnreachableStore {
    fn backend_name(&self) -> &str {
        "unreachable"
    }

    async fn insert(&self, _item: IndexedItem) -> AppResult<()> {
        Err(Self::error())
    }

    async fn search(
        &self,
        _query: &[f32],
        _top_k: usize,
        _filters: &SearchFilters,
    ) -> AppResult<Vec<SearchHit>> {
        Err(Self::error())
    }

    async fn items_by_owner(&self, _owner_id: &str) -> AppResult<Vec<IndexedItem>> {
        Err(Self::error())
    }

    async fn delete_by_owner(&self, _owner_id: &str) -> AppResult<usize> {
        Err(Self::error())
    }

    async fn count_by_owner(&self, _owner_id: &str) -> AppResult<usize> {
        Err(Self::error())
    }

    async fn len(&self) -> AppResult<usize> {
        Err(Self::error())
    }
}
