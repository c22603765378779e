//! Embedding engine.
//!
//! Chooses between the remote provider (when one is configured and enabled)
//! and the local hashed provider. Both satisfy the same contract; only the
//! local one guarantees unit-norm output.

pub mod provider;
pub mod providers;

pub use provider::EmbeddingProvider;
pub use providers::{hashed_embedding, HashedProvider, RemoteProvider};

use ark_core::AppResult;
use std::sync::Arc;

/// Provider-agnostic embedding entry point shared by ingestion and search.
#[derive(Debug, Clone)]
pub struct EmbeddingEngine {
    local: Arc<HashedProvider>,
    remote: Option<Arc<dyn EmbeddingProvider>>,
}

impl EmbeddingEngine {
    /// Engine that only uses the local hashed provider.
    pub fn local(dimensions: usize) -> Self {
        Self {
            local: Arc::new(HashedProvider::new(dimensions)),
            remote: None,
        }
    }

    /// Prefer `remote` whenever it reports itself enabled.
    pub fn with_remote(mut self, remote: Arc<dyn EmbeddingProvider>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// The provider that will serve the next call.
    pub fn active(&self) -> Arc<dyn EmbeddingProvider> {
        match &self.remote {
            Some(remote) if remote.is_enabled() => Arc::clone(remote),
            _ => self.local.clone() as Arc<dyn EmbeddingProvider>,
        }
    }

    /// Embed a single text.
    ///
    /// Errors from a remote provider are returned as is; there is no silent
    /// switch to the local provider, whose vectors live in a different space.
    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.active().embed(text).await
    }

    /// Embed multiple texts.
    pub async fn embed_texts(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let provider = self.active();
        tracing::debug!(
            "Embedding {} texts using provider '{}' (model: {})",
            texts.len(),
            provider.provider_name(),
            provider.model_name()
        );

        provider.embed_batch(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_core::{AppError, AppResult};

    #[derive(Debug)]
    struct FixedProvider {
        enabled: bool,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn provider_name(&self) -> &str {
            "fixed"
        }

        fn model_name(&self) -> &str {
            "fixed-v1"
        }

        fn dimensions(&self) -> Option<usize> {
            None
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t == "fail") {
                return Err(AppError::Llm("embedding backend down".to_string()));
            }
            Ok(texts.iter().map(|_| vec![3.0, 4.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_local_engine() {
        let engine = EmbeddingEngine::local(32);
        let v = engine.embed("hello world").await.unwrap();
        assert_eq!(v.len(), 32);
        assert_eq!(engine.active().provider_name(), "hashed");
    }

    #[tokio::test]
    async fn test_prefers_enabled_remote() {
        let engine =
            EmbeddingEngine::local(32).with_remote(Arc::new(FixedProvider { enabled: true }));
        assert_eq!(engine.embed("x").await.unwrap(), vec![3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_disabled_remote_uses_local() {
        let engine =
            EmbeddingEngine::local(32).with_remote(Arc::new(FixedProvider { enabled: false }));
        assert_eq!(engine.embed("x").await.unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_remote_errors_propagate() {
        let engine =
            EmbeddingEngine::local(32).with_remote(Arc::new(FixedProvider { enabled: true }));
        assert!(matches!(engine.embed("fail").await, Err(AppError::Llm(_))));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let engine = EmbeddingEngine::local(8);
        assert!(engine.embed_texts(&[]).await.unwrap().is_empty());
    }
}
