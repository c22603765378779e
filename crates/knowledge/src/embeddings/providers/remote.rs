//! Embedding provider backed by the generation backend's embedding endpoint.

use crate::embeddings::provider::EmbeddingProvider;
use ark_core::AppResult;
use ark_llm::LlmClient;
use std::fmt;
use std::sync::Arc;

/// Delegates to [`LlmClient::embed`].
///
/// Vectors are returned as the provider produces them; no normalization is
/// applied or assumed.
#[derive(Clone)]
pub struct RemoteProvider {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl RemoteProvider {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

impl fmt::Debug for RemoteProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProvider")
            .field("provider", &self.client.provider_name())
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for RemoteProvider {
    fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    fn is_enabled(&self) -> bool {
        self.client.is_enabled()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.client.embed(text).await?);
        }
        Ok(embeddings)
    }
}
