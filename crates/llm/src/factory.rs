//! LLM provider factory.
//!
//! Builds the configured generation backend from [`LlmSettings`]. An
//! unconfigured backend is not an error: callers fall back to local
//! behaviour (hashed embeddings, placeholder answers).

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use ark_core::LlmSettings;
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client from settings.
///
/// Returns `None` when the provider is unknown or lacks the endpoint or
/// credentials it needs.
pub fn create_client(settings: &LlmSettings) -> Option<Arc<dyn LlmClient>> {
    let Some(provider) = ProviderType::parse(&settings.provider) else {
        tracing::warn!("Unknown LLM provider '{}'", settings.provider);
        return None;
    };

    if !settings.is_configured() {
        tracing::debug!("LLM provider '{}' is not configured", provider);
        return None;
    }

    let base_url = settings.base_url.clone().unwrap_or_default();
    let timeout = Duration::from_secs(settings.timeout_secs);

    let client: Arc<dyn LlmClient> = match provider {
        ProviderType::OpenAi => {
            let mut client = OpenAiClient::new(base_url, settings.api_key.clone().unwrap_or_default())
                .with_timeout(timeout);
            if let Some(model) = &settings.chat_model {
                client = client.with_chat_model(model);
            }
            if let Some(model) = &settings.embedding_model {
                client = client.with_embedding_model(model);
            }
            Arc::new(client)
        }
        ProviderType::Ollama => {
            let mut client = OllamaClient::with_base_url(base_url).with_timeout(timeout);
            if let Some(model) = &settings.chat_model {
                client = client.with_chat_model(model);
            }
            if let Some(model) = &settings.embedding_model {
                client = client.with_embedding_model(model);
            }
            Arc::new(client)
        }
    };

    tracing::info!("Using LLM provider: {}", client.provider_name());
    Some(client)
}
