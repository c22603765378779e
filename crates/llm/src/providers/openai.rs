//! OpenAI-compatible provider implementation.
//!
//! Works against OpenAI and self-hosted servers (vLLM, DeepSeek, LM Studio,
//! ...) that expose `/chat/completions` and `/embeddings`. Streaming uses
//! server-sent events: `data: {json}` lines terminated by `data: [DONE]`.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::stream::{collect_stream, line_stream};
use ark_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [crate::client::ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Embedding request body.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client for the given API base URL (e.g. `https://api.openai.com/v1`).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            client: reqwest::Client::new(),
        }
    }

    /// Set the chat model.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the embedding model.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set the timeout applied to unary requests.
    ///
    /// Streaming requests are not bounded by it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn model_for<'a>(&'a self, request: &'a LlmRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.chat_model)
    }

    async fn error_from(response: reqwest::Response) -> AppError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        AppError::Llm(format!("API error ({}): {}", status, error_text))
    }
}

/// Parse one server-sent-event line into a stream chunk.
///
/// Returns `None` for lines that carry no token (comments, keep-alives,
/// role-only deltas, malformed JSON).
fn parse_sse_line(line: &str) -> Option<AppResult<LlmStreamChunk>> {
    let data = line.strip_prefix("data:")?.trim();

    if data == "[DONE]" {
        return Some(Ok(LlmStreamChunk::done(None)));
    }

    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Skipping malformed stream line: {}", e);
            return None;
        }
    };

    let choice = value.get("choices")?.get(0)?;
    let token = choice
        .get("delta")
        .and_then(|delta| delta.get("content"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        // Some providers send full messages per chunk
        .or_else(|| {
            choice
                .get("message")
                .and_then(|message| message.get("content"))
                .and_then(|c| c.as_str())
                .filter(|c| !c.is_empty())
        })?;

    Some(Ok(LlmStreamChunk::token(token)))
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn is_enabled(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::info!("Sending completion request to {}", self.base_url);

        let model = self.model_for(request).to_string();
        let content = tokio::time::timeout(self.timeout, async {
            let stream = self.stream(request).await?;
            collect_stream(stream).await
        })
        .await
        .map_err(|_| AppError::Llm(format!("Completion timed out after {:?}", self.timeout)))??;

        tracing::debug!("Received {} characters from {}", content.len(), model);

        Ok(LlmResponse {
            content,
            model,
            usage: LlmUsage::default(),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        if !self.is_enabled() {
            return Err(AppError::Config(
                "OpenAI-compatible client not configured".to_string(),
            ));
        }

        tracing::info!("Starting streaming request to {}", self.base_url);

        let body = ChatCompletionRequest {
            model: self.model_for(request),
            messages: &request.messages,
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: request.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send streaming request: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        Ok(line_stream(response.bytes_stream(), parse_sse_line))
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if !self.is_enabled() {
            return Err(AppError::Config(
                "OpenAI-compatible client not configured".to_string(),
            ));
        }

        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send embedding request: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse embedding response: {}", e)))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::Llm("Embedding response contained no data".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OpenAiClient::new("https://api.example.com/v1/", "sk-test");
        assert_eq!(client.provider_name(), "openai");
        assert_eq!(client.base_url, "https://api.example.com/v1");
        assert_eq!(client.chat_model, DEFAULT_CHAT_MODEL);
        assert!(client.is_enabled());
    }

    #[test]
    fn test_disabled_without_key() {
        let client = OpenAiClient::new("https://api.example.com/v1", "");
        assert!(!client.is_enabled());
    }

    #[test]
    fn test_parse_delta_token() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        let chunk = parse_sse_line(line).unwrap().unwrap();
        assert_eq!(chunk.content, "Hel");
        assert!(!chunk.done);
    }

    #[test]
    fn test_parse_full_message_fallback() {
        let line = r#"data: {"choices":[{"message":{"content":"whole answer"}}]}"#;
        let chunk = parse_sse_line(line).unwrap().unwrap();
        assert_eq!(chunk.content, "whole answer");
    }

    #[test]
    fn test_parse_done_marker() {
        let chunk = parse_sse_line("data: [DONE]").unwrap().unwrap();
        assert!(chunk.done);
        assert!(chunk.content.is_empty());
    }

    #[test]
    fn test_skips_non_token_lines() {
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("event: ping").is_none());
        assert!(parse_sse_line("data: {not json").is_none());
        assert!(parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).is_none());
    }

    #[tokio::test]
    async fn test_last_event_without_newline_is_kept() {
        let body = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n".to_vec(),
            ),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}".to_vec()),
        ]);
        let answer = collect_stream(line_stream(body, parse_sse_line)).await.unwrap();
        assert_eq!(answer, "Hello");
    }

    #[tokio::test]
    async fn test_unconfigured_stream_is_config_error() {
        let client = OpenAiClient::new("", "");
        let request = LlmRequest::new(vec![crate::client::ChatMessage::user("hi")]);
        assert!(matches!(
            client.stream(&request).await,
            Err(AppError::Config(_))
        ));
    }
}
