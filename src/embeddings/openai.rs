// src/embeddings/openai.rs
// OpenAI embeddings API client (text-embedding-3 family)

use crate::embeddings::EmbeddingProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default API endpoint for OpenAI embeddings
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Max input tokens (OpenAI limit for embedding models)
const MAX_INPUT_TOKENS: usize = 8192;

/// Approximate chars per token (conservative estimate)
const CHARS_PER_TOKEN: usize = 4;

/// Max characters to embed (based on token limit)
const MAX_TEXT_CHARS: usize = MAX_INPUT_TOKENS * CHARS_PER_TOKEN;

/// Max texts per batch request (OpenAI allows up to 2048 inputs,
/// but we cap lower to stay well within the total token limit)
const MAX_BATCH_SIZE: usize = 256;

/// Retry attempts
const RETRY_ATTEMPTS: usize = 2;

/// OpenAI embedding models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OpenAiEmbeddingModel {
    /// text-embedding-3-small: 1536 default dims
    #[default]
    TextEmbedding3Small,
    /// text-embedding-3-large: 3072 default dims
    TextEmbedding3Large,
}

impl OpenAiEmbeddingModel {
    /// Get the model name for API calls
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::TextEmbedding3Small => "text-embedding-3-small",
            Self::TextEmbedding3Large => "text-embedding-3-large",
        }
    }

    /// Get default embedding dimensions for this model
    pub fn default_dimensions(&self) -> usize {
        match self {
            Self::TextEmbedding3Small => 1536,
            Self::TextEmbedding3Large => 3072,
        }
    }

    /// Parse from model name string
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text-embedding-3-small" => Some(Self::TextEmbedding3Small),
            "text-embedding-3-large" => Some(Self::TextEmbedding3Large),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpenAiEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.model_name())
    }
}

/// OpenAI embeddings response types
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// OpenAI embeddings client
pub struct OpenAiEmbeddings {
    api_key: String,
    model: OpenAiEmbeddingModel,
    api_base: String,
    dimensions: usize,
    http_client: reqwest::Client,
}

impl OpenAiEmbeddings {
    /// Create embeddings client with full configuration.
    ///
    /// `api_base` overrides the endpoint for OpenAI-compatible gateways;
    /// `dimensions` overrides the model's default output size.
    pub fn with_config(
        api_key: String,
        model: OpenAiEmbeddingModel,
        api_base: Option<String>,
        dimensions: Option<usize>,
        http_client: reqwest::Client,
    ) -> Self {
        let dimensions = dimensions.unwrap_or_else(|| model.default_dimensions());
        let api_base = api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            api_key,
            model,
            api_base,
            dimensions,
            http_client,
        }
    }

    /// Get the model being used
    pub fn model(&self) -> OpenAiEmbeddingModel {
        self.model
    }

    /// Core embedding call with retries.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.api_base);

        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| {
                if t.len() > MAX_TEXT_CHARS {
                    debug!(
                        "Truncating text from {} to {} chars for embedding",
                        t.len(),
                        MAX_TEXT_CHARS
                    );
                    truncate_at_boundary(t, MAX_TEXT_CHARS)
                } else {
                    t.as_str()
                }
            })
            .collect();

        let body = serde_json::json!({
            "input": inputs,
            "model": self.model.model_name(),
            "dimensions": self.dimensions,
        });

        let mut last_error = None;

        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
            }

            match self
                .http_client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => {
                    if response.status().is_success() {
                        let resp: EmbeddingResponse = response
                            .json()
                            .await
                            .context("Failed to parse embedding response")?;

                        let mut data = resp.data;
                        data.sort_by_key(|d| d.index);

                        return Ok(data.into_iter().map(|d| d.embedding).collect());
                    }

                    let status = response.status();
                    let body_text = response.text().await.unwrap_or_default();
                    let message = serde_json::from_str::<ErrorResponse>(&body_text)
                        .map(|e| e.error.message)
                        .unwrap_or(body_text);

                    // Client errors other than rate limiting won't improve
                    // on retry
                    if status.is_client_error()
                        && status != reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        return Err(anyhow::anyhow!(
                            "Embedding request rejected ({}): {}",
                            status,
                            message
                        ));
                    }

                    last_error = Some(anyhow::anyhow!(
                        "Embedding request failed ({}): {}",
                        status,
                        message
                    ));
                }
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Embedding request error: {}", e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Embedding request failed")))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_texts(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if texts.len() <= MAX_BATCH_SIZE {
            return self.embed_texts(texts).await;
        }

        let mut all_results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            all_results.extend(self.embed_texts(chunk).await?);
        }
        Ok(all_results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_id(&self) -> &'static str {
        "openai"
    }
}

/// Truncate at a char boundary at or below `max_bytes`.
pub(crate) fn truncate_at_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::create_shared_client;

    fn client(api_base: Option<&str>, dimensions: Option<usize>) -> OpenAiEmbeddings {
        OpenAiEmbeddings::with_config(
            "sk-test".to_string(),
            OpenAiEmbeddingModel::default(),
            api_base.map(String::from),
            dimensions,
            create_shared_client(),
        )
    }

    #[test]
    fn test_default_dimensions() {
        assert_eq!(client(None, None).dimensions(), 1536);
        assert_eq!(
            OpenAiEmbeddingModel::TextEmbedding3Large.default_dimensions(),
            3072
        );
    }

    #[test]
    fn test_dimension_override() {
        assert_eq!(client(None, Some(512)).dimensions(), 512);
    }

    #[test]
    fn test_api_base_normalization() {
        let c = client(Some("https://gateway.example/v1/"), None);
        assert_eq!(c.api_base, "https://gateway.example/v1");
    }

    #[test]
    fn test_model_name_round_trip() {
        let model = OpenAiEmbeddingModel::TextEmbedding3Small;
        assert_eq!(
            OpenAiEmbeddingModel::from_name(model.model_name()),
            Some(model)
        );
        assert_eq!(OpenAiEmbeddingModel::from_name("unknown-model"), None);
    }

    #[test]
    fn test_truncate_at_boundary() {
        assert_eq!(truncate_at_boundary("hello", 10), "hello");
        assert_eq!(truncate_at_boundary("hello", 3), "hel");
        // Multi-byte chars are not split
        let s = "héllo";
        let truncated = truncate_at_boundary(s, 2);
        assert!(s.starts_with(truncated));
        assert!(truncated.len() <= 2);
    }
}
