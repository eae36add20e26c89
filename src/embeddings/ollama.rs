// src/embeddings/ollama.rs
// Ollama embeddings via OpenAI-compatible /v1/embeddings endpoint

use crate::embeddings::EmbeddingProvider;
use crate::embeddings::openai::truncate_at_boundary;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default Ollama embedding model
const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Default dimensions for nomic-embed-text
const DEFAULT_DIMENSIONS: usize = 768;

/// Max characters to embed per text before truncation.
///
/// Local embedding models typically carry an 8192-token context window and
/// dense text can tokenize near 2 chars/token, so 12000 chars keeps a
/// comfortable margin below the limit. Full content is always stored in the
/// database; truncation only affects the text sent to the embedding API.
const MAX_TEXT_CHARS: usize = 12_000;

/// Max texts per batch request
const MAX_BATCH_SIZE: usize = 64;

/// Retry attempts
const RETRY_ATTEMPTS: usize = 1;

/// OpenAI-compatible embedding response types (shared shape with openai.rs)
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Ollama embeddings client (OpenAI-compatible endpoint, no auth required)
pub struct OllamaEmbeddings {
    base_url: String,
    model: String,
    dimensions: usize,
    http_client: reqwest::Client,
}

impl OllamaEmbeddings {
    /// Create a new Ollama embeddings client.
    /// If `http_client` is `None`, creates one with a 60s timeout suitable
    /// for local embedding batches.
    pub fn new(
        base_url: String,
        model: Option<String>,
        dimensions: Option<usize>,
        http_client: Option<reqwest::Client>,
    ) -> Self {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let dimensions = dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        let base_url = base_url.trim_end_matches('/').to_string();

        let http_client = http_client.unwrap_or_else(|| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| crate::http::create_shared_client())
        });

        Self {
            base_url,
            model,
            dimensions,
            http_client,
        }
    }

    /// Get model name
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Core embedding call via Ollama's OpenAI-compatible endpoint.
    ///
    /// On a 400 response (typically context overflow), retries with the
    /// truncation limit halved so token-dense inputs that exceed the model's
    /// context window get a second chance with shorter text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let mut max_chars = MAX_TEXT_CHARS;
        let mut last_error = None;

        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(1000)).await;
            }

            let inputs: Vec<&str> = texts
                .iter()
                .map(|t| {
                    if t.len() > max_chars {
                        debug!(
                            "Truncating text from {} to {} chars for Ollama embedding",
                            t.len(),
                            max_chars
                        );
                        truncate_at_boundary(t, max_chars)
                    } else {
                        t.as_str()
                    }
                })
                .collect();

            let input_value = if inputs.len() == 1 {
                serde_json::Value::String(inputs[0].to_string())
            } else {
                serde_json::Value::Array(
                    inputs
                        .iter()
                        .map(|s| serde_json::Value::String(s.to_string()))
                        .collect(),
                )
            };

            let body = serde_json::json!({
                "input": input_value,
                "model": self.model,
            });

            match self
                .http_client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(response) => {
                    if response.status().is_success() {
                        let resp: EmbeddingResponse = response
                            .json()
                            .await
                            .context("Failed to parse Ollama embedding response")?;

                        let mut data = resp.data;
                        data.sort_by_key(|d| d.index);

                        let embeddings: Vec<Vec<f32>> =
                            data.into_iter().map(|d| d.embedding).collect();

                        if let Some(first) = embeddings.first()
                            && first.len() != self.dimensions
                        {
                            debug!(
                                "Ollama embedding dimensions: expected {}, got {}",
                                self.dimensions,
                                first.len()
                            );
                        }

                        return Ok(embeddings);
                    }

                    let status = response.status();
                    let body_text = response.text().await.unwrap_or_default();

                    // On 400 (likely context overflow), halve truncation
                    // limit for retry
                    if status == reqwest::StatusCode::BAD_REQUEST && attempt < RETRY_ATTEMPTS {
                        let prev = max_chars;
                        max_chars /= 2;
                        debug!(
                            "Ollama returned 400, reducing truncation limit from {} to {} chars",
                            prev, max_chars
                        );
                    }

                    last_error = Some(anyhow::anyhow!(
                        "Ollama embedding request failed ({}): {}",
                        status,
                        body_text
                    ));
                }
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Ollama embedding request error: {}", e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Ollama embedding failed")))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_texts(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response from Ollama"))
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
        "ollama"
    }
}
