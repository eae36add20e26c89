// src/embeddings/mod.rs
// Embedding provider module

mod ollama;
mod openai;

pub use self::ollama::OllamaEmbeddings;
pub use self::openai::{OpenAiEmbeddingModel, OpenAiEmbeddings};

use crate::config::EnvConfig;
use crate::error::{EngramError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Capability interface for text -> vector computation.
///
/// Adapters use `anyhow` internally for context-chaining; the memory
/// wrappers convert failures to `EngramError::Embedding` at their boundary.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed multiple texts in batch
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Output vector dimensionality; fixed for the provider's lifetime
    fn dimensions(&self) -> usize;

    /// Provider identifier for logging and change detection
    fn provider_id(&self) -> &'static str;
}

/// Closed set of embedding provider kinds.
///
/// Each variant carries only its own valid options and is validated eagerly
/// by [`EmbedderConfig::build`]: an unusable configuration fails at engine
/// construction, not at first use.
#[derive(Clone, Default)]
pub enum EmbedderConfig {
    /// Hosted OpenAI-compatible API
    OpenAi {
        model: OpenAiEmbeddingModel,
        /// Falls back to `OPENAI_API_KEY` when unset
        api_key: Option<String>,
        /// Overrides the default API endpoint (compatible gateways)
        api_base: Option<String>,
        /// Overrides the model's default output size
        dimensions: Option<usize>,
    },
    /// Locally-hosted Ollama endpoint (no auth)
    Ollama {
        /// Falls back to `ENGRAM_OLLAMA_URL`, then the standard local port
        base_url: Option<String>,
        model: Option<String>,
        dimensions: Option<usize>,
    },
    /// Caller-supplied embedding function
    Custom { provider: Arc<dyn EmbeddingProvider> },
    /// No embeddings: vector-backed memories degrade to always-empty reads
    /// and hard-failing writes; long-term memory is unaffected
    #[default]
    Disabled,
}

impl std::fmt::Debug for EmbedderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi { model, .. } => f.debug_struct("OpenAi").field("model", model).finish(),
            Self::Ollama { model, .. } => f.debug_struct("Ollama").field("model", model).finish(),
            Self::Custom { provider } => f
                .debug_struct("Custom")
                .field("provider", &provider.provider_id())
                .finish(),
            Self::Disabled => write!(f, "Disabled"),
        }
    }
}

impl EmbedderConfig {
    /// Validate the configuration and build the client.
    ///
    /// Returns `None` for [`EmbedderConfig::Disabled`]. Every other invalid
    /// combination is a fatal configuration error.
    pub fn build(
        &self,
        env: &EnvConfig,
        http_client: reqwest::Client,
    ) -> Result<Option<EmbeddingClient>> {
        if env.disable_embeddings {
            tracing::info!("ENGRAM_DISABLE_EMBEDDINGS is set, embedding provider disabled");
            return Ok(None);
        }

        let provider: Arc<dyn EmbeddingProvider> = match self {
            Self::Disabled => return Ok(None),
            Self::OpenAi {
                model,
                api_key,
                api_base,
                dimensions,
            } => {
                let key = api_key
                    .clone()
                    .or_else(|| env.api_keys.openai.clone())
                    .ok_or_else(|| {
                        EngramError::Config(
                            "OpenAI embedder selected but no API key provided \
                             (set OPENAI_API_KEY or pass one explicitly)"
                                .to_string(),
                        )
                    })?;
                let dimensions = (*dimensions).or(env.embedding_dimensions);
                Arc::new(OpenAiEmbeddings::with_config(
                    key,
                    *model,
                    api_base.clone(),
                    dimensions,
                    http_client,
                ))
            }
            Self::Ollama {
                base_url,
                model,
                dimensions,
            } => {
                let base_url = base_url
                    .clone()
                    .or_else(|| env.ollama_url.clone())
                    .unwrap_or_else(|| "http://localhost:11434".to_string());
                let dimensions = (*dimensions).or(env.embedding_dimensions);
                Arc::new(OllamaEmbeddings::new(
                    base_url,
                    model.clone(),
                    dimensions,
                    Some(http_client),
                ))
            }
            Self::Custom { provider } => provider.clone(),
        };

        if provider.dimensions() == 0 {
            return Err(EngramError::Config(format!(
                "embedding provider '{}' reports zero output dimensions",
                provider.provider_id()
            )));
        }

        Ok(Some(EmbeddingClient::new(provider)))
    }
}

/// Thin facade over the active provider; what the memory wrappers hold.
#[derive(Clone)]
pub struct EmbeddingClient {
    inner: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("provider_id", &self.inner.provider_id())
            .finish()
    }
}

impl EmbeddingClient {
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self { inner }
    }

    /// Provider identifier for logging
    pub fn provider_id(&self) -> &'static str {
        self.inner.provider_id()
    }

    /// Get embedding dimensions
    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    /// Embed multiple texts in batch
    pub async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.inner.embed_batch(texts).await
    }
}
