// src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use tracing::{debug, info, warn};

/// API keys loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// OpenAI API key (OPENAI_API_KEY)
    pub openai: Option<String>,
}

impl ApiKeys {
    /// Load API keys from environment variables (single source of truth)
    pub fn from_env() -> Self {
        let keys = Self {
            openai: Self::read_key("OPENAI_API_KEY"),
        };
        keys.log_status();
        keys
    }

    /// Read a single API key from environment, filtering empty values
    fn read_key(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|k| !k.trim().is_empty())
    }

    /// Check if hosted embeddings are available
    pub fn has_embeddings(&self) -> bool {
        self.openai.is_some()
    }

    /// Log which API keys are available (without exposing values)
    fn log_status(&self) {
        if self.openai.is_some() {
            debug!("OpenAI API key loaded");
        } else {
            debug!("No OpenAI API key configured");
        }
    }
}

/// Environment configuration - all env vars in one place
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// API keys for embedding providers
    pub api_keys: ApiKeys,
    /// Custom embedding dimensions (ENGRAM_EMBEDDING_DIMENSIONS)
    pub embedding_dimensions: Option<usize>,
    /// Base URL for a locally-hosted embedding endpoint (ENGRAM_OLLAMA_URL)
    pub ollama_url: Option<String>,
    /// Force-disable embeddings regardless of provider config
    /// (ENGRAM_DISABLE_EMBEDDINGS); vector memories degrade to empty reads
    pub disable_embeddings: bool,
}

impl EnvConfig {
    /// Load all environment configuration (call once at engine construction)
    pub fn load() -> Self {
        info!("Loading environment configuration");

        let embedding_dimensions = std::env::var("ENGRAM_EMBEDDING_DIMENSIONS")
            .ok()
            .and_then(|d| d.parse().ok());

        if let Some(dims) = embedding_dimensions {
            debug!(dimensions = dims, "Custom embedding dimensions configured");
        }

        Self {
            api_keys: ApiKeys::from_env(),
            embedding_dimensions,
            ollama_url: std::env::var("ENGRAM_OLLAMA_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            disable_embeddings: parse_bool_env("ENGRAM_DISABLE_EMBEDDINGS").unwrap_or(false),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if !self.api_keys.has_embeddings() && self.ollama_url.is_none() {
            validation.add_warning(
                "No embedding provider configured. Set OPENAI_API_KEY or ENGRAM_OLLAMA_URL \
                 for semantic recall; long-term memory works without one.",
            );
        }

        if let Some(0) = self.embedding_dimensions {
            validation.add_error("ENGRAM_EMBEDDING_DIMENSIONS must be greater than zero");
        }

        validation
    }
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

pub(crate) fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?.to_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(var = name, value = %value, "Unrecognized boolean value, ignoring");
            None
        }
    }
}
