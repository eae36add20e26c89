// src/config/file.rs
// File-based tunables from <data dir>/config.toml

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct EngramConfig {
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub long_term: LongTermConfig,
}

/// Rank-fusion tunables for the contextual aggregator.
///
/// Defaults: equal per-source weights, near-exact dedup, 5s fan-out deadline.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FusionConfig {
    /// Weight applied to short-term candidates
    pub short_term_weight: f32,
    /// Weight applied to entity candidates
    pub entity_weight: f32,
    /// Weight applied to long-term candidates
    pub long_term_weight: f32,
    /// Two candidates with normalized content similarity at or above this
    /// value are treated as duplicates (1.0 = exact normalized match)
    pub dedup_threshold: f32,
    /// Upper bound on each fan-out sub-query, in milliseconds
    pub fanout_deadline_ms: u64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            short_term_weight: 1.0,
            entity_weight: 1.0,
            long_term_weight: 1.0,
            dedup_threshold: 0.95,
            fanout_deadline_ms: 5_000,
        }
    }
}

impl FusionConfig {
    pub fn fanout_deadline(&self) -> Duration {
        Duration::from_millis(self.fanout_deadline_ms)
    }
}

/// Retrieval defaults for short-term and entity search
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of context entries when the caller does not specify one
    pub default_limit: usize,
    /// Minimum cosine similarity for vector recall
    pub score_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            score_threshold: 0.35,
        }
    }
}

/// Long-term memory tunables
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LongTermConfig {
    /// Records below this quality score are excluded from default search
    /// (still retained for audit)
    pub quality_floor: f64,
}

impl Default for LongTermConfig {
    fn default() -> Self {
        Self { quality_floor: 0.3 }
    }
}

impl EngramConfig {
    /// Load config from `<data dir>/config.toml`.
    ///
    /// A missing file yields defaults; a malformed file logs a warning and
    /// yields defaults rather than failing initialization.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("config.toml");

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[fusion]
entity_weight = 2.0
fanout_deadline_ms = 250

[long_term]
quality_floor = 0.5
"#;
        let config: EngramConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.fusion.entity_weight, 2.0);
        assert_eq!(config.fusion.short_term_weight, 1.0);
        assert_eq!(config.fusion.fanout_deadline(), Duration::from_millis(250));
        assert_eq!(config.long_term.quality_floor, 0.5);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: EngramConfig = toml::from_str("").unwrap();
        assert_eq!(config.retrieval.default_limit, 10);
        assert_eq!(config.fusion.dedup_threshold, 0.95);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngramConfig::load(dir.path());
        assert_eq!(config.long_term.quality_floor, 0.3);
    }

    #[test]
    fn test_load_malformed_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "not [valid toml").unwrap();
        let config = EngramConfig::load(dir.path());
        assert_eq!(config.retrieval.default_limit, 10);
    }
}
