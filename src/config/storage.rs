// src/config/storage.rs
// Storage-location resolution: one root, one subpath per store, per-project namespace

use crate::error::{EngramError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the default data directory
pub const DATA_DIR_ENV: &str = "ENGRAM_DATA_DIR";

/// Database file name used inside every store subdirectory
const DB_FILE: &str = "engram.db";

/// Caller-supplied storage options. An explicit root takes precedence over
/// the environment override.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Explicit storage root; `None` resolves via env/platform default
    pub root: Option<PathBuf>,
}

/// Resolved on-disk layout for one project's stores.
///
/// Resolution happens once at engine construction and the layout is
/// immutable for the life of the engine; changing the root requires a fresh
/// initialization.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    project: String,
}

impl StorageLayout {
    /// Resolve the storage layout for a project.
    ///
    /// Precedence: explicit config root, then `ENGRAM_DATA_DIR`, then the
    /// platform data directory, then `~/.engram`. Failure to resolve any
    /// root is a fatal configuration error.
    pub fn resolve(config: &StorageConfig, project: &str) -> Result<Self> {
        let env_root = std::env::var(DATA_DIR_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        Self::resolve_from(config.root.clone(), env_root, project)
    }

    /// Pure resolution core, separated so precedence is testable without
    /// touching process environment.
    fn resolve_from(
        explicit: Option<PathBuf>,
        env_root: Option<PathBuf>,
        project: &str,
    ) -> Result<Self> {
        let project = sanitize_project_id(project);
        if project.is_empty() {
            return Err(EngramError::Config(
                "project identifier resolves to an empty namespace".to_string(),
            ));
        }

        let root = explicit
            .or(env_root)
            .or_else(platform_default_root)
            .ok_or_else(|| {
                EngramError::Config(format!(
                    "cannot resolve a storage root: set {DATA_DIR_ENV} or provide an explicit path"
                ))
            })?;

        debug!(root = %root.display(), project = %project, "Resolved storage layout");
        Ok(Self { root, project })
    }

    /// The resolved storage root (without the project namespace)
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The sanitized project namespace
    pub fn project(&self) -> &str {
        &self.project
    }

    fn store_db(&self, store: &str) -> PathBuf {
        self.root.join(&self.project).join(store).join(DB_FILE)
    }

    /// Database file backing short-term memory
    pub fn short_term_db(&self) -> PathBuf {
        self.store_db("short_term")
    }

    /// Database file backing entity memory
    pub fn entities_db(&self) -> PathBuf {
        self.store_db("entities")
    }

    /// Database file backing long-term memory
    pub fn long_term_db(&self) -> PathBuf {
        self.store_db("long_term")
    }

    /// Database file backing the task-output log
    pub fn outputs_db(&self) -> PathBuf {
        self.store_db("outputs")
    }
}

/// Platform-appropriate application-data directory, with a home-directory
/// fallback for minimal environments.
fn platform_default_root() -> Option<PathBuf> {
    dirs::data_dir()
        .map(|d| d.join("engram"))
        .or_else(|| dirs::home_dir().map(|h| h.join(".engram")))
}

/// Reduce a project identifier to a filesystem-safe slug.
///
/// Lowercases, maps anything outside `[a-z0-9._-]` to `-`, and collapses
/// runs so unrelated projects sharing a machine cannot collide through
/// path tricks.
fn sanitize_project_id(project: &str) -> String {
    let mut slug = String::with_capacity(project.len());
    let mut prev_dash = false;
    for ch in project.trim().chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' {
            slug.push(ch);
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }
    // Trimming edge dots also rules out "." / ".." namespace escapes;
    // remaining dots are interior and form a single path component.
    slug.trim_matches(|c| c == '-' || c == '.').to_string()
}
