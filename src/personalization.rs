// src/personalization.rs
// External user-scoped preference memory (provider boundary only)

use crate::error::Result;
use crate::memory::types::Metadata;
use async_trait::async_trait;

/// Addressing for user-scoped memory: a user plus optional organization and
/// project identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserScope {
    pub user_id: String,
    pub org_id: Option<String>,
    pub project_id: Option<String>,
}

impl UserScope {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            org_id: None,
            project_id: None,
        }
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Third-party personalization service boundary.
///
/// User-level preference memory is delegated entirely to the external
/// provider: the engine forwards interactions after task completion and
/// pulls preference snippets during prompt construction, nothing more. No
/// provider configured means both operations are no-ops.
#[async_trait]
pub trait UserMemoryProvider: Send + Sync {
    /// Record one agent/user interaction.
    async fn add_interaction(
        &self,
        scope: &UserScope,
        text: &str,
        metadata: &Metadata,
    ) -> Result<()>;

    /// Preference snippets relevant to `query`, most relevant first.
    async fn retrieve(&self, scope: &UserScope, query: &str, limit: usize) -> Result<Vec<String>>;
}
