// src/memory/reset.rs
// Administrative reset: per-scope clearing of the backing stores

use crate::error::Result;
use crate::memory::entity::EntityMemory;
use crate::memory::long_term::LongTermMemory;
use crate::memory::outputs::TaskOutputLog;
use crate::memory::short_term::ShortTermMemory;
use futures::future::{BoxFuture, FutureExt, try_join_all};
use std::sync::Arc;
use tracing::{debug, info};

/// Boolean flags selecting which memory scopes to clear. Flags combine
/// additively; selecting none is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetScopes {
    pub short_term: bool,
    pub long_term: bool,
    pub entities: bool,
    pub task_outputs: bool,
}

impl ResetScopes {
    /// Clear everything.
    pub fn all() -> Self {
        Self {
            short_term: true,
            long_term: true,
            entities: true,
            task_outputs: true,
        }
    }

    pub fn short_term() -> Self {
        Self {
            short_term: true,
            ..Self::default()
        }
    }

    pub fn long_term() -> Self {
        Self {
            long_term: true,
            ..Self::default()
        }
    }

    pub fn entities() -> Self {
        Self {
            entities: true,
            ..Self::default()
        }
    }

    pub fn task_outputs() -> Self {
        Self {
            task_outputs: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.short_term || self.long_term || self.entities || self.task_outputs)
    }

    /// Comma-separated scope names for logging.
    pub fn describe(&self) -> String {
        let mut names = Vec::new();
        if self.short_term {
            names.push("short_term");
        }
        if self.long_term {
            names.push("long_term");
        }
        if self.entities {
            names.push("entities");
        }
        if self.task_outputs {
            names.push("task_outputs");
        }
        names.join(", ")
    }
}

/// Clears exactly the stores named by a [`ResetScopes`].
///
/// Each clear takes only that store's exclusive section, so resetting one
/// memory never blocks readers or writers of the other stores. Clearing an
/// already-empty store is a no-op success, so resets are idempotent.
pub struct LifecycleManager {
    short_term: Arc<ShortTermMemory>,
    entities: Arc<EntityMemory>,
    long_term: Arc<LongTermMemory>,
    outputs: Arc<TaskOutputLog>,
}

impl LifecycleManager {
    pub fn new(
        short_term: Arc<ShortTermMemory>,
        entities: Arc<EntityMemory>,
        long_term: Arc<LongTermMemory>,
        outputs: Arc<TaskOutputLog>,
    ) -> Self {
        Self {
            short_term,
            entities,
            long_term,
            outputs,
        }
    }

    pub async fn reset(&self, scopes: ResetScopes) -> Result<()> {
        if scopes.is_empty() {
            debug!("Reset called with no scopes selected; nothing to do");
            return Ok(());
        }

        let mut ops: Vec<BoxFuture<'_, Result<()>>> = Vec::new();
        if scopes.short_term {
            ops.push(self.short_term.clear().boxed());
        }
        if scopes.entities {
            ops.push(self.entities.clear().boxed());
        }
        if scopes.long_term {
            ops.push(self.long_term.clear().boxed());
        }
        if scopes.task_outputs {
            ops.push(self.outputs.clear().boxed());
        }

        try_join_all(ops).await?;
        info!(scopes = %scopes.describe(), "Memory reset complete");
        Ok(())
    }
}
