// src/memory/outputs.rs
// Latest-run task outputs (the kickoff-output log)

use crate::db::SqliteTaskOutputs;
use crate::error::Result;
use crate::memory::types::{Metadata, TaskOutputRecord};
use chrono::Utc;
use tokio::sync::RwLock;

/// Small append-only log of the latest run's task outputs. Cleared through
/// its own reset scope, independent of the three memories.
pub struct TaskOutputLog {
    store: SqliteTaskOutputs,
    reset_gate: RwLock<()>,
}

impl TaskOutputLog {
    pub fn new(store: SqliteTaskOutputs) -> Self {
        Self {
            store,
            reset_gate: RwLock::new(()),
        }
    }

    /// Record one task's output. Durable-write policy: fails hard.
    pub async fn record(
        &self,
        task_description: &str,
        output: &str,
        metadata: Metadata,
    ) -> Result<()> {
        let _writes_allowed = self.reset_gate.read().await;
        self.store
            .append(TaskOutputRecord {
                task_description: task_description.to_string(),
                output: output.to_string(),
                metadata,
                created_at: Utc::now(),
            })
            .await
    }

    /// The most recent `n` outputs, newest first.
    pub async fn recent(&self, n: usize) -> Result<Vec<TaskOutputRecord>> {
        self.store.recent(n).await
    }

    pub async fn clear(&self) -> Result<()> {
        let _exclusive = self.reset_gate.write().await;
        self.store.clear().await
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_recent() {
        let log = TaskOutputLog::new(SqliteTaskOutputs::open_in_memory().await.unwrap());

        log.record("research topic", "findings", Metadata::new())
            .await
            .unwrap();
        log.record("write summary", "the summary", Metadata::new())
            .await
            .unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].task_description, "write summary");

        log.clear().await.unwrap();
        assert_eq!(log.count().await.unwrap(), 0);
    }
}
