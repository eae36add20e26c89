// src/memory/long_term.rs
// Durable cross-run experience over the append-only execution log

use crate::error::Result;
use crate::memory::traits::ExecutionLog;
use crate::memory::types::TaskExecutionRecord;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Long-term memory: scored task-execution summaries, durable for the
/// lifetime of the storage location.
///
/// Writes fail hard; losing a record silently would corrupt the learning
/// signal. No vector similarity: retrieval is keyed by task description plus
/// a quality floor, so this store keeps working when no embedding provider
/// is configured.
pub struct LongTermMemory {
    log: Arc<dyn ExecutionLog>,
    quality_floor: f64,
    reset_gate: RwLock<()>,
}

impl LongTermMemory {
    pub fn new(log: Arc<dyn ExecutionLog>, quality_floor: f64) -> Self {
        Self {
            log,
            quality_floor,
            reset_gate: RwLock::new(()),
        }
    }

    /// Append an execution record. History is corrected by appending a new
    /// record, never by editing this one.
    pub async fn save(&self, record: TaskExecutionRecord) -> Result<()> {
        record.validate()?;
        let _writes_allowed = self.reset_gate.read().await;
        self.log.append(record).await
    }

    /// Records matching `task_description`, best quality first, ties broken
    /// by recency. Records below the quality floor are excluded (but
    /// retained for audit). Read failures degrade to empty.
    pub async fn search(&self, task_description: &str, limit: usize) -> Vec<TaskExecutionRecord> {
        match self
            .log
            .scan(task_description, limit, self.quality_floor)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!("Long-term search degraded to empty: {e}");
                Vec::new()
            }
        }
    }

    pub async fn clear(&self) -> Result<()> {
        let _exclusive = self.reset_gate.write().await;
        self.log.clear().await
    }

    pub async fn count(&self) -> Result<u64> {
        self.log.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteExecutionLog;

    async fn long_term(quality_floor: f64) -> LongTermMemory {
        let log = SqliteExecutionLog::open_in_memory().await.unwrap();
        LongTermMemory::new(Arc::new(log), quality_floor)
    }

    #[tokio::test]
    async fn test_best_quality_wins() {
        let memory = long_term(0.0).await;

        memory
            .save(TaskExecutionRecord::new(
                "summarize article X",
                "writer",
                "a summary",
                "mediocre summary",
                0.4,
            ))
            .await
            .unwrap();
        memory
            .save(TaskExecutionRecord::new(
                "summarize article X",
                "writer",
                "a summary",
                "good summary",
                0.9,
            ))
            .await
            .unwrap();

        let hits = memory.search("summarize article X", 1).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].quality_score, 0.9);
        assert_eq!(hits[0].actual_output, "good summary");
    }

    #[tokio::test]
    async fn test_quality_floor_excludes_but_retains() {
        let memory = long_term(0.3).await;

        memory
            .save(TaskExecutionRecord::new("task", "r", "", "bad", 0.1))
            .await
            .unwrap();

        assert!(memory.search("task", 10).await.is_empty());
        assert_eq!(memory.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_quality_rejected() {
        let memory = long_term(0.0).await;
        let err = memory
            .save(TaskExecutionRecord::new("task", "r", "", "out", 1.5))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::EngramError::InvalidInput(_)));
        assert_eq!(memory.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_idempotent() {
        let memory = long_term(0.0).await;
        memory
            .save(TaskExecutionRecord::new("task", "r", "", "out", 0.5))
            .await
            .unwrap();

        memory.clear().await.unwrap();
        memory.clear().await.unwrap();
        assert_eq!(memory.count().await.unwrap(), 0);
    }
}
