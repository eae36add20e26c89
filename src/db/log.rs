// src/db/log.rs
// SQLite adapters for the execution log and the task-output log

use crate::db::pool::DatabasePool;
use crate::db::schema::{ensure_execution_log_schema, ensure_task_outputs_schema};
use crate::db::vector::{now_timestamp, parse_stored_timestamp};
use crate::error::Result;
use crate::memory::traits::ExecutionLog;
use crate::memory::types::{Metadata, TaskExecutionRecord, TaskOutputRecord};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

fn parse_metadata(raw: Option<String>) -> Metadata {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Durable, append-only execution log over SQLite.
pub struct SqliteExecutionLog {
    pool: Arc<DatabasePool>,
}

impl SqliteExecutionLog {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = DatabasePool::open(path, ensure_execution_log_schema).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn open_in_memory() -> Result<Self> {
        let pool = DatabasePool::open_in_memory(ensure_execution_log_schema).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl ExecutionLog for SqliteExecutionLog {
    async fn append(&self, record: TaskExecutionRecord) -> Result<()> {
        let metadata_json = serde_json::to_string(&record.metadata)?;
        let created = now_timestamp();

        // Losing a long-term record silently would corrupt the learning
        // signal, so this write retries contention and then fails hard.
        self.pool
            .run_with_retry(move |conn| {
                conn.execute(
                    "INSERT INTO task_executions
                     (task_description, agent_role, expected_output, actual_output,
                      quality_score, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        record.task_description,
                        record.agent_role,
                        record.expected_output,
                        record.actual_output,
                        record.quality_score,
                        metadata_json,
                        created,
                    ],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
    }

    async fn scan(
        &self,
        task_description: &str,
        limit: usize,
        min_quality: f64,
    ) -> Result<Vec<TaskExecutionRecord>> {
        let needle = task_description.to_string();

        let rows = self
            .pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT task_description, agent_role, expected_output, actual_output,
                            quality_score, metadata, created_at
                     FROM task_executions
                     WHERE quality_score >= ?2
                       AND (task_description = ?1
                            OR task_description LIKE '%' || ?1 || '%')
                     ORDER BY (task_description = ?1) DESC,
                              quality_score DESC,
                              created_at DESC,
                              id DESC
                     LIMIT ?3",
                )?;
                let mapped = stmt.query_map(
                    rusqlite::params![needle, min_quality, limit as i64],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, f64>(4)?,
                            row.get::<_, Option<String>>(5)?,
                            row.get::<_, String>(6)?,
                        ))
                    },
                )?;
                mapped.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(task_description, agent_role, expected_output, actual_output, quality, meta, created)| {
                    TaskExecutionRecord {
                        task_description,
                        agent_role,
                        expected_output,
                        actual_output,
                        quality_score: quality,
                        metadata: parse_metadata(meta),
                        created_at: parse_stored_timestamp(&created),
                    }
                },
            )
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.pool
            .run(|conn| {
                conn.execute("DELETE FROM task_executions", [])?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
    }

    async fn count(&self) -> Result<u64> {
        self.pool
            .run(|conn| {
                conn.query_row("SELECT COUNT(*) FROM task_executions", [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .await
            .map(|n| n as u64)
    }
}

/// Append-only log of the latest run's task outputs.
pub struct SqliteTaskOutputs {
    pool: Arc<DatabasePool>,
}

impl SqliteTaskOutputs {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = DatabasePool::open(path, ensure_task_outputs_schema).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn open_in_memory() -> Result<Self> {
        let pool = DatabasePool::open_in_memory(ensure_task_outputs_schema).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn append(&self, record: TaskOutputRecord) -> Result<()> {
        let metadata_json = serde_json::to_string(&record.metadata)?;
        let created = now_timestamp();

        self.pool
            .run_with_retry(move |conn| {
                conn.execute(
                    "INSERT INTO task_outputs (task_description, output, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![record.task_description, record.output, metadata_json, created],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
    }

    /// The most recent `n` outputs, newest first.
    pub async fn recent(&self, n: usize) -> Result<Vec<TaskOutputRecord>> {
        let rows = self
            .pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT task_description, output, metadata, created_at
                     FROM task_outputs
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?1",
                )?;
                let mapped = stmt.query_map([n as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?;
                mapped.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(task_description, output, meta, created)| TaskOutputRecord {
                task_description,
                output,
                metadata: parse_metadata(meta),
                created_at: parse_stored_timestamp(&created),
            })
            .collect())
    }

    pub async fn clear(&self) -> Result<()> {
        self.pool
            .run(|conn| {
                conn.execute("DELETE FROM task_outputs", [])?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
    }

    pub async fn count(&self) -> Result<u64> {
        self.pool
            .run(|conn| {
                conn.query_row("SELECT COUNT(*) FROM task_outputs", [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .await
            .map(|n| n as u64)
    }
}
