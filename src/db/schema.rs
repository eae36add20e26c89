// src/db/schema.rs
// Schema setup for the per-store databases

use crate::error::EngramError;
use anyhow::Result;
use rusqlite::Connection;

/// Check if a table exists in the database
pub fn table_exists(conn: &Connection, table_name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
        [table_name],
        |_| Ok(true),
    )
    .unwrap_or(false)
}

/// Items table shared by the vector-backed stores (short-term, entities)
const MEMORY_ITEMS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS memory_items (
    id INTEGER PRIMARY KEY,
    key TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Append-only task execution log (long-term memory)
const TASK_EXECUTIONS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS task_executions (
    id INTEGER PRIMARY KEY,
    task_description TEXT NOT NULL,
    agent_role TEXT NOT NULL DEFAULT '',
    expected_output TEXT NOT NULL DEFAULT '',
    actual_output TEXT NOT NULL DEFAULT '',
    quality_score REAL NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_task_executions_desc
    ON task_executions(task_description);
CREATE INDEX IF NOT EXISTS idx_task_executions_quality
    ON task_executions(quality_score DESC);
"#;

/// Latest-run task outputs
const TASK_OUTPUTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS task_outputs (
    id INTEGER PRIMARY KEY,
    task_description TEXT NOT NULL,
    output TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Parse the current dimension of a vec0 table from its schema SQL.
fn vec_table_dimensions(conn: &Connection, table: &str) -> Option<usize> {
    conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type='table' AND name=?",
        [table],
        |row| {
            let sql: String = row.get(0)?;
            // Parse dimension from SQL like "embedding float[1536]"
            if let Some(start) = sql.find("float[") {
                let rest = &sql[start + 6..];
                if let Some(end) = rest.find(']')
                    && let Ok(dim) = rest[..end].parse::<usize>()
                {
                    return Ok(Some(dim));
                }
            }
            Ok(None)
        },
    )
    .unwrap_or(None)
}

/// Set up the schema for a vector-backed store.
///
/// `dimensions` is the embedding provider's configured output size; `None`
/// means no provider is configured and only the items table is created.
/// An existing vec table whose dimensionality differs from the provider's is
/// a fatal configuration error: vectors written under one dimensionality
/// must never be searched under another, so the mismatch surfaces instead of
/// being papered over.
pub fn ensure_vector_schema(conn: &Connection, dimensions: Option<usize>) -> Result<()> {
    conn.execute_batch(MEMORY_ITEMS_SCHEMA)?;

    let Some(dims) = dimensions else {
        return Ok(());
    };

    match vec_table_dimensions(conn, "vec_items") {
        Some(current) if current == dims => Ok(()),
        Some(current) => Err(EngramError::Config(format!(
            "vector store holds {current}-dimensional embeddings but the embedding \
             provider is configured for {dims}; reset the store or fix the provider"
        ))
        .into()),
        None => {
            tracing::debug!("Creating vec_items with {} dimensions", dims);
            conn.execute_batch(&format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS vec_items USING vec0(\
                     embedding float[{dims}],\
                     +item_id INTEGER,\
                     +content TEXT\
                 )"
            ))?;
            Ok(())
        }
    }
}

/// Set up the schema for the long-term execution log.
pub fn ensure_execution_log_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(TASK_EXECUTIONS_SCHEMA)?;
    Ok(())
}

/// Set up the schema for the task-output log.
pub fn ensure_task_outputs_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(TASK_OUTPUTS_SCHEMA)?;
    Ok(())
}
