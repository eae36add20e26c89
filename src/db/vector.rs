// src/db/vector.rs
// sqlite-vec adapter implementing the VectorStore capability

use crate::db::pool::DatabasePool;
use crate::db::schema::{ensure_vector_schema, table_exists};
use crate::error::{EngramError, Result};
use crate::memory::traits::{VectorRecord, VectorStore};
use crate::memory::types::{MemoryItem, Metadata};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use std::path::Path;
use std::sync::Arc;

/// Serialize an embedding to the little-endian byte layout sqlite-vec expects.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert a cosine distance from `vec_distance_cosine` (0 = identical,
/// 2 = opposite) into a similarity score in [-1, 1].
pub fn distance_to_score(distance: f32) -> f32 {
    (1.0 - distance).clamp(-1.0, 1.0)
}

/// Parse a stored timestamp: RFC 3339 from our own writes, with a fallback
/// for SQLite's CURRENT_TIMESTAMP format.
pub(crate) fn parse_stored_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|naive| naive.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

/// Current time in the fixed-width RFC 3339 form we store (lexicographic
/// order matches chronological order).
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_metadata(raw: Option<String>) -> Metadata {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// SQLite + sqlite-vec backed vector store.
///
/// One instance per collection (short-term, entities), each over its own
/// database file. Upserts are keyed, so a replaced record keeps its rowid.
pub struct SqliteVectorStore {
    pool: Arc<DatabasePool>,
    dimensions: Option<usize>,
}

impl SqliteVectorStore {
    /// Open (or create) the store at `path`.
    ///
    /// `dimensions` is the embedding provider's output size; an existing
    /// store created under a different dimensionality fails here with a
    /// configuration error. `None` opens the store without vector search
    /// (no provider configured).
    pub async fn open(path: &Path, dimensions: Option<usize>) -> Result<Self> {
        let pool = DatabasePool::open(path, move |conn| ensure_vector_schema(conn, dimensions))
            .await
            .map_err(coerce_anyhow)?;
        Ok(Self {
            pool: Arc::new(pool),
            dimensions,
        })
    }

    /// Open an in-memory store (shared-cache, for tests).
    pub async fn open_in_memory(dimensions: Option<usize>) -> Result<Self> {
        let pool =
            DatabasePool::open_in_memory(move |conn| ensure_vector_schema(conn, dimensions))
                .await
                .map_err(coerce_anyhow)?;
        Ok(Self {
            pool: Arc::new(pool),
            dimensions,
        })
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }
}

/// Recover a typed EngramError smuggled through an anyhow chain (the schema
/// setup reports dimension mismatches as Config errors).
fn coerce_anyhow(err: anyhow::Error) -> EngramError {
    match err.downcast::<EngramError>() {
        Ok(engram) => engram,
        Err(other) => EngramError::Anyhow(other),
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, record: VectorRecord) -> Result<MemoryItem> {
        let dims = self.dimensions.ok_or_else(|| {
            EngramError::Embedding("no embedding provider configured for this store".to_string())
        })?;
        if record.vector.len() != dims {
            return Err(EngramError::Config(format!(
                "embedding has {} dimensions, store expects {}",
                record.vector.len(),
                dims
            )));
        }

        let key = record.key.clone();
        let content = record.content.clone();
        let metadata_json = serde_json::to_string(&record.metadata)?;
        let embedding_bytes = embedding_to_bytes(&record.vector);
        let created = now_timestamp();

        let (_, stored_created) = self
            .pool
            .run_with_retry(move |conn| {
                let tx = conn.unchecked_transaction()?;
                tx.execute(
                    "INSERT INTO memory_items (key, content, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(key) DO UPDATE SET
                         content = excluded.content,
                         metadata = excluded.metadata",
                    rusqlite::params![key, content, metadata_json, created],
                )?;
                let (id, created_at): (i64, String) = tx.query_row(
                    "SELECT id, created_at FROM memory_items WHERE key = ?1",
                    [&key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                tx.execute(
                    "INSERT OR REPLACE INTO vec_items (rowid, embedding, item_id, content)
                     VALUES (?1, ?2, ?1, ?3)",
                    rusqlite::params![id, embedding_bytes, content],
                )?;
                tx.commit()?;
                Ok::<_, rusqlite::Error>((id, created_at))
            })
            .await?;

        Ok(MemoryItem {
            id: record.key,
            content: record.content,
            metadata: record.metadata,
            created_at: parse_stored_timestamp(&stored_created),
            relevance_score: 1.0,
            vector: Some(record.vector),
        })
    }

    async fn query(&self, vector: Vec<f32>, k: usize, min_score: f32) -> Result<Vec<MemoryItem>> {
        if self.dimensions.is_none() || k == 0 {
            return Ok(Vec::new());
        }
        let embedding_bytes = embedding_to_bytes(&vector);

        let rows = self
            .pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT m.key, m.content, m.metadata, m.created_at,
                            vec_distance_cosine(v.embedding, ?1) AS distance
                     FROM vec_items v
                     JOIN memory_items m ON m.id = v.rowid
                     ORDER BY distance
                     LIMIT ?2",
                )?;
                let mapped = stmt.query_map(
                    rusqlite::params![embedding_bytes, k as i64],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, f32>(4)?,
                        ))
                    },
                )?;
                mapped.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, content, metadata, created_at, distance)| {
                let score = distance_to_score(distance);
                if score >= min_score {
                    Some(MemoryItem {
                        id: key,
                        content,
                        metadata: parse_metadata(metadata),
                        created_at: parse_stored_timestamp(&created_at),
                        relevance_score: score,
                        vector: None,
                    })
                } else {
                    None
                }
            })
            .collect())
    }

    async fn fetch(&self, key: &str) -> Result<Option<MemoryItem>> {
        let key = key.to_string();
        let row = self
            .pool
            .run(move |conn| {
                conn.query_row(
                    "SELECT key, content, metadata, created_at FROM memory_items WHERE key = ?1",
                    [&key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        Ok(row.map(|(key, content, metadata, created_at)| MemoryItem {
            id: key,
            content,
            metadata: parse_metadata(metadata),
            created_at: parse_stored_timestamp(&created_at),
            relevance_score: 1.0,
            vector: None,
        }))
    }

    async fn clear(&self) -> Result<()> {
        self.pool
            .run(|conn| {
                let tx = conn.unchecked_transaction()?;
                if table_exists(conn, "vec_items") {
                    tx.execute("DELETE FROM vec_items", [])?;
                }
                tx.execute("DELETE FROM memory_items", [])?;
                tx.commit()?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
    }

    async fn count(&self) -> Result<u64> {
        self.pool
            .run(|conn| {
                conn.query_row("SELECT COUNT(*) FROM memory_items", [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .await
            .map(|n| n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, content: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            key: key.to_string(),
            content: content.to_string(),
            metadata: Metadata::new(),
            vector,
        }
    }

    #[test]
    fn test_embedding_to_bytes_roundtrip() {
        let bytes = embedding_to_bytes(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 1.0);
        assert_eq!(f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), -2.5);
    }

    #[test]
    fn test_distance_to_score() {
        assert_eq!(distance_to_score(0.0), 1.0);
        assert_eq!(distance_to_score(1.0), 0.0);
        assert_eq!(distance_to_score(2.0), -1.0);
    }

    #[test]
    fn test_parse_stored_timestamp_formats() {
        let rfc = parse_stored_timestamp("2026-03-01T12:00:00.000000Z");
        assert_eq!(rfc.timestamp(), 1772366400);
        let sqlite = parse_stored_timestamp("2026-03-01 12:00:00");
        assert_eq!(sqlite, rfc);
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let store = SqliteVectorStore::open_in_memory(Some(4)).await.unwrap();

        store
            .upsert(record("a", "first item", vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(record("b", "second item", vec![0.0, 1.0, 0.0, 0.0]))
            .await
            .unwrap();

        let hits = store.query(vec![1.0, 0.0, 0.0, 0.0], 5, 0.5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].relevance_score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_keeps_identity() {
        let store = SqliteVectorStore::open_in_memory(Some(4)).await.unwrap();

        store
            .upsert(record("k", "old content", vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(record("k", "new content", vec![0.0, 1.0, 0.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let fetched = store.fetch("k").await.unwrap().unwrap();
        assert_eq!(fetched.content, "new content");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_on_write_is_config_error() {
        let store = SqliteVectorStore::open_in_memory(Some(4)).await.unwrap();
        let err = store
            .upsert(record("k", "c", vec![1.0, 0.0]))
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_query_without_provider_is_empty() {
        let store = SqliteVectorStore::open_in_memory(None).await.unwrap();
        let hits = store.query(vec![1.0], 5, 0.0).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = SqliteVectorStore::open_in_memory(Some(4)).await.unwrap();
        store
            .upsert(record("a", "x", vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        // Clearing an already-empty store is a no-op success
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
