// src/memory/traits.rs

//! Capability traits for the pluggable storage backends.
//! The memory wrappers and the aggregator depend only on these seams, never
//! on a concrete backend type.

use crate::error::Result;
use crate::memory::types::{MemoryItem, Metadata, TaskExecutionRecord};
use async_trait::async_trait;

/// A write into a vector-backed store. The vector is computed once at write
/// time and owned exclusively by the store afterwards.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub key: String,
    pub content: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// Capability interface for vector-similarity storage (short-term and
/// entity memory backends).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the record stored under `record.key`. Replacing
    /// preserves the record's storage identity.
    async fn upsert(&self, record: VectorRecord) -> Result<MemoryItem>;

    /// Top-`k` items by cosine similarity to `vector`, most-relevant first,
    /// filtered to similarity >= `min_score`.
    async fn query(&self, vector: Vec<f32>, k: usize, min_score: f32) -> Result<Vec<MemoryItem>>;

    /// Look up a single record by its key.
    async fn fetch(&self, key: &str) -> Result<Option<MemoryItem>>;

    /// Remove every record. Clearing an empty store is a no-op success.
    async fn clear(&self) -> Result<()>;

    /// Number of stored records.
    async fn count(&self) -> Result<u64>;
}

/// Capability interface for the durable, append-only execution log
/// (long-term memory backend).
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    /// Append a record; records are never mutated after this.
    async fn append(&self, record: TaskExecutionRecord) -> Result<()>;

    /// Records matching `task_description` (exact preferred, substring
    /// fallback) with `quality_score >= min_quality`, best quality first,
    /// ties broken by recency.
    async fn scan(
        &self,
        task_description: &str,
        limit: usize,
        min_quality: f64,
    ) -> Result<Vec<TaskExecutionRecord>>;

    /// Remove every record. Clearing an empty log is a no-op success.
    async fn clear(&self) -> Result<()>;

    /// Number of stored records, including those below any quality floor.
    async fn count(&self) -> Result<u64>;
}
