// src/memory/short_term.rs
// Ephemeral task-scoped recall over a vector store

use crate::embeddings::EmbeddingClient;
use crate::error::{EngramError, Result};
use crate::memory::traits::{VectorRecord, VectorStore};
use crate::memory::types::{MemoryItem, Metadata};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Short-term memory: one crew execution's working set.
///
/// There is no autonomous eviction; the caller clears the store between
/// distinct executions. Writes fail hard when embedding fails (new knowledge
/// is never silently dropped); reads degrade to empty results so a transient
/// provider fault never blocks retrieval-dependent callers.
pub struct ShortTermMemory {
    store: Arc<dyn VectorStore>,
    embedder: Option<EmbeddingClient>,
    reset_gate: RwLock<()>,
}

impl ShortTermMemory {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Option<EmbeddingClient>) -> Self {
        Self {
            store,
            embedder,
            reset_gate: RwLock::new(()),
        }
    }

    /// Save an observation. Each save creates a fresh item under a UUID key.
    pub async fn save(&self, content: &str, metadata: Metadata) -> Result<MemoryItem> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            EngramError::Embedding("no embedding provider configured".to_string())
        })?;

        let vector = embedder
            .embed(content)
            .await
            .map_err(|e| EngramError::Embedding(e.to_string()))?;

        let _writes_allowed = self.reset_gate.read().await;
        self.store
            .upsert(VectorRecord {
                key: uuid::Uuid::new_v4().to_string(),
                content: content.to_string(),
                metadata,
                vector,
            })
            .await
    }

    /// Top-`limit` items with cosine similarity >= `score_threshold`,
    /// most-relevant first. Embedding or storage faults on this path are
    /// absorbed to an empty result.
    pub async fn search(
        &self,
        query_text: &str,
        limit: usize,
        score_threshold: f32,
    ) -> Vec<MemoryItem> {
        let Some(embedder) = self.embedder.as_ref() else {
            debug!("Short-term search skipped: no embedding provider");
            return Vec::new();
        };

        let vector = match embedder.embed(query_text).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Short-term search degraded to empty: embedding failed: {e}");
                return Vec::new();
            }
        };

        match self.store.query(vector, limit, score_threshold).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Short-term search degraded to empty: store query failed: {e}");
                Vec::new()
            }
        }
    }

    /// Clear the working set. Takes the store's exclusive section, so
    /// in-flight writers finish first and later writers see the empty store.
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
    use crate::db::SqliteVectorStore;
    use crate::embeddings::EmbeddingProvider;
    use async_trait::async_trait;

    struct UnitAxisEmbedder;

    /// Maps known words to fixed unit vectors so similarities are exact.
    #[async_trait]
    impl EmbeddingProvider for UnitAxisEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(match text {
                t if t.contains("alpha") => vec![1.0, 0.0, 0.0, 0.0],
                t if t.contains("beta") => vec![0.0, 1.0, 0.0, 0.0],
                _ => vec![0.0, 0.0, 1.0, 0.0],
            })
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn provider_id(&self) -> &'static str {
            "unit-axis"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("provider unavailable")
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn provider_id(&self) -> &'static str {
            "failing"
        }
    }

    async fn memory_with(provider: Arc<dyn EmbeddingProvider>) -> ShortTermMemory {
        let store = SqliteVectorStore::open_in_memory(Some(provider.dimensions()))
            .await
            .unwrap();
        ShortTermMemory::new(Arc::new(store), Some(EmbeddingClient::new(provider)))
    }

    #[tokio::test]
    async fn test_save_then_search() {
        let memory = memory_with(Arc::new(UnitAxisEmbedder)).await;

        memory.save("alpha note", Metadata::new()).await.unwrap();
        memory.save("beta note", Metadata::new()).await.unwrap();

        let hits = memory.search("alpha query", 10, 0.5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "alpha note");
    }

    #[tokio::test]
    async fn test_search_threshold_boundary() {
        let memory = memory_with(Arc::new(UnitAxisEmbedder)).await;
        memory.save("beta note", Metadata::new()).await.unwrap();

        // alpha vs beta vectors are orthogonal: similarity exactly 0.0
        let at_cutoff = memory.search("alpha query", 10, 0.0).await;
        assert_eq!(at_cutoff.len(), 1, "similarity equal to threshold clears it");

        let above_cutoff = memory.search("alpha query", 10, 0.01).await;
        assert!(above_cutoff.is_empty(), "similarity below threshold is excluded");
    }

    #[tokio::test]
    async fn test_save_fails_hard_on_embedding_failure() {
        let memory = memory_with(Arc::new(FailingEmbedder)).await;
        let err = memory.save("content", Metadata::new()).await.unwrap_err();
        assert!(matches!(err, EngramError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_search_fails_soft_on_embedding_failure() {
        let memory = memory_with(Arc::new(FailingEmbedder)).await;
        assert!(memory.search("anything", 10, 0.0).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_provider_degrades() {
        let store = SqliteVectorStore::open_in_memory(None).await.unwrap();
        let memory = ShortTermMemory::new(Arc::new(store), None);

        assert!(memory.search("anything", 10, 0.0).await.is_empty());
        assert!(matches!(
            memory.save("content", Metadata::new()).await,
            Err(EngramError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_empties_working_set() {
        let memory = memory_with(Arc::new(UnitAxisEmbedder)).await;
        memory.save("alpha note", Metadata::new()).await.unwrap();

        memory.clear().await.unwrap();
        assert_eq!(memory.count().await.unwrap(), 0);
        assert!(memory.search("alpha query", 10, 0.0).await.is_empty());
    }
}
