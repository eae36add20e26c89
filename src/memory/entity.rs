// src/memory/entity.rs
// Named-entity knowledge over a vector store, upsert-keyed by (name, type)

use crate::embeddings::EmbeddingClient;
use crate::error::{EngramError, Result};
use crate::memory::traits::{VectorRecord, VectorStore};
use crate::memory::types::{EntityRecord, MemoryItem, Metadata};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Entity memory: one record per `(name, type)`.
///
/// Entities are revisited across many tasks; appending would duplicate
/// knowledge and degrade retrieval precision, so writes merge into the
/// existing record instead (description last-write-wins, relationships
/// unioned). Same read/write failure asymmetry as short-term memory.
pub struct EntityMemory {
    store: Arc<dyn VectorStore>,
    embedder: Option<EmbeddingClient>,
    reset_gate: RwLock<()>,
}

fn entity_metadata(entity: &EntityRecord) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("name".to_string(), entity.name.clone().into());
    metadata.insert("type".to_string(), entity.entity_type.clone().into());
    metadata.insert(
        "description".to_string(),
        entity.description.clone().into(),
    );
    metadata.insert(
        "relationships".to_string(),
        serde_json::Value::Array(
            entity
                .relationships
                .iter()
                .map(|r| serde_json::Value::String(r.clone()))
                .collect(),
        ),
    );
    metadata
}

fn entity_from_metadata(metadata: &Metadata) -> Option<EntityRecord> {
    let name = metadata.get("name")?.as_str()?.to_string();
    let entity_type = metadata.get("type")?.as_str()?.to_string();
    let description = metadata
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_string();
    let relationships = metadata
        .get("relationships")
        .and_then(|r| r.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Some(EntityRecord {
        name,
        entity_type,
        description,
        relationships,
    })
}

impl EntityMemory {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Option<EmbeddingClient>) -> Self {
        Self {
            store,
            embedder,
            reset_gate: RwLock::new(()),
        }
    }

    /// Upsert an entity. An existing record under the same `(name, type)`
    /// is merged, not duplicated, and keeps its storage identity.
    pub async fn save(&self, mut entity: EntityRecord) -> Result<MemoryItem> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            EngramError::Embedding("no embedding provider configured".to_string())
        })?;

        let key = entity.key();
        if let Some(existing) = self.store.fetch(&key).await? {
            if let Some(previous) = entity_from_metadata(&existing.metadata) {
                entity.merge_previous(&previous);
            }
        }

        let content = entity.embedding_text();
        let vector = embedder
            .embed(&content)
            .await
            .map_err(|e| EngramError::Embedding(e.to_string()))?;

        let _writes_allowed = self.reset_gate.read().await;
        self.store
            .upsert(VectorRecord {
                key,
                content,
                metadata: entity_metadata(&entity),
                vector,
            })
            .await
    }

    /// Semantic search over entity records; fail-soft like short-term.
    pub async fn search(
        &self,
        query_text: &str,
        limit: usize,
        score_threshold: f32,
    ) -> Vec<MemoryItem> {
        let Some(embedder) = self.embedder.as_ref() else {
            debug!("Entity search skipped: no embedding provider");
            return Vec::new();
        };

        let vector = match embedder.embed(query_text).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Entity search degraded to empty: embedding failed: {e}");
                return Vec::new();
            }
        };

        match self.store.query(vector, limit, score_threshold).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Entity search degraded to empty: store query failed: {e}");
                Vec::new()
            }
        }
    }

    /// Fetch the single current record for `(name, type)`.
    pub async fn fetch(&self, name: &str, entity_type: &str) -> Result<Option<EntityRecord>> {
        let key = format!("{entity_type}:{name}");
        let item = self.store.fetch(&key).await?;
        Ok(item.and_then(|i| entity_from_metadata(&i.metadata)))
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
    use crate::db::SqliteVectorStore;
    use crate::embeddings::EmbeddingProvider;
    use async_trait::async_trait;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    /// Deterministic bag-of-words embedder: same text, same vector.
    struct HashEmbedder {
        dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for HashEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let mut vector = vec![0.0f32; self.dims];
            for token in text.to_lowercase().split_whitespace() {
                let mut hasher = DefaultHasher::new();
                token.hash(&mut hasher);
                vector[(hasher.finish() as usize) % self.dims] += 1.0;
            }
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut vector {
                    *v /= norm;
                }
            }
            Ok(vector)
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn provider_id(&self) -> &'static str {
            "hash"
        }
    }

    async fn entity_memory() -> EntityMemory {
        let store = SqliteVectorStore::open_in_memory(Some(64)).await.unwrap();
        EntityMemory::new(
            Arc::new(store),
            Some(EmbeddingClient::new(Arc::new(HashEmbedder { dims: 64 }))),
        )
    }

    #[tokio::test]
    async fn test_upsert_same_key_keeps_single_record() {
        let memory = entity_memory().await;

        memory
            .save(EntityRecord::new("Paris", "city", "capital of France"))
            .await
            .unwrap();
        memory
            .save(EntityRecord::new(
                "Paris",
                "city",
                "capital of France, pop. 2.1M",
            ))
            .await
            .unwrap();

        assert_eq!(memory.count().await.unwrap(), 1);
        let fetched = memory.fetch("Paris", "city").await.unwrap().unwrap();
        assert_eq!(fetched.description, "capital of France, pop. 2.1M");
    }

    #[tokio::test]
    async fn test_same_name_different_type_are_distinct() {
        let memory = entity_memory().await;

        memory
            .save(EntityRecord::new("Paris", "city", "capital of France"))
            .await
            .unwrap();
        memory
            .save(EntityRecord::new("Paris", "person", "mythological figure"))
            .await
            .unwrap();

        assert_eq!(memory.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_unions_relationships() {
        let memory = entity_memory().await;

        memory
            .save(
                EntityRecord::new("Paris", "city", "capital of France")
                    .with_relationships(vec!["France".to_string()]),
            )
            .await
            .unwrap();
        memory
            .save(
                EntityRecord::new("Paris", "city", "capital of France")
                    .with_relationships(vec!["Seine".to_string(), "France".to_string()]),
            )
            .await
            .unwrap();

        let fetched = memory.fetch("Paris", "city").await.unwrap().unwrap();
        assert_eq!(fetched.relationships, vec!["France", "Seine"]);
    }

    #[tokio::test]
    async fn test_search_finds_entity() {
        let memory = entity_memory().await;
        memory
            .save(EntityRecord::new("Paris", "city", "capital of France"))
            .await
            .unwrap();

        let hits = memory.search("Paris", 5, 0.1).await;
        assert!(!hits.is_empty());
        assert!(hits[0].content.contains("Paris"));
    }

    #[tokio::test]
    async fn test_fetch_missing_is_none() {
        let memory = entity_memory().await;
        assert!(memory.fetch("Nowhere", "city").await.unwrap().is_none());
    }
}
