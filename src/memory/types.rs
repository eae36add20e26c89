// src/memory/types.rs
// Core record types shared by the memory stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scalar metadata attached to memory records
pub type Metadata = HashMap<String, serde_json::Value>;

/// Which memory a retrieved item came from
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    ShortTerm,
    LongTerm,
    Entities,
}

impl MemorySource {
    /// Merge tie-break priority: entity knowledge is treated as more
    /// durable/authoritative than long-term history, which in turn beats
    /// ephemeral short-term recall.
    pub(crate) fn priority(self) -> u8 {
        match self {
            MemorySource::Entities => 0,
            MemorySource::LongTerm => 1,
            MemorySource::ShortTerm => 2,
        }
    }
}

/// A single retrievable item held by one of the vector-backed stores.
///
/// The vector is computed once at write time and never leaves the owning
/// store on reads; retrieved items carry the store's relevance score
/// instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Store-unique key (UUID for short-term items, `type:name` for entities)
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    /// Native score from the store that produced this item
    pub relevance_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// A scored summary of one task execution (long-term memory).
/// Append-only; corrections append a new record rather than editing history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub task_description: String,
    pub agent_role: String,
    pub expected_output: String,
    pub actual_output: String,
    /// How well the execution matched its expected output, in [0, 1]
    pub quality_score: f64,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl TaskExecutionRecord {
    pub fn new(
        task_description: impl Into<String>,
        agent_role: impl Into<String>,
        expected_output: impl Into<String>,
        actual_output: impl Into<String>,
        quality_score: f64,
    ) -> Self {
        Self {
            task_description: task_description.into(),
            agent_role: agent_role.into(),
            expected_output: expected_output.into(),
            actual_output: actual_output.into(),
            quality_score,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Quality scores live in [0, 1]; anything else is caller error.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(0.0..=1.0).contains(&self.quality_score) || self.quality_score.is_nan() {
            return Err(crate::error::EngramError::InvalidInput(format!(
                "quality_score must be in [0, 1], got {}",
                self.quality_score
            )));
        }
        Ok(())
    }
}

/// A named entity tracked across tasks.
///
/// Upserts are keyed by `(name, type)`: the description is last-write-wins
/// and relationship lists are unioned, so revisiting an entity refines one
/// record instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: String,
    #[serde(default)]
    pub relationships: Vec<String>,
}

impl EntityRecord {
    pub fn new(
        name: impl Into<String>,
        entity_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            description: description.into(),
            relationships: Vec::new(),
        }
    }

    pub fn with_relationships(mut self, relationships: Vec<String>) -> Self {
        self.relationships = relationships;
        self
    }

    /// Storage key for upserts; identity is `(name, type)`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.entity_type, self.name)
    }

    /// Text handed to the embedding provider.
    pub fn embedding_text(&self) -> String {
        format!("{} ({}): {}", self.name, self.entity_type, self.description)
    }

    /// Merge an earlier record under the same key into this one: this
    /// record's description wins, relationships are unioned preserving
    /// first-seen order.
    pub fn merge_previous(&mut self, previous: &EntityRecord) {
        let mut merged = previous.relationships.clone();
        for rel in &self.relationships {
            if !merged.contains(rel) {
                merged.push(rel.clone());
            }
        }
        self.relationships = merged;
    }
}

/// Latest-run task output (kickoff-output log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutputRecord {
    pub task_description: String,
    pub output: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// A transient retrieval request; constructed per call, never persisted.
#[derive(Debug, Clone)]
pub struct ContextQuery {
    pub query_text: String,
    pub limit: usize,
    pub score_threshold: f32,
}

impl ContextQuery {
    pub fn new(query_text: impl Into<String>, limit: usize, score_threshold: f32) -> Self {
        Self {
            query_text: query_text.into(),
            limit,
            score_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_score_validation() {
        assert!(TaskExecutionRecord::new("t", "r", "e", "a", 0.0).validate().is_ok());
        assert!(TaskExecutionRecord::new("t", "r", "e", "a", 1.0).validate().is_ok());
        assert!(TaskExecutionRecord::new("t", "r", "e", "a", 1.1).validate().is_err());
        assert!(TaskExecutionRecord::new("t", "r", "e", "a", -0.1).validate().is_err());
        assert!(TaskExecutionRecord::new("t", "r", "e", "a", f64::NAN).validate().is_err());
    }

    #[test]
    fn test_entity_key() {
        let entity = EntityRecord::new("Paris", "city", "capital of France");
        assert_eq!(entity.key(), "city:Paris");
        assert_eq!(entity.embedding_text(), "Paris (city): capital of France");
    }

    #[test]
    fn test_entity_merge_unions_relationships() {
        let previous = EntityRecord::new("Paris", "city", "capital of France")
            .with_relationships(vec!["France".to_string(), "Seine".to_string()]);

        let mut updated = EntityRecord::new("Paris", "city", "capital of France, pop. 2.1M")
            .with_relationships(vec!["Seine".to_string(), "Louvre".to_string()]);
        updated.merge_previous(&previous);

        // First-seen order, no duplicates, new description kept
        assert_eq!(updated.relationships, vec!["France", "Seine", "Louvre"]);
        assert_eq!(updated.description, "capital of France, pop. 2.1M");
    }

    #[test]
    fn test_source_priority_ordering() {
        assert!(MemorySource::Entities.priority() < MemorySource::LongTerm.priority());
        assert!(MemorySource::LongTerm.priority() < MemorySource::ShortTerm.priority());
    }

    #[test]
    fn test_source_display() {
        assert_eq!(MemorySource::ShortTerm.to_string(), "short_term");
        assert_eq!(MemorySource::Entities.to_string(), "entities");
    }
}
