// src/memory/contextual.rs
// Contextual aggregator: parallel fan-out, weighted rank fusion, dedup

use crate::config::FusionConfig;
use crate::memory::entity::EntityMemory;
use crate::memory::long_term::LongTermMemory;
use crate::memory::short_term::ShortTermMemory;
use crate::memory::types::{ContextQuery, MemorySource, Metadata, TaskExecutionRecord};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, warn};

/// One fused context entry, carrying its origin and combined score.
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub content: String,
    pub metadata: Metadata,
    pub source: MemorySource,
    pub score: f32,
}

/// The fused retrieval result: ordered, deduplicated, truncated to the
/// caller's limit. Rebuilt on every query, never cached: short-term memory
/// is the cache for "recent", not a cache of merge results.
#[derive(Debug, Clone, Default)]
pub struct MergedContext {
    pub entries: Vec<ContextEntry>,
}

impl MergedContext {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Plain-text rendering for prompt construction, one entry per line.
    pub fn text(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fuses the three memories into one ranked context.
pub struct ContextualMemory {
    short_term: Arc<ShortTermMemory>,
    entities: Arc<EntityMemory>,
    long_term: Arc<LongTermMemory>,
    fusion: FusionConfig,
}

impl ContextualMemory {
    pub fn new(
        short_term: Arc<ShortTermMemory>,
        entities: Arc<EntityMemory>,
        long_term: Arc<LongTermMemory>,
        fusion: FusionConfig,
    ) -> Self {
        Self {
            short_term,
            entities,
            long_term,
            fusion,
        }
    }

    /// Build the merged context for a query.
    ///
    /// Fans out to the stores in parallel; each sub-query is independently
    /// bounded by the configured deadline, and an expired or failed branch
    /// contributes nothing; partial context is preferable to no context
    /// under a deadline. Long-term memory participates only when the caller
    /// flags the query as learning-relevant. Read-only; an empty result is
    /// a normal state, especially on first run.
    pub async fn build_context(
        &self,
        query: &ContextQuery,
        include_long_term: bool,
    ) -> MergedContext {
        let start = Instant::now();
        let deadline = self.fusion.fanout_deadline();
        let q = query.query_text.as_str();

        let (short_term, entities, long_term) = tokio::join!(
            timeout(
                deadline,
                self.short_term.search(q, query.limit, query.score_threshold)
            ),
            timeout(
                deadline,
                self.entities.search(q, query.limit, query.score_threshold)
            ),
            async {
                if include_long_term {
                    timeout(deadline, self.long_term.search(q, query.limit)).await
                } else {
                    Ok(Vec::new())
                }
            },
        );

        let short_term = unwrap_or_abandoned(MemorySource::ShortTerm, short_term);
        let entities = unwrap_or_abandoned(MemorySource::Entities, entities);
        let long_term = unwrap_or_abandoned(MemorySource::LongTerm, long_term);

        let sources = vec![
            (
                MemorySource::ShortTerm,
                self.fusion.short_term_weight,
                short_term
                    .into_iter()
                    .map(|item| (item.content, item.metadata))
                    .collect(),
            ),
            (
                MemorySource::Entities,
                self.fusion.entity_weight,
                entities
                    .into_iter()
                    .map(|item| (item.content, item.metadata))
                    .collect(),
            ),
            (
                MemorySource::LongTerm,
                self.fusion.long_term_weight,
                long_term.into_iter().map(execution_candidate).collect(),
            ),
        ];

        let entries = fuse(sources, self.fusion.dedup_threshold, query.limit);

        debug!(
            entries = entries.len(),
            elapsed = ?start.elapsed(),
            "Context built"
        );

        MergedContext { entries }
    }
}

/// Flatten one fan-out branch: a deadline expiry means the sub-query was
/// abandoned and the merge proceeds with what the other sources returned.
fn unwrap_or_abandoned<T>(
    source: MemorySource,
    result: Result<Vec<T>, tokio::time::error::Elapsed>,
) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(_) => {
            warn!(source = %source, "Sub-query abandoned at fan-out deadline");
            Vec::new()
        }
    }
}

/// Project an execution record into a context candidate. The recalled
/// knowledge is the actual output; provenance rides along as metadata.
fn execution_candidate(record: TaskExecutionRecord) -> (String, Metadata) {
    let mut metadata = record.metadata;
    metadata.insert(
        "task_description".to_string(),
        record.task_description.into(),
    );
    metadata.insert("agent_role".to_string(), record.agent_role.into());
    metadata.insert("quality_score".to_string(), record.quality_score.into());
    (record.actual_output, metadata)
}

/// Weighted positional rank fusion.
///
/// Each source contributes `weight * (1 - rank/len)` per candidate, so the
/// top of every list scores its full weight regardless of list length.
/// Candidates are ordered by combined score; exact ties are broken by source
/// priority (entities > long-term > short-term), then by each list's native
/// order. Near-duplicates keep only the higher-scored entry, and the result
/// is truncated to `limit`.
pub(crate) fn fuse(
    sources: Vec<(MemorySource, f32, Vec<(String, Metadata)>)>,
    dedup_threshold: f32,
    limit: usize,
) -> Vec<ContextEntry> {
    let mut scored: Vec<ContextEntry> = Vec::new();
    for (source, weight, candidates) in sources {
        let len = candidates.len();
        for (rank, (content, metadata)) in candidates.into_iter().enumerate() {
            let score = weight * (1.0 - rank as f32 / len as f32);
            scored.push(ContextEntry {
                content,
                metadata,
                source,
                score,
            });
        }
    }

    // Stable sort keeps native order within equal (score, priority) pairs,
    // which makes the merge deterministic for fixed inputs.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source.priority().cmp(&b.source.priority()))
    });

    let mut kept: Vec<ContextEntry> = Vec::new();
    for entry in scored {
        if kept.len() == limit {
            break;
        }
        let duplicate = kept
            .iter()
            .any(|k| content_similarity(&k.content, &entry.content) >= dedup_threshold);
        if !duplicate {
            kept.push(entry);
        }
    }
    kept
}

/// Normalized content similarity in [0, 1]: 1.0 for case/whitespace-equal
/// text, token Jaccard overlap otherwise.
pub(crate) fn content_similarity(a: &str, b: &str) -> f32 {
    let na = normalize(a);
    let nb = normalize(b);
    if na == nb {
        return 1.0;
    }

    let tokens_a: HashSet<&str> = na.split(' ').collect();
    let tokens_b: HashSet<&str> = nb.split(' ').collect();
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(contents: &[&str]) -> Vec<(String, Metadata)> {
        contents
            .iter()
            .map(|c| (c.to_string(), Metadata::new()))
            .collect()
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let sources = || {
            vec![
                (
                    MemorySource::ShortTerm,
                    1.0,
                    candidates(&["recent fact", "older fact"]),
                ),
                (MemorySource::Entities, 1.0, candidates(&["entity fact"])),
                (
                    MemorySource::LongTerm,
                    1.0,
                    candidates(&["past execution"]),
                ),
            ]
        };

        let first = fuse(sources(), 0.95, 10);
        let second = fuse(sources(), 0.95, 10);

        let order = |entries: &[ContextEntry]| {
            entries
                .iter()
                .map(|e| (e.content.clone(), e.source))
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), order(&second));
    }

    #[test]
    fn test_tie_break_entity_beats_short_term() {
        let sources = vec![
            (
                MemorySource::ShortTerm,
                1.0,
                candidates(&["short-term fact"]),
            ),
            (MemorySource::Entities, 1.0, candidates(&["entity fact"])),
        ];

        // Both rank 0 of a 1-element list with equal weights: identical
        // combined scores
        let fused = fuse(sources, 0.95, 10);
        assert_eq!(fused[0].source, MemorySource::Entities);
        assert_eq!(fused[1].source, MemorySource::ShortTerm);
    }

    #[test]
    fn test_tie_break_long_term_beats_short_term() {
        let sources = vec![
            (MemorySource::ShortTerm, 1.0, candidates(&["a"])),
            (MemorySource::LongTerm, 1.0, candidates(&["b"])),
        ];
        let fused = fuse(sources, 0.95, 10);
        assert_eq!(fused[0].source, MemorySource::LongTerm);
    }

    #[test]
    fn test_weights_reorder_sources() {
        let sources = vec![
            (MemorySource::ShortTerm, 2.0, candidates(&["boosted"])),
            (MemorySource::Entities, 1.0, candidates(&["normal"])),
        ];
        let fused = fuse(sources, 0.95, 10);
        assert_eq!(fused[0].content, "boosted");
        assert_eq!(fused[0].score, 2.0);
    }

    #[test]
    fn test_positional_scores_decay_with_rank() {
        let sources = vec![(
            MemorySource::ShortTerm,
            1.0,
            candidates(&["first", "second", "third", "fourth"]),
        )];
        let fused = fuse(sources, 0.95, 10);
        assert_eq!(fused[0].score, 1.0);
        assert_eq!(fused[1].score, 0.75);
        assert_eq!(fused[3].score, 0.25);
    }

    #[test]
    fn test_dedup_keeps_higher_scored_entry() {
        let sources = vec![
            (
                MemorySource::ShortTerm,
                1.0,
                candidates(&["filler", "The Capital Of France"]),
            ),
            (
                MemorySource::Entities,
                1.0,
                candidates(&["the capital of france"]),
            ),
        ];

        let fused = fuse(sources, 0.95, 10);
        let dupes: Vec<_> = fused
            .iter()
            .filter(|e| e.content.eq_ignore_ascii_case("the capital of france"))
            .collect();
        assert_eq!(dupes.len(), 1);
        // The entity copy scored 1.0 vs the short-term copy's 0.5
        assert_eq!(dupes[0].source, MemorySource::Entities);
    }

    #[test]
    fn test_truncation_to_limit() {
        let sources = vec![(
            MemorySource::ShortTerm,
            1.0,
            candidates(&["a", "b", "c", "d", "e"]),
        )];
        let fused = fuse(sources, 0.95, 2);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].content, "a");
    }

    #[test]
    fn test_all_sources_empty_is_empty_context() {
        let sources = vec![
            (MemorySource::ShortTerm, 1.0, candidates(&[])),
            (MemorySource::Entities, 1.0, candidates(&[])),
            (MemorySource::LongTerm, 1.0, candidates(&[])),
        ];
        assert!(fuse(sources, 0.95, 10).is_empty());
    }

    #[test]
    fn test_content_similarity() {
        assert_eq!(content_similarity("Hello  World", "hello world"), 1.0);
        assert_eq!(content_similarity("alpha", "beta"), 0.0);
        let partial = content_similarity("the red fox", "the red dog");
        assert!(partial > 0.0 && partial < 1.0);
    }

    #[test]
    fn test_merged_context_text() {
        let context = MergedContext {
            entries: vec![
                ContextEntry {
                    content: "one".to_string(),
                    metadata: Metadata::new(),
                    source: MemorySource::Entities,
                    score: 1.0,
                },
                ContextEntry {
                    content: "two".to_string(),
                    metadata: Metadata::new(),
                    source: MemorySource::ShortTerm,
                    score: 0.5,
                },
            ],
        };
        assert_eq!(context.text(), "one\ntwo");
        assert_eq!(context.len(), 2);
        assert!(!context.is_empty());
    }
}
