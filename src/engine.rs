// src/engine.rs
// Engine façade: construction-time validation, store wiring, fan-in writes

use crate::config::{EngramConfig, EnvConfig, StorageConfig, StorageLayout};
use crate::db::{SqliteExecutionLog, SqliteTaskOutputs, SqliteVectorStore};
use crate::embeddings::EmbedderConfig;
use crate::error::{EngramError, Result};
use crate::http::create_shared_client;
use crate::memory::contextual::{ContextualMemory, MergedContext};
use crate::memory::entity::EntityMemory;
use crate::memory::long_term::LongTermMemory;
use crate::memory::outputs::TaskOutputLog;
use crate::memory::reset::{LifecycleManager, ResetScopes};
use crate::memory::short_term::ShortTermMemory;
use crate::memory::types::{
    ContextQuery, EntityRecord, MemoryItem, Metadata, TaskExecutionRecord,
};
use crate::personalization::{UserMemoryProvider, UserScope};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Engine construction options. Everything is validated eagerly by
/// [`MemoryEngine::new`]; nothing here is re-read after construction.
#[derive(Clone, Default)]
pub struct EngineConfig {
    /// Project/crew identifier namespacing the storage layout
    pub project: String,
    /// Storage root options (explicit path beats the env override)
    pub storage: StorageConfig,
    /// Embedding provider selection
    pub embedder: EmbedderConfig,
    /// Fusion/retrieval/long-term tunables; `None` loads `config.toml`
    /// from the storage root
    pub tunables: Option<EngramConfig>,
    /// Optional external personalization provider
    pub user_memory: Option<Arc<dyn UserMemoryProvider>>,
}

impl EngineConfig {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Self::default()
        }
    }
}

/// Per-store item counts.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub short_term_items: u64,
    pub entity_records: u64,
    pub long_term_records: u64,
    pub task_outputs: u64,
}

/// The contextual memory engine.
///
/// Owns the three memory stores plus the task-output log, the aggregator,
/// and the lifecycle manager. Invoked concurrently by many in-flight tasks;
/// no global lock spans the stores and cross-memory consistency is not
/// guaranteed (context is advisory, not transactional).
pub struct MemoryEngine {
    short_term: Arc<ShortTermMemory>,
    entities: Arc<EntityMemory>,
    long_term: Arc<LongTermMemory>,
    outputs: Arc<TaskOutputLog>,
    contextual: ContextualMemory,
    lifecycle: LifecycleManager,
    user_memory: Option<Arc<dyn UserMemoryProvider>>,
    tunables: EngramConfig,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("user_memory", &self.user_memory.is_some())
            .field("tunables", &self.tunables)
            .finish_non_exhaustive()
    }
}

impl MemoryEngine {
    /// Open the engine over on-disk stores.
    ///
    /// Fatal configuration problems (unknown provider setup, unresolvable
    /// storage root, a vector store created under different embedding
    /// dimensions) surface here, never at first use.
    pub async fn new(config: EngineConfig) -> Result<Self> {
        let env = EnvConfig::load();
        let validation = env.validate();
        for warning in &validation.warnings {
            warn!("{warning}");
        }
        if !validation.is_valid() {
            return Err(EngramError::Config(validation.report()));
        }

        let layout = StorageLayout::resolve(&config.storage, &config.project)?;
        let tunables = config
            .tunables
            .clone()
            .unwrap_or_else(|| EngramConfig::load(layout.root()));

        let embedder = config.embedder.build(&env, create_shared_client())?;
        let dimensions = embedder.as_ref().map(|e| e.dimensions());
        if let Some(client) = &embedder {
            info!(
                provider = client.provider_id(),
                dimensions = client.dimensions(),
                "Semantic recall enabled"
            );
        } else {
            info!("Semantic recall disabled (no embedding provider); long-term memory unaffected");
        }

        let short_store = SqliteVectorStore::open(&layout.short_term_db(), dimensions).await?;
        let entity_store = SqliteVectorStore::open(&layout.entities_db(), dimensions).await?;
        let execution_log = SqliteExecutionLog::open(&layout.long_term_db()).await?;
        let output_store = SqliteTaskOutputs::open(&layout.outputs_db()).await?;

        info!(
            root = %layout.root().display(),
            project = layout.project(),
            "Memory engine initialized"
        );

        Ok(Self::assemble(
            config,
            tunables,
            short_store,
            entity_store,
            execution_log,
            output_store,
            embedder,
        ))
    }

    /// Open the engine over in-memory stores (tests and ephemeral runs).
    /// Environment variables are not consulted; the embedder must be fully
    /// specified in `config`.
    pub async fn in_memory(config: EngineConfig) -> Result<Self> {
        let tunables = config.tunables.clone().unwrap_or_default();
        let embedder = config
            .embedder
            .build(&EnvConfig::default(), create_shared_client())?;
        let dimensions = embedder.as_ref().map(|e| e.dimensions());

        let short_store = SqliteVectorStore::open_in_memory(dimensions).await?;
        let entity_store = SqliteVectorStore::open_in_memory(dimensions).await?;
        let execution_log = SqliteExecutionLog::open_in_memory().await?;
        let output_store = SqliteTaskOutputs::open_in_memory().await?;

        Ok(Self::assemble(
            config,
            tunables,
            short_store,
            entity_store,
            execution_log,
            output_store,
            embedder,
        ))
    }

    fn assemble(
        config: EngineConfig,
        tunables: EngramConfig,
        short_store: SqliteVectorStore,
        entity_store: SqliteVectorStore,
        execution_log: SqliteExecutionLog,
        output_store: SqliteTaskOutputs,
        embedder: Option<crate::embeddings::EmbeddingClient>,
    ) -> Self {
        let short_term = Arc::new(ShortTermMemory::new(
            Arc::new(short_store),
            embedder.clone(),
        ));
        let entities = Arc::new(EntityMemory::new(Arc::new(entity_store), embedder));
        let long_term = Arc::new(LongTermMemory::new(
            Arc::new(execution_log),
            tunables.long_term.quality_floor,
        ));
        let outputs = Arc::new(TaskOutputLog::new(output_store));

        let contextual = ContextualMemory::new(
            short_term.clone(),
            entities.clone(),
            long_term.clone(),
            tunables.fusion.clone(),
        );
        let lifecycle = LifecycleManager::new(
            short_term.clone(),
            entities.clone(),
            long_term.clone(),
            outputs.clone(),
        );

        Self {
            short_term,
            entities,
            long_term,
            outputs,
            contextual,
            lifecycle,
            user_memory: config.user_memory,
            tunables,
        }
    }

    /// A query using the configured retrieval defaults.
    pub fn query(&self, query_text: impl Into<String>) -> ContextQuery {
        ContextQuery::new(
            query_text,
            self.tunables.retrieval.default_limit,
            self.tunables.retrieval.score_threshold,
        )
    }

    /// Build the fused context for the current decision. Read-only.
    pub async fn build_context(
        &self,
        query: &ContextQuery,
        include_long_term: bool,
    ) -> MergedContext {
        self.contextual.build_context(query, include_long_term).await
    }

    /// Write a task observation into short-term memory.
    pub async fn remember(&self, content: &str, metadata: Metadata) -> Result<MemoryItem> {
        self.short_term.save(content, metadata).await
    }

    /// Upsert an entity observed or mentioned by a task.
    pub async fn remember_entity(&self, entity: EntityRecord) -> Result<MemoryItem> {
        self.entities.save(entity).await
    }

    /// Append a scored execution summary to long-term memory.
    pub async fn record_execution(&self, record: TaskExecutionRecord) -> Result<()> {
        self.long_term.save(record).await
    }

    /// Record one task output in the latest-run log.
    pub async fn record_task_output(
        &self,
        task_description: &str,
        output: &str,
        metadata: Metadata,
    ) -> Result<()> {
        self.outputs.record(task_description, output, metadata).await
    }

    /// Forward an interaction to the external personalization provider, if
    /// one is configured.
    pub async fn record_interaction(
        &self,
        scope: &UserScope,
        text: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        match &self.user_memory {
            Some(provider) => provider.add_interaction(scope, text, metadata).await,
            None => {
                debug!("No user-memory provider configured; interaction not forwarded");
                Ok(())
            }
        }
    }

    /// User-level preference snippets for prompt construction; empty when no
    /// provider is configured.
    pub async fn user_context(
        &self,
        scope: &UserScope,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        match &self.user_memory {
            Some(provider) => provider.retrieve(scope, query, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Clear the selected memory scopes. Idempotent; no scopes selected is
    /// a no-op.
    pub async fn reset(&self, scopes: ResetScopes) -> Result<()> {
        self.lifecycle.reset(scopes).await
    }

    /// Per-store item counts.
    pub async fn stats(&self) -> Result<MemoryStats> {
        Ok(MemoryStats {
            short_term_items: self.short_term.count().await?,
            entity_records: self.entities.count().await?,
            long_term_records: self.long_term.count().await?,
            task_outputs: self.outputs.count().await?,
        })
    }

    pub fn short_term(&self) -> &ShortTermMemory {
        &self.short_term
    }

    pub fn entities(&self) -> &EntityMemory {
        &self.entities
    }

    pub fn long_term(&self) -> &LongTermMemory {
        &self.long_term
    }

    pub fn task_outputs(&self) -> &TaskOutputLog {
        &self.outputs
    }
}
