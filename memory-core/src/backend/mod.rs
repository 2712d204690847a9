//! The memory backend: tool-operation façade over the three stores.
//!
//! Binds a resolved project to its symbolic, episodic, and semantic
//! stores, implements the tool operations, records metrics around every
//! call, keeps the 100-op ring, and drives automatic learning through a
//! bounded queue whose worker never delays tool responses.

mod params;

pub use params::{
    AddEpisodeParams, AddFactParams, AnalyzeConversationParams, GetContextParams,
    IngestFileParams, ListProjectsParams, ListSourcesParams, SearchParams,
};

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::analyzer::{ChatCompleter, ConversationAnalyzer, Learning};
use crate::config::MemoryConfig;
use crate::embeddings::{CachedEmbedder, Embedder};
use crate::episodic::{EpisodeQuery, EpisodicStore};
use crate::error::{Error, Result};
use crate::ingest::Ingestor;
use crate::learning::{
    AutoLearningTracker, DEDUP_SIMILARITY_THRESHOLD, LearningCandidate, LearningExtractor,
    lesson_similarity,
};
use crate::monitoring::MetricsRegistry;
use crate::project::ProjectManager;
use crate::retrieval::{RetrievalRequest, RetrievalTrigger, Retriever};
use crate::security::RemoteUploadGuard;
use crate::semantic::{SemanticStore, semantic_store_at};
use crate::symbolic::{FactQuery, SymbolicStore};
use crate::types::{
    Authority, Episode, FactCategory, FactSource, MemoryFact, OpResult, OperationRecord,
    ProjectStatus,
};

/// Capacity of the in-memory operation ring.
const MAX_OPERATION_RECORDS: usize = 100;

/// Capacity of the learning side-effect queue (drop-oldest on overflow).
const LEARNING_QUEUE_CAPACITY: usize = 64;

/// Delay before an ingested upload is deleted from the sandbox.
const UPLOAD_DELETE_DELAY_MS: u64 = 500;

/// A project's three stores, opened once and shared.
pub struct ProjectStores {
    pub symbolic: SymbolicStore,
    pub episodic: EpisodicStore,
    pub semantic: Arc<dyn SemanticStore>,
}

/// Stateless tool façade (apart from the op ring and learning queue).
pub struct MemoryBackend {
    config: MemoryConfig,
    projects: ProjectManager,
    stores: tokio::sync::Mutex<HashMap<String, Arc<ProjectStores>>>,
    embedder: Arc<dyn Embedder>,
    metrics: Arc<MetricsRegistry>,
    upload_guard: RemoteUploadGuard,
    analyzer: ConversationAnalyzer,
    tracker: AutoLearningTracker,
    extractor: LearningExtractor,
    operations: parking_lot::Mutex<VecDeque<OperationRecord>>,
    learn_queue: parking_lot::Mutex<VecDeque<(String, LearningCandidate)>>,
    learn_notify: Arc<Notify>,
}

impl MemoryBackend {
    /// Build a backend over `data_dir` and spawn its learning worker.
    pub async fn new(
        config: MemoryConfig,
        data_dir: &Path,
        embedder: Arc<dyn Embedder>,
        completer: Option<Arc<dyn ChatCompleter>>,
    ) -> Result<Arc<Self>> {
        let projects = ProjectManager::open(data_dir).await?;
        let metrics = Arc::new(MetricsRegistry::new(data_dir));
        metrics.load();
        let embedder: Arc<dyn Embedder> = Arc::new(CachedEmbedder::new(embedder, 1_000));

        let backend = Arc::new(Self {
            upload_guard: RemoteUploadGuard::new(config.upload.clone()),
            analyzer: ConversationAnalyzer::new(
                config.conversation_analyzer.clone(),
                completer.clone(),
            ),
            tracker: AutoLearningTracker::new(config.automatic_learning.clone()),
            extractor: LearningExtractor::new(completer),
            config,
            projects,
            stores: tokio::sync::Mutex::new(HashMap::new()),
            embedder,
            metrics,
            operations: parking_lot::Mutex::new(VecDeque::with_capacity(MAX_OPERATION_RECORDS)),
            learn_queue: parking_lot::Mutex::new(VecDeque::new()),
            learn_notify: Arc::new(Notify::new()),
        });

        backend.spawn_learning_worker();
        info!(data_dir = %data_dir.display(), "memory backend initialized");
        Ok(backend)
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    #[must_use]
    pub fn project_manager(&self) -> &ProjectManager {
        &self.projects
    }

    /// Snapshot of the operation ring, oldest first.
    #[must_use]
    pub fn operation_records(&self) -> Vec<OperationRecord> {
        self.operations.lock().iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Tool operations
    // ------------------------------------------------------------------

    /// `list_projects` — all registered projects.
    pub async fn list_projects(&self, params: &ListProjectsParams) -> Result<Value> {
        let op = OpScope::open(self, "list_projects", "global", serde_json::to_value(params)?);
        let result = self.do_list_projects(params).await;
        op.finish(self, &result);
        result
    }

    async fn do_list_projects(&self, params: &ListProjectsParams) -> Result<Value> {
        let status = params
            .scope_type
            .as_deref()
            .map(ProjectStatus::from_str)
            .transpose()?;
        let projects = self.projects.list_projects(status).await?;
        let total = projects.len();
        Ok(json!({
            "status": "success",
            "projects": projects,
            "total": total,
            "message": format!("Found {total} project(s)"),
            "authority": Authority::System,
        }))
    }

    /// `list_sources` — per-source aggregation of a project's chunks.
    pub async fn list_sources(&self, params: &ListSourcesParams) -> Result<Value> {
        let op = OpScope::open(self, "list_sources", &params.project_id, serde_json::to_value(params)?);
        let result = self.do_list_sources(params).await;
        op.finish(self, &result);
        result
    }

    async fn do_list_sources(&self, params: &ListSourcesParams) -> Result<Value> {
        let (stores, _) = self.stores_for(&params.project_id).await?;

        let mut sources: std::collections::BTreeMap<String, (String, usize, chrono::DateTime<Utc>)> =
            std::collections::BTreeMap::new();
        for chunk in stores.semantic.chunks_snapshot() {
            let source = chunk.source().unwrap_or("unknown").to_string();
            let doc_type = chunk
                .metadata
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            if let Some(filter) = &params.source_type {
                if &doc_type != filter {
                    continue;
                }
            }
            let entry = sources.entry(source).or_insert((doc_type, 0, chunk.created_at));
            entry.1 += 1;
            entry.2 = entry.2.max(chunk.created_at);
        }

        let sources: Vec<Value> = sources
            .into_iter()
            .map(|(path, (doc_type, chunk_count, last_updated))| {
                json!({
                    "path": path,
                    "type": doc_type,
                    "chunk_count": chunk_count,
                    "last_updated": last_updated,
                })
            })
            .collect();
        let total = sources.len();

        Ok(json!({
            "status": "success",
            "sources": sources,
            "total": total,
            "message": format!("Found {total} source(s)"),
            "authority": Authority::NonAuthoritative,
        }))
    }

    /// `get_context` — the three memory arrays under the authority
    /// hierarchy. Semantic context requires a query.
    pub async fn get_context(&self, params: &GetContextParams) -> Result<Value> {
        let op = OpScope::open(self, "get_context", &params.project_id, serde_json::to_value(params)?);
        let result = self.do_get_context(params).await;
        op.finish(self, &result);
        result
    }

    async fn do_get_context(&self, params: &GetContextParams) -> Result<Value> {
        if !matches!(params.context_type.as_str(), "all" | "symbolic" | "episodic" | "semantic") {
            return Err(Error::InvalidArgument(format!(
                "Unknown context type: {}",
                params.context_type
            )));
        }

        let (stores, project) = self.stores_for(&params.project_id).await?;
        let context_type = params.context_type.as_str();

        let mut symbolic = Vec::new();
        if matches!(context_type, "all" | "symbolic") {
            let facts = stores
                .symbolic
                .query_memory(&FactQuery {
                    project_id: Some(project.project_id.clone()),
                    min_confidence: 0.5,
                    limit: Some(params.max_results),
                    ..FactQuery::default()
                })
                .await?;
            for fact in facts {
                symbolic.push(annotate(serde_json::to_value(&fact)?, Authority::Authoritative));
            }
        }

        let mut episodic = Vec::new();
        if matches!(context_type, "all" | "episodic") {
            let episodes = stores
                .episodic
                .list_recent_episodes(&project.project_id, 30, 0.5, params.max_results)
                .await?;
            for episode in episodes {
                episodic.push(annotate(serde_json::to_value(&episode)?, Authority::Advisory));
            }
        }

        let mut semantic = Vec::new();
        if matches!(context_type, "all" | "semantic") {
            if let Some(query) = params.query.as_deref().filter(|q| !q.is_empty()) {
                let retriever = self.retriever_for(&stores);
                let hits = retriever
                    .retrieve(&self.retrieval_request(query, params.max_results))
                    .await?;
                for hit in hits {
                    semantic.push(json!({
                        "chunk_id": hit.hit.chunk_id,
                        "content": hit.hit.content,
                        "source": hit.hit.metadata.get("source").and_then(Value::as_str).unwrap_or("unknown"),
                        "similarity": hit.hit.score,
                        "citation": hit.hit.citation,
                        "authority": Authority::NonAuthoritative,
                    }));
                }
            }
        }

        let total = symbolic.len() + episodic.len() + semantic.len();
        Ok(json!({
            "status": "success",
            "symbolic": symbolic,
            "episodic": episodic,
            "semantic": semantic,
            "message": format!("Retrieved {total} context item(s)"),
        }))
    }

    /// `search` — merged results, symbolic first, episodic next, semantic
    /// last.
    pub async fn search(&self, params: &SearchParams) -> Result<Value> {
        let op = OpScope::open(self, "search", &params.project_id, serde_json::to_value(params)?);
        let result = self.do_search(params).await;
        op.finish(self, &result);
        result
    }

    async fn do_search(&self, params: &SearchParams) -> Result<Value> {
        if !matches!(params.memory_type.as_str(), "all" | "symbolic" | "episodic" | "semantic") {
            return Err(Error::InvalidArgument(format!(
                "Unknown memory type: {}",
                params.memory_type
            )));
        }

        let (stores, project) = self.stores_for(&params.project_id).await?;
        let memory_type = params.memory_type.as_str();
        let mut results = Vec::new();

        if matches!(memory_type, "all" | "symbolic") {
            let pattern = if params.query.contains('%') || params.query.contains('_') {
                params.query.clone()
            } else {
                format!("%{}%", params.query)
            };
            let facts = stores
                .symbolic
                .query_memory(&FactQuery {
                    project_id: Some(project.project_id.clone()),
                    key: Some(pattern),
                    limit: Some(params.top_k),
                    ..FactQuery::default()
                })
                .await?;
            for fact in facts {
                let mut value = annotate(serde_json::to_value(&fact)?, Authority::Authoritative);
                insert_field(&mut value, "type", json!("symbolic"));
                results.push(value);
            }
        }

        if matches!(memory_type, "all" | "episodic") {
            let episodes = stores
                .episodic
                .query_episodes(&EpisodeQuery {
                    project_id: project.project_id.clone(),
                    lesson: params
                        .situation_contains
                        .is_none()
                        .then(|| params.query.clone()),
                    situation_contains: params.situation_contains.clone(),
                    min_confidence: 0.0,
                    limit: params.top_k,
                })
                .await?;
            for episode in episodes {
                let mut value = annotate(serde_json::to_value(&episode)?, Authority::Advisory);
                insert_field(&mut value, "type", json!("episodic"));
                results.push(value);
            }
        }

        if matches!(memory_type, "all" | "semantic") {
            let retriever = self.retriever_for(&stores);
            let hits = retriever
                .retrieve(&self.retrieval_request(&params.query, params.top_k))
                .await?;
            for hit in hits {
                results.push(json!({
                    "type": "semantic",
                    "authority": Authority::NonAuthoritative,
                    "chunk_id": hit.hit.chunk_id,
                    "content": hit.hit.content,
                    "source": hit.hit.metadata.get("source").and_then(Value::as_str).unwrap_or("unknown"),
                    "similarity": hit.hit.score,
                    "citation": hit.hit.citation,
                }));
            }
        }

        let total = results.len();
        results.truncate(params.top_k);
        Ok(json!({
            "status": "success",
            "results": results,
            "total": total,
            "message": format!("Found {total} result(s)"),
        }))
    }

    /// `ingest_file` — sandbox-validated file ingestion into semantic
    /// memory, with asynchronous deletion of consumed uploads.
    pub async fn ingest_file(&self, params: &IngestFileParams) -> Result<Value> {
        let op = OpScope::open(self, "ingest_file", &params.project_id, serde_json::to_value(params)?);
        let result = self.do_ingest_file(params).await;
        op.finish(self, &result);
        result
    }

    async fn do_ingest_file(&self, params: &IngestFileParams) -> Result<Value> {
        self.upload_guard.ensure_directory()?;
        if let Err(e) = self.upload_guard.cleanup_old_uploads() {
            warn!(error = %e, "upload cleanup failed");
        }

        let real_path = self.upload_guard.validate(Path::new(&params.file_path))?;

        let (stores, project) = self.stores_for(&params.project_id).await?;

        let mut metadata = params.metadata.clone().unwrap_or_default();
        metadata.insert("project_id".to_string(), Value::from(project.project_id.clone()));
        metadata.insert("source_type".to_string(), Value::from(params.source_type.clone()));
        metadata.insert(
            "ingested_at".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
        );

        let ingestor = Ingestor::new(
            Arc::clone(&stores.semantic),
            self.config.chunk_size,
            self.config.chunk_overlap,
        );
        let chunk_ids = ingestor
            .ingest_file(&real_path, Some(metadata), None, None)
            .await?;

        if self.upload_guard.is_sandboxed(&real_path) {
            schedule_upload_deletion(real_path.clone());
        }

        if self.config.automatic_learning.enabled && self.config.automatic_learning.track_code_changes {
            self.store_ingestion_facts(&stores, &project.project_id, &real_path).await;
        }

        let doc_id = chunk_ids
            .first()
            .and_then(|id| id.split(':').next())
            .unwrap_or("unknown")
            .to_string();
        let chunk_count = chunk_ids.len();

        Ok(json!({
            "status": "success",
            "file_path": params.file_path,
            "real_path": real_path,
            "chunk_count": chunk_count,
            "doc_id": doc_id,
            "authority": Authority::NonAuthoritative,
            "message": format!("Successfully ingested {chunk_count} chunk(s)"),
        }))
    }

    /// `add_fact` — upsert an authoritative fact.
    pub async fn add_fact(&self, params: &AddFactParams) -> Result<Value> {
        let op = OpScope::open(self, "add_fact", &params.project_id, serde_json::to_value(params)?);
        let result = self.do_add_fact(params).await;
        op.finish(self, &result);
        result
    }

    async fn do_add_fact(&self, params: &AddFactParams) -> Result<Value> {
        let category = params
            .category
            .as_deref()
            .map(FactCategory::from_str)
            .transpose()?
            .unwrap_or(FactCategory::Fact);

        let (stores, project) = self.stores_for(&params.project_id).await?;
        let fact = MemoryFact::new(
            project.project_id,
            category,
            params.fact_key.clone(),
            params.fact_value.clone(),
            params.confidence,
            FactSource::Agent,
        );
        let stored = stores.symbolic.store_memory(fact).await?;

        let mut value = annotate(serde_json::to_value(&stored)?, Authority::Authoritative);
        insert_field(&mut value, "status", json!("success"));
        insert_field(&mut value, "fact_id", json!(stored.id));
        insert_field(&mut value, "action", json!("created"));
        insert_field(&mut value, "message", json!("Successfully stored fact"));
        Ok(value)
    }

    /// `add_episode` — store an advisory episode, parsing structured
    /// `Situation:/Action:/Outcome:/Lesson:` content.
    pub async fn add_episode(&self, params: &AddEpisodeParams) -> Result<Value> {
        let op = OpScope::open(self, "add_episode", &params.project_id, serde_json::to_value(params)?);
        let result = self.do_add_episode(params).await;
        op.finish(self, &result);
        result
    }

    async fn do_add_episode(&self, params: &AddEpisodeParams) -> Result<Value> {
        let (stores, project) = self.stores_for(&params.project_id).await?;

        let parts = parse_episode_content(&params.content, &params.title);
        let episode = Episode::new(
            project.project_id,
            parts.situation,
            parts.action,
            parts.outcome,
            parts.lesson,
            params.quality,
        );
        let stored = stores.episodic.store_episode(episode).await?;

        let mut value = annotate(serde_json::to_value(&stored)?, Authority::Advisory);
        insert_field(&mut value, "status", json!("success"));
        insert_field(&mut value, "episode_id", json!(stored.id));
        insert_field(&mut value, "message", json!("Successfully stored episode"));
        Ok(value)
    }

    /// `analyze_conversation` — run the analyzer, optionally auto-storing
    /// the extracted facts and episodes above their confidence floors.
    pub async fn analyze_conversation(&self, params: &AnalyzeConversationParams) -> Result<Value> {
        let op = OpScope::open(
            self,
            "analyze_conversation",
            &params.project_id,
            serde_json::to_value(params)?,
        );
        let result = self.do_analyze_conversation(params).await;
        op.finish(self, &result);
        result
    }

    async fn do_analyze_conversation(&self, params: &AnalyzeConversationParams) -> Result<Value> {
        let started = Instant::now();

        let learnings = self
            .analyzer
            .analyze(
                &params.user_message,
                &params.agent_response,
                Some(params.extraction_mode.as_str()),
            )
            .await?;

        let min_fact = self.config.conversation_analyzer.min_fact_confidence;
        let min_episode = self.config.conversation_analyzer.min_episode_confidence;

        let mut facts = Vec::new();
        let mut episodes = Vec::new();
        for learning in learnings {
            match &learning {
                Learning::Fact(f) if f.confidence >= min_fact => facts.push(learning),
                Learning::Episode(e) if e.confidence >= min_episode => episodes.push(learning),
                _ => {}
            }
        }

        let mut facts_stored = 0usize;
        let mut episodes_stored = 0usize;
        if params.auto_store && !params.return_only {
            for learning in &facts {
                let Learning::Fact(fact) = learning else { continue };
                let stored = self
                    .add_fact(&AddFactParams {
                        project_id: params.project_id.clone(),
                        fact_key: fact.key.clone(),
                        fact_value: fact.value.clone(),
                        confidence: fact.confidence,
                        category: None,
                        auto_learn: params.auto_learn,
                    })
                    .await;
                match stored {
                    Ok(_) => facts_stored += 1,
                    Err(e) => warn!(key = %fact.key, error = %e, "failed to auto-store fact"),
                }
            }
            for learning in &episodes {
                let Learning::Episode(episode) = learning else { continue };
                let content = format!(
                    "Situation: {}\nAction: {}\nOutcome: {}\nLesson: {}",
                    episode.situation, episode.action, episode.outcome, episode.lesson
                );
                let stored = self
                    .add_episode(&AddEpisodeParams {
                        project_id: params.project_id.clone(),
                        title: episode.lesson_type.clone(),
                        content,
                        lesson_type: Some(episode.lesson_type.clone()),
                        quality: episode.confidence,
                        auto_learn: params.auto_learn,
                    })
                    .await;
                match stored {
                    Ok(_) => episodes_stored += 1,
                    Err(e) => {
                        warn!(lesson_type = %episode.lesson_type, error = %e, "failed to auto-store episode");
                    }
                }
            }
        }

        Ok(json!({
            "status": "success",
            "facts_stored": facts_stored,
            "episodes_stored": episodes_stored,
            "facts": facts,
            "episodes": episodes,
            "duration_ms": started.elapsed().as_secs_f64() * 1_000.0,
        }))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Resolve a project id or name and open (or reuse) its stores.
    async fn stores_for(
        &self,
        project_id: &str,
    ) -> Result<(Arc<ProjectStores>, crate::types::Project)> {
        let project = self.projects.resolve_or_create(project_id).await?;

        let mut stores = self.stores.lock().await;
        if let Some(existing) = stores.get(&project.project_id) {
            return Ok((Arc::clone(existing), project));
        }

        let dir = self.projects.base_dir().join(&project.project_id);
        let symbolic = SymbolicStore::open(&dir.join("memory.db")).await?;
        let episodic = EpisodicStore::open(&dir.join("episodic.db")).await?;
        let semantic = semantic_store_at(
            &dir.join("semantic_index"),
            self.config.vector_backend,
            Arc::clone(&self.embedder),
        )?;

        let opened = Arc::new(ProjectStores {
            symbolic,
            episodic,
            semantic,
        });
        stores.insert(project.project_id.clone(), Arc::clone(&opened));
        debug!(project_id = %project.project_id, "opened project stores");
        Ok((opened, project))
    }

    fn retriever_for(&self, stores: &Arc<ProjectStores>) -> Retriever {
        Retriever::new(
            Arc::clone(&stores.semantic),
            Arc::clone(&self.embedder),
            self.config.query_expansion_enabled,
            self.config.num_expansions,
        )
    }

    fn retrieval_request(&self, query: &str, top_k: usize) -> RetrievalRequest {
        RetrievalRequest::from_config(query, RetrievalTrigger::DEFAULT, &self.config)
            .with_top_k(top_k)
    }

    /// Record one finished operation: op ring, tracking, and detection.
    fn record_operation(&self, operation: OperationRecord) {
        {
            let mut ring = self.operations.lock();
            if ring.len() == MAX_OPERATION_RECORDS {
                ring.pop_front();
            }
            ring.push_back(operation.clone());
        }

        if !self.tracker.should_track(&operation) {
            return;
        }
        let project_id = operation.project_id.clone();
        self.tracker.track_operation(operation);

        if let Some(candidate) = self.tracker.detect_task_completion() {
            self.enqueue_candidate(&project_id, candidate);
        }
        if let Some(candidate) = self.tracker.detect_pattern() {
            self.enqueue_candidate(&project_id, candidate);
        }
    }

    /// Queue a learning candidate (drop-oldest on overflow).
    fn enqueue_candidate(&self, project_id: &str, candidate: LearningCandidate) {
        {
            let mut queue = self.learn_queue.lock();
            if queue.len() == LEARNING_QUEUE_CAPACITY {
                queue.pop_front();
                warn!("learning queue full, dropping oldest candidate");
            }
            queue.push_back((project_id.to_string(), candidate));
        }
        self.learn_notify.notify_one();
    }

    fn pop_candidate(&self) -> Option<(String, LearningCandidate)> {
        self.learn_queue.lock().pop_front()
    }

    fn spawn_learning_worker(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let notify = Arc::clone(&self.learn_notify);
        tokio::spawn(async move {
            loop {
                notify.notified().await;
                let Some(backend) = weak.upgrade() else { break };
                backend.drain_learning_queue().await;
            }
        });
    }

    /// Process every queued learning candidate now.
    ///
    /// The background worker calls this after each wakeup; tests call it
    /// directly for deterministic side effects.
    pub async fn drain_learning_queue(&self) {
        while let Some((project_id, candidate)) = self.pop_candidate() {
            self.process_candidate(&project_id, candidate).await;
        }
    }

    async fn process_candidate(&self, project_id: &str, candidate: LearningCandidate) {
        let Some(extracted) = self.extractor.extract(&candidate).await else {
            return;
        };
        if extracted.confidence < self.config.automatic_learning.min_episode_confidence {
            debug!(confidence = extracted.confidence, "extracted episode below confidence floor");
            return;
        }

        let Ok((stores, project)) = self.stores_for(project_id).await else {
            warn!(project_id, "cannot open stores for learning side effect");
            return;
        };

        if self.config.automatic_learning.episode_deduplication {
            let existing = stores
                .episodic
                .query_episodes(&EpisodeQuery {
                    lesson: Some(extracted.lesson.clone()),
                    min_confidence: 0.5,
                    limit: 5,
                    ..EpisodeQuery::for_project(project.project_id.clone())
                })
                .await
                .unwrap_or_default();
            for episode in &existing {
                if lesson_similarity(&extracted.lesson, &episode.lesson)
                    > DEDUP_SIMILARITY_THRESHOLD
                {
                    debug!("near-duplicate lesson, skipping auto-stored episode");
                    return;
                }
            }
        }

        let episode = Episode::new(
            project.project_id,
            extracted.situation,
            extracted.action,
            extracted.outcome,
            extracted.lesson,
            extracted.confidence,
        );
        match stores.episodic.store_episode(episode).await {
            Ok(stored) => info!(id = %stored.id, "auto-stored learned episode"),
            Err(e) => debug!(error = %e, "auto-store rejected episode"),
        }
    }

    /// Framework hints inferred from an ingested path, stored as
    /// auto-learning facts (first write wins).
    async fn store_ingestion_facts(
        &self,
        stores: &Arc<ProjectStores>,
        project_id: &str,
        path: &Path,
    ) {
        let Some(framework) = framework_hint(path) else { return };

        let existing = stores
            .symbolic
            .query_memory(&FactQuery {
                project_id: Some(project_id.to_string()),
                key: Some("framework".to_string()),
                ..FactQuery::default()
            })
            .await
            .unwrap_or_default();
        if !existing.is_empty() {
            return;
        }

        let fact = MemoryFact::new(
            project_id,
            FactCategory::Fact,
            "framework",
            json!({ "framework": framework }),
            1.0,
            FactSource::AutoLearning,
        );
        if let Err(e) = stores.symbolic.store_memory(fact).await {
            debug!(error = %e, "failed to store ingestion fact");
        }
    }
}

/// Metrics + op-record choreography around one tool call.
struct OpScope {
    tool: &'static str,
    project_id: String,
    arguments: Value,
    request_id: String,
    started: Instant,
}

impl OpScope {
    fn open(backend: &MemoryBackend, tool: &'static str, project_id: &str, arguments: Value) -> Self {
        let request_id = backend.metrics.record_tool_call(project_id, tool);
        Self {
            tool,
            project_id: project_id.to_string(),
            arguments,
            request_id,
            started: Instant::now(),
        }
    }

    fn finish(self, backend: &MemoryBackend, result: &Result<Value>) {
        let error_message = result.as_ref().err().map(ToString::to_string);
        backend.metrics.record_tool_completion(
            &self.request_id,
            error_message.is_some(),
            error_message.as_deref().unwrap_or(""),
        );

        backend.record_operation(OperationRecord {
            tool_name: self.tool.to_string(),
            project_id: self.project_id,
            arguments: self.arguments,
            result: if error_message.is_some() { OpResult::Error } else { OpResult::Success },
            outcome: if error_message.is_some() { "failed" } else { "completed" }.to_string(),
            error: error_message,
            timestamp: Utc::now(),
            duration_ms: self.started.elapsed().as_millis() as u64,
        });
    }
}

struct EpisodeParts {
    situation: String,
    action: String,
    outcome: String,
    lesson: String,
}

/// Parse `Situation:/Action:/Outcome:/Lesson:` line prefixes
/// (case-insensitive). Without them, the title becomes the situation and
/// the content the lesson, truncated to 500 characters.
fn parse_episode_content(content: &str, title: &str) -> EpisodeParts {
    let mut parts = EpisodeParts {
        situation: String::new(),
        action: String::new(),
        outcome: String::new(),
        lesson: String::new(),
    };

    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = strip_prefix_ci(line, "situation:") {
            parts.situation = rest.trim().to_string();
        } else if let Some(rest) = strip_prefix_ci(line, "action:") {
            parts.action = rest.trim().to_string();
        } else if let Some(rest) = strip_prefix_ci(line, "outcome:") {
            parts.outcome = rest.trim().to_string();
        } else if let Some(rest) = strip_prefix_ci(line, "lesson:") {
            parts.lesson = rest.trim().to_string();
        }
    }

    if parts.situation.is_empty() {
        parts.situation = title.to_string();
        parts.action = "Recorded via tool call".to_string();
        parts.outcome = "Success".to_string();
        parts.lesson = content.chars().take(500).collect();
    }

    parts
}

/// ASCII case-insensitive prefix strip.
fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &line[prefix.len()..])
}

/// Framework hint from well-known path shapes.
fn framework_hint(path: &Path) -> Option<&'static str> {
    let lower = path.to_string_lossy().to_lowercase();
    if lower.ends_with("/app.py") {
        Some("Flask/FastAPI")
    } else if lower.contains("/router") {
        Some("Express/FastAPI")
    } else if lower.contains("/component") {
        Some("React/Vue/Angular")
    } else {
        None
    }
}

fn annotate(mut value: Value, authority: Authority) -> Value {
    insert_field(&mut value, "authority", json!(authority));
    value
}

fn insert_field(value: &mut Value, key: &str, field: Value) {
    if let Value::Object(map) = value {
        map.insert(key.to_string(), field);
    }
}

fn schedule_upload_deletion(path: PathBuf) {
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(UPLOAD_DELETE_DELAY_MS)).await;
        match std::fs::remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "deleted consumed upload"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to delete upload"),
        }
    });
}
