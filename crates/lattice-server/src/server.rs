//! The `Server` handle: owns connections, indexes, sessions, engines, and
//! lifecycles. Long-running builds become background tasks that report
//! through the health surface; callers that outwait
//! `syncRebuildThresholdMs` get a QUEUED envelope with the tx id.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use lattice_core::config::LatticeConfig;
use lattice_core::errors::{BuildError, QueryError};
use lattice_core::model::{ids, EdgeRecord, EdgeType, NodeLabel};
use lattice_core::traits::{
    EmbeddingBackend, GitLookup, GraphConnector, SummarizerBackend, VectorBackend,
};
use lattice_core::{now_millis, FxHashMap, LatticeError};
use lattice_graph::builder::upsert_node;
use lattice_graph::{cycles, MemoryIndex};
use lattice_query::{
    temporal, Bm25Mode, HybridRetriever, PprRanker, PprRequest, RetrievalMode, RetrieveRequest,
    TemporalEngine,
};
use lattice_session::memory::EpisodeDraft;
use lattice_session::{
    adapt_workspace_for_runtime, resolve_project_context, ClaimOutcome, CoordinationEngine,
    EpisodeStore, EpisodeType, RecallQuery, ResolveArgs, SessionContext, SyncStateMachine,
};
use lattice_session::coordination::ClaimRequest;
use lattice_store::{Bm25Provisioner, GraphClient};
use uuid::Uuid;

use crate::docs::DocsEngine;
use crate::health::{self, HealthReport};
use crate::orchestrator::{BuildMode, BuildReport, BuildRequest, Orchestrator};
use crate::tools::{ToolRequest, ToolResponse};
use crate::watcher::FileWatcher;

const RECENT_ERRORS_CAP: usize = 20;

/// External collaborators injected at construction; tests pass stubs.
#[derive(Default)]
pub struct ServerBackends {
    pub connector: Option<Arc<dyn GraphConnector>>,
    pub vector: Option<Arc<dyn VectorBackend>>,
    pub embedder: Option<Arc<dyn EmbeddingBackend>>,
    pub summarizer: Option<Arc<dyn SummarizerBackend>>,
    pub git: Option<Arc<dyn GitLookup>>,
}

struct BuildHandle {
    task: JoinHandle<()>,
    tx_id: String,
}

pub struct Server {
    config: LatticeConfig,
    client: Option<Arc<GraphClient>>,
    index: Arc<RwLock<MemoryIndex>>,
    retriever: HybridRetriever,
    ppr: PprRanker,
    temporal: TemporalEngine,
    orchestrator: Orchestrator,
    docs: DocsEngine,
    sync: SyncStateMachine,
    coordination: CoordinationEngine,
    episodes: EpisodeStore,
    provisioner: Arc<Bm25Provisioner>,
    vector: Option<Arc<dyn VectorBackend>>,

    context: StdMutex<Option<SessionContext>>,
    watcher: StdMutex<Option<FileWatcher>>,
    builds: StdMutex<FxHashMap<String, BuildHandle>>,
    build_gates: StdMutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    last_builds: StdMutex<FxHashMap<String, BuildReport>>,
    recent_errors: StdMutex<FxHashMap<String, VecDeque<String>>>,
    watch_batches: StdMutex<Option<tokio::sync::mpsc::UnboundedSender<Vec<PathBuf>>>>,
}

impl Server {
    pub fn new(config: LatticeConfig, backends: ServerBackends) -> Arc<Self> {
        let client = backends
            .connector
            .map(|connector| Arc::new(GraphClient::new(config.graph.clone(), connector)));
        let index = Arc::new(RwLock::new(MemoryIndex::new()));
        let provisioner = Arc::new(Bm25Provisioner::new());

        let retriever = HybridRetriever::new(
            client.clone(),
            backends.vector.clone(),
            backends.embedder.clone(),
            Arc::clone(&index),
            config.vector.collections.clone(),
            Arc::clone(&provisioner),
        );
        let ppr = PprRanker::new(client.clone(), Arc::clone(&index));
        let temporal = TemporalEngine::new(client.clone(), Arc::clone(&index), backends.git);
        let orchestrator = Orchestrator::new(
            client.clone(),
            Arc::clone(&index),
            backends.summarizer.clone(),
            config.features.clone(),
        );
        let docs = DocsEngine::new(client.clone(), Arc::clone(&index));
        let sync = SyncStateMachine::new(config.effective_state_history_max_size());

        Arc::new(Self {
            client,
            index,
            retriever,
            ppr,
            temporal,
            orchestrator,
            docs,
            sync,
            coordination: CoordinationEngine::new(),
            episodes: EpisodeStore::new(),
            provisioner,
            vector: backends.vector,
            context: StdMutex::new(None),
            watcher: StdMutex::new(None),
            builds: StdMutex::new(FxHashMap::default()),
            build_gates: StdMutex::new(FxHashMap::default()),
            last_builds: StdMutex::new(FxHashMap::default()),
            recent_errors: StdMutex::new(FxHashMap::default()),
            watch_batches: StdMutex::new(None),
            config,
        })
    }

    /// Attempt the store connection and provision the text indices.
    /// Returns whether the store is reachable; failure is not fatal — the
    /// engines degrade to their index-backed paths.
    pub async fn connect(&self) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        match client.connect().await {
            Ok(()) => {
                let status = self.provisioner.ensure(client).await;
                if let Some(error) = status.error {
                    warn!(error = %error, "bm25 provisioning failed; retrieval degrades to lexical");
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "graph store unreachable at startup");
                false
            }
        }
    }

    pub fn active_context(&self) -> Option<SessionContext> {
        self.context.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn require_context(&self) -> Result<SessionContext, LatticeError> {
        // Fall back to config defaults when no workspace was set.
        let active = self.active_context();
        resolve_project_context(&ResolveArgs::default(), active.as_ref(), &self.config)
            .map_err(Into::into)
    }

    fn record_error(&self, project_id: &str, message: String) {
        let mut map = self.recent_errors.lock().unwrap_or_else(|e| e.into_inner());
        let ring = map.entry(project_id.to_string()).or_default();
        ring.push_back(message);
        while ring.len() > RECENT_ERRORS_CAP {
            ring.pop_front();
        }
    }

    fn build_gate(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.build_gates.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            gates
                .entry(project_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Cancel a queued/running build. All four sync subsystems drop back
    /// to drifted.
    pub fn cancel_build(&self, project_id: &str) -> bool {
        let handle = {
            let mut builds = self.builds.lock().unwrap_or_else(|e| e.into_inner());
            builds.remove(project_id)
        };
        match handle {
            Some(build) => {
                build.task.abort();
                self.sync.mark_all_drifted();
                info!(project = project_id, tx = %build.tx_id, "build cancelled");
                true
            }
            None => false,
        }
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    pub async fn dispatch(self: &Arc<Self>, request: ToolRequest) -> ToolResponse {
        let tool = request.tool_name();
        let started = Instant::now();
        let response = self.dispatch_inner(request).await;
        match response {
            Ok((data, summary)) => {
                ToolResponse::success(data, summary, tool, started.elapsed().as_millis() as u64)
            }
            Err(e) => {
                if let Ok(context) = self.require_context() {
                    self.record_error(&context.project_id, e.to_string());
                }
                ToolResponse::error(&e, None)
            }
        }
    }

    async fn dispatch_inner(
        self: &Arc<Self>,
        request: ToolRequest,
    ) -> Result<(Value, Option<String>), LatticeError> {
        match request {
            ToolRequest::GraphSetWorkspace {
                workspace_root,
                source_dir,
                project_id,
            } => self.set_workspace(workspace_root, source_dir, project_id).await,

            ToolRequest::GraphRebuild {
                mode,
                workspace_root,
                source_dir,
                project_id,
                index_docs,
            } => {
                let args = ResolveArgs {
                    workspace_root,
                    source_dir,
                    project_id,
                };
                let mode = match mode.as_deref() {
                    None | Some("full") => BuildMode::Full,
                    Some("incremental") => BuildMode::Incremental,
                    Some(other) => {
                        return Err(QueryError::InvalidInput {
                            reason: format!("unknown build mode '{other}'"),
                        }
                        .into())
                    }
                };
                self.rebuild(args, mode, None, index_docs).await
            }

            ToolRequest::GraphQuery {
                query,
                language,
                mode,
                limit,
                as_of,
            } => self.graph_query(query, language, mode, limit, as_of).await,

            ToolRequest::GraphHealth {} => {
                let report = self.health().await?;
                Ok((serde_json::to_value(&report)?, None))
            }

            ToolRequest::DiffSince {
                since,
                types,
                project_id,
            } => self.diff_since(since, types, project_id).await,

            ToolRequest::AgentClaim {
                agent_id,
                target_id,
                claim_type,
                intent,
                task_id,
                session_id,
            } => {
                let context = self.require_context()?;
                let outcome = self.coordination.claim(ClaimRequest {
                    agent_id,
                    target_id,
                    claim_type,
                    intent,
                    task_id,
                    session_id: session_id.unwrap_or_default(),
                    project_id: context.project_id.clone(),
                });
                if let ClaimOutcome::Created { claim_id } = &outcome {
                    self.persist_claim(claim_id).await;
                }
                Ok((serde_json::to_value(&outcome)?, None))
            }

            ToolRequest::AgentRelease { claim_id, outcome } => {
                let report = self.coordination.release(&claim_id, outcome);
                self.persist_claim(&claim_id).await;
                Ok((serde_json::to_value(&report)?, None))
            }

            ToolRequest::AgentStatus { agent_id } => {
                let context = self.require_context()?;
                let claims = self
                    .coordination
                    .status(&context.project_id, agent_id.as_deref());
                Ok((serde_json::to_value(&claims)?, None))
            }

            ToolRequest::CoordinationOverview {} => {
                let context = self.require_context()?;
                let overview = self.coordination.overview(&context.project_id);
                Ok((
                    serde_json::to_value(&overview)?,
                    Some(format!("{} active claims", overview.active_claims)),
                ))
            }

            ToolRequest::EpisodeAdd {
                episode_type,
                content,
                entities,
                task_id,
                outcome,
                metadata,
                sensitive,
                agent_id,
                session_id,
            } => {
                let context = self.require_context()?;
                let draft = EpisodeDraft {
                    episode_type,
                    content,
                    entities: entities.unwrap_or_default(),
                    task_id,
                    outcome,
                    metadata: metadata.unwrap_or_default(),
                    sensitive: sensitive.unwrap_or(false),
                    agent_id,
                    session_id: session_id.unwrap_or_default(),
                };
                let episode_id = self.episodes.add(draft, &context.project_id)?;
                self.persist_episode(&episode_id, &context.project_id).await;
                Ok((json!({ "episodeId": episode_id }), None))
            }

            ToolRequest::EpisodeRecall {
                query,
                agent_id,
                task_id,
                types,
                entities,
                limit,
                since,
                include_sensitive,
            } => {
                let context = self.require_context()?;
                let types = match types {
                    Some(raw) => {
                        let mut parsed = Vec::with_capacity(raw.len());
                        for t in raw {
                            parsed.push(EpisodeType::parse(&t).ok_or_else(|| {
                                QueryError::InvalidInput {
                                    reason: format!("unknown episode type '{t}'"),
                                }
                            })?);
                        }
                        Some(parsed)
                    }
                    None => None,
                };
                let since = match since {
                    Some(anchor) => Some(
                        temporal::to_epoch_millis(&anchor).ok_or(QueryError::AnchorNotFound {
                            anchor,
                        })?,
                    ),
                    None => None,
                };
                let recall = RecallQuery {
                    query,
                    agent_id,
                    task_id,
                    types,
                    entities: entities.unwrap_or_default(),
                    limit: limit.unwrap_or(20),
                    since,
                    include_sensitive: include_sensitive.unwrap_or(false),
                };
                let episodes = self.episodes.recall(&recall, &context.project_id);
                Ok((serde_json::to_value(&episodes)?, None))
            }

            ToolRequest::DecisionQuery {
                query,
                agent_id,
                limit,
            } => {
                let context = self.require_context()?;
                let recall = RecallQuery {
                    query,
                    agent_id,
                    limit: limit.unwrap_or(20),
                    ..Default::default()
                };
                let decisions = self.episodes.decision_query(&recall, &context.project_id);
                Ok((serde_json::to_value(&decisions)?, None))
            }

            ToolRequest::Reflect {
                task_id,
                agent_id,
                limit,
            } => {
                let context = self.require_context()?;
                let report = self.episodes.reflect(
                    task_id.as_deref(),
                    agent_id.as_deref(),
                    limit.unwrap_or(50),
                    &context.project_id,
                );
                Ok((serde_json::to_value(&report)?, None))
            }

            ToolRequest::IndexDocs { incremental } => {
                let context = self.require_context()?;
                let tx_id = format!("tx-{}", Uuid::new_v4());
                let report = self
                    .docs
                    .index_docs(
                        &context.workspace_root,
                        &context.project_id,
                        &tx_id,
                        now_millis(),
                        incremental.unwrap_or(false),
                    )
                    .await;
                Ok((
                    serde_json::to_value(&report)?,
                    Some(format!("{} docs indexed, {} skipped", report.indexed, report.skipped)),
                ))
            }

            ToolRequest::SearchDocs { query, limit } => {
                let context = self.require_context()?;
                let hits = self
                    .docs
                    .search_docs(&query, &context.project_id, limit.unwrap_or(10))
                    .await;
                Ok((serde_json::to_value(&hits)?, None))
            }

            ToolRequest::DocsBySymbol { symbol, limit } => {
                let context = self.require_context()?;
                let hits = self
                    .docs
                    .docs_by_symbol(&symbol, &context.project_id, limit.unwrap_or(10));
                Ok((serde_json::to_value(&hits)?, None))
            }

            ToolRequest::FindPattern { pattern_type } => self.find_pattern(&pattern_type).await,

            ToolRequest::Briefing {
                task,
                seed_ids,
                limit,
            } => {
                let context = self.require_context()?;
                let ranked = self
                    .ppr
                    .rank(&PprRequest {
                        max_results: limit.unwrap_or(50),
                        ..PprRequest::new(seed_ids, context.project_id.clone())
                    })
                    .await;
                let episodes = self.episodes.recall(
                    &RecallQuery {
                        query: task.clone(),
                        limit: limit.unwrap_or(50).min(20),
                        ..Default::default()
                    },
                    &context.project_id,
                );
                Ok((
                    json!({ "ranked": ranked, "episodes": episodes }),
                    Some(format!(
                        "{} ranked entities, {} episodes for '{task}'",
                        ranked.len(),
                        episodes.len()
                    )),
                ))
            }
        }
    }

    // ─── Workspace & watcher ────────────────────────────────────────────

    async fn set_workspace(
        self: &Arc<Self>,
        workspace_root: PathBuf,
        source_dir: Option<PathBuf>,
        project_id: Option<String>,
    ) -> Result<(Value, Option<String>), LatticeError> {
        let args = ResolveArgs {
            workspace_root: Some(workspace_root),
            source_dir,
            project_id,
        };
        let resolved = resolve_project_context(&args, self.active_context().as_ref(), &self.config)?;
        let adapted = adapt_workspace_for_runtime(resolved, &self.config)?;

        // Changing context stops any active watcher and starts a new one
        // bound to the new source directory.
        {
            let mut watcher = self.watcher.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = watcher.take() {
                existing.stop();
            }
        }
        *self.context.lock().unwrap_or_else(|e| e.into_inner()) = Some(adapted.context.clone());
        let watcher_state = self.start_watcher(&adapted.context);
        info!(
            project = %adapted.context.project_id,
            workspace = %adapted.context.workspace_root.display(),
            "workspace context set"
        );

        Ok((
            json!({
                "context": adapted.context,
                "usedFallback": adapted.used_fallback,
                "fallbackReason": adapted.fallback_reason,
                "watcher": watcher_state,
            }),
            Some(format!("workspace set to {}", adapted.context.project_id)),
        ))
    }

    fn start_watcher(self: &Arc<Self>, context: &SessionContext) -> Value {
        if !context.source_dir.is_dir() {
            return json!("unavailable");
        }

        let sender = {
            let mut slot = self.watch_batches.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<PathBuf>>();
                let weak = Arc::downgrade(self);
                tokio::spawn(async move {
                    while let Some(batch) = rx.recv().await {
                        let Some(server) = weak.upgrade() else {
                            break;
                        };
                        server.on_watch_batch(batch).await;
                    }
                });
                *slot = Some(tx);
            }
            slot.clone().expect("just initialized")
        };

        let handler: crate::watcher::BatchHandler = Arc::new(move |batch| {
            let _ = sender.send(batch);
        });
        match FileWatcher::start(
            context.source_dir.clone(),
            Duration::from_millis(self.config.effective_debounce_ms()),
            handler,
        ) {
            Ok(watcher) => {
                let state = watcher.state();
                *self.watcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(watcher);
                serde_json::to_value(state).unwrap_or(json!("unknown"))
            }
            Err(e) => {
                warn!(error = %e, "watcher failed to start");
                json!("unavailable")
            }
        }
    }

    /// Watcher batches drive incremental rebuilds.
    async fn on_watch_batch(self: &Arc<Self>, batch: Vec<PathBuf>) {
        let Some(context) = self.active_context() else {
            return;
        };
        info!(files = batch.len(), project = %context.project_id, "incremental rebuild from watcher");
        let args = ResolveArgs::default();
        if let Err(e) = self
            .rebuild(args, BuildMode::Incremental, Some(batch), None)
            .await
        {
            self.record_error(&context.project_id, e.to_string());
        }
    }

    // ─── Builds ─────────────────────────────────────────────────────────

    async fn rebuild(
        self: &Arc<Self>,
        args: ResolveArgs,
        mode: BuildMode,
        changed_files: Option<Vec<PathBuf>>,
        index_docs: Option<bool>,
    ) -> Result<(Value, Option<String>), LatticeError> {
        let context = resolve_project_context(&args, self.active_context().as_ref(), &self.config)?;
        if !context.workspace_root.is_dir() {
            return Err(BuildError::WorkspaceNotFound {
                path: context.workspace_root.display().to_string(),
            }
            .into());
        }

        let tx_id = format!("tx-{}", Uuid::new_v4());
        let request = BuildRequest {
            mode,
            workspace_root: context.workspace_root.clone(),
            project_id: context.project_id.clone(),
            source_dir: context.source_dir.clone(),
            exclude: self.config.exclude.clone(),
            changed_files,
            tx_id: Some(tx_id.clone()),
            tx_timestamp: None,
            index_docs: index_docs.unwrap_or_else(|| self.config.effective_index_docs()),
        };

        let (report_tx, report_rx) =
            tokio::sync::oneshot::channel::<Result<BuildReport, LatticeError>>();
        let server = Arc::clone(self);
        let project_id = context.project_id.clone();
        let task = tokio::spawn(async move {
            let result = server.run_build(request).await;
            let _ = report_tx.send(result);
        });
        {
            let mut builds = self.builds.lock().unwrap_or_else(|e| e.into_inner());
            builds.insert(
                project_id.clone(),
                BuildHandle {
                    task,
                    tx_id: tx_id.clone(),
                },
            );
        }

        let threshold = Duration::from_millis(self.config.effective_sync_rebuild_threshold_ms());
        match tokio::time::timeout(threshold, report_rx).await {
            Ok(Ok(Ok(report))) => {
                self.builds
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&project_id);
                let summary = format!(
                    "{} files processed, {} nodes in {}ms",
                    report.files_processed, report.nodes_upserted, report.duration_ms
                );
                Ok((
                    json!({ "status": "COMPLETED", "report": report }),
                    Some(summary),
                ))
            }
            Ok(Ok(Err(e))) => {
                self.builds
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&project_id);
                Err(e)
            }
            Ok(Err(_recv_dropped)) => Err(BuildError::Cancelled { project_id }.into()),
            Err(_elapsed) => {
                // The background task keeps going; callers poll health.
                Ok((
                    json!({ "status": "QUEUED", "txId": tx_id }),
                    Some("build continues in the background".to_string()),
                ))
            }
        }
    }

    async fn run_build(self: &Arc<Self>, request: BuildRequest) -> Result<BuildReport, LatticeError> {
        let gate = self.build_gate(&request.project_id);
        let _guard = gate.lock().await;
        let project_id = request.project_id.clone();
        let run_docs = request.index_docs && request.mode == BuildMode::Full;

        match request.mode {
            BuildMode::Full => self.sync.start_rebuild(),
            BuildMode::Incremental => self.sync.start_incremental(),
        }

        let result = self.orchestrator.run(request).await;
        match result {
            Ok(mut report) => {
                // Docs pass on full builds with a connected store.
                if run_docs {
                    let connected = match &self.client {
                        Some(client) => client.is_connected().await,
                        None => false,
                    };
                    if connected {
                        let context = self.active_context();
                        if let Some(context) = context.filter(|c| c.project_id == project_id) {
                            let docs_report = self
                                .docs
                                .index_docs(
                                    &context.workspace_root,
                                    &project_id,
                                    &report.tx_id,
                                    report.tx_timestamp,
                                    false,
                                )
                                .await;
                            report
                                .warnings
                                .extend(docs_report.errors.iter().cloned());
                        }
                    }
                }

                // Invalidate claims whose targets vanished.
                let invalidated = {
                    let index = self.index.read().unwrap_or_else(|e| e.into_inner());
                    let project = project_id.clone();
                    self.coordination.invalidate_stale_claims(&project_id, |target| {
                        index
                            .get(target)
                            .map(|n| n.is_live())
                            .or_else(|| {
                                index
                                    .get(&ids::file_id(&project, target))
                                    .map(|n| n.is_live())
                            })
                            .unwrap_or(false)
                    })
                };
                if invalidated > 0 {
                    report
                        .warnings
                        .push(format!("{invalidated} stale claims invalidated"));
                }

                // Provision text indices after full rebuilds.
                if report.mode == BuildMode::Full {
                    if let Some(client) = &self.client {
                        if client.is_connected().await {
                            let _ = self.provisioner.ensure(client).await;
                        }
                    }
                }

                match report.mode {
                    BuildMode::Full => self.sync.complete_rebuild(),
                    BuildMode::Incremental => self.sync.complete_incremental(),
                }
                for error in &report.errors {
                    self.record_error(&project_id, error.clone());
                }
                self.last_builds
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(project_id, report.clone());
                Ok(report)
            }
            Err(e) => {
                self.sync.mark_all_drifted();
                self.record_error(&project_id, e.to_string());
                Err(e)
            }
        }
    }

    // ─── Queries ────────────────────────────────────────────────────────

    async fn graph_query(
        &self,
        query: String,
        language: Option<String>,
        mode: Option<String>,
        limit: Option<usize>,
        as_of: Option<String>,
    ) -> Result<(Value, Option<String>), LatticeError> {
        let context = self.require_context()?;
        let language = language.unwrap_or_else(|| detect_language(&query).to_string());

        if language == "cypher" {
            let Some(client) = &self.client else {
                return Err(lattice_core::errors::StoreError::NotConnected.into());
            };
            let mut params = Map::new();
            let query = match as_of {
                Some(anchor) => {
                    // A literal timestamp, or any anchor the since-resolver
                    // understands (tx id, git rev, agent id).
                    let ts = match temporal::to_epoch_millis(&anchor) {
                        Some(ts) => ts,
                        None => {
                            self.temporal
                                .resolve_since_anchor(&anchor, &context.project_id)
                                .await
                                .ok_or(QueryError::AnchorNotFound { anchor })?
                                .since_ts
                        }
                    };
                    params.insert("asOfTs".into(), json!(ts));
                    temporal::apply_temporal_filter(&query)
                }
                None => query,
            };
            let result = client.try_execute(&query, &params).await?;
            return Ok((
                json!({ "rows": result }),
                Some(format!("{} rows", result.len())),
            ));
        }

        // Natural-language path: hybrid retrieval. `local` leans on graph
        // expansion, `global` on the vector space.
        let retrieval_mode = match mode.as_deref() {
            Some("local") => RetrievalMode::Graph,
            Some("global") => RetrievalMode::Vector,
            _ => RetrievalMode::Hybrid,
        };
        let response = self
            .retriever
            .retrieve(&RetrieveRequest {
                query,
                project_id: context.project_id.clone(),
                limit: limit.unwrap_or(20),
                types: None,
                mode: retrieval_mode,
                rrf_k: lattice_query::rrf::DEFAULT_RRF_K,
            })
            .await;
        Ok((
            json!({
                "results": response.results,
                "bm25Mode": response.bm25_mode,
            }),
            Some(format!("{} fused results", response.results.len())),
        ))
    }

    async fn diff_since(
        &self,
        since: String,
        types: Option<Vec<String>>,
        project_id: Option<String>,
    ) -> Result<(Value, Option<String>), LatticeError> {
        let context = self.require_context()?;
        let project_id = project_id.unwrap_or(context.project_id);

        let anchor = self
            .temporal
            .resolve_since_anchor(&since, &project_id)
            .await
            .ok_or(QueryError::AnchorNotFound { anchor: since })?;

        let types = match types {
            Some(raw) => {
                let mut parsed = Vec::with_capacity(raw.len());
                for t in raw {
                    parsed.push(NodeLabel::parse(&t).ok_or_else(|| QueryError::InvalidInput {
                        reason: format!("unknown node type '{t}'"),
                    })?);
                }
                Some(parsed)
            }
            None => None,
        };

        let report = self
            .temporal
            .diff_since(anchor.since_ts, types, &project_id)
            .await;
        let summary = format!(
            "+{} −{} ~{} since {} ({})",
            report.added.len(),
            report.removed.len(),
            report.modified.len(),
            anchor.anchor_value,
            anchor.mode
        );
        Ok((json!({ "anchor": anchor, "diff": report }), Some(summary)))
    }

    async fn find_pattern(&self, pattern_type: &str) -> Result<(Value, Option<String>), LatticeError> {
        let context = self.require_context()?;
        if pattern_type != "circular" {
            return Err(QueryError::InvalidInput {
                reason: format!("unknown pattern type '{pattern_type}'"),
            }
            .into());
        }

        let (cycles, have_files) = {
            let index = self.index.read().unwrap_or_else(|e| e.into_inner());
            let have_files = index.nodes_of(NodeLabel::File).next().is_some();
            (
                cycles::find_import_cycles(&index, &context.project_id),
                have_files,
            )
        };

        // Only when the in-memory file set is empty: the two-hop store
        // fallback (catches mutual imports only).
        if !have_files {
            if let Some(client) = &self.client {
                let mut params = Map::new();
                params.insert("projectId".into(), json!(context.project_id));
                let result = client
                    .execute_query(cycles::TWO_HOP_CYCLE_QUERY, &params)
                    .await;
                if result.is_ok() {
                    let fallback: Vec<Value> = result
                        .rows
                        .iter()
                        .filter_map(|row| {
                            let a = row.get("a")?.as_str()?;
                            let b = row.get("b")?.as_str()?;
                            Some(json!({ "members": [a, b], "length": 2 }))
                        })
                        .collect();
                    return Ok((
                        json!({ "cycles": fallback, "source": "store" }),
                        Some(format!("{} cycles (store fallback)", fallback.len())),
                    ));
                }
            }
        }

        let summary = format!("{} import cycles", cycles.len());
        Ok((
            json!({ "cycles": cycles, "source": "index" }),
            Some(summary),
        ))
    }

    async fn health(&self) -> Result<HealthReport, LatticeError> {
        let context = self.require_context()?;
        let store_connected = match &self.client {
            Some(client) => client.is_connected().await,
            None => false,
        };
        let store = match (&self.client, store_connected) {
            (Some(client), true) => health::store_counts(client, &context.project_id).await,
            _ => None,
        };
        let vector_count =
            health::vector_point_count(self.vector.as_ref(), &self.config.vector.collections).await;
        let (index_nodes, index_edges, drift) = health::drift_report(&self.index, store, vector_count);

        Ok(HealthReport {
            project_id: context.project_id.clone(),
            store_connected,
            sync: self.sync.snapshot(),
            watcher: self
                .watcher
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
                .map(|w| w.state()),
            index_nodes,
            index_edges,
            drift,
            bm25_index_known_to_exist: self.provisioner.index_known_to_exist(),
            last_build: self
                .last_builds
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&context.project_id)
                .cloned(),
            recent_errors: self
                .recent_errors
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&context.project_id)
                .map(|ring| ring.iter().cloned().collect())
                .unwrap_or_default(),
        })
    }

    pub fn bm25_mode(&self) -> Bm25Mode {
        self.retriever.bm25_mode()
    }

    // ─── Write-through persistence ──────────────────────────────────────

    async fn persist_claim(&self, claim_id: &str) {
        let record = self
            .coordination
            .all()
            .into_iter()
            .find(|c| c.id == claim_id);
        let Some(record) = record else {
            return;
        };
        let node = record.to_node();
        {
            let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
            index.upsert_node(node.clone());
            index.add_edge(EdgeRecord::new(
                EdgeType::AppliesTo,
                &record.id,
                &record.target_id,
            ));
        }
        if let Some(client) = &self.client {
            let mut statements = vec![upsert_node(NodeLabel::Claim, &node.id, &node.properties)];
            // The target may be a plain path rather than a node id; the
            // id-only match makes the edge best-effort.
            let mut params = Map::new();
            params.insert("fromId".into(), json!(record.id));
            params.insert("toId".into(), json!(record.target_id));
            statements.push(lattice_core::Statement::new(
                "MATCH (a:CLAIM {id: $fromId}), (b {id: $toId}) MERGE (a)-[:APPLIES_TO]->(b)",
                params,
            ));
            for result in client.execute_batch(&statements).await {
                if let Some(error) = result.error {
                    warn!(claim = claim_id, error = %error, "claim write-through failed");
                }
            }
        }
    }

    async fn persist_episode(&self, episode_id: &str, project_id: &str) {
        let episode = self
            .episodes
            .all(project_id)
            .into_iter()
            .find(|e| e.id == episode_id);
        let Some(episode) = episode else {
            return;
        };
        let node = episode.to_node();
        {
            let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
            index.upsert_node(node.clone());
            for entity in &episode.entities {
                index.add_edge(EdgeRecord::new(EdgeType::Involves, &episode.id, entity));
            }
        }
        if let Some(client) = &self.client {
            let mut statements = vec![upsert_node(NodeLabel::Episode, &node.id, &node.properties)];
            for entity in &episode.entities {
                let edge = EdgeRecord::new(EdgeType::Involves, &episode.id, entity);
                // Target label is unknown here; match on id only.
                let mut params = Map::new();
                params.insert("fromId".into(), json!(edge.from));
                params.insert("toId".into(), json!(edge.to));
                statements.push(lattice_core::Statement::new(
                    "MATCH (a:EPISODE {id: $fromId}), (b {id: $toId}) MERGE (a)-[:INVOLVES]->(b)",
                    params,
                ));
            }
            for result in client.execute_batch(&statements).await {
                if let Some(error) = result.error {
                    warn!(episode = episode_id, error = %error, "episode write-through failed");
                }
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(active) = watcher.take() {
                active.stop();
            }
        }
    }
}

/// Queries that look like cypher get the cypher path by default.
fn detect_language(query: &str) -> &'static str {
    let head = query.trim_start().to_ascii_uppercase();
    if ["MATCH", "CALL", "RETURN", "MERGE", "CREATE", "SHOW"]
        .iter()
        .any(|kw| head.starts_with(kw))
    {
        "cypher"
    } else {
        "natural"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_detection_is_keyword_based() {
        assert_eq!(detect_language("MATCH (n) RETURN n"), "cypher");
        assert_eq!(detect_language("  match (n) return n"), "cypher");
        assert_eq!(detect_language("where is the retry logic"), "natural");
    }
}
