//! Build orchestrator: one build transaction end to end.
//!
//! Discover → select → record tx → parse+build → derived edges → feature
//! seeding → batch execute → docs → reconcile → persist cache. Single
//! writer per project (the server holds the lock); per-file trouble is
//! collected, never fatal.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::{json, Map};
use tracing::{info, warn};
use uuid::Uuid;

use lattice_core::model::{ids, EdgeRecord, EdgeType, NodeLabel, NodeRecord};
use lattice_core::statement::Statement;
use lattice_core::traits::SummarizerBackend;
use lattice_core::{now_millis, FxHashSet, LatticeError};
use lattice_core::errors::BuildError;
use lattice_graph::builder::{
    resolve_relative_import, upsert_edge, upsert_node, upsert_node_on_create, BuildContext,
    BuildOutput, GraphBuilder,
};
use lattice_graph::MemoryIndex;
use lattice_parse::{HashCache, Language, ParsedFile, ParserAdapter};
use lattice_store::GraphClient;

/// Directories never walked during discovery, on top of dot-directories.
pub const DISCOVERY_IGNORES: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "target",
    "coverage",
    "__pycache__",
    "vendor",
    ".next",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub mode: BuildMode,
    pub workspace_root: PathBuf,
    pub project_id: String,
    pub source_dir: PathBuf,
    pub exclude: Vec<String>,
    /// Watcher-provided batch; absent means hash-select.
    pub changed_files: Option<Vec<PathBuf>>,
    pub tx_id: Option<String>,
    pub tx_timestamp: Option<i64>,
    pub index_docs: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub tx_id: String,
    pub tx_timestamp: i64,
    pub mode: BuildMode,
    pub files_discovered: usize,
    pub files_changed: usize,
    pub files_processed: usize,
    pub nodes_upserted: usize,
    pub edges_upserted: usize,
    pub statements_executed: usize,
    pub statement_failures: usize,
    pub stale_tombstoned: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
struct DiscoveredSource {
    absolute: PathBuf,
    relative: String,
}

pub struct Orchestrator {
    client: Option<Arc<GraphClient>>,
    shared_index: Arc<RwLock<MemoryIndex>>,
    adapter: ParserAdapter,
    summarizer: Option<Arc<dyn SummarizerBackend>>,
    /// Feature names seeded with ON CREATE semantics on every build.
    features: Vec<String>,
}

/// Files summarized per build when a summarizer backend is configured.
const SUMMARY_BUDGET: usize = 32;
/// Head of each file handed to the summarizer.
const SUMMARY_INPUT_BYTES: usize = 2048;

impl Orchestrator {
    pub fn new(
        client: Option<Arc<GraphClient>>,
        shared_index: Arc<RwLock<MemoryIndex>>,
        summarizer: Option<Arc<dyn SummarizerBackend>>,
        features: Vec<String>,
    ) -> Self {
        Self {
            client,
            shared_index,
            adapter: ParserAdapter::new(),
            summarizer,
            features,
        }
    }

    /// Run one build transaction.
    pub async fn run(&self, request: BuildRequest) -> Result<BuildReport, LatticeError> {
        let started = Instant::now();

        if !request.workspace_root.is_dir() {
            return Err(BuildError::WorkspaceNotFound {
                path: request.workspace_root.display().to_string(),
            }
            .into());
        }
        if !request.source_dir.is_dir() {
            return Err(BuildError::SourceDirNotFound {
                path: request.source_dir.display().to_string(),
            }
            .into());
        }

        let tx_id = request
            .tx_id
            .clone()
            .unwrap_or_else(|| format!("tx-{}", Uuid::new_v4()));
        let tx_timestamp = request.tx_timestamp.unwrap_or_else(now_millis);

        let mut warnings: Vec<String> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        // 1. Discover.
        let discovered = discover_sources(&request.workspace_root, &request.source_dir, &request.exclude);
        let known_files: FxHashSet<String> =
            discovered.iter().map(|d| d.relative.clone()).collect();

        // 2. Select.
        let mut cache = HashCache::load(&request.workspace_root);
        let selected = self.select_files(&request, &discovered, &mut cache, &mut warnings);
        info!(
            project = %request.project_id,
            tx = %tx_id,
            mode = ?request.mode,
            discovered = discovered.len(),
            selected = selected.len(),
            "build selection complete"
        );

        // 3. Record TX.
        let tx_statement = self.graph_tx_statement(&request, &tx_id, tx_timestamp);

        // 4. Parse (CPU-bound fan-out off the async thread), then
        // summaries, then statement build.
        let adapter = self.adapter.clone();
        let selected_for_parse = selected.clone();
        let (parsed_files, parse_errors) =
            tokio::task::spawn_blocking(move || parse_all(&adapter, &selected_for_parse))
                .await
                .map_err(|e| BuildError::Cancelled {
                    project_id: e.to_string(),
                })?;
        errors.extend(parse_errors);
        for parsed in &parsed_files {
            warnings.extend(parsed.warnings.iter().cloned());
        }

        let summaries = self.summarize_files(&selected, &mut warnings).await;
        let context = BuildContext::new(request.project_id.clone(), tx_id.clone(), tx_timestamp)
            .with_summaries(summaries);

        let build_context = context.clone();
        let known_for_build = known_files.clone();
        let files_for_build = parsed_files;
        let (parsed_files, mut output) = tokio::task::spawn_blocking(move || {
            let output = build_all(&build_context, &files_for_build, &known_for_build);
            (files_for_build, output)
        })
        .await
        .map_err(|e| BuildError::Cancelled {
            project_id: e.to_string(),
        })?;

        // 5. Derived TEST_SUITE-TESTS→FILE edges.
        derive_test_edges(&context, &parsed_files, &known_files, &mut output);

        // 6. Feature seeding (never overwrites status on re-runs).
        for feature in &self.features {
            let id = ids::feature_id(&request.project_id, feature);
            let mut props = Map::new();
            props.insert("name".into(), json!(feature));
            props.insert("status".into(), json!("planned"));
            props.insert("priority".into(), json!("medium"));
            props.insert("projectId".into(), json!(request.project_id));
            props.insert("createdAt".into(), json!(tx_timestamp));
            output
                .node_statements
                .push(upsert_node_on_create(NodeLabel::Feature, &id, &props));
            output.nodes.push(NodeRecord::new(&id, NodeLabel::Feature, props));
        }

        // The internal index is this build's complete view; on full builds
        // it also seeds community recomputation.
        let mut internal = MemoryIndex::new();
        // The GRAPH_TX node is part of the build's view.
        internal.add_node(self.graph_tx_node(&request, &tx_id, tx_timestamp));
        for node in &output.nodes {
            internal.add_node(node.clone());
        }
        for edge in &output.edges {
            internal.add_edge(edge.clone());
        }

        // Communities are recomputed only on full builds.
        if request.mode == BuildMode::Full {
            let communities =
                lattice_graph::communities::compute_communities(&internal, &request.project_id, &context);
            for node in &communities.nodes {
                internal.add_node(node.clone());
            }
            for edge in &communities.edges {
                internal.add_edge(edge.clone());
            }
            output.merge(communities);
        }

        // 7. Execute against the store.
        let mut statements_executed = 0;
        let mut statement_failures = 0;
        if let Some(client) = &self.client {
            let mut batch: Vec<Statement> = Vec::with_capacity(output.statement_count() + 1);
            batch.push(tx_statement);
            batch.extend(output.statements());
            let results = client.execute_batch(&batch).await;
            statements_executed = results.len();
            for (statement, result) in batch.iter().zip(&results) {
                if let Some(error) = &result.error {
                    statement_failures += 1;
                    warnings.push(format!("statement failed: {error} [{}]", statement.query));
                }
            }
        }

        // 8/9. Reconcile the shared index: absorb the fresh subgraphs,
        // tombstone stale nodes on full builds.

        let stale = {
            let mut shared = self.shared_index.write().unwrap_or_else(|e| e.into_inner());
            if request.mode == BuildMode::Incremental {
                for source in &selected {
                    shared.remove_file_subtree(&ids::file_id(&request.project_id, &source.relative));
                }
            }
            shared.absorb(&internal);
            if request.mode == BuildMode::Full {
                shared.mark_stale_for_project(&request.project_id, &tx_id, tx_timestamp)
            } else {
                Vec::new()
            }
        };

        if !stale.is_empty() {
            if let Some(client) = &self.client {
                let mut params = Map::new();
                params.insert("projectId".into(), json!(request.project_id));
                params.insert("txId".into(), json!(tx_id));
                params.insert("ts".into(), json!(tx_timestamp));
                let result = client
                    .execute_query(TOMBSTONE_STALE_QUERY, &params)
                    .await;
                if let Some(error) = result.error {
                    warnings.push(format!("stale tombstoning failed: {error}"));
                }
            }
        }

        // 10. Persist the cache and close out.
        for parsed in &parsed_files {
            cache.set(&parsed.relative_path, parsed.hash.clone(), parsed.loc, tx_timestamp);
        }
        if let Err(e) = cache.save(tx_timestamp) {
            warnings.push(format!("hash cache save failed: {e}"));
        }

        let report = BuildReport {
            tx_id,
            tx_timestamp,
            mode: request.mode,
            files_discovered: discovered.len(),
            files_changed: selected.len(),
            files_processed: parsed_files.len(),
            nodes_upserted: output.nodes.len(),
            edges_upserted: output.edges.len(),
            statements_executed,
            statement_failures,
            stale_tombstoned: stale.len(),
            warnings,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            project = %request.project_id,
            tx = %report.tx_id,
            files = report.files_processed,
            nodes = report.nodes_upserted,
            duration_ms = report.duration_ms,
            "build complete"
        );
        Ok(report)
    }

    fn select_files(
        &self,
        request: &BuildRequest,
        discovered: &[DiscoveredSource],
        cache: &mut HashCache,
        warnings: &mut Vec<String>,
    ) -> Vec<DiscoveredSource> {
        match request.mode {
            BuildMode::Full => {
                cache.clear();
                discovered.to_vec()
            }
            BuildMode::Incremental => {
                if let Some(changed) = &request.changed_files {
                    // Normalize: absolute, deduped, inside the workspace,
                    // supported extension — then intersect with discovery.
                    let mut wanted: FxHashSet<String> = FxHashSet::default();
                    for path in changed {
                        let absolute = if path.is_absolute() {
                            path.clone()
                        } else {
                            request.workspace_root.join(path)
                        };
                        let Ok(relative) = absolute.strip_prefix(&request.workspace_root) else {
                            warnings.push(format!(
                                "changed path outside workspace ignored: {}",
                                path.display()
                            ));
                            continue;
                        };
                        let ext = absolute.extension().and_then(|e| e.to_str());
                        if Language::from_extension(ext).is_none() {
                            continue;
                        }
                        wanted.insert(relative.to_string_lossy().replace('\\', "/"));
                    }
                    discovered
                        .iter()
                        .filter(|d| wanted.contains(&d.relative))
                        .cloned()
                        .collect()
                } else {
                    // Hash every discovered file, keep the changed ones.
                    discovered
                        .iter()
                        .filter(|d| match std::fs::read(&d.absolute) {
                            Ok(bytes) => {
                                cache.has_changed(&d.relative, &lattice_parse::content_hash(&bytes))
                            }
                            Err(e) => {
                                warnings.push(format!(
                                    "unreadable during selection: {} ({e})",
                                    d.relative
                                ));
                                false
                            }
                        })
                        .cloned()
                        .collect()
                }
            }
        }
    }

    /// First `SUMMARY_BUDGET` selected files get a summary when a
    /// summarizer backend is configured; without one summaries stay empty.
    async fn summarize_files(
        &self,
        selected: &[DiscoveredSource],
        warnings: &mut Vec<String>,
    ) -> lattice_core::FxHashMap<String, String> {
        let mut summaries: lattice_core::FxHashMap<String, String> = Default::default();
        let Some(summarizer) = &self.summarizer else {
            return summaries;
        };
        for source in selected.iter().take(SUMMARY_BUDGET) {
            let Ok(bytes) = std::fs::read(&source.absolute) else {
                continue;
            };
            let head = String::from_utf8_lossy(&bytes[..bytes.len().min(SUMMARY_INPUT_BYTES)])
                .to_string();
            match summarizer.summarize(&head).await {
                Ok(summary) => {
                    summaries.insert(source.relative.clone(), summary);
                }
                Err(e) => {
                    warnings.push(format!("summarizer failed for {}: {e}", source.relative));
                    break;
                }
            }
        }
        summaries
    }

    fn graph_tx_statement(&self, request: &BuildRequest, tx_id: &str, ts: i64) -> Statement {
        let node = self.graph_tx_node(request, tx_id, ts);
        upsert_node(NodeLabel::GraphTx, tx_id, &node.properties)
    }

    fn graph_tx_node(&self, request: &BuildRequest, tx_id: &str, ts: i64) -> NodeRecord {
        let mut props = Map::new();
        props.insert("projectId".into(), json!(request.project_id));
        props.insert("type".into(), json!("build"));
        props.insert("timestamp".into(), json!(ts));
        props.insert(
            "mode".into(),
            json!(match request.mode {
                BuildMode::Full => "full",
                BuildMode::Incremental => "incremental",
            }),
        );
        props.insert(
            "sourceDir".into(),
            json!(request.source_dir.display().to_string()),
        );
        NodeRecord::new(tx_id, NodeLabel::GraphTx, props)
    }
}

pub const TOMBSTONE_STALE_QUERY: &str = "MATCH (n) WHERE n.projectId = $projectId AND n.validTo IS NULL AND n.txId <> $txId AND (n:FILE OR n:FUNCTION OR n:CLASS OR n:VARIABLE OR n:IMPORT OR n:DOCUMENT OR n:SECTION OR n:COMMUNITY) SET n.validTo = $ts";

/// Walk the source dir collecting supported files, skipping dot
/// directories, the default ignore set, and `exclude` substrings.
fn discover_sources(
    workspace_root: &Path,
    source_dir: &Path,
    exclude: &[String],
) -> Vec<DiscoveredSource> {
    let mut builder = ignore::WalkBuilder::new(source_dir);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false);

    let mut overrides = ignore::overrides::OverrideBuilder::new(source_dir);
    for pattern in DISCOVERY_IGNORES {
        let _ = overrides.add(&format!("!{pattern}/**"));
        let _ = overrides.add(&format!("!{pattern}"));
    }
    if let Ok(built) = overrides.build() {
        builder.overrides(built);
    }

    let mut sources = Vec::new();
    for entry in builder.build().flatten() {
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if Language::from_extension(path.extension().and_then(|e| e.to_str())).is_none() {
            continue;
        }
        let relative = match path.strip_prefix(workspace_root) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if exclude.iter().any(|needle| relative.contains(needle)) {
            continue;
        }
        sources.push(DiscoveredSource {
            absolute: path.to_path_buf(),
            relative,
        });
    }
    sources.sort_by(|a, b| a.relative.cmp(&b.relative));
    sources
}

/// Parallel parse. Per-file read failures land in the error list; they
/// never abort the build.
fn parse_all(
    adapter: &ParserAdapter,
    selected: &[DiscoveredSource],
) -> (Vec<ParsedFile>, Vec<String>) {
    let results: Vec<Result<ParsedFile, String>> = selected
        .par_iter()
        .map(|source| {
            let bytes = std::fs::read(&source.absolute)
                .map_err(|e| format!("read failed for {}: {e}", source.relative))?;
            Ok(adapter.parse_file(&source.absolute, &source.relative, &bytes))
        })
        .collect();

    let mut parsed_files = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(parsed) => parsed_files.push(parsed),
            Err(e) => {
                warn!("{e}");
                errors.push(e);
            }
        }
    }
    (parsed_files, errors)
}

/// Statement build over all parsed files.
fn build_all(
    context: &BuildContext,
    parsed_files: &[ParsedFile],
    known_files: &FxHashSet<String>,
) -> BuildOutput {
    let builder = GraphBuilder::new(context, known_files);
    let mut output = BuildOutput::default();
    for parsed in parsed_files {
        output.merge(builder.build(parsed));
    }
    output
}

/// `TEST_SUITE-TESTS→FILE`: each test file's suites point at the files its
/// imports resolve to, using the same relative-import resolution as the
/// builder.
fn derive_test_edges(
    context: &BuildContext,
    parsed_files: &[ParsedFile],
    known_files: &FxHashSet<String>,
    output: &mut BuildOutput,
) {
    for parsed in parsed_files {
        if parsed.test_suites.is_empty() {
            continue;
        }
        let targets: Vec<String> = parsed
            .imports
            .iter()
            .filter_map(|import| {
                resolve_relative_import(&parsed.relative_path, &import.source, known_files)
            })
            .collect();
        if targets.is_empty() {
            continue;
        }
        let mut suite_ordinals: lattice_core::FxHashMap<String, usize> = Default::default();
        for suite in &parsed.test_suites {
            let counter = suite_ordinals.entry(suite.name.clone()).or_insert(0);
            let ordinal = *counter;
            *counter += 1;
            let suite_id =
                ids::test_suite_id(&context.project_id, &parsed.relative_path, &suite.name, ordinal);
            for target in &targets {
                let file_id = ids::file_id(&context.project_id, target);
                let edge = EdgeRecord::new(EdgeType::Tests, &suite_id, &file_id);
                output
                    .edge_statements
                    .push(upsert_edge(NodeLabel::TestSuite, NodeLabel::File, &edge));
                output.edges.push(edge);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn request(ws: &Path, mode: BuildMode) -> BuildRequest {
        BuildRequest {
            mode,
            workspace_root: ws.to_path_buf(),
            project_id: "demo".to_string(),
            source_dir: ws.join("src"),
            exclude: Vec::new(),
            changed_files: None,
            tx_id: None,
            tx_timestamp: None,
            index_docs: false,
        }
    }

    fn orchestrator() -> (Orchestrator, Arc<RwLock<MemoryIndex>>) {
        let index = Arc::new(RwLock::new(MemoryIndex::new()));
        (
            Orchestrator::new(None, Arc::clone(&index), None, Vec::new()),
            index,
        )
    }

    #[tokio::test]
    async fn full_build_indexes_discovered_files() {
        let ws = TempDir::new().unwrap();
        write(ws.path(), "src/a.ts", "export function alpha() { return 1; }\n");
        write(ws.path(), "src/b.ts", "export function beta() { return 2; }\n");

        let (orchestrator, index) = orchestrator();
        let report = orchestrator
            .run(request(ws.path(), BuildMode::Full))
            .await
            .unwrap();

        assert_eq!(report.files_discovered, 2);
        assert_eq!(report.files_processed, 2);
        assert!(report.nodes_upserted >= 4, "2 files + 2 functions at least");
        assert!(report.errors.is_empty());

        let index = index.read().unwrap();
        assert!(index.contains("demo:file:src/a.ts"));
        assert!(index.contains("demo:function:src/a.ts:alpha:0"));
        assert!(index.contains(&report.tx_id));
    }

    #[tokio::test]
    async fn unchanged_workspace_incremental_is_a_no_op() {
        let ws = TempDir::new().unwrap();
        write(ws.path(), "src/a.ts", "export function alpha() { return 1; }\n");
        write(ws.path(), "src/b.ts", "export function beta() { return 2; }\n");

        let (orchestrator, _index) = orchestrator();
        orchestrator
            .run(request(ws.path(), BuildMode::Full))
            .await
            .unwrap();

        // Rewrite A byte-identically.
        write(ws.path(), "src/a.ts", "export function alpha() { return 1; }\n");

        let report = orchestrator
            .run(request(ws.path(), BuildMode::Incremental))
            .await
            .unwrap();
        assert_eq!(report.files_changed, 0);
        assert_eq!(report.files_processed, 0);
    }

    #[tokio::test]
    async fn changed_file_is_reindexed_with_new_symbols() {
        let ws = TempDir::new().unwrap();
        write(ws.path(), "src/a.ts", "export function alpha() { return 1; }\n");

        let (orchestrator, index) = orchestrator();
        orchestrator
            .run(request(ws.path(), BuildMode::Full))
            .await
            .unwrap();

        write(
            ws.path(),
            "src/a.ts",
            "export function alpha() { return 1; }\nexport function foo() { return 3; }\n",
        );
        let report = orchestrator
            .run(request(ws.path(), BuildMode::Incremental))
            .await
            .unwrap();
        assert_eq!(report.files_changed, 1);

        let index = index.read().unwrap();
        assert!(index.contains("demo:function:src/a.ts:foo:0"));
        assert!(index.contains("demo:function:src/a.ts:alpha:0"));
    }

    #[tokio::test]
    async fn explicit_changed_files_are_normalized_and_intersected() {
        let ws = TempDir::new().unwrap();
        write(ws.path(), "src/a.ts", "export function alpha() {}\n");
        write(ws.path(), "src/b.ts", "export function beta() {}\n");

        let (orchestrator, _index) = orchestrator();
        orchestrator
            .run(request(ws.path(), BuildMode::Full))
            .await
            .unwrap();

        let mut incremental = request(ws.path(), BuildMode::Incremental);
        incremental.changed_files = Some(vec![
            ws.path().join("src/a.ts"),
            ws.path().join("src/a.ts"),             // duplicate
            PathBuf::from("/outside/elsewhere.ts"), // outside workspace
            ws.path().join("src/readme.txt"),       // unsupported extension
        ]);
        let report = orchestrator.run(incremental).await.unwrap();
        assert_eq!(report.files_changed, 1);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("outside workspace")));
    }

    #[tokio::test]
    async fn full_rebuild_tombstones_removed_entities() {
        let ws = TempDir::new().unwrap();
        write(ws.path(), "src/a.ts", "export function alpha() {}\n");
        write(ws.path(), "src/b.ts", "export function beta() {}\n");

        let (orchestrator, index) = orchestrator();
        orchestrator
            .run(request(ws.path(), BuildMode::Full))
            .await
            .unwrap();

        std::fs::remove_file(ws.path().join("src/b.ts")).unwrap();
        let report = orchestrator
            .run(request(ws.path(), BuildMode::Full))
            .await
            .unwrap();
        assert!(report.stale_tombstoned >= 2, "file b and its function");

        let index = index.read().unwrap();
        let b = index.get("demo:file:src/b.ts").unwrap();
        assert!(!b.is_live(), "removed file must be tombstoned, not deleted");
        let a = index.get("demo:file:src/a.ts").unwrap();
        assert!(a.is_live());
    }

    #[tokio::test]
    async fn test_suites_link_to_imported_files() {
        let ws = TempDir::new().unwrap();
        write(ws.path(), "src/engine.ts", "export function run() {}\n");
        write(
            ws.path(),
            "src/engine.test.ts",
            "import { run } from \"./engine\";\n\ndescribe(\"engine\", () => {\n  it(\"runs\", () => { run(); });\n});\n",
        );

        let (orchestrator, index) = orchestrator();
        orchestrator
            .run(request(ws.path(), BuildMode::Full))
            .await
            .unwrap();

        let index = index.read().unwrap();
        let engine_file = "demo:file:src/engine.ts";
        let has_tests_edge = index
            .incoming(engine_file)
            .iter()
            .any(|e| e.rel == EdgeType::Tests);
        assert!(has_tests_edge, "TESTS edge from suite to imported file");
    }

    #[tokio::test]
    async fn missing_source_dir_is_a_typed_error() {
        let ws = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator();
        let err = orchestrator
            .run(request(ws.path(), BuildMode::Full))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LatticeError::Build(BuildError::SourceDirNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn feature_seeds_are_created_once() {
        let ws = TempDir::new().unwrap();
        write(ws.path(), "src/a.ts", "export function alpha() {}\n");
        let index = Arc::new(RwLock::new(MemoryIndex::new()));
        let orchestrator = Orchestrator::new(
            None,
            Arc::clone(&index),
            None,
            vec!["search-upgrade".to_string()],
        );
        orchestrator
            .run(request(ws.path(), BuildMode::Full))
            .await
            .unwrap();
        let guard = index.read().unwrap();
        let feature = guard.get("demo:feature:search-upgrade").unwrap();
        assert_eq!(feature.str_prop("status"), Some("planned"));
    }
}
