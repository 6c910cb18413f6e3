//! End-to-end server tests against a tempdir workspace. The graph store
//! is either absent (index-backed degradation paths) or a recording stub,
//! never a live engine.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use lattice_core::config::LatticeConfig;
use lattice_core::errors::StoreError;
use lattice_core::traits::{GraphBackend, GraphConnector, Row};
use lattice_server::{Server, ServerBackends, ToolRequest};

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn workspace() -> TempDir {
    let ws = TempDir::new().unwrap();
    write(
        ws.path(),
        "src/engine.ts",
        "import { fmt } from \"./util\";\n\nexport function compute(a: number, b: number): number {\n  return a + b;\n}\n\nexport function result(): string {\n  return fmt(compute(1, 2));\n}\n",
    );
    write(
        ws.path(),
        "src/util.ts",
        "export function fmt(x: number): string {\n  return String(x);\n}\n",
    );
    ws
}

fn server_for(ws: &TempDir) -> Arc<Server> {
    let mut config = LatticeConfig::default();
    config.workspace_root = Some(ws.path().to_path_buf());
    Server::new(config, ServerBackends::default())
}

async fn full_build(server: &Arc<Server>) -> Value {
    let response = server
        .dispatch(ToolRequest::GraphRebuild {
            mode: Some("full".to_string()),
            workspace_root: None,
            source_dir: None,
            project_id: None,
            index_docs: Some(false),
        })
        .await;
    assert!(response.is_success(), "{response:?}");
    response.data().unwrap().clone()
}

#[tokio::test]
async fn full_then_untouched_incremental_processes_nothing() {
    let ws = workspace();
    let server = server_for(&ws);

    let data = full_build(&server).await;
    assert_eq!(data["status"], "COMPLETED");
    assert_eq!(data["report"]["filesProcessed"], json!(2));

    // Rewrite byte-identically, then incremental.
    write(
        ws.path(),
        "src/engine.ts",
        "import { fmt } from \"./util\";\n\nexport function compute(a: number, b: number): number {\n  return a + b;\n}\n\nexport function result(): string {\n  return fmt(compute(1, 2));\n}\n",
    );
    let response = server
        .dispatch(ToolRequest::GraphRebuild {
            mode: Some("incremental".to_string()),
            workspace_root: None,
            source_dir: None,
            project_id: None,
            index_docs: Some(false),
        })
        .await;
    let data = response.data().unwrap();
    assert_eq!(data["report"]["filesChanged"], json!(0));
    assert_eq!(data["report"]["filesProcessed"], json!(0));
}

#[tokio::test]
async fn incremental_picks_up_a_new_function() {
    let ws = workspace();
    let server = server_for(&ws);
    full_build(&server).await;

    write(
        ws.path(),
        "src/engine.ts",
        "export function compute(a: number, b: number): number {\n  return a + b;\n}\n\nexport function foo(): number {\n  return 42;\n}\n",
    );
    let response = server
        .dispatch(ToolRequest::GraphRebuild {
            mode: Some("incremental".to_string()),
            workspace_root: None,
            source_dir: None,
            project_id: None,
            index_docs: Some(false),
        })
        .await;
    let data = response.data().unwrap();
    assert_eq!(data["report"]["filesChanged"], json!(1));

    // The new symbol is retrievable.
    let response = server
        .dispatch(ToolRequest::GraphQuery {
            query: "foo".to_string(),
            language: Some("natural".to_string()),
            mode: None,
            limit: Some(10),
            as_of: None,
        })
        .await;
    let data = response.data().unwrap();
    let ids: Vec<&str> = data["results"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["id"].as_str())
        .collect();
    assert!(ids.iter().any(|id| id.contains(":function:src/engine.ts:foo:0")), "{ids:?}");
}

#[tokio::test]
async fn bm25_without_store_reports_lexical_fallback_and_project_isolation() {
    let ws = workspace();
    let server = server_for(&ws);
    full_build(&server).await;

    let response = server
        .dispatch(ToolRequest::GraphQuery {
            query: "compute result".to_string(),
            language: Some("natural".to_string()),
            mode: None,
            limit: Some(20),
            as_of: None,
        })
        .await;
    let data = response.data().unwrap();
    assert_eq!(data["bm25Mode"], "lexical_fallback");

    let project_prefix = format!(
        "{}:",
        ws.path().file_name().unwrap().to_string_lossy()
    );
    for result in data["results"].as_array().unwrap() {
        assert!(result["id"].as_str().unwrap().starts_with(&project_prefix));
    }
}

#[tokio::test]
async fn circular_imports_surface_through_find_pattern() {
    let ws = TempDir::new().unwrap();
    write(ws.path(), "src/x.ts", "import { y } from \"./y\";\nexport const x = 1;\n");
    write(ws.path(), "src/y.ts", "import { x } from \"./x\";\nexport const y = 2;\n");
    let server = server_for(&ws);
    full_build(&server).await;

    let response = server
        .dispatch(ToolRequest::FindPattern {
            pattern_type: "circular".to_string(),
        })
        .await;
    let data = response.data().unwrap();
    let cycles = data["cycles"].as_array().unwrap();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0]["length"], json!(2));
    let members: Vec<&str> = cycles[0]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .collect();
    assert_eq!(members, vec!["src/x.ts", "src/y.ts"], "canonical order");
}

#[tokio::test]
async fn claim_conflict_then_release_then_retry() {
    let ws = workspace();
    let server = server_for(&ws);

    let alpha = server
        .dispatch(ToolRequest::AgentClaim {
            agent_id: "alpha".to_string(),
            target_id: "src/engine.ts".to_string(),
            claim_type: "file".to_string(),
            intent: "refactor".to_string(),
            task_id: Some("t-1".to_string()),
            session_id: None,
        })
        .await;
    let alpha_data = alpha.data().unwrap();
    assert_eq!(alpha_data["status"], "CREATED");
    let claim_id = alpha_data["claimId"].as_str().unwrap().to_string();

    let beta = server
        .dispatch(ToolRequest::AgentClaim {
            agent_id: "beta".to_string(),
            target_id: "src/engine.ts".to_string(),
            claim_type: "file".to_string(),
            intent: "edit".to_string(),
            task_id: None,
            session_id: None,
        })
        .await;
    let beta_data = beta.data().unwrap();
    assert_eq!(beta_data["status"], "CONFLICT");
    assert_eq!(beta_data["conflictingAgentId"], "alpha");

    let release = server
        .dispatch(ToolRequest::AgentRelease {
            claim_id,
            outcome: Some("done".to_string()),
        })
        .await;
    assert_eq!(release.data().unwrap()["found"], json!(true));

    let retry = server
        .dispatch(ToolRequest::AgentClaim {
            agent_id: "beta".to_string(),
            target_id: "src/engine.ts".to_string(),
            claim_type: "file".to_string(),
            intent: "edit".to_string(),
            task_id: None,
            session_id: None,
        })
        .await;
    assert_eq!(retry.data().unwrap()["status"], "CREATED");
}

#[tokio::test]
async fn health_shows_no_drift_after_successful_build() {
    let ws = workspace();
    let server = server_for(&ws);
    full_build(&server).await;

    let response = server.dispatch(ToolRequest::GraphHealth {}).await;
    let data = response.data().unwrap();
    assert_eq!(data["drift"]["driftDetected"], json!(false));
    assert!(data["drift"]["cachedNodes"].as_u64().unwrap() > 0);
    assert_eq!(data["sync"]["graphStore"], "synced");
    assert_eq!(data["sync"]["index"], "synced");
}

#[tokio::test]
async fn diff_since_build_tx_lists_every_rebuilt_node_as_added() {
    let ws = workspace();
    let server = server_for(&ws);
    let data = full_build(&server).await;
    let tx_id = data["report"]["txId"].as_str().unwrap().to_string();

    let response = server
        .dispatch(ToolRequest::DiffSince {
            since: tx_id.clone(),
            types: None,
            project_id: None,
        })
        .await;
    let data = response.data().unwrap();
    assert_eq!(data["anchor"]["mode"], "tx");
    let added = data["diff"]["added"].as_array().unwrap();
    // 2 files + 3 functions (compute, result, fmt).
    assert!(added.len() >= 5, "{added:?}");
    assert!(data["diff"]["txIds"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v.as_str() == Some(tx_id.as_str())));
    assert!(data["diff"]["removed"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn diff_since_now_is_empty() {
    let ws = workspace();
    let server = server_for(&ws);
    full_build(&server).await;

    let response = server
        .dispatch(ToolRequest::DiffSince {
            since: format!("{}", lattice_core::now_millis() + 60_000),
            types: None,
            project_id: None,
        })
        .await;
    let data = response.data().unwrap();
    assert!(data["diff"]["added"].as_array().unwrap().is_empty());
    assert!(data["diff"]["removed"].as_array().unwrap().is_empty());
    assert!(data["diff"]["modified"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_anchor_is_a_recoverable_error() {
    let ws = workspace();
    let server = server_for(&ws);
    let response = server
        .dispatch(ToolRequest::DiffSince {
            since: "no-such-anchor".to_string(),
            types: None,
            project_id: None,
        })
        .await;
    assert_eq!(response.error_code(), Some("ANCHOR_NOT_FOUND"));
}

#[tokio::test]
async fn episodes_round_trip_through_recall_and_reflection() {
    let ws = workspace();
    let server = server_for(&ws);

    for content in ["tsc failed with TS2345", "tsc failed with TS2345"] {
        let response = server
            .dispatch(ToolRequest::EpisodeAdd {
                episode_type: "ERROR".to_string(),
                content: content.to_string(),
                entities: None,
                task_id: Some("t-9".to_string()),
                outcome: None,
                metadata: None,
                sensitive: None,
                agent_id: "alpha".to_string(),
                session_id: None,
            })
            .await;
        assert!(response.is_success());
    }

    let recall = server
        .dispatch(ToolRequest::EpisodeRecall {
            query: "tsc failed".to_string(),
            agent_id: None,
            task_id: None,
            types: None,
            entities: None,
            limit: Some(10),
            since: None,
            include_sensitive: None,
        })
        .await;
    assert_eq!(recall.data().unwrap().as_array().unwrap().len(), 2);

    let reflect = server
        .dispatch(ToolRequest::Reflect {
            task_id: Some("t-9".to_string()),
            agent_id: Some("alpha".to_string()),
            limit: None,
        })
        .await;
    let data = reflect.data().unwrap();
    assert!(data["learningsCreated"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn docs_index_and_search_work_storeless() {
    let ws = workspace();
    write(
        ws.path(),
        "README.md",
        "# Demo\n\n## Computation\n\nThe `compute` function adds numbers.\n",
    );
    let server = server_for(&ws);
    full_build(&server).await;

    let response = server
        .dispatch(ToolRequest::IndexDocs { incremental: None })
        .await;
    assert_eq!(response.data().unwrap()["indexed"], json!(1));

    let search = server
        .dispatch(ToolRequest::SearchDocs {
            query: "compute".to_string(),
            limit: Some(5),
        })
        .await;
    assert!(!search.data().unwrap().as_array().unwrap().is_empty());

    let by_symbol = server
        .dispatch(ToolRequest::DocsBySymbol {
            symbol: "compute".to_string(),
            limit: Some(5),
        })
        .await;
    assert!(!by_symbol.data().unwrap().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn slow_builds_return_queued_with_tx_id() {
    let ws = workspace();
    let mut config = LatticeConfig::default();
    config.workspace_root = Some(ws.path().to_path_buf());
    config.sync_rebuild_threshold_ms = Some(0); // everything is "slow"
    let server = Server::new(config, ServerBackends::default());

    let response = server
        .dispatch(ToolRequest::GraphRebuild {
            mode: Some("full".to_string()),
            workspace_root: None,
            source_dir: None,
            project_id: None,
            index_docs: Some(false),
        })
        .await;
    let data = response.data().unwrap();
    assert_eq!(data["status"], "QUEUED");
    assert!(data["txId"].as_str().unwrap().starts_with("tx-"));

    // The background task finishes; health eventually reports the build.
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let health = server.dispatch(ToolRequest::GraphHealth {}).await;
        if health.data().unwrap()["lastBuild"].is_object() {
            return;
        }
    }
    panic!("queued build never completed");
}

// ─── Recording store: batch discipline & provenance ─────────────────────

#[derive(Default)]
struct RecordingBackend {
    queries: Mutex<Vec<(String, Map<String, Value>)>>,
}

#[async_trait]
impl GraphBackend for RecordingBackend {
    async fn run(&self, query: &str, params: &Map<String, Value>) -> Result<Vec<Row>, StoreError> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), params.clone()));
        Ok(Vec::new())
    }
}

struct RecordingConnector {
    backend: Arc<RecordingBackend>,
}

#[async_trait]
impl GraphConnector for RecordingConnector {
    async fn connect(&self, _uri: &str) -> Result<Arc<dyn GraphBackend>, StoreError> {
        Ok(Arc::clone(&self.backend) as Arc<dyn GraphBackend>)
    }
}

#[tokio::test]
async fn store_statements_carry_provenance_and_order() {
    let ws = workspace();
    let backend = Arc::new(RecordingBackend::default());
    let mut config = LatticeConfig::default();
    config.workspace_root = Some(ws.path().to_path_buf());
    let server = Server::new(
        config,
        ServerBackends {
            connector: Some(Arc::new(RecordingConnector {
                backend: Arc::clone(&backend),
            })),
            ..Default::default()
        },
    );
    assert!(server.connect().await);
    full_build(&server).await;

    let recorded = backend.queries.lock().unwrap();
    let node_upserts: Vec<&(String, Map<String, Value>)> = recorded
        .iter()
        .filter(|(q, _)| q.starts_with("MERGE (n:") && q.contains("txId"))
        .collect();
    assert!(!node_upserts.is_empty());

    // Every versioned node statement carries the shared provenance fields.
    let tx_ids: std::collections::BTreeSet<&str> = node_upserts
        .iter()
        .filter_map(|(_, p)| p.get("txId").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(tx_ids.len(), 1, "one txId per build");
    for (query, params) in &node_upserts {
        assert!(params.contains_key("validFrom"), "{query}");
        assert!(params.contains_key("validTo"), "{query}");
        assert!(params.contains_key("projectId"), "{query}");
    }

    // Node upserts precede edges referencing them.
    let mut seen_ids = std::collections::HashSet::new();
    for (query, params) in recorded.iter() {
        if query.starts_with("MERGE (n:") {
            if let Some(id) = params.get("id").and_then(|v| v.as_str()) {
                seen_ids.insert(id.to_string());
            }
        } else if query.starts_with("MATCH (a:") && query.contains("MERGE (a)-[") {
            for key in ["fromId", "toId"] {
                let id = params.get(key).and_then(|v| v.as_str()).unwrap();
                assert!(seen_ids.contains(id), "edge before node: {id} in {query}");
            }
        }
    }
}
