//! The closed tool surface: every tool deserializes from its wire form,
//! schema trouble is rejected at the edge, and error envelopes carry the
//! taxonomy codes.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use lattice_core::config::LatticeConfig;
use lattice_server::{Server, ServerBackends, ToolRequest};

fn server_with_workspace() -> (TempDir, Arc<Server>) {
    let ws = TempDir::new().unwrap();
    std::fs::create_dir_all(ws.path().join("src")).unwrap();
    std::fs::write(
        ws.path().join("src/a.ts"),
        "export function a() { return 1; }\n",
    )
    .unwrap();
    let mut config = LatticeConfig::default();
    config.workspace_root = Some(ws.path().to_path_buf());
    let server = Server::new(config, ServerBackends::default());
    (ws, server)
}

#[test]
fn every_tool_name_round_trips() {
    let requests = [
        json!({"tool": "graph_set_workspace", "args": {"workspaceRoot": "/ws"}}),
        json!({"tool": "graph_rebuild", "args": {}}),
        json!({"tool": "graph_query", "args": {"query": "MATCH (n) RETURN n"}}),
        json!({"tool": "graph_health", "args": {}}),
        json!({"tool": "diff_since", "args": {"since": "tx-1"}}),
        json!({"tool": "agent_claim", "args": {"agentId": "a", "targetId": "t", "claimType": "file", "intent": "edit"}}),
        json!({"tool": "agent_release", "args": {"claimId": "claim-1"}}),
        json!({"tool": "agent_status", "args": {}}),
        json!({"tool": "coordination_overview", "args": {}}),
        json!({"tool": "episode_add", "args": {"episodeType": "OBSERVATION", "content": "x", "agentId": "a"}}),
        json!({"tool": "episode_recall", "args": {"query": "x"}}),
        json!({"tool": "decision_query", "args": {"query": "x"}}),
        json!({"tool": "reflect", "args": {}}),
        json!({"tool": "index_docs", "args": {}}),
        json!({"tool": "search_docs", "args": {"query": "x"}}),
        json!({"tool": "docs_by_symbol", "args": {"symbol": "x"}}),
        json!({"tool": "find_pattern", "args": {"type": "circular"}}),
        json!({"tool": "briefing", "args": {"task": "x", "seedIds": []}}),
    ];
    let expected = [
        "graph_set_workspace",
        "graph_rebuild",
        "graph_query",
        "graph_health",
        "diff_since",
        "agent_claim",
        "agent_release",
        "agent_status",
        "coordination_overview",
        "episode_add",
        "episode_recall",
        "decision_query",
        "reflect",
        "index_docs",
        "search_docs",
        "docs_by_symbol",
        "find_pattern",
        "briefing",
    ];
    for (raw, name) in requests.iter().zip(expected) {
        let request: ToolRequest =
            serde_json::from_value(raw.clone()).unwrap_or_else(|e| panic!("{name}: {e}"));
        assert_eq!(request.tool_name(), name);
    }
}

#[test]
fn missing_required_args_fail_deserialization() {
    for raw in [
        json!({"tool": "agent_claim", "args": {"agentId": "a"}}),
        json!({"tool": "graph_query", "args": {}}),
        json!({"tool": "episode_add", "args": {"content": "x"}}),
    ] {
        assert!(serde_json::from_value::<ToolRequest>(raw).is_err());
    }
}

#[tokio::test]
async fn cypher_without_a_store_is_store_unavailable() {
    let (_ws, server) = server_with_workspace();
    let response = server
        .dispatch(ToolRequest::GraphQuery {
            query: "MATCH (n) RETURN n".to_string(),
            language: None,
            mode: None,
            limit: None,
            as_of: None,
        })
        .await;
    assert_eq!(response.error_code(), Some("STORE_UNAVAILABLE"));
}

#[tokio::test]
async fn invalid_build_mode_is_invalid_input() {
    let (_ws, server) = server_with_workspace();
    let response = server
        .dispatch(ToolRequest::GraphRebuild {
            mode: Some("sideways".to_string()),
            workspace_root: None,
            source_dir: None,
            project_id: None,
            index_docs: None,
        })
        .await;
    assert_eq!(response.error_code(), Some("INVALID_INPUT"));
}

#[tokio::test]
async fn unknown_workspace_is_workspace_not_found() {
    let server = Server::new(LatticeConfig::default(), ServerBackends::default());
    let response = server
        .dispatch(ToolRequest::GraphRebuild {
            mode: None,
            workspace_root: None,
            source_dir: None,
            project_id: None,
            index_docs: None,
        })
        .await;
    assert_eq!(response.error_code(), Some("WORKSPACE_NOT_FOUND"));
}

#[tokio::test]
async fn bad_episode_type_is_rejected_with_invalid_episode() {
    let (_ws, server) = server_with_workspace();
    let response = server
        .dispatch(ToolRequest::EpisodeAdd {
            episode_type: "GUESS".to_string(),
            content: "x".to_string(),
            entities: None,
            task_id: None,
            outcome: None,
            metadata: None,
            sensitive: None,
            agent_id: "a".to_string(),
            session_id: None,
        })
        .await;
    assert_eq!(response.error_code(), Some("INVALID_EPISODE"));
}

#[tokio::test]
async fn set_workspace_reports_context_and_watcher() {
    let (ws, server) = server_with_workspace();
    let response = server
        .dispatch(ToolRequest::GraphSetWorkspace {
            workspace_root: ws.path().to_path_buf(),
            source_dir: None,
            project_id: Some("surface-test".to_string()),
        })
        .await;
    assert!(response.is_success(), "{response:?}");
    let data = response.data().unwrap();
    assert_eq!(data["context"]["projectId"], "surface-test");
    assert_eq!(data["usedFallback"], json!(false));
    assert!(data["watcher"].is_string());
}

#[tokio::test]
async fn unreachable_workspace_without_fallback_is_sandboxed() {
    let server = Server::new(LatticeConfig::default(), ServerBackends::default());
    let response = server
        .dispatch(ToolRequest::GraphSetWorkspace {
            workspace_root: "/definitely/not/mounted/here".into(),
            source_dir: None,
            project_id: None,
        })
        .await;
    assert_eq!(response.error_code(), Some("WORKSPACE_PATH_SANDBOXED"));
}

#[tokio::test]
async fn success_envelopes_carry_profile_metadata() {
    let (_ws, server) = server_with_workspace();
    let response = server.dispatch(ToolRequest::GraphHealth {}).await;
    let serialized = serde_json::to_value(&response).unwrap();
    assert_eq!(serialized["profile"]["tool"], "graph_health");
    assert!(serialized["profile"]["durationMs"].is_number());
}
