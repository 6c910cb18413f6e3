//! Temporal query layer: anchor resolution, validity-window rewrites, and
//! the diff-since emitter over the bitemporal node model.

use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map};
use tracing::debug;

use lattice_core::model::NodeLabel;
use lattice_core::traits::GitLookup;
use lattice_core::FxHashSet;
use lattice_graph::MemoryIndex;
use lattice_store::GraphClient;

/// Resolved `since` anchor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinceAnchor {
    /// How the anchor resolved: `tx`, `timestamp`, `git`, or `episode`.
    pub mode: String,
    pub anchor_value: String,
    pub since_ts: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub id: String,
    pub label: NodeLabel,
    pub name: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub added: Vec<DiffEntry>,
    pub removed: Vec<DiffEntry>,
    /// Ids present in both sets: the entity was replaced in the window.
    pub modified: Vec<String>,
    pub tx_ids: Vec<String>,
}

/// Accept ISO-8601, integer epoch millis, or a numeric string.
pub fn to_epoch_millis(anchor: &str) -> Option<i64> {
    let trimmed = anchor.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(ms) = trimmed.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis());
    }
    None
}

/// Node labels guarded by the as-of rewrite.
const VERSIONED_LABELS: &[&str] = &[
    "FILE", "FUNCTION", "CLASS", "VARIABLE", "IMPORT", "DOCUMENT", "SECTION",
];

/// Rewrite a cypher query so labeled node patterns only match nodes whose
/// validity window covers `$asOfTs`. Patterns without a versioned label
/// are left untouched; queries with no matching pattern come back
/// unchanged.
pub fn apply_temporal_filter(query: &str) -> String {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"\((\w+):([A-Z_]+)").expect("static regex"));
    let mut guarded: Vec<String> = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    for caps in pattern.captures_iter(query) {
        let var = &caps[1];
        let label = &caps[2];
        if VERSIONED_LABELS.contains(&label) && seen.insert(var.to_string()) {
            guarded.push(format!(
                "{var}.validFrom <= $asOfTs AND ({var}.validTo IS NULL OR {var}.validTo > $asOfTs)"
            ));
        }
    }
    if guarded.is_empty() {
        return query.to_string();
    }
    let guard = guarded.join(" AND ");

    // Splice the guard in ahead of RETURN, extending an existing WHERE.
    let upper = query.to_uppercase();
    if let Some(return_pos) = upper.find("RETURN") {
        let (head, tail) = query.split_at(return_pos);
        let connector = if upper[..return_pos].contains("WHERE") {
            "AND"
        } else {
            "WHERE"
        };
        format!("{} {connector} {guard} {}", head.trim_end(), tail)
    } else {
        format!("{query} WHERE {guard}")
    }
}

pub struct TemporalEngine {
    client: Option<Arc<GraphClient>>,
    index: Arc<RwLock<MemoryIndex>>,
    git: Option<Arc<dyn GitLookup>>,
}

impl TemporalEngine {
    pub fn new(
        client: Option<Arc<GraphClient>>,
        index: Arc<RwLock<MemoryIndex>>,
        git: Option<Arc<dyn GitLookup>>,
    ) -> Self {
        Self { client, index, git }
    }

    /// Resolve a `since` anchor, trying in order: GRAPH_TX id, literal
    /// timestamp, git commit, most recent episode by that agent id.
    pub async fn resolve_since_anchor(&self, since: &str, project_id: &str) -> Option<SinceAnchor> {
        if let Some(ts) = self.tx_timestamp(since, project_id).await {
            return Some(SinceAnchor {
                mode: "tx".to_string(),
                anchor_value: since.to_string(),
                since_ts: ts,
            });
        }
        if let Some(ts) = to_epoch_millis(since) {
            return Some(SinceAnchor {
                mode: "timestamp".to_string(),
                anchor_value: since.to_string(),
                since_ts: ts,
            });
        }
        if let Some(ts) = self.git.as_ref().and_then(|g| g.commit_timestamp(since)) {
            return Some(SinceAnchor {
                mode: "git".to_string(),
                anchor_value: since.to_string(),
                since_ts: ts,
            });
        }
        if let Some(ts) = self.latest_episode_ts(since, project_id).await {
            return Some(SinceAnchor {
                mode: "episode".to_string(),
                anchor_value: since.to_string(),
                since_ts: ts,
            });
        }
        None
    }

    async fn tx_timestamp(&self, tx_id: &str, project_id: &str) -> Option<i64> {
        if let Some(client) = &self.client {
            let mut params = Map::new();
            params.insert("id".into(), json!(tx_id));
            params.insert("projectId".into(), json!(project_id));
            let result = client
                .execute_query(
                    "MATCH (t:GRAPH_TX {id: $id, projectId: $projectId}) RETURN t.timestamp AS ts",
                    &params,
                )
                .await;
            if result.is_ok() {
                if let Some(ts) = result
                    .rows
                    .first()
                    .and_then(|row| row.get("ts"))
                    .and_then(|v| v.as_i64())
                {
                    return Some(ts);
                }
            }
        }
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let result = index
            .nodes_of(NodeLabel::GraphTx)
            .find(|n| n.id == tx_id && n.project_id() == Some(project_id))
            .and_then(|n| n.properties.get("timestamp").and_then(|v| v.as_i64()));
        result
    }

    async fn latest_episode_ts(&self, agent_id: &str, project_id: &str) -> Option<i64> {
        if let Some(client) = &self.client {
            let mut params = Map::new();
            params.insert("agentId".into(), json!(agent_id));
            params.insert("projectId".into(), json!(project_id));
            let result = client
                .execute_query(
                    "MATCH (e:EPISODE {agentId: $agentId, projectId: $projectId}) RETURN e.createdAt AS ts ORDER BY e.createdAt DESC LIMIT 1",
                    &params,
                )
                .await;
            if result.is_ok() {
                if let Some(ts) = result
                    .rows
                    .first()
                    .and_then(|row| row.get("ts"))
                    .and_then(|v| v.as_i64())
                {
                    return Some(ts);
                }
            }
        }
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        index
            .nodes_of(NodeLabel::Episode)
            .filter(|n| {
                n.str_prop("agentId") == Some(agent_id) && n.project_id() == Some(project_id)
            })
            .filter_map(|n| n.properties.get("createdAt").and_then(|v| v.as_i64()))
            .max()
    }

    /// Diff since a resolved timestamp: added (validFrom ≥ since), removed
    /// (validTo ≥ since), modified (ids in both), plus the GRAPH_TX ids in
    /// the window. `types` defaults to FILE/FUNCTION/CLASS.
    pub async fn diff_since(
        &self,
        since_ts: i64,
        types: Option<Vec<NodeLabel>>,
        project_id: &str,
    ) -> DiffReport {
        let types =
            types.unwrap_or_else(|| vec![NodeLabel::File, NodeLabel::Function, NodeLabel::Class]);
        debug!(since_ts, ?types, "computing temporal diff");

        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let mut report = DiffReport::default();
        let mut added_ids: FxHashSet<String> = FxHashSet::default();
        let mut removed_ids: FxHashSet<String> = FxHashSet::default();

        for &label in &types {
            for node in index.nodes_of(label) {
                if node.project_id() != Some(project_id) {
                    continue;
                }
                let entry = || DiffEntry {
                    id: node.id.clone(),
                    label,
                    name: node.str_prop("name").map(String::from),
                    file_path: node
                        .str_prop("filePath")
                        .or_else(|| node.str_prop("relativePath"))
                        .map(String::from),
                };
                if node.valid_from().is_some_and(|ts| ts >= since_ts) {
                    added_ids.insert(node.id.clone());
                    report.added.push(entry());
                }
                if node.valid_to().is_some_and(|ts| ts >= since_ts) {
                    removed_ids.insert(node.id.clone());
                    report.removed.push(entry());
                }
            }
        }

        report.modified = added_ids
            .intersection(&removed_ids)
            .cloned()
            .collect::<Vec<_>>();
        report.modified.sort();
        report.added.sort_by(|a, b| a.id.cmp(&b.id));
        report.removed.sort_by(|a, b| a.id.cmp(&b.id));

        report.tx_ids = index
            .nodes_of(NodeLabel::GraphTx)
            .filter(|n| n.project_id() == Some(project_id))
            .filter(|n| {
                n.properties
                    .get("timestamp")
                    .and_then(|v| v.as_i64())
                    .is_some_and(|ts| ts >= since_ts)
            })
            .map(|n| n.id.clone())
            .collect();
        report.tx_ids.sort();

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::model::NodeRecord;

    #[test]
    fn epoch_parsing_accepts_all_three_forms() {
        assert_eq!(to_epoch_millis("1700000000000"), Some(1_700_000_000_000));
        assert_eq!(
            to_epoch_millis("2024-01-01T00:00:00Z"),
            Some(1_704_067_200_000)
        );
        assert_eq!(to_epoch_millis("2024-01-01"), Some(1_704_067_200_000));
        assert_eq!(to_epoch_millis("not a time"), None);
        assert_eq!(to_epoch_millis(""), None);
    }

    #[test]
    fn rewrite_guards_versioned_labels_only() {
        let rewritten = apply_temporal_filter("MATCH (f:FILE) RETURN f");
        assert!(rewritten.contains("f.validFrom <= $asOfTs"));
        assert!(rewritten.contains("f.validTo IS NULL OR f.validTo > $asOfTs"));

        let untouched = apply_temporal_filter("MATCH (c:CLAIM) RETURN c");
        assert_eq!(untouched, "MATCH (c:CLAIM) RETURN c");
    }

    #[test]
    fn rewrite_extends_existing_where() {
        let rewritten =
            apply_temporal_filter("MATCH (f:FUNCTION) WHERE f.name = 'x' RETURN f");
        assert!(rewritten.contains("WHERE f.name = 'x'"));
        assert!(rewritten.contains("AND f.validFrom <= $asOfTs"));
        let where_count = rewritten.matches("WHERE").count();
        assert_eq!(where_count, 1);
    }

    fn node(id: &str, label: NodeLabel, project: &str, from: i64, to: Option<i64>) -> NodeRecord {
        let mut props = Map::new();
        props.insert("projectId".into(), json!(project));
        props.insert("validFrom".into(), json!(from));
        if let Some(to) = to {
            props.insert("validTo".into(), json!(to));
        }
        NodeRecord::new(id, label, props)
    }

    fn engine(index: MemoryIndex) -> TemporalEngine {
        TemporalEngine::new(None, Arc::new(RwLock::new(index)), None)
    }

    #[tokio::test]
    async fn diff_classifies_added_removed_modified() {
        let mut index = MemoryIndex::new();
        // Added after anchor.
        index.add_node(node("p:file:new.ts", NodeLabel::File, "p", 200, None));
        // Removed after anchor.
        index.add_node(node("p:file:old.ts", NodeLabel::File, "p", 10, Some(250)));
        // Replaced in the window: tombstoned and re-added.
        index.add_node(node("p:file:mod.ts", NodeLabel::File, "p", 220, Some(230)));
        // Untouched since before the anchor.
        index.add_node(node("p:file:stable.ts", NodeLabel::File, "p", 10, None));

        let report = engine(index).diff_since(100, None, "p").await;
        let added: Vec<&str> = report.added.iter().map(|e| e.id.as_str()).collect();
        let removed: Vec<&str> = report.removed.iter().map(|e| e.id.as_str()).collect();
        assert!(added.contains(&"p:file:new.ts"));
        assert!(removed.contains(&"p:file:old.ts"));
        assert_eq!(report.modified, vec!["p:file:mod.ts".to_string()]);
        assert!(!added.contains(&"p:file:stable.ts"));
    }

    #[tokio::test]
    async fn diff_at_now_is_empty() {
        let mut index = MemoryIndex::new();
        index.add_node(node("p:file:a.ts", NodeLabel::File, "p", 100, None));
        let report = engine(index).diff_since(i64::MAX, None, "p").await;
        assert!(report.added.is_empty());
        assert!(report.removed.is_empty());
        assert!(report.modified.is_empty());
    }

    #[tokio::test]
    async fn anchor_resolution_order_tx_then_timestamp() {
        let mut index = MemoryIndex::new();
        let mut props = Map::new();
        props.insert("projectId".into(), json!("p"));
        props.insert("timestamp".into(), json!(555));
        index.add_node(NodeRecord::new("tx-abc", NodeLabel::GraphTx, props));
        let engine = engine(index);

        let anchor = engine.resolve_since_anchor("tx-abc", "p").await.unwrap();
        assert_eq!(anchor.mode, "tx");
        assert_eq!(anchor.since_ts, 555);

        let anchor = engine
            .resolve_since_anchor("1700000000000", "p")
            .await
            .unwrap();
        assert_eq!(anchor.mode, "timestamp");
    }

    #[tokio::test]
    async fn anchor_falls_back_to_git_then_episode() {
        struct FixedGit;
        impl GitLookup for FixedGit {
            fn commit_timestamp(&self, rev: &str) -> Option<i64> {
                (rev == "abc123").then_some(777)
            }
        }
        let mut index = MemoryIndex::new();
        let mut props = Map::new();
        props.insert("projectId".into(), json!("p"));
        props.insert("agentId".into(), json!("agent-7"));
        props.insert("createdAt".into(), json!(900));
        index.add_node(NodeRecord::new("ep-1", NodeLabel::Episode, props));

        let engine = TemporalEngine::new(
            None,
            Arc::new(RwLock::new(index)),
            Some(Arc::new(FixedGit)),
        );

        let git_anchor = engine.resolve_since_anchor("abc123", "p").await.unwrap();
        assert_eq!(git_anchor.mode, "git");
        assert_eq!(git_anchor.since_ts, 777);

        let ep_anchor = engine.resolve_since_anchor("agent-7", "p").await.unwrap();
        assert_eq!(ep_anchor.mode, "episode");
        assert_eq!(ep_anchor.since_ts, 900);

        assert!(engine.resolve_since_anchor("nothing", "p").await.is_none());
    }
}
