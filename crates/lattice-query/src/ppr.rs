//! Seeded personalized PageRank over the project subgraph.
//!
//! Fixed iteration budget (no convergence check) for predictable cost.
//! Candidate edges come from the store when connected, otherwise from the
//! in-memory index; either way the load is capped.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::{json, Map};
use tracing::debug;

use lattice_core::FxHashMap;
use lattice_graph::MemoryIndex;
use lattice_store::GraphClient;

use crate::retriever::edge_weight;

/// Candidate edge cap per ranking run.
pub const MAX_CANDIDATE_EDGES: usize = 20_000;

/// Result cap.
pub const MAX_RESULTS: usize = 500;

const EDGE_LOAD_QUERY: &str = "MATCH (a)-[r]->(b) WHERE a.projectId = $projectId AND b.projectId = $projectId RETURN a.id AS fromId, labels(a)[0] AS fromLabel, a.name AS fromName, coalesce(a.filePath, a.relativePath) AS fromPath, type(r) AS rel, b.id AS toId, labels(b)[0] AS toLabel, b.name AS toName, coalesce(b.filePath, b.relativePath) AS toPath LIMIT 20000";

#[derive(Debug, Clone)]
pub struct PprRequest {
    pub seed_ids: Vec<String>,
    pub project_id: String,
    /// Overrides for the default edge-weight table, keyed by rel type.
    pub edge_weights: Option<FxHashMap<String, f64>>,
    pub damping: f64,
    pub iterations: usize,
    pub max_results: usize,
}

impl PprRequest {
    pub fn new(seed_ids: Vec<String>, project_id: impl Into<String>) -> Self {
        Self {
            seed_ids,
            project_id: project_id.into(),
            edge_weights: None,
            damping: 0.85,
            iterations: 20,
            max_results: MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PprScore {
    pub id: String,
    /// Rounded to 6 decimals.
    pub score: f64,
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    pub name: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct NodeMeta {
    node_type: Option<String>,
    name: Option<String>,
    file_path: Option<String>,
}

#[derive(Debug, Clone)]
struct CandidateEdge {
    from: String,
    to: String,
    rel: String,
}

pub struct PprRanker {
    client: Option<Arc<GraphClient>>,
    index: Arc<RwLock<MemoryIndex>>,
}

impl PprRanker {
    pub fn new(client: Option<Arc<GraphClient>>, index: Arc<RwLock<MemoryIndex>>) -> Self {
        Self { client, index }
    }

    pub async fn rank(&self, request: &PprRequest) -> Vec<PprScore> {
        // Empty seeds: empty result, no store round-trip.
        if request.seed_ids.is_empty() {
            return Vec::new();
        }

        let (edges, mut meta) = self.load_edges(&request.project_id).await;
        debug!(
            edges = edges.len(),
            seeds = request.seed_ids.len(),
            "ppr candidate graph loaded"
        );

        // Node set: seeds ∪ edge endpoints.
        let mut node_ids: Vec<String> = Vec::new();
        let mut seen: FxHashMap<String, usize> = FxHashMap::default();
        let mut intern = |id: &str, node_ids: &mut Vec<String>| -> usize {
            if let Some(&i) = seen.get(id) {
                return i;
            }
            let i = node_ids.len();
            node_ids.push(id.to_string());
            seen.insert(id.to_string(), i);
            i
        };
        for seed in &request.seed_ids {
            intern(seed, &mut node_ids);
        }
        for edge in &edges {
            intern(&edge.from, &mut node_ids);
            intern(&edge.to, &mut node_ids);
        }
        let n = node_ids.len();

        // Outgoing adjacency with per-edge weights + out-weight sums.
        let weight_of = |rel: &str| -> f64 {
            request
                .edge_weights
                .as_ref()
                .and_then(|w| w.get(rel).copied())
                .unwrap_or_else(|| edge_weight(rel))
        };
        let mut outgoing: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut out_weight: Vec<f64> = vec![0.0; n];
        for edge in &edges {
            let from = seen[&edge.from];
            let to = seen[&edge.to];
            let w = weight_of(&edge.rel);
            outgoing[from].push((to, w));
            out_weight[from] += w;
        }

        // Personalization: uniform over seeds, zero elsewhere.
        let mut personalization = vec![0.0; n];
        let seed_share = 1.0 / request.seed_ids.len() as f64;
        for seed in &request.seed_ids {
            personalization[seen[seed]] += seed_share;
        }

        let damping = request.damping;
        let iterations = request.iterations.clamp(1, 100);
        let mut rank = personalization.clone();
        for _ in 0..iterations {
            let mut next: Vec<f64> = personalization.iter().map(|p| (1.0 - damping) * p).collect();
            for (from, targets) in outgoing.iter().enumerate() {
                if out_weight[from] <= 0.0 {
                    continue;
                }
                let share = damping * rank[from] / out_weight[from];
                for &(to, w) in targets {
                    next[to] += share * w;
                }
            }
            rank = next;
        }

        let mut scored: Vec<(usize, f64)> = rank
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| node_ids[a.0].cmp(&node_ids[b.0]))
        });
        scored.truncate(request.max_results.min(MAX_RESULTS));

        scored
            .into_iter()
            .map(|(i, score)| {
                let id = node_ids[i].clone();
                let m = meta.remove(&id).unwrap_or_else(|| self.meta_from_index(&id));
                PprScore {
                    id,
                    score: (score * 1_000_000.0).round() / 1_000_000.0,
                    node_type: m.node_type,
                    name: m.name,
                    file_path: m.file_path,
                }
            })
            .collect()
    }

    /// Load candidate edges: store first, index fallback. Also returns
    /// whatever endpoint metadata came with the edges.
    async fn load_edges(&self, project_id: &str) -> (Vec<CandidateEdge>, FxHashMap<String, NodeMeta>) {
        if let Some(client) = &self.client {
            let mut params = Map::new();
            params.insert("projectId".into(), json!(project_id));
            let result = client.execute_query(EDGE_LOAD_QUERY, &params).await;
            if result.is_ok() && !result.rows.is_empty() {
                let mut edges = Vec::with_capacity(result.rows.len());
                let mut meta: FxHashMap<String, NodeMeta> = FxHashMap::default();
                for row in &result.rows {
                    let get = |key: &str| row.get(key).and_then(|v| v.as_str()).map(String::from);
                    let (Some(from), Some(to), Some(rel)) =
                        (get("fromId"), get("toId"), get("rel"))
                    else {
                        continue;
                    };
                    meta.entry(from.clone()).or_insert_with(|| NodeMeta {
                        node_type: get("fromLabel"),
                        name: get("fromName"),
                        file_path: get("fromPath"),
                    });
                    meta.entry(to.clone()).or_insert_with(|| NodeMeta {
                        node_type: get("toLabel"),
                        name: get("toName"),
                        file_path: get("toPath"),
                    });
                    edges.push(CandidateEdge { from, to, rel });
                    if edges.len() >= MAX_CANDIDATE_EDGES {
                        break;
                    }
                }
                return (edges, meta);
            }
        }

        // Index fallback.
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let prefix = format!("{project_id}:");
        let edges: Vec<CandidateEdge> = index
            .all_edges()
            .filter(|e| e.from.starts_with(&prefix) && e.to.starts_with(&prefix))
            .take(MAX_CANDIDATE_EDGES)
            .map(|e| CandidateEdge {
                from: e.from.clone(),
                to: e.to.clone(),
                rel: e.rel.as_str().to_string(),
            })
            .collect();
        (edges, FxHashMap::default())
    }

    fn meta_from_index(&self, id: &str) -> NodeMeta {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        match index.get(id) {
            Some(node) => NodeMeta {
                node_type: Some(node.label.as_str().to_string()),
                name: node.str_prop("name").map(String::from),
                file_path: node
                    .str_prop("filePath")
                    .or_else(|| node.str_prop("relativePath"))
                    .map(String::from),
            },
            None => NodeMeta::default(),
        }
    }
}
