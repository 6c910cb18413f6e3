//! Health reporting: sync states, index/store/vector drift, watcher
//! state, and the last build's outcome.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::{json, Map};

use lattice_core::traits::VectorBackend;
use lattice_graph::drift::{self, DriftReport, StoreCounts};
use lattice_graph::MemoryIndex;
use lattice_session::sync_state::StateSnapshot;
use lattice_store::GraphClient;

use crate::orchestrator::BuildReport;
use crate::watcher::WatcherState;

const STORE_NODE_COUNT_QUERY: &str = "MATCH (n) WHERE n.projectId = $projectId AND n.validTo IS NULL AND (n:FILE OR n:FUNCTION OR n:CLASS OR n:IMPORT OR n:EXPORT OR n:TEST_SUITE) RETURN count(n) AS nodes";
const STORE_EDGE_COUNT_QUERY: &str =
    "MATCH (a)-[r]->() WHERE a.projectId = $projectId RETURN count(r) AS edges";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub project_id: String,
    pub store_connected: bool,
    pub sync: StateSnapshot,
    pub watcher: Option<WatcherState>,
    pub index_nodes: usize,
    pub index_edges: usize,
    pub drift: DriftReport,
    pub bm25_index_known_to_exist: bool,
    pub last_build: Option<BuildReport>,
    pub recent_errors: Vec<String>,
}

/// Live store counts for the drift comparison; `None` when the store is
/// unreachable.
pub async fn store_counts(client: &GraphClient, project_id: &str) -> Option<StoreCounts> {
    let mut params = Map::new();
    params.insert("projectId".into(), json!(project_id));

    let nodes = client.execute_query(STORE_NODE_COUNT_QUERY, &params).await;
    if !nodes.is_ok() {
        return None;
    }
    let indexable_nodes = nodes
        .rows
        .first()
        .and_then(|row| row.get("nodes"))
        .and_then(|v| v.as_i64())?;

    let edges = client
        .execute_query(STORE_EDGE_COUNT_QUERY, &params)
        .await
        .rows
        .first()
        .and_then(|row| row.get("edges"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    Some(StoreCounts {
        indexable_nodes,
        edges,
    })
}

/// Total points across the configured collections; `None` when the vector
/// backend is absent or unreachable.
pub async fn vector_point_count(
    vector: Option<&Arc<dyn VectorBackend>>,
    collections: &[String],
) -> Option<usize> {
    let vector = vector?;
    let mut total = 0;
    let mut any = false;
    for collection in collections {
        if let Ok(count) = vector.count(collection).await {
            total += count;
            any = true;
        }
    }
    any.then_some(total)
}

/// Assemble the drift section from the index plus live counts.
pub fn drift_report(
    index: &Arc<RwLock<MemoryIndex>>,
    store: Option<StoreCounts>,
    vector_count: Option<usize>,
) -> (usize, usize, DriftReport) {
    let stats = index.read().unwrap_or_else(|e| e.into_inner()).stats();
    let report = drift::detect(&stats, store, vector_count);
    (stats.node_count, stats.edge_count, report)
}
