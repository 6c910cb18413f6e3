//! Drift detection between the in-memory index, the graph store, and the
//! vector store. Pure count comparison; recommendations are strings on the
//! health response and never trigger work on their own.

use serde::Serialize;

use crate::index::IndexStats;

/// Node/edge counts read live from the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCounts {
    pub indexable_nodes: i64,
    pub edges: i64,
}

/// Allowed absolute difference before node counts count as drift.
pub const NODE_DRIFT_TOLERANCE: i64 = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub cached_nodes: usize,
    pub store_indexable_nodes: Option<i64>,
    pub drift_detected: bool,
    pub indexed_symbols: usize,
    pub vector_count: Option<usize>,
    pub vector_drift: bool,
    pub recommendations: Vec<String>,
}

/// Compare index statistics against live store and vector counts. `None`
/// inputs mean the corresponding backend was unreachable; that is reported
/// but not itself treated as drift.
pub fn detect(
    stats: &IndexStats,
    store: Option<StoreCounts>,
    vector_count: Option<usize>,
) -> DriftReport {
    let cached_nodes = stats.indexable_nodes();
    let indexed_symbols = stats.indexed_symbols();

    let mut recommendations = Vec::new();

    let (store_indexable_nodes, drift_detected) = match store {
        Some(counts) => {
            let drift =
                (cached_nodes as i64 - counts.indexable_nodes).abs() > NODE_DRIFT_TOLERANCE;
            if drift {
                recommendations.push(format!(
                    "index/store node counts diverge ({cached} vs {store}); run a full rebuild",
                    cached = cached_nodes,
                    store = counts.indexable_nodes,
                ));
            }
            (Some(counts.indexable_nodes), drift)
        }
        None => {
            recommendations
                .push("graph store unreachable; counts compared against cache only".to_string());
            (None, false)
        }
    };

    let vector_drift = match vector_count {
        Some(points) if points < indexed_symbols => {
            recommendations.push(format!(
                "vector store holds {points} points for {indexed_symbols} indexed symbols; re-embed",
            ));
            true
        }
        _ => false,
    };

    if cached_nodes == 0 {
        recommendations.push("in-memory index is empty; run graph_rebuild".to_string());
    }

    DriftReport {
        cached_nodes,
        store_indexable_nodes,
        drift_detected,
        indexed_symbols,
        vector_count,
        vector_drift,
        recommendations,
    }
}
