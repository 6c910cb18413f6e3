//! Import-cycle detection: full SCC over resolved import edges.
//!
//! The file-level graph is derived from `FILE-IMPORTS→IMPORT` and
//! `IMPORT-REFERENCES→FILE` chains in the in-memory index. When the index
//! holds no FILE nodes at all, callers fall back to the two-hop store
//! query below — which only catches mutual (length-2) cycles.

use petgraph::graph::{DiGraph, NodeIndex};

use lattice_core::model::{EdgeType, NodeLabel};
use lattice_core::FxHashMap;

use crate::index::MemoryIndex;

/// One detected cycle, members in canonical order.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ImportCycle {
    /// Relative paths, sorted lexicographically — the canonical form is
    /// independent of traversal start.
    pub members: Vec<String>,
    pub length: usize,
}

/// Cypher fallback used when the in-memory file set is empty.
pub const TWO_HOP_CYCLE_QUERY: &str = "MATCH (a:FILE {projectId: $projectId})-[:IMPORTS]->(:IMPORT)-[:REFERENCES]->(b:FILE)-[:IMPORTS]->(:IMPORT)-[:REFERENCES]->(a) WHERE a.id < b.id RETURN a.relativePath AS a, b.relativePath AS b";

/// Find all import cycles among FILE nodes of `project_id`.
pub fn find_import_cycles(index: &MemoryIndex, project_id: &str) -> Vec<ImportCycle> {
    // file id → graph node, lazily created.
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes: FxHashMap<String, NodeIndex> = FxHashMap::default();

    let mut node_for = |graph: &mut DiGraph<String, ()>, id: &str, rel: String| {
        *nodes
            .entry(id.to_string())
            .or_insert_with(|| graph.add_node(rel))
    };

    for file in index.nodes_of(NodeLabel::File) {
        if file.project_id() != Some(project_id) || !file.is_live() {
            continue;
        }
        let from_rel = file
            .str_prop("relativePath")
            .unwrap_or(file.id.as_str())
            .to_string();
        let from = node_for(&mut graph, &file.id, from_rel);

        for import_edge in index.outgoing(&file.id) {
            if import_edge.rel != EdgeType::Imports {
                continue;
            }
            for reference in index.outgoing(&import_edge.to) {
                if reference.rel != EdgeType::References {
                    continue;
                }
                let Some(target) = index.get(&reference.to) else {
                    continue;
                };
                let target_rel = target
                    .str_prop("relativePath")
                    .unwrap_or(target.id.as_str())
                    .to_string();
                let to = node_for(&mut graph, &target.id, target_rel);
                graph.add_edge(from, to, ());
            }
        }
    }

    let mut cycles: Vec<ImportCycle> = petgraph::algo::tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| {
            let mut members: Vec<String> = scc.iter().map(|&i| graph[i].clone()).collect();
            members.sort();
            ImportCycle {
                length: members.len(),
                members,
            }
        })
        .collect();

    cycles.sort_by(|a, b| a.members.cmp(&b.members));
    cycles
}
