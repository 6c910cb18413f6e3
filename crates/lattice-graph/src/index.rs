//! Project-scoped in-memory mirror of the graph.
//!
//! Serves hot-path queries when the store is offline and feeds the drift
//! detector. Read-mostly; writes happen under the per-project build lock.

use lattice_core::model::{EdgeRecord, EdgeType, NodeLabel, NodeRecord};
use lattice_core::{FxHashMap, FxHashSet};
use serde_json::json;

/// Aggregate counters exported with snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_label: FxHashMap<NodeLabel, usize>,
    pub edges_by_type: FxHashMap<EdgeType, usize>,
}

impl IndexStats {
    /// Code entities the drift detector compares against store counts.
    pub fn indexable_nodes(&self) -> usize {
        self.nodes_by_label
            .iter()
            .filter(|(label, _)| label.is_indexable())
            .map(|(_, n)| n)
            .sum()
    }

    /// FUNCTION + CLASS + FILE — the kinds that receive vector points.
    pub fn indexed_symbols(&self) -> usize {
        [NodeLabel::Function, NodeLabel::Class, NodeLabel::File]
            .iter()
            .filter_map(|l| self.nodes_by_label.get(l))
            .sum()
    }
}

/// Typed node/edge index with by-type, by-id, and by-endpoint lookups.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    by_id: FxHashMap<String, NodeRecord>,
    by_type: FxHashMap<NodeLabel, Vec<String>>,
    outgoing: FxHashMap<String, Vec<EdgeRecord>>,
    incoming: FxHashMap<String, Vec<EdgeRecord>>,
    by_rel_type: FxHashMap<EdgeType, usize>,
    edge_keys: FxHashSet<(EdgeType, String, String)>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: re-adding an existing id is a no-op.
    pub fn add_node(&mut self, node: NodeRecord) -> bool {
        if self.by_id.contains_key(&node.id) {
            return false;
        }
        self.by_type
            .entry(node.label)
            .or_default()
            .push(node.id.clone());
        self.by_id.insert(node.id.clone(), node);
        true
    }

    /// Replace an existing node's properties (same id). Inserts when absent.
    pub fn upsert_node(&mut self, node: NodeRecord) {
        if let Some(existing) = self.by_id.get_mut(&node.id) {
            existing.properties = node.properties;
        } else {
            self.add_node(node);
        }
    }

    /// Idempotent on `(rel, from, to)`; duplicates are silently skipped.
    pub fn add_edge(&mut self, edge: EdgeRecord) -> bool {
        let key = (edge.rel, edge.from.clone(), edge.to.clone());
        if !self.edge_keys.insert(key) {
            return false;
        }
        *self.by_rel_type.entry(edge.rel).or_default() += 1;
        self.outgoing
            .entry(edge.from.clone())
            .or_default()
            .push(edge.clone());
        self.incoming.entry(edge.to.clone()).or_default().push(edge);
        true
    }

    pub fn get(&self, id: &str) -> Option<&NodeRecord> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn nodes_of(&self, label: NodeLabel) -> impl Iterator<Item = &NodeRecord> {
        self.by_type
            .get(&label)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
    }

    pub fn outgoing(&self, id: &str) -> &[EdgeRecord] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn incoming(&self, id: &str) -> &[EdgeRecord] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.by_id.values()
    }

    pub fn all_edges(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.outgoing.values().flatten()
    }

    /// Remove one node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<NodeRecord> {
        let node = self.by_id.remove(id)?;
        if let Some(ids) = self.by_type.get_mut(&node.label) {
            ids.retain(|i| i != id);
        }
        for edge in self
            .outgoing
            .remove(id)
            .into_iter()
            .flatten()
            .chain(self.incoming.remove(id).into_iter().flatten())
        {
            let key = (edge.rel, edge.from.clone(), edge.to.clone());
            if self.edge_keys.remove(&key) {
                if let Some(n) = self.by_rel_type.get_mut(&edge.rel) {
                    *n = n.saturating_sub(1);
                }
            }
            // Drop the mirror entry on the other endpoint.
            let other = if edge.from == id { &edge.to } else { &edge.from };
            if let Some(v) = self.outgoing.get_mut(other) {
                v.retain(|e| !(e.rel == edge.rel && e.from == edge.from && e.to == edge.to));
            }
            if let Some(v) = self.incoming.get_mut(other) {
                v.retain(|e| !(e.rel == edge.rel && e.from == edge.from && e.to == edge.to));
            }
        }
        Some(node)
    }

    /// Remove a FILE node's owned children (symbols reached via CONTAINS /
    /// IMPORTS / EXPORTS) and then the file itself. Used by incremental
    /// refresh before re-adding the new subgraph.
    pub fn remove_file_subtree(&mut self, file_id: &str) {
        let children: Vec<String> = self
            .outgoing(file_id)
            .iter()
            .filter(|e| {
                matches!(
                    e.rel,
                    EdgeType::Contains | EdgeType::Imports | EdgeType::Exports
                )
            })
            .map(|e| e.to.clone())
            .collect();
        for child in children {
            self.remove_node(&child);
        }
        self.remove_node(file_id);
    }

    /// Bitemporal tombstoning after a full build: every versioned node of
    /// the project still marked live but written by an earlier tx inherits
    /// `validTo = build timestamp`. Returns the tombstoned ids.
    pub fn mark_stale_for_project(
        &mut self,
        project_id: &str,
        current_tx: &str,
        tombstone_ts: i64,
    ) -> Vec<String> {
        let mut stale = Vec::new();
        for node in self.by_id.values_mut() {
            if !node.label.is_versioned() {
                continue;
            }
            if node.project_id() != Some(project_id) || !node.is_live() {
                continue;
            }
            if node.str_prop("txId") == Some(current_tx) {
                continue;
            }
            node.properties
                .insert("validTo".to_string(), serde_json::json!(tombstone_ts));
            stale.push(node.id.clone());
        }
        stale.sort();
        stale
    }

    /// Merge another index's nodes and edges; duplicates silently skipped.
    pub fn sync_from(&mut self, other: &MemoryIndex) {
        for node in other.by_id.values() {
            self.add_node(node.clone());
        }
        for edges in other.outgoing.values() {
            for edge in edges {
                self.add_edge(edge.clone());
            }
        }
    }

    /// Like `sync_from`, but a node that already exists takes the other
    /// side's properties. Used when absorbing a build's output, where the
    /// incoming records carry the fresh tx provenance.
    pub fn absorb(&mut self, other: &MemoryIndex) {
        for node in other.by_id.values() {
            self.upsert_node(node.clone());
        }
        for edges in other.outgoing.values() {
            for edge in edges {
                self.add_edge(edge.clone());
            }
        }
    }

    pub fn stats(&self) -> IndexStats {
        let mut nodes_by_label: FxHashMap<NodeLabel, usize> = FxHashMap::default();
        for node in self.by_id.values() {
            *nodes_by_label.entry(node.label).or_default() += 1;
        }
        IndexStats {
            node_count: self.by_id.len(),
            edge_count: self.edge_keys.len(),
            nodes_by_label,
            edges_by_type: self.by_rel_type.clone(),
        }
    }

    /// JSON snapshot of the by-type map and statistics. Used by the drift
    /// detector and debug dumps.
    pub fn snapshot(&self) -> serde_json::Value {
        let stats = self.stats();
        let mut by_type = serde_json::Map::new();
        let mut labels: Vec<_> = self.by_type.keys().copied().collect();
        labels.sort_by_key(|l| l.as_str());
        for label in labels {
            let nodes: Vec<_> = self
                .nodes_of(label)
                .map(|n| json!({ "id": n.id, "properties": n.properties }))
                .collect();
            by_type.insert(label.as_str().to_string(), json!(nodes));
        }
        let mut label_counts = serde_json::Map::new();
        let mut sorted: Vec<_> = stats.nodes_by_label.iter().collect();
        sorted.sort_by_key(|(l, _)| l.as_str());
        for (label, count) in sorted {
            label_counts.insert(label.as_str().to_string(), json!(count));
        }
        json!({
            "byType": by_type,
            "stats": {
                "nodeCount": stats.node_count,
                "edgeCount": stats.edge_count,
                "nodesByLabel": label_counts,
            }
        })
    }
}
