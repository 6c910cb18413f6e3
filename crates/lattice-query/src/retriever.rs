//! Hybrid retriever: vector + BM25 + graph expansion, fused with RRF.
//!
//! Degradation is part of the contract: a missing or failing vector
//! backend falls through to the lexical scan (still labeled `vector`), a
//! failing native text-search falls back to the in-memory token-overlap
//! scan with `bm25_mode = lexical_fallback`.

use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::debug;

use lattice_core::model::NodeLabel;
use lattice_core::traits::{EmbeddingBackend, VectorBackend};
use lattice_core::FxHashMap;
use lattice_graph::MemoryIndex;
use lattice_store::bm25::{Bm25Provisioner, SYMBOL_SEARCH_QUERY};
use lattice_store::GraphClient;

use crate::rrf;

/// Hard cap on `limit`.
pub const MAX_LIMIT: usize = 100;

/// Edge weights used by graph expansion (and, by default, PPR).
pub fn edge_weight(rel: &str) -> f64 {
    match rel {
        "CALLS" => 0.9,
        "IMPORTS" => 0.7,
        "CONTAINS" => 0.5,
        "TESTS" => 0.4,
        "INVOLVES" => 0.3,
        "APPLIES_TO" => 0.4,
        "DEFINED_IN" => 0.6,
        _ => 0.2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Vector,
    Bm25,
    Graph,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bm25Mode {
    Native,
    LexicalFallback,
}

#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub query: String,
    pub project_id: String,
    pub limit: usize,
    pub types: Option<Vec<NodeLabel>>,
    pub mode: RetrievalMode,
    pub rrf_k: f64,
}

impl RetrieveRequest {
    pub fn hybrid(query: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            project_id: project_id.into(),
            limit: 20,
            types: None,
            mode: RetrievalMode::Hybrid,
            rrf_k: rrf::DEFAULT_RRF_K,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub id: String,
    pub score: f64,
    pub label: Option<NodeLabel>,
    pub name: Option<String>,
    pub file_path: Option<String>,
    /// Which list(s) surfaced this id: `vector`, `bm25`, `graph`.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveResponse {
    pub results: Vec<RetrievalResult>,
    pub bm25_mode: Bm25Mode,
}

pub struct HybridRetriever {
    client: Option<Arc<GraphClient>>,
    vector: Option<Arc<dyn VectorBackend>>,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    index: Arc<RwLock<MemoryIndex>>,
    collections: Vec<String>,
    /// Last observed mode — reporting state, not a capability flag.
    bm25_mode: Mutex<Bm25Mode>,
    #[allow(dead_code)]
    provisioner: Arc<Bm25Provisioner>,
}

impl HybridRetriever {
    pub fn new(
        client: Option<Arc<GraphClient>>,
        vector: Option<Arc<dyn VectorBackend>>,
        embedder: Option<Arc<dyn EmbeddingBackend>>,
        index: Arc<RwLock<MemoryIndex>>,
        collections: Vec<String>,
        provisioner: Arc<Bm25Provisioner>,
    ) -> Self {
        Self {
            client,
            vector,
            embedder,
            index,
            collections,
            bm25_mode: Mutex::new(Bm25Mode::LexicalFallback),
            provisioner,
        }
    }

    pub fn bm25_mode(&self) -> Bm25Mode {
        *self.bm25_mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn retrieve(&self, request: &RetrieveRequest) -> RetrieveResponse {
        let limit = request.limit.clamp(1, MAX_LIMIT);

        let (lists, sources): (Vec<Vec<String>>, Vec<&str>) = match request.mode {
            RetrievalMode::Vector => {
                let v = self.vector_list(request, limit).await;
                (vec![v], vec!["vector"])
            }
            RetrievalMode::Bm25 => {
                let b = self.bm25_list(request, limit).await;
                (vec![b], vec!["bm25"])
            }
            RetrievalMode::Graph => {
                let seeds = self.bm25_list(request, limit).await;
                let g = self.graph_expansion(&seeds, limit);
                (vec![g], vec!["graph"])
            }
            RetrievalMode::Hybrid => {
                let v = self.vector_list(request, limit).await;
                let b = self.bm25_list(request, limit).await;
                let seeds: Vec<String> = v
                    .iter()
                    .chain(b.iter())
                    .cloned()
                    .take(limit)
                    .collect();
                let g = self.graph_expansion(&seeds, limit);
                (vec![v, b, g], vec!["vector", "bm25", "graph"])
            }
        };

        // Fuse, then post-filter by project and requested types, then trim.
        let fused = rrf::fuse(&lists, request.rrf_k);
        let project_prefix = format!("{}:", request.project_id);

        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let mut results = Vec::with_capacity(limit);
        for (id, score) in fused {
            if !id.starts_with(&project_prefix) {
                continue;
            }
            let node = index.get(&id);
            let label = node.map(|n| n.label).or_else(|| label_hint(&id));
            if let Some(wanted) = &request.types {
                match label {
                    Some(label) if wanted.contains(&label) => {}
                    _ => continue,
                }
            }
            let in_lists: Vec<String> = lists
                .iter()
                .zip(&sources)
                .filter(|(list, _)| list.contains(&id))
                .map(|(_, s)| s.to_string())
                .collect();
            results.push(RetrievalResult {
                score,
                label,
                name: node.and_then(|n| n.str_prop("name").map(String::from)),
                file_path: node.and_then(|n| {
                    n.str_prop("filePath")
                        .or_else(|| n.str_prop("relativePath"))
                        .map(String::from)
                }),
                sources: in_lists,
                id,
            });
            if results.len() >= limit {
                break;
            }
        }

        RetrieveResponse {
            results,
            bm25_mode: self.bm25_mode(),
        }
    }

    /// Vector list; on absent/failed backend, the lexical scan fills in —
    /// the list is still the "vector" list for fusion purposes.
    async fn vector_list(&self, request: &RetrieveRequest, limit: usize) -> Vec<String> {
        if let (Some(vector), Some(embedder)) = (&self.vector, &self.embedder) {
            match embedder.embed(&request.query).await {
                Ok(embedding) => {
                    let mut hits: Vec<(String, f32)> = Vec::new();
                    let mut any_ok = false;
                    for collection in &self.collections {
                        match vector.search(collection, &embedding, limit).await {
                            Ok(points) => {
                                any_ok = true;
                                hits.extend(points.into_iter().map(|p| (p.id, p.score)));
                            }
                            Err(e) => {
                                debug!(collection = %collection, error = %e, "vector search failed")
                            }
                        }
                    }
                    if any_ok {
                        hits.sort_by(|a, b| {
                            b.1.partial_cmp(&a.1)
                                .unwrap_or(std::cmp::Ordering::Equal)
                                .then_with(|| a.0.cmp(&b.0))
                        });
                        hits.truncate(limit);
                        return hits.into_iter().map(|(id, _)| id).collect();
                    }
                }
                Err(e) => debug!(error = %e, "embedding failed, lexical fill-in for vector list"),
            }
        }
        self.lexical_scan(&request.query, &request.project_id, limit)
    }

    /// BM25 list: native text-search first, lexical fallback second. The
    /// reported mode flips to native only when a native query actually
    /// succeeds.
    async fn bm25_list(&self, request: &RetrieveRequest, limit: usize) -> Vec<String> {
        if let Some(client) = &self.client {
            let params =
                Bm25Provisioner::symbol_search_params(&request.query, &request.project_id, limit);
            let result = client.execute_query(SYMBOL_SEARCH_QUERY, &params).await;
            if result.is_ok() {
                let ids: Vec<String> = result
                    .rows
                    .iter()
                    .filter_map(|row| row.get("id").and_then(|v| v.as_str()))
                    .map(String::from)
                    .collect();
                *self.bm25_mode.lock().unwrap_or_else(|e| e.into_inner()) = Bm25Mode::Native;
                return ids;
            }
            debug!(error = ?result.error, "native bm25 failed, lexical fallback");
        }
        *self.bm25_mode.lock().unwrap_or_else(|e| e.into_inner()) = Bm25Mode::LexicalFallback;
        self.lexical_scan(&request.query, &request.project_id, limit)
    }

    /// In-memory token-overlap scan over FUNCTION, CLASS, and FILE nodes.
    fn lexical_scan(&self, query: &str, project_id: &str, limit: usize) -> Vec<String> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(String, usize)> = Vec::new();
        for label in [NodeLabel::Function, NodeLabel::Class, NodeLabel::File] {
            for node in index.nodes_of(label) {
                if node.project_id() != Some(project_id) || !node.is_live() {
                    continue;
                }
                let mut haystack = String::new();
                for key in ["name", "relativePath", "filePath", "summary"] {
                    if let Some(v) = node.str_prop(key) {
                        haystack.push_str(v);
                        haystack.push(' ');
                    }
                }
                let haystack = haystack.to_ascii_lowercase();
                let overlap = tokens.iter().filter(|t| haystack.contains(*t)).count();
                if overlap > 0 {
                    scored.push((node.id.clone(), overlap));
                }
            }
        }
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(limit);
        scored.into_iter().map(|(id, _)| id).collect()
    }

    /// Weighted-degree expansion from seed ids over the in-memory
    /// adjacency, both directions.
    fn graph_expansion(&self, seed_ids: &[String], limit: usize) -> Vec<String> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let mut scores: FxHashMap<String, f64> = FxHashMap::default();
        for seed in seed_ids {
            for edge in index.outgoing(seed) {
                *scores.entry(edge.to.clone()).or_default() += edge_weight(edge.rel.as_str());
            }
            for edge in index.incoming(seed) {
                *scores.entry(edge.from.clone()).or_default() += edge_weight(edge.rel.as_str());
            }
        }
        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(limit);
        ranked.into_iter().map(|(id, _)| id).collect()
    }
}

fn tokenize(query: &str) -> Vec<String> {
    query
        .to_ascii_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Best-effort label from the id's kind segment when the node is not in
/// the index (e.g. store-only hits).
fn label_hint(id: &str) -> Option<NodeLabel> {
    let kind = id.split(':').nth(1)?;
    Some(match kind {
        "file" => NodeLabel::File,
        "folder" => NodeLabel::Folder,
        "function" => NodeLabel::Function,
        "class" | "classref" => NodeLabel::Class,
        "variable" => NodeLabel::Variable,
        "import" => NodeLabel::Import,
        "export" => NodeLabel::Export,
        "suite" => NodeLabel::TestSuite,
        "doc" => NodeLabel::Document,
        "sec" => NodeLabel::Section,
        "feature" => NodeLabel::Feature,
        _ => return None,
    })
}
