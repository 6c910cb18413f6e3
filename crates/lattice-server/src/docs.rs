//! Docs engine: markdown workspace discovery feeding the docs builder,
//! plus doc search served natively or from the index.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Map};
use tracing::{debug, info};

use lattice_core::model::{EdgeType, NodeLabel};
use lattice_graph::builder::BuildContext;
use lattice_graph::{DocLinkTargets, DocsBuilder, MemoryIndex};
use lattice_parse::markdown::doc_kind;
use lattice_parse::{content_hash, DocKind, HashCache, ParserAdapter};
use lattice_store::bm25::DOCS_SEARCH_QUERY;
use lattice_store::GraphClient;

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DocsReport {
    pub indexed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocSearchHit {
    pub id: String,
    pub heading: String,
    pub relative_path: String,
    pub snippet: String,
    pub score: f64,
}

pub struct DocsEngine {
    client: Option<Arc<GraphClient>>,
    index: Arc<RwLock<MemoryIndex>>,
    adapter: ParserAdapter,
}

impl DocsEngine {
    pub fn new(client: Option<Arc<GraphClient>>, index: Arc<RwLock<MemoryIndex>>) -> Self {
        Self {
            client,
            index,
            adapter: ParserAdapter::new(),
        }
    }

    /// Walk the workspace for whitelisted markdown, parse, build, execute,
    /// and mirror into the index. `incremental` skips unchanged hashes.
    pub async fn index_docs(
        &self,
        workspace_root: &Path,
        project_id: &str,
        tx_id: &str,
        tx_timestamp: i64,
        incremental: bool,
    ) -> DocsReport {
        let started = Instant::now();
        let mut report = DocsReport::default();

        let mut cache = HashCache::load(workspace_root);
        let context = BuildContext::new(project_id, tx_id, tx_timestamp);
        let targets = {
            let index = self.index.read().unwrap_or_else(|e| e.into_inner());
            DocLinkTargets::from_index(&index)
        };

        for path in discover_docs(workspace_root) {
            let relative = match path.strip_prefix(workspace_root) {
                Ok(r) => r.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    report.errors.push(format!("read failed for {relative}: {e}"));
                    continue;
                }
            };
            let hash = content_hash(&bytes);
            if incremental && !cache.has_changed(&relative, &hash) {
                report.skipped += 1;
                continue;
            }

            let doc = self.adapter.parse_doc(&path, &relative, &bytes);
            let output = DocsBuilder::new(&context, &targets).build(&doc);

            if let Some(client) = &self.client {
                let results = client.execute_batch(&output.statements()).await;
                for result in results {
                    if let Some(error) = result.error {
                        report.errors.push(format!("{relative}: {error}"));
                    }
                }
            }

            {
                let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
                let mut internal = MemoryIndex::new();
                for node in &output.nodes {
                    internal.add_node(node.clone());
                }
                for edge in &output.edges {
                    internal.add_edge(edge.clone());
                }
                index.absorb(&internal);
            }

            cache.set(&relative, hash, doc.sections.len(), tx_timestamp);
            report.indexed += 1;
            debug!(doc = %relative, sections = doc.sections.len(), "doc indexed");
        }

        if let Err(e) = cache.save(tx_timestamp) {
            report.errors.push(format!("doc cache save failed: {e}"));
        }
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            errors = report.errors.len(),
            "docs pass complete"
        );
        report
    }

    /// Full-text search over sections: native `docs_index` when the store
    /// serves it, token-overlap scan otherwise.
    pub async fn search_docs(
        &self,
        query: &str,
        project_id: &str,
        limit: usize,
    ) -> Vec<DocSearchHit> {
        if let Some(client) = &self.client {
            let mut params = Map::new();
            params.insert("q".into(), json!(query));
            params.insert("projectId".into(), json!(project_id));
            params.insert("limit".into(), json!(limit as i64));
            let result = client.execute_query(DOCS_SEARCH_QUERY, &params).await;
            if result.is_ok() && !result.rows.is_empty() {
                return result
                    .rows
                    .iter()
                    .filter_map(|row| {
                        Some(DocSearchHit {
                            id: row.get("id")?.as_str()?.to_string(),
                            heading: row
                                .get("heading")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            relative_path: row
                                .get("relativePath")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            snippet: snippet(
                                row.get("content").and_then(|v| v.as_str()).unwrap_or(""),
                            ),
                            score: row.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0),
                        })
                    })
                    .collect();
            }
        }
        self.scan_sections(query, project_id, limit)
    }

    /// Sections describing a symbol, resolved through `DOC_DESCRIBES`.
    pub fn docs_by_symbol(&self, symbol: &str, project_id: &str, limit: usize) -> Vec<DocSearchHit> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let mut hits = Vec::new();
        for section in index.nodes_of(NodeLabel::Section) {
            if section.project_id() != Some(project_id) {
                continue;
            }
            let describes = index.outgoing(&section.id).iter().any(|edge| {
                edge.rel == EdgeType::DocDescribes
                    && edge
                        .properties
                        .get("matchedName")
                        .and_then(|v| v.as_str())
                        .is_some_and(|name| name == symbol || name.ends_with(&format!("/{symbol}")))
            });
            if describes {
                hits.push(DocSearchHit {
                    id: section.id.clone(),
                    heading: section.str_prop("heading").unwrap_or_default().to_string(),
                    relative_path: section
                        .str_prop("relativePath")
                        .unwrap_or_default()
                        .to_string(),
                    snippet: snippet(section.str_prop("content").unwrap_or_default()),
                    score: 1.0,
                });
                if hits.len() >= limit {
                    break;
                }
            }
        }
        hits
    }

    fn scan_sections(&self, query: &str, project_id: &str, limit: usize) -> Vec<DocSearchHit> {
        let tokens: Vec<String> = query
            .to_ascii_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        if tokens.is_empty() {
            return Vec::new();
        }
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(usize, DocSearchHit)> = Vec::new();
        for section in index.nodes_of(NodeLabel::Section) {
            if section.project_id() != Some(project_id) {
                continue;
            }
            let haystack = format!(
                "{} {}",
                section.str_prop("heading").unwrap_or_default(),
                section.str_prop("content").unwrap_or_default()
            )
            .to_ascii_lowercase();
            let overlap = tokens.iter().filter(|t| haystack.contains(*t)).count();
            if overlap == 0 {
                continue;
            }
            scored.push((
                overlap,
                DocSearchHit {
                    id: section.id.clone(),
                    heading: section.str_prop("heading").unwrap_or_default().to_string(),
                    relative_path: section
                        .str_prop("relativePath")
                        .unwrap_or_default()
                        .to_string(),
                    snippet: snippet(section.str_prop("content").unwrap_or_default()),
                    score: overlap as f64 / tokens.len() as f64,
                },
            ));
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.into_iter().take(limit).map(|(_, hit)| hit).collect()
    }
}

fn snippet(content: &str) -> String {
    const SNIPPET_LEN: usize = 240;
    if content.chars().count() <= SNIPPET_LEN {
        content.to_string()
    } else {
        content.chars().take(SNIPPET_LEN).collect()
    }
}

/// Markdown whitelist walk: README / CHANGELOG / ARCHITECTURE anywhere,
/// ADR and decision folders, guides, and everything under `docs/`.
fn discover_docs(workspace_root: &Path) -> Vec<PathBuf> {
    let mut builder = ignore::WalkBuilder::new(workspace_root);
    builder.hidden(true).git_ignore(true);
    let mut overrides = ignore::overrides::OverrideBuilder::new(workspace_root);
    for pattern in super::orchestrator::DISCOVERY_IGNORES {
        let _ = overrides.add(&format!("!{pattern}/**"));
    }
    if let Ok(built) = overrides.build() {
        builder.overrides(built);
    }

    let mut docs = Vec::new();
    for entry in builder.build().flatten() {
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let relative = match path.strip_prefix(workspace_root) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if doc_kind(&relative) != DocKind::Other {
            docs.push(path.to_path_buf());
        }
    }
    docs.sort();
    docs
}
