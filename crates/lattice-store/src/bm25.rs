//! BM25 (full-text) index provisioning on the graph engine.
//!
//! Two named indices: `symbol_index` over FUNCTION|CLASS|FILE|SECTION and
//! `docs_index` over SECTION. Creation is idempotent; failures degrade the
//! retriever to its lexical fallback but never fail a build. Knowing the
//! index exists is not the same as having served a query from it — the
//! retriever's `bm25_mode` flips to native only after a real query
//! succeeds.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{json, Map};
use tracing::{info, warn};

use crate::client::GraphClient;

pub const SYMBOL_INDEX: &str = "symbol_index";
pub const DOCS_INDEX: &str = "docs_index";

const CREATE_SYMBOL_INDEX: &str = "CREATE FULLTEXT INDEX symbol_index IF NOT EXISTS FOR (n:FUNCTION|CLASS|FILE|SECTION) ON EACH [n.name, n.summary, n.path, n.heading, n.content]";
const CREATE_DOCS_INDEX: &str = "CREATE FULLTEXT INDEX docs_index IF NOT EXISTS FOR (n:SECTION) ON EACH [n.heading, n.content]";
const SHOW_FULLTEXT_INDEXES: &str = "SHOW FULLTEXT INDEXES YIELD name RETURN name";

/// Query template used by the retriever's native BM25 path.
pub const SYMBOL_SEARCH_QUERY: &str = "CALL db.index.fulltext.queryNodes('symbol_index', $q) YIELD node, score WHERE node.projectId = $projectId AND (node:FUNCTION OR node:CLASS OR node:FILE OR node:SECTION) RETURN node.id AS id, score ORDER BY score DESC LIMIT $limit";

/// Query template used by the docs engine's native search path.
pub const DOCS_SEARCH_QUERY: &str = "CALL db.index.fulltext.queryNodes('docs_index', $q) YIELD node, score WHERE node.projectId = $projectId RETURN node.id AS id, node.heading AS heading, node.content AS content, node.relativePath AS relativePath, score ORDER BY score DESC LIMIT $limit";

#[derive(Debug, Clone, Default)]
pub struct Bm25Status {
    pub created: Vec<String>,
    pub already_exists: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct Bm25Provisioner {
    known_to_exist: AtomicBool,
}

impl Bm25Provisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a previous `ensure` confirmed both indices.
    pub fn index_known_to_exist(&self) -> bool {
        self.known_to_exist.load(Ordering::Relaxed)
    }

    /// Ensure both named indices exist, creating any that are missing.
    pub async fn ensure(&self, client: &GraphClient) -> Bm25Status {
        let mut status = Bm25Status::default();

        let existing = client
            .execute_query(SHOW_FULLTEXT_INDEXES, &Map::new())
            .await;
        let existing_names: Vec<String> = if existing.is_ok() {
            existing
                .rows
                .iter()
                .filter_map(|row| row.get("name").and_then(|v| v.as_str()))
                .map(String::from)
                .collect()
        } else {
            // SHOW unsupported on this engine; fall through to blind
            // CREATE IF NOT EXISTS, which is idempotent anyway.
            Vec::new()
        };

        for (name, create) in [
            (SYMBOL_INDEX, CREATE_SYMBOL_INDEX),
            (DOCS_INDEX, CREATE_DOCS_INDEX),
        ] {
            if existing_names.iter().any(|n| n == name) {
                status.already_exists.push(name.to_string());
                continue;
            }
            let result = client.execute_query(create, &Map::new()).await;
            match result.error {
                None => {
                    info!(index = name, "full-text index created");
                    status.created.push(name.to_string());
                }
                Some(e) if e.to_ascii_lowercase().contains("already exists") => {
                    status.already_exists.push(name.to_string());
                }
                Some(e) => {
                    warn!(index = name, error = %e, "full-text index creation failed");
                    status.error = Some(e);
                }
            }
        }

        // Known-to-exist only flips on full success.
        if status.error.is_none() {
            self.known_to_exist.store(true, Ordering::Relaxed);
        }
        status
    }

    /// Params for a symbol search against the native index.
    pub fn symbol_search_params(query: &str, project_id: &str, limit: usize) -> Map<String, serde_json::Value> {
        let mut params = Map::new();
        params.insert("q".into(), json!(query));
        params.insert("projectId".into(), json!(project_id));
        params.insert("limit".into(), json!(limit as i64));
        params
    }
}
