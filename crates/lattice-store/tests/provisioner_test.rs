//! BM25 provisioning against scripted store behavior: fresh creation,
//! idempotent re-runs, and degraded engines.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use lattice_core::config::GraphConfig;
use lattice_core::errors::StoreError;
use lattice_core::traits::{GraphBackend, GraphConnector, Row};
use lattice_store::{Bm25Provisioner, GraphClient};

/// Store stub that understands SHOW / CREATE for full-text indices.
struct IndexAwareBackend {
    existing: Mutex<Vec<String>>,
    /// When set, CREATE statements fail with this message.
    create_error: Option<String>,
}

#[async_trait]
impl GraphBackend for IndexAwareBackend {
    async fn run(&self, query: &str, _params: &Map<String, Value>) -> Result<Vec<Row>, StoreError> {
        if query.starts_with("SHOW FULLTEXT") {
            let existing = self.existing.lock().unwrap();
            return Ok(existing
                .iter()
                .map(|name| {
                    let mut row = Map::new();
                    row.insert("name".to_string(), json!(name));
                    row
                })
                .collect());
        }
        if query.starts_with("CREATE FULLTEXT") {
            if let Some(message) = &self.create_error {
                return Err(StoreError::Backend {
                    message: message.clone(),
                });
            }
            let name = if query.contains("symbol_index") {
                "symbol_index"
            } else {
                "docs_index"
            };
            self.existing.lock().unwrap().push(name.to_string());
        }
        Ok(Vec::new())
    }
}

struct FixedConnector {
    backend: Arc<IndexAwareBackend>,
}

#[async_trait]
impl GraphConnector for FixedConnector {
    async fn connect(&self, _uri: &str) -> Result<Arc<dyn GraphBackend>, StoreError> {
        Ok(Arc::clone(&self.backend) as Arc<dyn GraphBackend>)
    }
}

fn client_with(backend: Arc<IndexAwareBackend>) -> GraphClient {
    GraphClient::new(GraphConfig::default(), Arc::new(FixedConnector { backend }))
}

#[tokio::test]
async fn fresh_store_creates_both_indices() {
    let backend = Arc::new(IndexAwareBackend {
        existing: Mutex::new(Vec::new()),
        create_error: None,
    });
    let client = client_with(Arc::clone(&backend));
    client.connect().await.unwrap();

    let provisioner = Bm25Provisioner::new();
    assert!(!provisioner.index_known_to_exist());

    let status = provisioner.ensure(&client).await;
    assert_eq!(status.created, vec!["symbol_index", "docs_index"]);
    assert!(status.already_exists.is_empty());
    assert!(status.error.is_none());
    assert!(provisioner.index_known_to_exist());
}

#[tokio::test]
async fn reensure_is_idempotent() {
    let backend = Arc::new(IndexAwareBackend {
        existing: Mutex::new(Vec::new()),
        create_error: None,
    });
    let client = client_with(Arc::clone(&backend));
    client.connect().await.unwrap();

    let provisioner = Bm25Provisioner::new();
    provisioner.ensure(&client).await;
    let second = provisioner.ensure(&client).await;
    assert!(second.created.is_empty());
    assert_eq!(second.already_exists.len(), 2);
    assert!(second.error.is_none());
}

#[tokio::test]
async fn partial_store_creates_only_the_missing_index() {
    let backend = Arc::new(IndexAwareBackend {
        existing: Mutex::new(vec!["symbol_index".to_string()]),
        create_error: None,
    });
    let client = client_with(Arc::clone(&backend));
    client.connect().await.unwrap();

    let status = Bm25Provisioner::new().ensure(&client).await;
    assert_eq!(status.already_exists, vec!["symbol_index"]);
    assert_eq!(status.created, vec!["docs_index"]);
}

#[tokio::test]
async fn creation_failure_degrades_without_flipping_known_flag() {
    let backend = Arc::new(IndexAwareBackend {
        existing: Mutex::new(Vec::new()),
        create_error: Some("fulltext unsupported on this engine".to_string()),
    });
    let client = client_with(Arc::clone(&backend));
    client.connect().await.unwrap();

    let provisioner = Bm25Provisioner::new();
    let status = provisioner.ensure(&client).await;
    assert!(status.error.is_some());
    assert!(
        !provisioner.index_known_to_exist(),
        "known-to-exist only flips on full success"
    );
}
