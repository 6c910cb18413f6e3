//! Graph store client.
//!
//! Wraps a `GraphConnector` with the connection discipline the engines
//! rely on: connectivity verification, a single localhost fallback when a
//! container-network hostname does not resolve, one retry with a fresh
//! session on transient errors, auto-connect on first use, and batch
//! execution that collects per-statement failures instead of aborting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use lattice_core::config::GraphConfig;
use lattice_core::errors::StoreError;
use lattice_core::statement::{sanitize_params, Statement};
use lattice_core::traits::{GraphBackend, GraphConnector, Row};

/// Result of one executed statement: rows, or an error string. Batch
/// execution returns one of these per input statement, in input order.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub error: Option<String>,
}

impl QueryResult {
    pub fn ok(rows: Vec<Row>) -> Self {
        Self { rows, error: None }
    }

    pub fn err(error: impl std::fmt::Display) -> Self {
        Self {
            rows: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct GraphClient {
    config: GraphConfig,
    connector: Arc<dyn GraphConnector>,
    session: RwLock<Option<Arc<dyn GraphBackend>>>,
    used_fallback: AtomicBool,
}

impl GraphClient {
    pub fn new(config: GraphConfig, connector: Arc<dyn GraphConnector>) -> Self {
        Self {
            config,
            connector,
            session: RwLock::new(None),
            used_fallback: AtomicBool::new(false),
        }
    }

    /// Whether the localhost fallback was taken on connect.
    pub fn used_fallback(&self) -> bool {
        self.used_fallback.load(Ordering::Relaxed)
    }

    pub async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Connect and verify with a trivial query. On a host-unresolvable
    /// error against a non-localhost host, retry once against
    /// `localhost:<port>` — the declared hostname often exists only inside
    /// a container network.
    pub async fn connect(&self) -> Result<(), StoreError> {
        match self.open_and_verify(&self.config.uri()).await {
            Ok(session) => {
                *self.session.write().await = Some(session);
                info!(uri = %self.config.uri(), "graph store connected");
                Ok(())
            }
            Err(StoreError::HostUnresolvable { host }) if !self.config.is_localhost() => {
                warn!(
                    host = %host,
                    "graph host unresolvable, falling back to localhost"
                );
                let session = self.open_and_verify(&self.config.localhost_uri()).await?;
                *self.session.write().await = Some(session);
                self.used_fallback.store(true, Ordering::Relaxed);
                info!(uri = %self.config.localhost_uri(), "graph store connected via fallback");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn open_and_verify(&self, uri: &str) -> Result<Arc<dyn GraphBackend>, StoreError> {
        let session = self.connector.connect(uri).await?;
        session.run("RETURN 1 AS ok", &Map::new()).await?;
        Ok(session)
    }

    /// Drop the current session and connect again (fresh session for the
    /// transient-error retry).
    async fn reconnect(&self) -> Result<Arc<dyn GraphBackend>, StoreError> {
        *self.session.write().await = None;
        self.connect().await?;
        self.session
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotConnected)
    }

    /// Current session, connecting first if a call arrives while
    /// disconnected.
    async fn ensure_session(&self) -> Result<Arc<dyn GraphBackend>, StoreError> {
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }
        self.connect().await?;
        self.session
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotConnected)
    }

    /// Execute one query. Errors come back inside the result envelope, not
    /// as an `Err` — callers on the health/build paths treat store trouble
    /// as data.
    pub async fn execute_query(&self, query: &str, params: &Map<String, Value>) -> QueryResult {
        match self.try_execute(query, params).await {
            Ok(rows) => QueryResult::ok(rows),
            Err(e) => {
                debug!(error = %e, "query failed");
                QueryResult::err(e)
            }
        }
    }

    /// Typed variant for callers that need to distinguish store errors.
    pub async fn try_execute(
        &self,
        query: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Row>, StoreError> {
        let params = sanitize_params(params);
        let session = self.ensure_session().await?;
        match session.run(query, &params).await {
            Ok(rows) => Ok(rows),
            Err(e) if e.is_transient() => {
                debug!(error = %e, "transient store error, retrying once with fresh session");
                let session = self.reconnect().await?;
                session.run(query, &params).await
            }
            Err(e) => Err(e),
        }
    }

    /// Execute statements sequentially. Per-statement failures are
    /// collected and reported; later statements still run. One result per
    /// statement, in input order.
    pub async fn execute_batch(&self, statements: &[Statement]) -> Vec<QueryResult> {
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(self.execute_query(&statement.query, &statement.params).await);
        }
        let failures = results.iter().filter(|r| !r.is_ok()).count();
        if failures > 0 {
            warn!(
                failures,
                total = statements.len(),
                "batch completed with statement failures"
            );
        }
        results
    }
}
