//! Trait seams for the external collaborators.
//!
//! The graph engine, vector store, embedding backend, summarizer, and git
//! are all interface-only here: production wiring lives in `lattice-store`,
//! tests construct a `Server` with stubs.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::StoreError;

/// One result row from the graph engine: column name → value.
pub type Row = Map<String, Value>;

/// An open session against the graph engine.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Run one parametrized query and return its rows.
    async fn run(&self, query: &str, params: &Map<String, Value>) -> Result<Vec<Row>, StoreError>;
}

/// Creates sessions. The client calls this once per connect (and once more
/// for the single localhost fallback / transient retry).
#[async_trait]
pub trait GraphConnector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn GraphBackend>, StoreError>;
}

/// A scored point returned from vector search; the id is the graph node id.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
}

/// Vector-store seam. Collections are per entity kind.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    async fn count(&self, collection: &str) -> Result<usize, StoreError>;
}

/// Embedding-model seam.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
}

/// Optional summarizer; absent backend ⇒ empty summaries.
#[async_trait]
pub trait SummarizerBackend: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, StoreError>;
}

/// Git lookup used by the temporal anchor resolver. External because the
/// engine never shells out on the query path directly.
pub trait GitLookup: Send + Sync {
    /// Commit timestamp in epoch millis, if `rev` resolves.
    fn commit_timestamp(&self, rev: &str) -> Option<i64>;
}
