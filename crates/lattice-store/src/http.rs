//! HTTP collaborators: vector store (qdrant-style REST), embedding
//! backend, and the optional summarizer. All errors map into the store
//! taxonomy so callers apply one retry/fallback policy.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use lattice_core::errors::StoreError;
use lattice_core::traits::{EmbeddingBackend, ScoredPoint, SummarizerBackend, VectorBackend};

fn transport_err(e: reqwest::Error) -> StoreError {
    StoreError::ServiceUnavailable {
        message: e.to_string(),
    }
}

// ─── Vector store ───────────────────────────────────────────────────────

pub struct HttpVectorStore {
    base_url: String,
    http: reqwest::Client,
}

impl HttpVectorStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct SearchEnvelope {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: serde_json::Value,
    score: f32,
}

#[derive(Deserialize)]
struct CountEnvelope {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

#[async_trait]
impl VectorBackend for HttpVectorStore {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let url = format!("{}/collections/{collection}/points/search", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "vector": vector, "limit": limit, "with_payload": false }))
            .send()
            .await
            .map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(StoreError::Backend {
                message: format!("vector search {collection}: http {}", response.status()),
            });
        }
        let envelope: SearchEnvelope = response.json().await.map_err(transport_err)?;
        debug!(collection, hits = envelope.result.len(), "vector search");
        Ok(envelope
            .result
            .into_iter()
            .map(|hit| ScoredPoint {
                id: match hit.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
                score: hit.score,
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let url = format!("{}/collections/{collection}/points/count", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "exact": true }))
            .send()
            .await
            .map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(StoreError::Backend {
                message: format!("vector count {collection}: http {}", response.status()),
            });
        }
        let envelope: CountEnvelope = response.json().await.map_err(transport_err)?;
        Ok(envelope.result.count)
    }
}

// ─── Embedding backend ──────────────────────────────────────────────────

pub struct HttpEmbedder {
    url: String,
    http: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingEnvelope {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "input": text }))
            .send()
            .await
            .map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(StoreError::Backend {
                message: format!("embedding backend: http {}", response.status()),
            });
        }
        let envelope: EmbeddingEnvelope = response.json().await.map_err(transport_err)?;
        Ok(envelope.embedding)
    }
}

// ─── Summarizer ─────────────────────────────────────────────────────────

pub struct HttpSummarizer {
    url: String,
    http: reqwest::Client,
}

impl HttpSummarizer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct SummaryEnvelope {
    summary: String,
}

#[async_trait]
impl SummarizerBackend for HttpSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, StoreError> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(StoreError::Backend {
                message: format!("summarizer: http {}", response.status()),
            });
        }
        let envelope: SummaryEnvelope = response.json().await.map_err(transport_err)?;
        Ok(envelope.summary)
    }
}
