//! Stdio entrypoint: one JSON tool invocation per line in, one response
//! envelope per line out. All real behavior lives in the library; this
//! binary only wires config to backends and pumps the loop.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use lattice_core::config::LatticeConfig;
use lattice_core::telemetry::init_tracing;
use lattice_core::traits::{EmbeddingBackend, SummarizerBackend, VectorBackend};
use lattice_server::{Server, ServerBackends, ToolRequest, ToolResponse};
use lattice_store::http::{HttpEmbedder, HttpSummarizer, HttpVectorStore};
use lattice_store::Neo4jConnector;
use tracing::{info, warn};

fn load_config() -> LatticeConfig {
    let path = std::env::var("LATTICE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("lattice.toml"));
    match LatticeConfig::load(&path) {
        Ok(config) => config,
        Err(_) => {
            let mut config = LatticeConfig::default();
            config.apply_env_overrides();
            config
        }
    }
}

fn backends_from(config: &LatticeConfig) -> ServerBackends {
    ServerBackends {
        connector: Some(Arc::new(Neo4jConnector::new(
            config.graph.user.clone(),
            config.graph.password.clone(),
        ))),
        vector: config
            .vector
            .url
            .as_deref()
            .map(|url| Arc::new(HttpVectorStore::new(url)) as Arc<dyn VectorBackend>),
        embedder: config
            .embedding_url
            .as_deref()
            .map(|url| Arc::new(HttpEmbedder::new(url)) as Arc<dyn EmbeddingBackend>),
        summarizer: config
            .summarizer_url
            .as_deref()
            .map(|url| Arc::new(HttpSummarizer::new(url)) as Arc<dyn SummarizerBackend>),
        git: None,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let config = load_config();
    let server = Server::new(config.clone(), backends_from(&config));

    if server.connect().await {
        info!("graph store connected");
    } else {
        warn!("graph store unreachable; serving from the in-memory index");
    }

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ToolRequest>(&line) {
            Ok(request) => server.dispatch(request).await,
            Err(e) => ToolResponse::invalid_input(
                format!("unparseable tool request: {e}"),
                Some("expected {\"tool\": ..., \"args\": {...}}".to_string()),
            ),
        };
        match serde_json::to_string(&response) {
            Ok(text) => {
                if writeln!(stdout, "{text}").and_then(|()| stdout.flush()).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "response serialization failed"),
        }
    }
}
