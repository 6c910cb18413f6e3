//! Engine configuration: TOML file merged with `LATTICE_*` environment
//! overrides, option fields with `effective_*` accessors for defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for a Lattice server instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LatticeConfig {
    /// Absolute path to the project workspace.
    pub workspace_root: Option<PathBuf>,
    /// Source directory, absolute or relative to the workspace. Default: `src`.
    pub source_dir: Option<PathBuf>,
    /// Project id. Default: basename of the workspace root.
    pub project_id: Option<String>,
    /// Substring exclusions applied during discovery.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Feature names seeded as FEATURE nodes on every build (status is
    /// only set on first creation).
    #[serde(default)]
    pub features: Vec<String>,

    pub graph: GraphConfig,
    pub vector: VectorConfig,

    /// Optional summarizer endpoint; when absent summaries are empty strings.
    pub summarizer_url: Option<String>,
    /// Optional embedding endpoint; when absent the retriever degrades to
    /// its lexical paths.
    pub embedding_url: Option<String>,

    /// Bounded ring size for sync-state history. Default: 50.
    pub state_history_max_size: Option<usize>,
    /// Builds expected to exceed this return QUEUED and continue in the
    /// background. Default: 10_000.
    pub sync_rebuild_threshold_ms: Option<u64>,
    /// Allow swapping an unreachable workspace path for a mounted fallback.
    pub allow_runtime_path_fallback: Option<bool>,
    /// Mount root tried when the fallback is allowed. Default: `/workspace`.
    pub runtime_fallback_root: Option<PathBuf>,
    /// Watcher debounce in milliseconds. Default: 500.
    pub debounce_ms: Option<u64>,
    /// Index markdown docs during full builds. Default: true.
    pub index_docs: Option<bool>,
}

/// Graph engine (Bolt) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7687,
            user: String::new(),
            password: String::new(),
        }
    }
}

impl GraphConfig {
    pub fn uri(&self) -> String {
        format!("bolt://{}:{}", self.host, self.port)
    }

    pub fn localhost_uri(&self) -> String {
        format!("bolt://localhost:{}", self.port)
    }

    pub fn is_localhost(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "::1")
    }
}

/// Vector store settings. Collections are per entity kind; point id is the
/// graph node id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub url: Option<String>,
    pub collections: Vec<String>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            collections: vec![
                "functions".to_string(),
                "classes".to_string(),
                "files".to_string(),
            ],
        }
    }
}

impl LatticeConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: LatticeConfig = toml::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables win over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LATTICE_WORKSPACE_ROOT") {
            self.workspace_root = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("LATTICE_SOURCE_DIR") {
            self.source_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("LATTICE_PROJECT_ID") {
            self.project_id = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICE_GRAPH_HOST") {
            self.graph.host = v;
        }
        if let Ok(v) = std::env::var("LATTICE_GRAPH_PORT") {
            if let Ok(port) = v.parse() {
                self.graph.port = port;
            }
        }
        if let Ok(v) = std::env::var("LATTICE_VECTOR_URL") {
            self.vector.url = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICE_SUMMARIZER_URL") {
            self.summarizer_url = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICE_EMBEDDING_URL") {
            self.embedding_url = Some(v);
        }
    }

    pub fn effective_state_history_max_size(&self) -> usize {
        self.state_history_max_size.unwrap_or(50)
    }

    pub fn effective_sync_rebuild_threshold_ms(&self) -> u64 {
        self.sync_rebuild_threshold_ms.unwrap_or(10_000)
    }

    pub fn effective_allow_runtime_path_fallback(&self) -> bool {
        self.allow_runtime_path_fallback.unwrap_or(false)
    }

    pub fn effective_runtime_fallback_root(&self) -> PathBuf {
        self.runtime_fallback_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("/workspace"))
    }

    pub fn effective_debounce_ms(&self) -> u64 {
        self.debounce_ms.unwrap_or(500)
    }

    pub fn effective_index_docs(&self) -> bool {
        self.index_docs.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = LatticeConfig::default();
        assert_eq!(config.graph.uri(), "bolt://localhost:7687");
        assert!(config.graph.is_localhost());
        assert_eq!(config.effective_debounce_ms(), 500);
        assert_eq!(config.effective_state_history_max_size(), 50);
        assert!(config.effective_index_docs());
    }

    #[test]
    fn toml_round_trip() {
        let text = r#"
            project_id = "demo"
            exclude = ["generated"]

            [graph]
            host = "memgraph"
            port = 7687
        "#;
        let config: LatticeConfig = toml::from_str(text).unwrap();
        assert_eq!(config.project_id.as_deref(), Some("demo"));
        assert_eq!(config.graph.host, "memgraph");
        assert!(!config.graph.is_localhost());
        assert_eq!(config.graph.localhost_uri(), "bolt://localhost:7687");
    }
}
