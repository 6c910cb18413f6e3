//! # lattice-core
//!
//! Foundation crate for the Lattice code-intelligence engine.
//! Defines the graph data model, errors, config, tracing, and the
//! trait seams behind which the external collaborators (graph engine,
//! vector store, embedding backend, summarizer, git) live.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod errors;
pub mod model;
pub mod statement;
pub mod telemetry;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::LatticeConfig;
pub use errors::error_code::LatticeErrorCode;
pub use errors::LatticeError;
pub use model::{EdgeRecord, EdgeType, NodeLabel, NodeRecord, Validity};
pub use statement::Statement;

/// Fx-hashed collections used across the workspace.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub type FxHashSet<T> = rustc_hash::FxHashSet<T>;

/// Epoch milliseconds for "now". The single clock used at the store boundary.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
