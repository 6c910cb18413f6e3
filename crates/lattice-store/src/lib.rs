//! # lattice-store
//!
//! Clients for the external collaborators: the Bolt graph engine (with the
//! retry/batch/auto-connect discipline), BM25 full-text index
//! provisioning, and the vector / embedding / summarizer HTTP backends.
//! Everything here sits behind the `lattice-core` trait seams so tests can
//! swap in stubs.

pub mod bm25;
pub mod client;
pub mod http;
pub mod neo4j;

pub use bm25::{Bm25Provisioner, Bm25Status};
pub use client::{GraphClient, QueryResult};
pub use neo4j::Neo4jConnector;
