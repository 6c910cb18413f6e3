//! # lattice-query
//!
//! The read side: hybrid retrieval (vector + BM25 + graph expansion fused
//! with reciprocal rank fusion), seeded personalized PageRank, and the
//! temporal layer that resolves anchors and applies validity filters.

pub mod ppr;
pub mod retriever;
pub mod rrf;
pub mod temporal;

pub use ppr::{PprRanker, PprRequest, PprScore};
pub use retriever::{
    Bm25Mode, HybridRetriever, RetrievalMode, RetrievalResult, RetrieveRequest, RetrieveResponse,
};
pub use temporal::{DiffReport, SinceAnchor, TemporalEngine};
