//! # lattice-graph
//!
//! Maps parsed records to ordered batches of idempotent upsert statements,
//! mirrors the graph in a typed in-memory index, detects index/store
//! drift, and finds import cycles.

pub mod builder;
pub mod communities;
pub mod cycles;
pub mod docs_builder;
pub mod drift;
pub mod index;

pub use builder::{BuildContext, BuildOutput, GraphBuilder};
pub use docs_builder::{DocLinkTargets, DocsBuilder};
pub use drift::{DriftReport, StoreCounts};
pub use index::{IndexStats, MemoryIndex};
