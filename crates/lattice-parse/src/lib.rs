//! # lattice-parse
//!
//! Turns `(path, bytes)` into canonical `ParsedFile` / `ParsedDoc` records.
//! Tree-sitter backends cover the TypeScript/JavaScript/Python family; a
//! coarser line-based extractor covers everything else and every failure
//! path — the output shape is identical either way. Also home of the
//! advisory hash cache that drives incremental selection.

pub mod adapter;
pub mod backend;
pub mod hash_cache;
pub mod markdown;
pub mod types;

pub use adapter::ParserAdapter;
pub use hash_cache::HashCache;
pub use types::{
    DocKind, Language, ParsedClass, ParsedDoc, ParsedExport, ParsedFile, ParsedFunction,
    ParsedImport, ParsedSection, ParsedTestSuite, ParsedVariable,
};

/// Hex-encoded xxh3 digest of file content. Unchanged content ⇒ identical hash.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(bytes))
}
