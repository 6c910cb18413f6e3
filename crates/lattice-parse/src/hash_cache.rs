//! Persistent per-file hash cache driving incremental selection.
//!
//! Advisory only: correctness never depends on it, it just decides which
//! files get re-parsed. Saved atomically (temp file + rename) so a crash
//! mid-save never corrupts readers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CACHE_VERSION: u32 = 1;

/// One cached entry per relative path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub hash: String,
    pub timestamp: i64,
    pub loc: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    last_build: i64,
    files: BTreeMap<String, CacheEntry>,
}

/// The on-disk cache lives at `<workspaceRoot>/.lattice/cache/file-hashes.json`.
#[derive(Debug)]
pub struct HashCache {
    path: PathBuf,
    last_build: i64,
    files: BTreeMap<String, CacheEntry>,
}

impl HashCache {
    pub fn cache_path(workspace_root: &Path) -> PathBuf {
        workspace_root
            .join(".lattice")
            .join("cache")
            .join("file-hashes.json")
    }

    /// Load the cache for a workspace; a missing or corrupt file yields an
    /// empty cache (everything re-parses, nothing fails).
    pub fn load(workspace_root: &Path) -> Self {
        let path = Self::cache_path(workspace_root);
        let files = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<CacheFile>(&text) {
                Ok(parsed) if parsed.version == CACHE_VERSION => {
                    debug!(entries = parsed.files.len(), "hash cache loaded");
                    return Self {
                        path,
                        last_build: parsed.last_build,
                        files: parsed.files,
                    };
                }
                Ok(parsed) => {
                    warn!(version = parsed.version, "hash cache version mismatch, starting empty");
                    BTreeMap::new()
                }
                Err(e) => {
                    warn!("hash cache unreadable ({e}), starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            last_build: 0,
            files,
        }
    }

    pub fn get(&self, relative_path: &str) -> Option<&CacheEntry> {
        self.files.get(relative_path)
    }

    pub fn set(&mut self, relative_path: &str, hash: String, loc: usize, timestamp: i64) {
        self.files.insert(
            relative_path.to_string(),
            CacheEntry {
                hash,
                timestamp,
                loc,
            },
        );
    }

    /// True when the path is absent or its cached hash differs.
    pub fn has_changed(&self, relative_path: &str, current_hash: &str) -> bool {
        match self.files.get(relative_path) {
            Some(entry) => entry.hash != current_hash,
            None => true,
        }
    }

    pub fn remove(&mut self, relative_path: &str) -> bool {
        self.files.remove(relative_path).is_some()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn last_build(&self) -> i64 {
        self.last_build
    }

    /// Persist: write to a temp sibling, then rename over the target.
    pub fn save(&mut self, build_timestamp: i64) -> std::io::Result<()> {
        self.last_build = build_timestamp;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = CacheFile {
            version: CACHE_VERSION,
            last_build: self.last_build,
            files: self.files.clone(),
        };
        let text = serde_json::to_string_pretty(&payload)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(entries = self.files.len(), "hash cache saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn has_changed_is_false_iff_hash_matches() {
        let dir = TempDir::new().unwrap();
        let mut cache = HashCache::load(dir.path());

        assert!(cache.has_changed("src/a.ts", "h1"), "absent paths count as changed");
        cache.set("src/a.ts", "h1".into(), 10, 1_000);
        assert!(!cache.has_changed("src/a.ts", "h1"));
        assert!(cache.has_changed("src/a.ts", "h2"));
    }

    #[test]
    fn save_then_fresh_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut cache = HashCache::load(dir.path());
        cache.set("src/a.ts", "h1".into(), 12, 1_000);
        cache.set("src/b.ts", "h2".into(), 34, 1_000);
        cache.save(2_000).unwrap();

        let reloaded = HashCache::load(dir.path());
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.last_build(), 2_000);
        assert_eq!(reloaded.get("src/a.ts"), cache.get("src/a.ts"));
        assert_eq!(reloaded.get("src/b.ts").unwrap().loc, 34);
    }

    #[test]
    fn clear_empties_the_cache() {
        let dir = TempDir::new().unwrap();
        let mut cache = HashCache::load(dir.path());
        cache.set("src/a.ts", "h1".into(), 1, 1);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.has_changed("src/a.ts", "h1"));
    }

    #[test]
    fn corrupt_cache_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = HashCache::cache_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();
        let cache = HashCache::load(dir.path());
        assert!(cache.is_empty());
    }
}
