//! HashCache — durable `relativePath -> {contentHash, chunkCount, mtime}`
//! mapping (spec.md §3.1, §4.3).
//!
//! Persistence follows the same "write somewhere durable, don't corrupt it on
//! a crash" discipline as the teacher's config writers in `server/src/init.rs`
//! (`fs::write` of pretty-printed JSON/TOML), made atomic per spec.md §4.3's
//! explicit invariant via the standard write-to-temp-then-rename idiom.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::sha256_hex;

pub const HASH_CACHE_FILENAME: &str = "file-hashes.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileHashEntry {
    pub content_hash: String,
    pub last_modified: i64,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashCache {
    pub project_path: PathBuf,
    pub collection_name: String,
    pub last_indexed: Option<i64>,
    pub files: BTreeMap<String, FileHashEntry>,

    /// Where this cache lives on disk; not serialized, set on load/new.
    #[serde(skip)]
    path: PathBuf,
}

impl HashCache {
    fn doc_path(context_dir: &Path) -> PathBuf {
        context_dir.join(HASH_CACHE_FILENAME)
    }

    /// Load the cache for `(project_path, collection_name)`. Per spec.md
    /// §3.1: "if HashCache.collectionName != current collection name, the
    /// cache is treated as empty (and recreated)."
    pub fn load(context_dir: &Path, project_path: &Path, collection_name: &str) -> io::Result<Self> {
        let path = Self::doc_path(context_dir);
        let loaded = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<HashCache>(&raw).ok(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        match loaded {
            Some(mut cache) if cache.collection_name == collection_name => {
                cache.path = path;
                Ok(cache)
            }
            _ => Ok(Self {
                project_path: project_path.to_path_buf(),
                collection_name: collection_name.to_string(),
                last_indexed: None,
                files: BTreeMap::new(),
                path,
            }),
        }
    }

    /// True if `relative_path` is absent or its stored hash disagrees with
    /// `current_hash` (spec.md §4.3).
    pub fn has_file_changed(&self, relative_path: &str, current_hash: &str) -> bool {
        match self.files.get(relative_path) {
            Some(entry) => entry.content_hash != current_hash,
            None => true,
        }
    }

    pub fn update_file(&mut self, relative_path: &str, hash: String, chunk_count: usize) {
        self.files.insert(
            normalize(relative_path),
            FileHashEntry { content_hash: hash, last_modified: now_ms(), chunk_count },
        );
    }

    pub fn remove_file(&mut self, relative_path: &str) {
        self.files.remove(relative_path);
    }

    /// Entries whose key is not present in `current_files` (spec.md §4.3).
    pub fn get_deleted_files(&self, current_files: &HashSet<String>) -> Vec<String> {
        self.files.keys().filter(|k| !current_files.contains(k.as_str())).cloned().collect()
    }

    pub fn total_chunks(&self) -> usize {
        self.files.values().map(|e| e.chunk_count).sum()
    }

    /// Atomic write: temp file in the same directory, then rename. A crash
    /// mid-write leaves either the old document intact or nothing at the
    /// temp path — never a truncated `file-hashes.json` (spec.md §4.3).
    pub fn save(&mut self) -> io::Result<()> {
        self.last_indexed = Some(now_ms());
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let tmp_path = dir.join(format!(".{HASH_CACHE_FILENAME}.tmp"));
        let body = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(&tmp_path, format!("{body}\n"))?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn clear(&mut self) -> io::Result<()> {
        self.files.clear();
        self.last_indexed = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn normalize(relative_path: &str) -> String {
    relative_path.replace('\\', "/")
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Content hash of a file's raw bytes (spec.md §4.3).
pub fn hash_file_bytes(bytes: &[u8]) -> String {
    sha256_hex(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = HashCache::load(dir.path(), Path::new("/proj"), "coll_a").unwrap();
        cache.update_file("src/a.ts", "hash1".into(), 2);
        cache.save().unwrap();

        let reloaded = HashCache::load(dir.path(), Path::new("/proj"), "coll_a").unwrap();
        assert_eq!(reloaded.files.get("src/a.ts").unwrap().content_hash, "hash1");
        assert_eq!(reloaded.total_chunks(), 2);
    }

    #[test]
    fn mismatched_collection_name_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = HashCache::load(dir.path(), Path::new("/proj"), "coll_a").unwrap();
        cache.update_file("src/a.ts", "hash1".into(), 1);
        cache.save().unwrap();

        let reloaded = HashCache::load(dir.path(), Path::new("/proj"), "coll_b").unwrap();
        assert!(reloaded.files.is_empty());
        assert_eq!(reloaded.collection_name, "coll_b");
    }

    #[test]
    fn has_file_changed_detects_new_and_modified_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = HashCache::load(dir.path(), Path::new("/proj"), "coll_a").unwrap();
        assert!(cache.has_file_changed("src/a.ts", "h1"));
        cache.update_file("src/a.ts", "h1".into(), 1);
        assert!(!cache.has_file_changed("src/a.ts", "h1"));
        assert!(cache.has_file_changed("src/a.ts", "h2"));
    }

    #[test]
    fn get_deleted_files_returns_keys_missing_from_current_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = HashCache::load(dir.path(), Path::new("/proj"), "coll_a").unwrap();
        cache.update_file("src/a.ts", "h1".into(), 1);
        cache.update_file("src/b.ts", "h2".into(), 1);

        let current: HashSet<String> = ["src/a.ts".to_string()].into_iter().collect();
        let mut deleted = cache.get_deleted_files(&current);
        deleted.sort();
        assert_eq!(deleted, vec!["src/b.ts".to_string()]);
    }
}
