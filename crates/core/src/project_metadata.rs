//! ProjectMetadata — one committed record per project (spec.md §3.1, §6.4).

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const PROJECT_METADATA_FILENAME: &str = "project.json";
const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub version: u32,
    pub project_path: PathBuf,
    pub collection_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo_identifier: Option<String>,
    pub is_hybrid: bool,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub created_at: i64,
    pub last_indexed: i64,
    pub indexed_file_count: usize,
    pub total_chunks: usize,

    #[serde(skip)]
    path: PathBuf,
}

impl ProjectMetadata {
    fn doc_path(context_dir: &Path) -> PathBuf {
        context_dir.join(PROJECT_METADATA_FILENAME)
    }

    pub fn load(context_dir: &Path) -> io::Result<Option<ProjectMetadata>> {
        let path = Self::doc_path(context_dir);
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let mut meta: ProjectMetadata = serde_json::from_str(&raw).map_err(io::Error::other)?;
                meta.path = path;
                Ok(Some(meta))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn new(
        context_dir: &Path,
        project_path: PathBuf,
        collection_name: String,
        git_repo_identifier: Option<String>,
        is_hybrid: bool,
        embedding_model: String,
        embedding_dimension: usize,
    ) -> Self {
        let now = now_ms();
        Self {
            version: CURRENT_VERSION,
            project_path,
            collection_name,
            git_repo_identifier,
            is_hybrid,
            embedding_model,
            embedding_dimension,
            created_at: now,
            last_indexed: now,
            indexed_file_count: 0,
            total_chunks: 0,
            path: Self::doc_path(context_dir),
        }
    }

    /// Atomic write, same discipline as `HashCache::save` (spec.md §6.4:
    /// pretty-printed JSON, UTF-8, LF line endings).
    pub fn save(&mut self) -> io::Result<()> {
        self.last_indexed = now_ms();
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let tmp_path = dir.join(format!(".{PROJECT_METADATA_FILENAME}.tmp"));
        let body = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(&tmp_path, format!("{body}\n"))?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_preserves_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = ProjectMetadata::new(
            dir.path(),
            PathBuf::from("/proj"),
            "code_chunks_abc12345".into(),
            None,
            false,
            "text-embedding-3-small".into(),
            1536,
        );
        meta.indexed_file_count = 3;
        meta.total_chunks = 9;
        meta.save().unwrap();

        let reloaded = ProjectMetadata::load(dir.path()).unwrap().unwrap();
        assert_eq!(reloaded.embedding_dimension, 1536);
        assert_eq!(reloaded.total_chunks, 9);
        assert_eq!(reloaded.collection_name, "code_chunks_abc12345");
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectMetadata::load(dir.path()).unwrap().is_none());
    }
}
