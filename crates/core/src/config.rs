//! Project-local configuration: `.context/config.toml` (committed, non-secret)
//! merged with environment variables for anything sensitive (spec.md §1
//! "environment/config parsing ... specified only to the depth the core
//! requires"; SPEC_FULL.md §1 "Configuration").
//!
//! Mirrors the teacher's split in `server/src/init.rs`: a small TOML document
//! under version control, with API keys and endpoints supplied at runtime
//! rather than written to disk.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_chars: usize,
    pub window_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: crate::types::DEFAULT_MAX_CHUNK_CHARS,
            window_chars: crate::types::DEFAULT_WINDOW_CHARS,
            overlap_chars: crate::types::DEFAULT_OVERLAP_CHARS,
        }
    }
}

/// The committed, non-secret portion of project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub extensions: HashSet<String>,
    pub exclude_globs: Vec<String>,
    pub max_file_bytes: u64,
    pub hybrid: bool,
    pub embedding_model: String,
    pub custom_dimension: Option<usize>,
    pub chunking: ChunkingConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            extensions: [
                "ts", "tsx", "js", "jsx", "py", "go", "rs", "java", "c", "h", "cpp", "hpp", "cc",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            exclude_globs: crate::walker::WalkOptions::default().exclude_globs,
            max_file_bytes: 1024 * 1024,
            hybrid: false,
            embedding_model: "text-embedding-3-small".to_string(),
            custom_dimension: None,
            chunking: ChunkingConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Load `<context_dir>/config.toml`, falling back to defaults if absent.
    pub fn load(context_dir: &Path) -> Result<Self, IndexError> {
        let path = context_dir.join(CONFIG_FILENAME);
        match std::fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw)
                .map_err(|e| IndexError::Configuration(format!("invalid {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(IndexError::Io { path, source: e }),
        }
    }

    pub fn save(&self, context_dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(context_dir)
            .map_err(|e| IndexError::Io { path: context_dir.to_path_buf(), source: e })?;
        let path = context_dir.join(CONFIG_FILENAME);
        let body = toml::to_string_pretty(self)
            .map_err(|e| IndexError::Configuration(format!("failed to serialize config: {e}")))?;
        std::fs::write(&path, body).map_err(|e| IndexError::Io { path, source: e })
    }
}

/// Secrets and endpoints, read only from the environment — never persisted
/// alongside `ProjectConfig` (spec.md §7.1 ConfigurationError: "no embedding
/// API key, no vector store endpoint").
#[derive(Debug, Clone)]
pub struct Secrets {
    pub embedding_base_url: String,
    pub embedding_api_key: String,
    pub embedding_bearer_auth: bool,
    pub vector_store_base_url: String,
    pub vector_store_api_token: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self, IndexError> {
        let embedding_base_url = require_env("HYBRIDEX_EMBEDDING_BASE_URL")?;
        let embedding_api_key = require_env("HYBRIDEX_EMBEDDING_API_KEY")?;
        let embedding_bearer_auth = std::env::var("HYBRIDEX_EMBEDDING_AZURE_AUTH").is_err();
        let vector_store_base_url = require_env("HYBRIDEX_VECTOR_STORE_URL")?;
        let vector_store_api_token = require_env("HYBRIDEX_VECTOR_STORE_TOKEN")?;
        Ok(Self {
            embedding_base_url,
            embedding_api_key,
            embedding_bearer_auth,
            vector_store_base_url,
            vector_store_api_token,
        })
    }
}

fn require_env(name: &str) -> Result<String, IndexError> {
    std::env::var(name).map_err(|_| IndexError::Configuration(format!("missing required environment variable {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ProjectConfig::load(dir.path()).unwrap();
        assert!(cfg.extensions.contains("ts"));
        assert!(!cfg.hybrid);
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ProjectConfig::default();
        cfg.hybrid = true;
        cfg.embedding_model = "custom-model".to_string();
        cfg.save(dir.path()).unwrap();

        let reloaded = ProjectConfig::load(dir.path()).unwrap();
        assert!(reloaded.hybrid);
        assert_eq!(reloaded.embedding_model, "custom-model");
    }
}
