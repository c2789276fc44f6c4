//! Shared data-model types (spec.md §3.1): chunks, embedded chunks, and the
//! sizing constants the chunker and embedding client are parameterized by.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Declaration-subdivision ceiling for the syntax-aware chunker (spec.md §4.2).
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 2500;
/// Sliding-window size for the character-window fallback.
pub const DEFAULT_WINDOW_CHARS: usize = 2000;
/// Overlap between consecutive fallback windows.
pub const DEFAULT_OVERLAP_CHARS: usize = 300;

/// A contiguous slice of one file (spec.md §3.1 "Chunk").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub relative_path: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub file_extension: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Chunk {
    /// Derive the stable chunk id: a SHA-256 over the fields that uniquely
    /// place it in a project (spec.md §3.1: "derived from projectPath +
    /// relativePath + startLine + endLine + contentHash").
    pub fn derive_id(
        project_path: &str,
        relative_path: &str,
        start_line: usize,
        end_line: usize,
        content_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(project_path.as_bytes());
        hasher.update(b"\0");
        hasher.update(relative_path.as_bytes());
        hasher.update(b"\0");
        hasher.update(start_line.to_le_bytes());
        hasher.update(end_line.to_le_bytes());
        hasher.update(content_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn new(
        project_path: &str,
        relative_path: String,
        start_line: usize,
        end_line: usize,
        file_extension: String,
        content: String,
    ) -> Self {
        let content_hash = sha256_hex(content.as_bytes());
        let id =
            Self::derive_id(project_path, &relative_path, start_line, end_line, &content_hash);
        Self { id, content, relative_path, start_line, end_line, file_extension, metadata: BTreeMap::new() }
    }
}

/// A Chunk plus its dense vector and, in hybrid mode, a sparse lexical
/// representation (spec.md §3.1 "Embedded Chunk").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub dense_vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_representation: Option<BTreeMap<u32, f32>>,
}

/// SHA-256 of raw bytes, hex-encoded (spec.md §4.3: "contentHash is SHA-256
/// over the file's raw bytes").
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_stable() {
        let a = sha256_hex(b"hello world");
        let b = sha256_hex(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn chunk_id_is_deterministic_and_order_sensitive() {
        let id1 = Chunk::derive_id("/proj", "src/a.ts", 1, 10, "abc");
        let id2 = Chunk::derive_id("/proj", "src/a.ts", 1, 10, "abc");
        let id3 = Chunk::derive_id("/proj", "src/a.ts", 1, 11, "abc");
        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }
}
