//! Error kinds for the indexing and search engine.
//!
//! Mirrors spec.md §7: these are kinds, not a type per external system —
//! `VerificationWarning` is deliberately absent here because it is not an
//! error (it is carried on the run summary instead, see `controller.rs`).

use std::path::PathBuf;

/// Whether a failure is worth retrying with backoff (§4.5, §4.6, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recoverability {
    Recoverable,
    NonRecoverable,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Missing or contradictory inputs: no API key, no vector-store endpoint,
    /// incompatible `customDimension`, dimension mismatch requiring `--clean`.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Filesystem or persistence failure. Per-file read failures are handled
    /// by the caller (logged + skipped); this variant is for cache/metadata
    /// writes, which are fatal for the run.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Embedding provider failure; `recoverability` decides whether the
    /// controller retries (§4.5).
    #[error("embedding failure ({recoverability:?}): {message}")]
    Embedding { message: String, recoverability: Recoverability },

    /// Vector-store failure; timeouts are recoverable, schema mismatches are
    /// not, not-found is not an error at all (§4.6, §7.4).
    #[error("vector store failure ({recoverability:?}): {message}")]
    VectorStore { message: String, recoverability: Recoverability },

    /// Query vector dimension disagrees with the collection's declared
    /// dimension (§4.8 step 1, §7.5). Requires `--clean` to repair.
    #[error("schema mismatch: query vector has dimension {got}, collection expects {expected}")]
    SchemaMismatch { expected: usize, got: usize },

    /// User-initiated cancellation (§5, §7.7). Not an error; the controller
    /// treats this as an orderly-shutdown signal, but it is represented here
    /// so it can flow through the same `Result` plumbing as real errors.
    #[error("run cancelled")]
    Cancelled,
}

impl IndexError {
    pub fn is_fatal(&self) -> bool {
        match self {
            IndexError::Configuration(_) => true,
            IndexError::Io { .. } => true,
            IndexError::Embedding { recoverability, .. }
            | IndexError::VectorStore { recoverability, .. } => {
                *recoverability == Recoverability::NonRecoverable
            }
            IndexError::SchemaMismatch { .. } => true,
            IndexError::Cancelled => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
