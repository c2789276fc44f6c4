//! Best-effort per-project lock file (spec.md §5 "Shared-resource policy"):
//! rejects concurrent indexing runs on the same project; locks older than an
//! hour are treated as abandoned and reclaimed.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const LOCK_FILENAME: &str = "index.lock";
const STALE_AFTER: Duration = Duration::from_secs(3600);

#[derive(Debug, Serialize, Deserialize)]
struct LockContents {
    pid: u32,
    acquired_at_ms: i64,
}

pub struct ProjectLock {
    path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another indexing run holds the lock (pid {pid}, acquired {age_secs}s ago)")]
    HeldByOther { pid: u32, age_secs: i64 },
    #[error("lock I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProjectLock {
    /// Acquire the lock at `context_dir/index.lock`, reclaiming it first if
    /// it is older than one hour.
    pub fn acquire(context_dir: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(context_dir)?;
        let path = context_dir.join(LOCK_FILENAME);

        if let Ok(raw) = std::fs::read_to_string(&path) {
            if let Ok(existing) = serde_json::from_str::<LockContents>(&raw) {
                let age = now_ms() - existing.acquired_at_ms;
                if Duration::from_millis(age.max(0) as u64) < STALE_AFTER {
                    return Err(LockError::HeldByOther { pid: existing.pid, age_secs: age / 1000 });
                }
                // Stale: fall through and reclaim by overwriting.
            }
        }

        let contents = LockContents { pid: std::process::id(), acquired_at_ms: now_ms() };
        std::fs::write(&path, serde_json::to_string(&contents).unwrap())?;
        Ok(Self { path })
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = ProjectLock::acquire(dir.path()).unwrap();
            assert!(ProjectLock::acquire(dir.path()).is_err());
        }
        assert!(ProjectLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILENAME);
        let stale = LockContents { pid: 999999, acquired_at_ms: now_ms() - 2 * 3600 * 1000 };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        assert!(ProjectLock::acquire(dir.path()).is_ok());
    }
}
