//! FileWalker — enumerate candidate files under a project root.
//!
//! Grounded on the teacher's parallel `ignore::WalkBuilder` walk in
//! `scan.rs::walk_files_parallel`: a parallel directory walk, filtered on
//! extension, with excluded directory names pruned during the walk itself
//! rather than after. Exclusion *glob* patterns are matched with
//! `ignore::gitignore::GitignoreBuilder` since it already implements
//! repo-relative glob matching (including `**`) and is an existing
//! dependency.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use tracing::warn;

/// Inclusion/exclusion policy for one walk (spec.md §4.1).
#[derive(Clone)]
pub struct WalkOptions {
    /// File extensions to include, without the leading dot. Empty means
    /// "match nothing" — callers must supply at least one extension.
    pub extensions: HashSet<String>,
    /// Glob patterns, matched against the forward-slash-normalized path
    /// relative to the root; any match excludes the file.
    pub exclude_globs: Vec<String>,
    /// Files larger than this are skipped and counted as oversize.
    pub max_file_bytes: u64,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            extensions: HashSet::new(),
            exclude_globs: vec![
                ".git/**".into(),
                "node_modules/**".into(),
                "target/**".into(),
                "dist/**".into(),
                "build/**".into(),
                ".next/**".into(),
                "vendor/**".into(),
                "__pycache__/**".into(),
            ],
            max_file_bytes: 1024 * 1024,
        }
    }
}

/// Summary counters for files the walk deliberately skipped (§4.1), surfaced
/// to `ProgressReporter` during the `Discovering` phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkStats {
    pub oversize: usize,
    pub unreadable: usize,
    pub excluded: usize,
}

/// Result of one walk: the emitted files plus the skip counters.
pub struct WalkOutcome {
    pub files: Vec<PathBuf>,
    pub stats: WalkStats,
}

fn build_exclusion_matcher(root: &Path, globs: &[String]) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in globs {
        // A bad pattern is a configuration mistake, not a reason to abort
        // the whole walk — skip it and keep going.
        if let Some(e) = builder.add_line(None, pattern).err() {
            warn!("ignoring invalid exclude pattern {pattern:?}: {e}");
        }
    }
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}

fn is_excluded(matcher: &Gitignore, rel_path: &str, is_dir: bool) -> bool {
    matcher.matched(rel_path, is_dir).is_ignore()
}

/// Walk `root` and return every file matching the inclusion/exclusion policy.
///
/// Symbolic links are not followed (`WalkBuilder::follow_links(false)`, the
/// default). Order is not guaranteed to callers even though the walk itself
/// is parallel and may emit directory-first for cache locality.
pub fn walk(root: &Path, opts: &WalkOptions) -> WalkOutcome {
    let matcher = build_exclusion_matcher(root, &opts.exclude_globs);
    let stats = Mutex::new(WalkStats::default());
    let files: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

    WalkBuilder::new(root)
        .follow_links(false)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .threads(rayon::current_num_threads().min(12))
        .filter_entry({
            let matcher = matcher.clone();
            let root = root.to_path_buf();
            move |entry| {
                if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                    let rel = entry
                        .path()
                        .strip_prefix(&root)
                        .unwrap_or(entry.path())
                        .to_string_lossy()
                        .replace('\\', "/");
                    if rel.is_empty() {
                        return true;
                    }
                    return !is_excluded(&matcher, &rel, true);
                }
                true
            }
        })
        .build_parallel()
        .run(|| {
            let matcher = matcher.clone();
            let root = root.to_path_buf();
            let opts = opts.clone();
            let files = &files;
            let stats = &stats;
            Box::new(move |entry| {
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => return ignore::WalkState::Continue,
                };
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    return ignore::WalkState::Continue;
                }

                let abs_path = entry.path().to_path_buf();
                let rel_path = abs_path
                    .strip_prefix(&root)
                    .unwrap_or(&abs_path)
                    .to_string_lossy()
                    .replace('\\', "/");

                if is_excluded(&matcher, &rel_path, false) {
                    stats.lock().unwrap().excluded += 1;
                    return ignore::WalkState::Continue;
                }

                let ext = abs_path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if !opts.extensions.contains(ext) {
                    return ignore::WalkState::Continue;
                }

                match fs::metadata(&abs_path) {
                    Ok(meta) => {
                        if meta.len() > opts.max_file_bytes {
                            stats.lock().unwrap().oversize += 1;
                            return ignore::WalkState::Continue;
                        }
                    }
                    Err(e) => {
                        warn!("skipping unreadable file {}: {e}", abs_path.display());
                        stats.lock().unwrap().unreadable += 1;
                        return ignore::WalkState::Continue;
                    }
                }

                files.lock().unwrap().push(abs_path);
                ignore::WalkState::Continue
            })
        });

    WalkOutcome { files: files.into_inner().unwrap(), stats: stats.into_inner().unwrap() }
}

/// Read one file's contents, counting it as unreadable (not a fatal error)
/// on failure — per-file read errors keep the file out of the diff set
/// (spec.md §7 "Propagation policy") rather than aborting the run.
pub fn read_file_lossy(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => {
            if bytes.contains(&0) {
                None
            } else {
                Some(bytes)
            }
        }
        Err(e) => {
            warn!("skipping unreadable file {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn exts(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn walks_only_included_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        std::fs::write(dir.path().join("b.ts"), "export const b = 2;").unwrap();
        std::fs::write(dir.path().join("README.md"), "# hi").unwrap();

        let opts = WalkOptions { extensions: exts(&["ts"]), ..Default::default() };
        let outcome = walk(dir.path(), &opts);
        let mut rels: Vec<String> = outcome
            .files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        rels.sort();
        assert_eq!(rels, vec!["a.ts".to_string(), "b.ts".to_string()]);
    }

    #[test]
    fn excludes_glob_matches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "1").unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/b.ts"), "2").unwrap();

        let opts = WalkOptions { extensions: exts(&["ts"]), ..Default::default() };
        let outcome = walk(dir.path(), &opts);
        assert_eq!(outcome.files.len(), 1);
        assert!(outcome.files[0].ends_with("src/a.ts"));
    }

    #[test]
    fn skips_oversize_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.ts"), vec![b'x'; 200]).unwrap();
        let opts =
            WalkOptions { extensions: exts(&["ts"]), max_file_bytes: 100, ..Default::default() };
        let outcome = walk(dir.path(), &opts);
        assert!(outcome.files.is_empty());
        assert_eq!(outcome.stats.oversize, 1);
    }

    #[test]
    fn does_not_follow_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        std::fs::write(target_dir.path().join("outside.ts"), "1").unwrap();

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target_dir.path(), dir.path().join("link")).unwrap();
            let opts = WalkOptions { extensions: exts(&["ts"]), ..Default::default() };
            let outcome = walk(dir.path(), &opts);
            assert!(outcome.files.is_empty());
        }
    }
}
