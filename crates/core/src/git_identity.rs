//! Git repository identifier resolution for `CollectionNamer` (spec.md §4.4).
//!
//! Trimmed from the teacher's `server/src/git.rs` (which opens the repo via
//! `git2::Repository::open` for blame/history/churn) down to exactly what
//! the namer needs: the `origin` remote URL, or `None` if the project isn't
//! a git repository or has no `origin`.

use std::path::Path;

use git2::Repository;

/// Resolve a stable identifier for the project's git origin, if any.
pub fn resolve(project_root: &Path) -> Option<String> {
    let repo = Repository::discover(project_root).ok()?;
    let remote = repo.find_remote("origin").ok()?;
    remote.url().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_git_directory_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve(dir.path()).is_none());
    }

    #[test]
    fn repo_without_origin_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        assert!(resolve(dir.path()).is_none());
    }

    #[test]
    fn repo_with_origin_resolves_to_its_url() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        repo.remote("origin", "https://example.com/acme/widgets.git").unwrap();
        assert_eq!(resolve(dir.path()).as_deref(), Some("https://example.com/acme/widgets.git"));
    }
}
