//! CollectionNamer — deterministic `(identifier, isHybrid) -> collectionName`
//! mapping (spec.md §4.4).

use md5::{Digest, Md5};

const MAX_SLUG_LEN: usize = 32;

fn md5_hash8(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(32);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex[..8].to_string()
}

fn slugify(identifier: &str) -> String {
    let lower = identifier.to_lowercase();
    let slug: String = lower
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    slug.chars().take(MAX_SLUG_LEN).collect()
}

/// Compute the collection name for a project. `git_identifier` should be the
/// value produced by `git_identity::resolve`, if any; `project_path` must
/// already be resolved to an absolute path by the caller.
pub fn collection_name(
    git_identifier: Option<&str>,
    project_path: &str,
    is_hybrid: bool,
) -> String {
    let prefix = if is_hybrid { "hybrid_code_chunks" } else { "code_chunks" };
    let body = match git_identifier {
        Some(id) => format!("git_{}_{}", slugify(id), md5_hash8(id)),
        None => md5_hash8(project_path),
    };
    format!("{prefix}_{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let a = collection_name(Some("github.com/acme/widgets"), "/abs/path", false);
        let b = collection_name(Some("github.com/acme/widgets"), "/abs/path", false);
        assert_eq!(a, b);
    }

    #[test]
    fn hybrid_flag_changes_prefix_only() {
        let dense = collection_name(None, "/abs/path", false);
        let hybrid = collection_name(None, "/abs/path", true);
        assert!(dense.starts_with("code_chunks_"));
        assert!(hybrid.starts_with("hybrid_code_chunks_"));
        assert_eq!(
            dense.trim_start_matches("code_chunks_"),
            hybrid.trim_start_matches("hybrid_code_chunks_")
        );
    }

    #[test]
    fn git_identifier_produces_slug_and_hash8() {
        let name = collection_name(Some("GitHub.com/Acme/Widgets!!"), "/abs/path", false);
        assert!(name.starts_with("code_chunks_git_github_com_acme_widgets"));
        let hash_part = name.rsplit('_').next().unwrap();
        assert_eq!(hash_part.len(), 8);
    }

    #[test]
    fn slug_truncates_to_32_chars() {
        let long_id = "x".repeat(100);
        let name = collection_name(Some(&long_id), "/abs/path", false);
        // code_chunks_git_ + 32 chars of slug + _ + 8 hex chars
        let body = name.trim_start_matches("code_chunks_git_");
        let slug_and_hash: Vec<&str> = body.rsplitn(2, '_').collect();
        assert_eq!(slug_and_hash[1].len(), MAX_SLUG_LEN);
    }

    #[test]
    fn falls_back_to_path_hash_without_git_identifier() {
        let name = collection_name(None, "/some/abs/path", false);
        assert!(name.starts_with("code_chunks_"));
        assert!(!name.contains("git_"));
    }
}
