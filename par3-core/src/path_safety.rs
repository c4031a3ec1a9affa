//! Path validation for untrusted relative paths read back out of File/
//! Directory Packets or supplied on the command line.

use std::path::{Component, Path, PathBuf};

use crate::error::{Par3Error, Result};

#[derive(Clone, Copy, Debug, Default)]
pub struct PathPolicy {
    pub follow_symlinks: bool,
}

/// Ensure `rel` is safe relative to `root`: no absolute path, no `..`
/// traversal, and — unless `follow_symlinks` — no symlink anywhere along the
/// joined path. With `follow_symlinks`, the canonicalized candidate must stay
/// under the canonicalized root.
pub fn validate_path(root: &Path, rel: &Path, policy: PathPolicy) -> Result<PathBuf> {
    if rel.is_absolute() {
        return Err(Par3Error::invariant(format!("absolute paths are not allowed: {rel:?}")));
    }
    for comp in rel.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(Par3Error::invariant(format!("parent traversal not allowed: {rel:?}")));
        }
    }
    let candidate = root.join(rel);

    if !policy.follow_symlinks {
        if let Ok(m) = std::fs::symlink_metadata(&candidate) {
            if m.file_type().is_symlink() {
                return Err(Par3Error::invariant(format!(
                    "symlink encountered (not following): {candidate:?}"
                )));
            }
        }
        let mut cur = root.to_path_buf();
        for comp in rel.components() {
            cur = cur.join(comp);
            if let Ok(m) = std::fs::symlink_metadata(&cur) {
                if m.file_type().is_symlink() {
                    return Err(Par3Error::invariant(format!(
                        "symlink in path (not following): {cur:?}"
                    )));
                }
            }
        }
        Ok(candidate)
    } else {
        let root_can = std::fs::canonicalize(root)?;
        let cand_can = std::fs::canonicalize(&candidate)?;
        if !cand_can.starts_with(&root_can) {
            return Err(Par3Error::invariant(format!("path escapes root: {rel:?}")));
        }
        Ok(cand_can)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn rejects_absolute_and_parent_traversal() {
        let root = std::env::temp_dir();
        assert!(validate_path(&root, Path::new("/etc/passwd"), PathPolicy::default()).is_err());
        assert!(validate_path(&root, Path::new("../escape"), PathPolicy::default()).is_err());
    }

    #[test]
    fn accepts_plain_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let result = validate_path(dir.path(), Path::new("a.txt"), PathPolicy::default());
        assert!(result.is_ok());
    }
}
