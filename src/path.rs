//! Path Validator.
//!
//! Normalises and validates client-supplied path strings against the
//! repository root. Trust boundary: we refuse escapes expressed in the
//! syntax of the path itself, but do not chase symlinks; the repository is
//! assumed to be under the operator's control and nothing in this crate
//! creates symlinks.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Validate `client_path` and join it onto `repository_root`.
///
/// Rules, checked in order:
/// 1. reject absolute paths
/// 2. reject any `.` or `..` segment
/// 3. reject paths that are not already in normal form (redundant
///    separators, trailing slash)
pub fn validate(repository_root: &Path, client_path: &str) -> Result<PathBuf> {
    let candidate = Path::new(client_path);

    if candidate.is_absolute() {
        return Err(Error::InvalidPath(client_path.to_string()));
    }

    for segment in client_path.split('/') {
        if segment == "." || segment == ".." {
            return Err(Error::InvalidPath(client_path.to_string()));
        }
    }

    if !is_normalized(client_path) {
        return Err(Error::InvalidPath(client_path.to_string()));
    }

    Ok(repository_root.join(candidate))
}

/// A path is normalized when splitting and rejoining on `/` reproduces it
/// exactly: no empty segments (double separators or a trailing slash), and
/// no leading separator (already excluded by the absolute-path check).
fn is_normalized(client_path: &str) -> bool {
    if client_path.is_empty() {
        return false;
    }
    client_path.split('/').all(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/repo")
    }

    #[test]
    fn accepts_simple_relative_path() {
        let p = validate(&root(), "notes/a.md").unwrap();
        assert_eq!(p, PathBuf::from("/repo/notes/a.md"));
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(matches!(
            validate(&root(), "/etc/passwd"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn rejects_dotdot_segment() {
        assert!(matches!(
            validate(&root(), "../etc/passwd"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn rejects_dot_segment() {
        assert!(matches!(
            validate(&root(), "a/./b"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn rejects_double_separator() {
        assert!(matches!(
            validate(&root(), "a//b"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn rejects_trailing_slash() {
        assert!(matches!(
            validate(&root(), "a/b/"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn rejects_empty_path() {
        assert!(matches!(validate(&root(), ""), Err(Error::InvalidPath(_))));
    }
}
