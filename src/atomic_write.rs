//! Atomic Writer.
//!
//! Write-then-rename: a concurrent reader of `path` observes either the
//! pre-image or the complete post-image, never a partial write. The
//! temporary file lives alongside the target so the final rename stays on
//! one filesystem.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::registry::entry::Mtime;

/// Write `content` to `path` atomically, returning the mtime captured right
/// after fsync and before the rename.
///
/// Creates parent directories on demand. Runs on the blocking thread pool
/// since [`tempfile::NamedTempFile`] is synchronous; the crate's longest
/// blocking calls are brief and tolerated per the concurrency model.
pub async fn write(path: &Path, content: &str) -> io::Result<Mtime> {
    let path = path.to_path_buf();
    let content = content.to_string();
    tokio::task::spawn_blocking(move || write_blocking(&path, &content))
        .await
        .expect("atomic write task panicked")
}

fn write_blocking(path: &Path, content: &str) -> io::Result<Mtime> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)?;

    use std::io::Write;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;

    let metadata = tmp.as_file().metadata()?;
    let mtime = Mtime::from_system_time(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH));

    // `tmp`'s Drop impl would unlink it on any `?` above; `persist` replaces
    // that with the atomic rename on success.
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn temp_dir_has_no_leftovers(dir: &Path) -> bool {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .all(|e| !e.file_name().to_string_lossy().ends_with(".tmp"))
            })
            .unwrap_or(true)
    }

    #[tokio::test]
    async fn writes_content_and_returns_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let _mtime = write(&path, "hello").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/a.txt");
        write(&path, "x").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "x");
    }

    #[tokio::test]
    async fn leaves_no_temp_file_on_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        write(&path, "hello").await.unwrap();
        assert!(temp_dir_has_no_leftovers(dir.path()));
    }

    #[tokio::test]
    async fn overwrite_replaces_content_fully() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        write(&path, "first").await.unwrap();
        write(&path, "second").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "second");
    }
}
