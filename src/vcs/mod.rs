//! Version-Control Gateway.
//!
//! A thin wrapper over `git2` (libgit2 bindings) exposing exactly the three
//! operations the Registry and Session layers need: reading a blob at a
//! revision, staging-and-committing everything respecting `.gitignore`, and
//! resolving the current HEAD to a commit id plus the ref file that tracks
//! it.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// The resolved HEAD: a commit id (empty string if the ref has no commits
/// yet) and the filesystem path of the file the watcher should track for
/// changes to it (either the ref file HEAD points at, or `.git/HEAD` itself
/// when detached).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadState {
    pub commit_id: String,
    /// `.git/HEAD` itself. A branch switch rewrites this file's symbolic
    /// target even though the ref file it used to point at is untouched, so
    /// the watcher must track both paths, not just `ref_file_path`.
    pub head_file_path: PathBuf,
    pub ref_file_path: PathBuf,
}

/// Version-Control Gateway over a single repository.
pub struct GitGateway {
    repo_root: PathBuf,
}

impl GitGateway {
    pub fn open(repo_root: &Path) -> Result<Self> {
        // Validates that libgit2 can open the repository; surfaces as a Git
        // error immediately rather than lazily on first use.
        git2::Repository::open(repo_root)?;
        Ok(GitGateway {
            repo_root: repo_root.to_path_buf(),
        })
    }

    fn repo(&self) -> Result<git2::Repository> {
        Ok(git2::Repository::open(&self.repo_root)?)
    }

    /// Read `path` (repository-relative) as it reads at `revision` (e.g.
    /// `"HEAD"`). Empty-string content is returned for a path that is not
    /// present in the revision's tree only when the caller asks for it via
    /// [`Self::read_blob_or_empty`]; this method fails with
    /// [`Error::NotFoundInRevision`] instead, matching "open" semantics.
    pub fn read_blob(&self, path: &str, revision: &str) -> Result<String> {
        let repo = self.repo()?;
        let obj = repo
            .revparse_single(revision)
            .map_err(|_| Error::InvalidRevision)?;
        let commit = obj.peel_to_commit().map_err(|_| Error::InvalidRevision)?;
        let tree = commit.tree().map_err(|_| Error::InvalidRevision)?;

        let entry = tree
            .get_path(Path::new(path))
            .map_err(|_| Error::NotFoundInRevision(path.to_string()))?;
        let blob = entry
            .to_object(&repo)
            .and_then(|o| o.peel_to_blob())
            .map_err(|_| Error::NotFoundInRevision(path.to_string()))?;

        String::from_utf8(blob.content().to_vec())
            .map_err(|_| Error::NotFoundInRevision(path.to_string()))
    }

    /// Like [`Self::read_blob`] but treats "not present in this revision" as
    /// empty content instead of an error, used for committed-namespace
    /// opens and for re-reading entries after a HEAD change.
    pub fn read_blob_or_empty(&self, path: &str, revision: &str) -> Result<String> {
        match self.read_blob(path, revision) {
            Ok(content) => Ok(content),
            Err(Error::NotFoundInRevision(_)) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Stage everything respecting `.gitignore` and commit. A no-op (not an
    /// error) when the resulting tree equals HEAD's tree.
    pub fn stage_all_and_commit(&self, message: &str) -> Result<()> {
        let repo = self.repo()?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_oid = index.write_tree()?;
        let tree = repo.find_tree(tree_oid)?;

        let head_commit = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        if let Some(parent) = &head_commit {
            if parent.tree_id() == tree_oid {
                return Ok(());
            }
        }

        let signature = repo
            .signature()
            .or_else(|_| git2::Signature::now("syncd", "syncd@localhost"))?;

        let parents: Vec<&git2::Commit> = head_commit.iter().collect();
        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )
        .map_err(|e| Error::CommitFailed(e.message().to_string()))?;

        Ok(())
    }

    /// Resolve the current HEAD: commit id (empty if unborn) and the
    /// filesystem path of the file that should be watched for HEAD changes.
    pub fn resolve_head(&self) -> Result<HeadState> {
        let repo = self.repo()?;
        let git_dir = repo.path().to_path_buf();
        let head_file_path = git_dir.join("HEAD");

        let head_ref = repo.find_reference("HEAD")?;
        let ref_file_path = match head_ref.symbolic_target() {
            Some(target) => git_dir.join(target),
            None => head_file_path.clone(),
        };

        let commit_id = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .map(|c| c.id().to_string())
            .unwrap_or_default();

        Ok(HeadState {
            commit_id,
            head_file_path,
            ref_file_path,
        })
    }
}
