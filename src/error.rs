//! Crate-wide error type.
//!
//! Every variant here corresponds to one of the wire-level error kinds the
//! [`crate::session`] layer converts into an `error` frame. Nothing below the
//! session layer is allowed to panic on a bad client request; lower-layer
//! failures flow up through `From` impls into this enum instead.

use std::path::PathBuf;

/// A single crate-wide error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A client-supplied path failed [`crate::path::validate`].
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Working-tree file absent on open.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Committed-namespace file absent at the current revision.
    #[error("file not found in revision: {0}")]
    NotFoundInRevision(String),

    /// The git backend rejected the requested revision.
    #[error("invalid revision")]
    InvalidRevision,

    /// `open_file` requested a handle already live on the session.
    #[error("handle already in use: {0}")]
    HandleInUse(String),

    /// `close_file` / `write_file` named a handle the session does not hold.
    #[error("unknown handle: {0}")]
    UnknownHandle(String),

    /// A command was missing a field required by its type.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The `type` tag on an inbound frame did not match a known command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// `commit` was requested with a non-empty change set but git failed.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// The atomic writer failed; on-disk and cached state are unchanged.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-frame decoding/encoding failure.
    #[error("protocol error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The git backend reported a failure not covered by a more specific
    /// variant above.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Reference-relative path this error is about, if any; carried on the
    /// wire `error` frame's optional `path` field.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::InvalidPath(p) | Error::NotFound(p) | Error::NotFoundInRevision(p) => {
                Some(p.as_str())
            }
            _ => None,
        }
    }
}

/// Repository root failed validation during [`crate::config::Settings`] construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("repository path does not exist: {0}")]
    RootMissing(PathBuf),
    #[error("repository path is not a directory: {0}")]
    RootNotDir(PathBuf),
    #[error("path is not a git repository: {0}")]
    NotAGitRepo(PathBuf),
    #[error("invalid listen address: {0}")]
    InvalidAddr(String),
}
