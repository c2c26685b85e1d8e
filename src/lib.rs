//! syncd: a collaborative file-synchronisation engine.
//!
//! Mediates between concurrent clients editing plain-text files in a git
//! working tree: clients subscribe to files by handle, push edits that are
//! reconciled by three-way textual merge, and stay live against external
//! changes (other clients, editors, branch switches, new commits) via a
//! filesystem watcher and a HEAD-pointer tracker.

pub mod atomic_write;
pub mod config;
pub mod error;
pub mod fanout;
pub mod merge;
pub mod path;
pub mod registry;
pub mod server;
pub mod session;
pub mod vcs;
pub mod watcher;
