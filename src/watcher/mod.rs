//! Change Detector: the filesystem-watching half.
//!
//! Translates raw `notify` events into repository-relative paths and forwards
//! them to the Registry actor, which owns the classification rules (internal
//! vs tracked vs untracked, spurious-event short-circuit, HEAD-change
//! procedure) because it alone holds the state those rules depend on.

use std::path::PathBuf;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::registry::{FsEventKind, Registry};

/// Owns the live `notify` watcher and the forwarding task. Dropping this
/// stops the watch and aborts the forwarding task.
pub struct DetectorHandle {
    _watcher: RecommendedWatcher,
    join: JoinHandle<()>,
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}

/// Start watching `repository_root` recursively, forwarding every event into
/// `registry`.
pub fn start(repository_root: PathBuf, registry: Registry) -> notify::Result<DetectorHandle> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(&repository_root, RecursiveMode::Recursive)?;

    let root = repository_root;
    let join = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let kind = match event.kind {
                EventKind::Remove(_) => FsEventKind::Deleted,
                EventKind::Create(_) | EventKind::Modify(_) => FsEventKind::AddedOrModified,
                _ => continue,
            };
            for path in event.paths {
                let Ok(relative) = path.strip_prefix(&root) else {
                    continue;
                };
                if relative.as_os_str().is_empty() {
                    continue;
                }
                let relative = relative.to_string_lossy().replace('\\', "/");
                registry.raw_fs_event(relative, kind);
            }
        }
        tracing::info!("change detector forwarding loop stopped");
    });

    Ok(DetectorHandle {
        _watcher: watcher,
        join,
    })
}
