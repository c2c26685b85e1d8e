//! File Registry and its owning actor task.
//!
//! The map of open files is mutated by exactly one task (the
//! [`RegistryActor`]), reached only through the cloneable [`Registry`]
//! handle. This gives every caller (Session Multiplexers, the Change
//! Detector) the "no registry state observed across a suspension without
//! re-checking" guarantee the concurrency model requires, without a
//! hand-rolled lock: every request is a message, processed one at a time.

pub mod entry;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::fanout::{FanOut, Subscriber};
use crate::vcs::{GitGateway, HeadState};

use entry::{File, Mtime, Name};

/// Opaque per-session identifier used to suppress self-notification.
pub type SessionId = u64;

/// `(session, handle)`: the origin of a write, used by the Watcher
/// Fan-out to exclude only that one handle from the broadcast.
pub type Source = (SessionId, String);

/// Kind of a raw filesystem event, already reduced from `notify`'s event
/// kinds to the three the Change Detector cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Deleted,
    AddedOrModified,
}

enum Command {
    Open {
        name: Name,
        reply: oneshot::Sender<Result<String>>,
    },
    Close {
        name: Name,
    },
    Write {
        name: Name,
        base: String,
        desired: String,
        source: Option<Source>,
        reply: oneshot::Sender<Result<String>>,
    },
    Edit {
        name: Name,
        f: Box<dyn FnOnce(&str) -> String + Send>,
        reply: oneshot::Sender<Result<()>>,
    },
    Commit {
        message: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RawFsEvent {
        relative: String,
        kind: FsEventKind,
    },
}

/// Cloneable handle onto the Registry actor.
#[derive(Clone)]
pub struct Registry {
    tx: mpsc::UnboundedSender<Command>,
    fanout: Arc<FanOut>,
    repository_root: PathBuf,
}

impl Registry {
    /// Start the actor and return a handle to it, along with the repository
    /// root it resolved its git gateway against.
    pub fn start(repository_root: PathBuf) -> Result<Self> {
        let gateway = GitGateway::open(&repository_root)?;
        let head = gateway.resolve_head()?;
        let fanout = Arc::new(FanOut::new());
        let (tx, rx) = mpsc::unbounded_channel();

        let actor = RegistryActor {
            rx,
            repository_root: repository_root.clone(),
            gateway,
            files: HashMap::new(),
            head,
            fanout: fanout.clone(),
        };
        tokio::spawn(actor.run());

        Ok(Registry {
            tx,
            fanout,
            repository_root,
        })
    }

    pub fn repository_root(&self) -> &std::path::Path {
        &self.repository_root
    }

    pub async fn open(&self, name: Name) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Open {
            name,
            reply: reply_tx,
        });
        await_reply(reply_rx).await
    }

    /// Fire-and-forget: ordering with prior/later requests is preserved by
    /// the channel, no reply is needed.
    pub fn close(&self, name: Name) {
        self.send(Command::Close { name });
    }

    pub async fn write(
        &self,
        name: Name,
        base: String,
        desired: String,
        source: Option<Source>,
    ) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Write {
            name,
            base,
            desired,
            source,
            reply: reply_tx,
        });
        await_reply(reply_rx).await
    }

    #[allow(dead_code)] // exposed for engine-internal callers; no wire command reaches it today
    pub async fn edit(&self, name: Name, f: impl FnOnce(&str) -> String + Send + 'static) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Edit {
            name,
            f: Box::new(f),
            reply: reply_tx,
        });
        await_reply(reply_rx).await
    }

    pub async fn commit(&self, message: String) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Commit {
            message,
            reply: reply_tx,
        });
        await_reply(reply_rx).await
    }

    pub(crate) fn raw_fs_event(&self, relative: String, kind: FsEventKind) {
        self.send(Command::RawFsEvent { relative, kind });
    }

    pub fn register_subscriber(&self, subscriber: Arc<dyn Subscriber>) {
        self.fanout.register(subscriber);
    }

    pub fn unregister_subscriber(&self, id: SessionId) {
        self.fanout.unregister(id);
    }

    fn send(&self, cmd: Command) {
        // The actor task only stops at process shutdown; an error here
        // would mean it already exited, which we tolerate silently like any
        // other best-effort delivery in this crate.
        let _ = self.tx.send(cmd);
    }
}

async fn await_reply<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
    // The actor never drops a reply sender without using it; a recv error
    // here would mean the actor task panicked, which we surface as an I/O
    // failure rather than unwrapping.
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(Error::Io(std::io::Error::other("registry actor stopped"))),
    }
}

struct RegistryActor {
    rx: mpsc::UnboundedReceiver<Command>,
    repository_root: PathBuf,
    gateway: GitGateway,
    files: HashMap<Name, File>,
    head: HeadState,
    fanout: Arc<FanOut>,
}

impl RegistryActor {
    async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                Command::Open { name, reply } => {
                    let result = self.handle_open(name).await;
                    let _ = reply.send(result);
                }
                Command::Close { name } => {
                    self.handle_close(&name);
                }
                Command::Write {
                    name,
                    base,
                    desired,
                    source,
                    reply,
                } => {
                    self.handle_write(name, base, desired, source, reply).await;
                }
                Command::Edit { name, f, reply } => {
                    let result = self.handle_edit(name, f).await;
                    let _ = reply.send(result);
                }
                Command::Commit { message, reply } => {
                    let result = self.gateway.stage_all_and_commit(&message);
                    let _ = reply.send(result);
                }
                Command::RawFsEvent { relative, kind } => {
                    self.handle_raw_fs_event(relative, kind).await;
                }
            }
        }
        tracing::info!("registry actor channel closed, shutting down");
    }

    async fn handle_open(&mut self, name: Name) -> Result<String> {
        if let Some(entry) = self.files.get_mut(&name) {
            entry.ref_count += 1;
            return Ok(entry.content.clone());
        }

        crate::path::validate(&self.repository_root, name.relative_path())?;

        let (content, mtime) = match &name {
            Name::Committed(path) => (self.gateway.read_blob(path, "HEAD")?, Mtime::ZERO),
            Name::Working(path) => {
                let abs = self.repository_root.join(path);
                let metadata = tokio::fs::metadata(&abs)
                    .await
                    .map_err(|_| Error::NotFound(path.clone()))?;
                let mtime =
                    Mtime::from_system_time(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH));
                let content = tokio::fs::read_to_string(&abs)
                    .await
                    .map_err(|_| Error::NotFound(path.clone()))?;
                (content, mtime)
            }
        };

        self.files.insert(name, File::new(content.clone(), mtime));
        Ok(content)
    }

    fn handle_close(&mut self, name: &Name) {
        if let Some(entry) = self.files.get_mut(name) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count == 0 {
                self.files.remove(name);
            }
        }
    }

    /// Reply to the writer before fanning out to peers: §5 requires the
    /// `file_written` reply to reach the writing handle before any
    /// `file_updated` delivered for the same write, so `reply` is sent as
    /// soon as the merged content is durable and cached, strictly before
    /// the fan-out's own await point starts.
    async fn handle_write(
        &mut self,
        name: Name,
        base: String,
        desired: String,
        source: Option<Source>,
        reply: oneshot::Sender<Result<String>>,
    ) {
        if name.is_committed() {
            let _ = reply.send(Err(Error::InvalidPath(name.wire())));
            return;
        }

        let current = match self.handle_open(name.clone()).await {
            Ok(content) => content,
            Err(Error::NotFound(_)) => String::new(),
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let merged = crate::merge::merge(&current, &base, &desired);

        let abs = self.repository_root.join(name.relative_path());
        let mtime = match crate::atomic_write::write(&abs, &merged).await {
            Ok(mtime) => mtime,
            Err(e) => {
                let _ = reply.send(Err(Error::from(e)));
                return;
            }
        };

        match self.files.get_mut(&name) {
            Some(entry) => {
                entry.content = merged.clone();
                entry.mtime = mtime;
            }
            None => {
                self.files.insert(name.clone(), File::new(merged.clone(), mtime));
            }
        }

        self.handle_close(&name);

        let _ = reply.send(Ok(merged.clone()));

        self.fanout
            .publish(&name, &merged, source.as_ref().map(|(sid, h)| (*sid, h.as_str())))
            .await;
    }

    async fn handle_edit(&mut self, name: Name, f: Box<dyn FnOnce(&str) -> String + Send>) -> Result<()> {
        let current = self.handle_open(name.clone()).await?;
        let new_content = f(&current);

        let abs = self.repository_root.join(name.relative_path());
        let mtime = crate::atomic_write::write(&abs, &new_content).await?;

        if let Some(entry) = self.files.get_mut(&name) {
            entry.content = new_content.clone();
            entry.mtime = mtime;
        }
        self.handle_close(&name);

        self.fanout.publish(&name, &new_content, None).await;
        Ok(())
    }

    fn is_git_internal(&self, relative: &str) -> bool {
        relative == ".git" || relative.starts_with(".git/")
    }

    async fn handle_raw_fs_event(&mut self, relative: String, kind: FsEventKind) {
        let abs = self.repository_root.join(&relative);

        if self.is_git_internal(&relative) {
            if abs == self.head.head_file_path || abs == self.head.ref_file_path {
                self.handle_head_change().await;
            }
            return;
        }

        let name = Name::Working(relative);
        if !self.files.contains_key(&name) {
            return;
        }

        match kind {
            FsEventKind::Deleted => {
                self.files.remove(&name);
                self.fanout.publish(&name, "", None).await;
            }
            FsEventKind::AddedOrModified => {
                let metadata = match tokio::fs::metadata(&abs).await {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(path = %abs.display(), error = %e, "stat failed after change event");
                        return;
                    }
                };
                let mtime =
                    Mtime::from_system_time(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH));
                if self.files.get(&name).map(|f| f.mtime) == Some(mtime) {
                    return; // spurious: our own write produced this event
                }

                let content = match tokio::fs::read_to_string(&abs).await {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(path = %abs.display(), error = %e, "read failed after change event");
                        return;
                    }
                };

                if let Some(entry) = self.files.get_mut(&name) {
                    entry.content = content.clone();
                    entry.mtime = mtime;
                }
                self.fanout.publish(&name, &content, None).await;
            }
        }
    }

    async fn handle_head_change(&mut self) {
        let new_head = match self.gateway.resolve_head() {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "resolve_head failed during head-change handling");
                return;
            }
        };
        if new_head.commit_id == self.head.commit_id {
            return;
        }
        self.head = new_head;

        let committed_names: Vec<Name> = self
            .files
            .keys()
            .filter(|n| n.is_committed())
            .cloned()
            .collect();

        for name in committed_names {
            let path = name.relative_path().to_string();
            let new_content = match self.gateway.read_blob_or_empty(&path, "HEAD") {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "blob re-read failed after head change");
                    continue;
                }
            };

            let changed = self
                .files
                .get(&name)
                .map(|f| f.content != new_content)
                .unwrap_or(false);
            if changed {
                if let Some(entry) = self.files.get_mut(&name) {
                    entry.content = new_content.clone();
                }
                self.fanout.publish(&name, &new_content, None).await;
            }
        }
    }
}
