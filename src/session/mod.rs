//! Session Multiplexer: one per client connection.
//!
//! Owns the handle table for its connection (`handle -> Name`) and the
//! inverse index (`Name -> handles`) the Watcher Fan-out needs to decide
//! which of this session's own handles should receive a `file_updated`.
//! Dispatches parsed commands onto the [`crate::registry::Registry`] and
//! turns every outcome, success or failure, into a [`ServerEvent`] pushed
//! onto `event_tx` for the connection's writer task to send.

pub mod protocol;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::fanout::Subscriber;
use crate::registry::entry::Name;
use crate::registry::{Registry, SessionId};

use protocol::{Command, ServerEvent};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_session_id() -> SessionId {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// The `Name -> handles` inverse index, shared between the [`Session`] (which
/// mutates it on open/close) and the [`SessionSubscriber`] registered with
/// the fan-out (which only reads it, possibly from a different task).
#[derive(Default)]
struct Shared {
    names: Mutex<HashMap<Name, HashSet<String>>>,
}

pub struct Session {
    id: SessionId,
    registry: Registry,
    handles: HashMap<String, Name>,
    shared: Arc<Shared>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
}

/// The fan-out-facing half of a session: cheap to clone into an
/// `Arc<dyn Subscriber>` without sharing mutable access to the [`Session`]
/// itself.
pub struct SessionSubscriber {
    id: SessionId,
    shared: Arc<Shared>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
}

impl Session {
    /// Build a session and its paired subscriber handle. The caller is
    /// responsible for registering the subscriber with the registry and for
    /// calling [`Session::teardown`] when the connection ends.
    pub fn new(
        id: SessionId,
        registry: Registry,
        event_tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> (Self, Arc<SessionSubscriber>) {
        let shared = Arc::new(Shared::default());
        let subscriber = Arc::new(SessionSubscriber {
            id,
            shared: shared.clone(),
            event_tx: event_tx.clone(),
        });
        let session = Session {
            id,
            registry,
            handles: HashMap::new(),
            shared,
            event_tx,
        };
        (session, subscriber)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub async fn handle_frame(&mut self, raw: &str) {
        match protocol::parse_command(raw) {
            Ok(cmd) => self.dispatch(cmd).await,
            Err(e) => self.send_error(e),
        }
    }

    async fn dispatch(&mut self, cmd: Command) {
        let result = match cmd {
            Command::OpenFile { path, handle } => self.open_file(path, handle).await,
            Command::CloseFile { handle } => self.close_file(handle).await,
            Command::WriteFile {
                handle,
                last_content,
                new_content,
            } => self.write_file(handle, last_content, new_content).await,
            Command::Commit { message } => self.commit(message).await,
        };
        if let Err(e) = result {
            self.send_error(e);
        }
    }

    async fn open_file(&mut self, path: String, handle: String) -> Result<()> {
        if self.handles.contains_key(&handle) {
            return Err(Error::HandleInUse(handle));
        }
        let name = Name::parse(&path);
        let content = self.registry.open(name.clone()).await?;

        self.handles.insert(handle.clone(), name.clone());
        self.shared
            .names
            .lock()
            .unwrap()
            .entry(name)
            .or_default()
            .insert(handle.clone());

        self.send(ServerEvent::FileOpened {
            path,
            handle,
            content,
        });
        Ok(())
    }

    async fn close_file(&mut self, handle: String) -> Result<()> {
        let name = self
            .handles
            .remove(&handle)
            .ok_or_else(|| Error::UnknownHandle(handle.clone()))?;

        let mut names = self.shared.names.lock().unwrap();
        if let Some(set) = names.get_mut(&name) {
            set.remove(&handle);
            if set.is_empty() {
                names.remove(&name);
            }
        }
        drop(names);

        self.registry.close(name);
        self.send(ServerEvent::FileClosed { handle });
        Ok(())
    }

    async fn write_file(&mut self, handle: String, last_content: String, new_content: String) -> Result<()> {
        let name = self
            .handles
            .get(&handle)
            .cloned()
            .ok_or_else(|| Error::UnknownHandle(handle.clone()))?;

        let written = self
            .registry
            .write(name, last_content, new_content, Some((self.id, handle.clone())))
            .await?;

        self.send(ServerEvent::FileWritten {
            handle,
            content: written,
        });
        Ok(())
    }

    async fn commit(&mut self, message: String) -> Result<()> {
        if message.is_empty() {
            return Err(Error::MissingField("message"));
        }
        self.registry.commit(message).await?;
        self.send(ServerEvent::Committed {});
        Ok(())
    }

    /// Release every handle this session still holds, on disconnect.
    pub fn teardown(&mut self) {
        for (_, name) in self.handles.drain() {
            self.registry.close(name);
        }
        self.shared.names.lock().unwrap().clear();
        self.registry.unregister_subscriber(self.id);
    }

    fn send(&self, event: ServerEvent) {
        // Best-effort: if the writer task's receiver is gone the connection
        // is already tearing down.
        let _ = self.event_tx.send(event);
    }

    fn send_error(&self, err: Error) {
        tracing::warn!(session = self.id, error = %err, "command failed");
        let path = err.path().map(str::to_string);
        self.send(ServerEvent::Error {
            message: err.to_string(),
            path,
        });
    }
}

/// Registered with the Fan-out instead of [`Session`] itself: delivery can
/// race the session's own command loop, so it only ever touches the shared
/// inverse index and a cloned event sender, never the session's exclusively
/// owned handle table.
#[async_trait]
impl Subscriber for SessionSubscriber {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn deliver(&self, name: &Name, content: &str, source_handle: Option<&str>) {
        let handles: Vec<String> = {
            let names = self.shared.names.lock().unwrap();
            match names.get(name) {
                Some(set) => set.iter().cloned().collect(),
                None => return,
            }
        };
        for handle in handles {
            if Some(handle.as_str()) == source_handle {
                continue;
            }
            let _ = self.event_tx.send(ServerEvent::FileUpdated {
                handle,
                content: content.to_string(),
            });
        }
    }
}
