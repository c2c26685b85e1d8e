//! Watcher Fan-out.
//!
//! A single notification hook the Registry calls after every mutation.
//! Subscribers are Session Multiplexers; each one owns its own name-to-handle
//! inverse index and decides which of its handles actually receive a
//! `file_updated` event. This module only decides who gets called and with
//! what `source_handle` exclusion.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::registry::entry::Name;
use crate::registry::SessionId;

#[async_trait]
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SessionId;

    /// Deliver `content` for `name`. `source_handle` is set only when this
    /// subscriber originated the write, naming the one handle that should
    /// not receive a self-notification.
    async fn deliver(&self, name: &Name, content: &str, source_handle: Option<&str>);
}

#[derive(Default)]
pub struct FanOut {
    subscribers: Mutex<Vec<Arc<dyn Subscriber>>>,
}

impl FanOut {
    pub fn new() -> Self {
        FanOut::default()
    }

    pub fn register(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.lock().unwrap().push(subscriber);
    }

    pub fn unregister(&self, id: SessionId) {
        self.subscribers.lock().unwrap().retain(|s| s.id() != id);
    }

    pub async fn publish(&self, name: &Name, content: &str, source: Option<(SessionId, &str)>) {
        let snapshot: Vec<Arc<dyn Subscriber>> = self.subscribers.lock().unwrap().clone();

        for subscriber in snapshot {
            let source_handle = match source {
                Some((sid, handle)) if sid == subscriber.id() => Some(handle),
                _ => None,
            };
            subscriber.deliver(name, content, source_handle).await;
        }
    }
}
