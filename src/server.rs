//! Transport & Server Loop.
//!
//! A TCP listener accepts connections and upgrades each to a WebSocket. Per
//! connection the server spawns one Session Multiplexer task bound to that
//! socket's split read/write halves, sharing one [`Registry`] handle. A
//! single Change Detector task, started once here and owned by a scoped
//! [`watcher::DetectorHandle`], feeds the same Registry for the lifetime of
//! the server. The accept loop itself never awaits a client: a slow or
//! wedged connection only delays its own task.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::session::protocol::ServerEvent;
use crate::session::{next_session_id, Session};
use crate::watcher;

/// Bind `settings.listen_addr`, start the Registry actor and the Change
/// Detector, and accept WebSocket connections until the process is killed.
pub async fn serve(settings: Settings) -> Result<()> {
    let registry = Registry::start(settings.repository_root.clone())?;
    let _detector = watcher::start(settings.repository_root.clone(), registry.clone())
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

    let listener = TcpListener::bind(settings.listen_addr).await?;
    tracing::info!(
        addr = %settings.listen_addr,
        repo = %settings.repository_root.display(),
        "syncd listening"
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, registry).await {
                tracing::warn!(%peer, error = %e, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, registry: Registry) -> Result<()> {
    stream.set_nodelay(true).ok();

    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    let (mut ws_write, mut ws_read) = ws.split();

    let id = next_session_id();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (mut session, subscriber) = Session::new(id, registry.clone(), event_tx);
    registry.register_subscriber(subscriber);

    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode server event");
                    continue;
                }
            };
            if ws_write.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    tracing::info!(session = id, %peer, "session connected");

    while let Some(msg) = ws_read.next().await {
        match msg {
            Ok(Message::Text(text)) => session.handle_frame(&text.to_string()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(session = id, error = %e, "transport read error");
                break;
            }
        }
    }

    session.teardown();
    writer.abort();
    tracing::info!(session = id, "session disconnected");
    Ok(())
}
