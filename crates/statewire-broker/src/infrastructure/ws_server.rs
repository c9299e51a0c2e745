//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections and upgrading them to WebSocket.
//! 3. Registering each connection with the shared [`Router`] under a fresh
//!    connection id.
//! 4. Running two halves per connection: a writer task draining the
//!    connection's frame queue, and an inline read loop feeding decoded
//!    [`ClientFrame`]s into the router.
//! 5. Tearing the connection down on close or error, which destroys its
//!    private channel and announces `DISCONNECTED` on the event channel.
//! 6. Shutting down gracefully when the `running` flag is cleared.
//!
//! The router itself never awaits: deliveries are non-blocking sends into
//! per-connection queues, so it sits behind a plain mutex held only for the
//! duration of one bookkeeping call.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use statewire_core::protocol::frames::ClientFrame;
use statewire_core::SessionId;

use crate::application::Router;
use crate::domain::BrokerConfig;

/// Shared router handle.
pub type SharedRouter = Arc<Mutex<Router>>;

/// Runs the accept loop until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(config: BrokerConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind broker listener on {}", config.bind_addr))?;

    info!("statewire broker listening on {}", config.bind_addr);
    let router: SharedRouter = Arc::new(Mutex::new(Router::new()));

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the loop can observe the shutdown flag even when
        // nothing is connecting.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, router).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error; keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {
                // Timeout; loop back to check the flag.
            }
        }
    }

    Ok(())
}

// ── Per-connection handling ───────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, router: SharedRouter) {
    match run_connection(stream, peer_addr, router).await {
        Ok(id) => info!("connection {id} ({peer_addr}) closed"),
        Err(e) => warn!("connection {peer_addr} failed: {e:#}"),
    }
}

/// Runs one connection from WebSocket upgrade to disconnect cleanup.
async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    router: SharedRouter,
) -> anyhow::Result<SessionId> {
    let ws = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    // The connection id doubles as the session id handed out at login.
    let id = SessionId::new(uuid::Uuid::new_v4().to_string());
    info!("connection {id} established from {peer_addr}");

    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    router.lock().expect("router lock").connect(id.clone(), tx.clone());

    // Writer: drains the connection's frame queue into the socket.
    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            // ServerFrame serialization is infallible: enums and strings.
            let json = serde_json::to_string(&frame).unwrap_or_default();
            if sink.send(WsMessage::Text(json)).await.is_err() {
                debug!("connection {writer_id}: write failed (peer gone)");
                break;
            }
        }
    });

    // Reader: decode frames and drive the router.
    while let Some(incoming) = stream.next().await {
        let text = match incoming {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue, // ping/pong/binary: nothing to route
            Err(e) => {
                debug!("connection {id}: read error: {e}");
                break;
            }
        };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                // One bad frame does not kill the connection; the sender
                // may be probing or buggy, and rejecting is enough.
                warn!("connection {id}: undecodable frame: {e}");
                continue;
            }
        };

        let mut router = router.lock().expect("router lock");
        match frame {
            ClientFrame::Login { role } => {
                let ack = router.login(&id, &role);
                let _ = tx.send(ack);
            }
            ClientFrame::Subscribe { channel } => {
                if let Err(e) = router.subscribe(&id, &channel) {
                    warn!("connection {id}: subscribe failed: {e}");
                }
            }
            ClientFrame::Unsubscribe { channel } => router.unsubscribe(&id, &channel),
            ClientFrame::Emit { event, message } => {
                router.emit(&id, &event, message);
            }
            ClientFrame::Publish { channel, message } => {
                router.publish(&id, &channel, message);
            }
        }
    }

    // Cleanup: destroys the private channel and announces DISCONNECTED.
    router.lock().expect("router lock").disconnect(&id);
    drop(tx);
    writer.abort();
    Ok(id)
}
