//! Broker connection supervisor.
//!
//! One Tokio task owns the WebSocket for the lifetime of the client. It
//! waits for a `Connect` request, dials the broker, performs the login
//! handshake, and then shuttles frames in both directions: outbound
//! [`SocketRequest`]s become [`ClientFrame`]s, inbound [`ServerFrame`]s
//! become [`ClientCommand`]s on the client loop's queue.
//!
//! Transport failures never reach the host application. Each distinct error
//! kind is logged once (repeats are demoted to debug) until a successful
//! connect clears the memory, and reconnection follows a jittered
//! exponential-ish backoff. After a reconnect the login handshake repeats
//! and subscriptions are rebuilt from scratch; nothing buffered before the
//! disconnect is replayed.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, warn};

use statewire_core::protocol::frames::{ClientFrame, ServerFrame, MASTER_ROLE};
use statewire_core::{RelayMessage, SessionId};

use crate::infrastructure::client::ClientCommand;

/// Base delay of the reconnect backoff.
const BACKOFF_BASE_MS: u64 = 1_000;

/// Ceiling of the deterministic part of the backoff.
const BACKOFF_CAP_MS: u64 = 30_000;

/// Requests from the client loop to the connection supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketRequest {
    /// Dial the broker (no-op when already connected).
    Connect,
    /// Emit a relay message under a named event.
    Emit { event: String, message: RelayMessage },
    /// Subscribe to a channel.
    Subscribe { channel: String },
    /// Drop a channel subscription.
    Unsubscribe { channel: String },
    /// Close the transport and wait for the next `Connect`.
    Close,
}

/// Connection lifecycle notifications for the client loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Login handshake completed; the broker assigned this identity.
    LoggedIn { session_id: SessionId, channel: String },
    /// The broker rejected the login; the relay stays disabled.
    LoginFailed(String),
    /// The transport dropped or was closed.
    Disconnected,
}

/// Connection settings extracted from the relay configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub url: String,
    pub auto_reconnect: bool,
    pub jitter_ms: u64,
}

/// Spawns the supervisor task; returns the request sender.
pub fn spawn(
    config: SocketConfig,
    commands: mpsc::UnboundedSender<ClientCommand>,
) -> mpsc::UnboundedSender<SocketRequest> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(config, commands, rx));
    tx
}

async fn run(
    config: SocketConfig,
    commands: mpsc::UnboundedSender<ClientCommand>,
    mut requests: mpsc::UnboundedReceiver<SocketRequest>,
) {
    let mut logged_kinds: HashSet<String> = HashSet::new();

    'idle: loop {
        // Disconnected: wait until the client asks for a connection.
        loop {
            match requests.recv().await {
                None => return,
                Some(SocketRequest::Connect) => break,
                Some(other) => debug!("socket request while disconnected (dropped): {other:?}"),
            }
        }

        let mut attempt: u32 = 0;
        'connect: loop {
            let ws = match connect_async(config.url.as_str()).await {
                Ok((ws, _response)) => ws,
                Err(error) => {
                    log_once(&mut logged_kinds, &error);
                    if !config.auto_reconnect {
                        notify(&commands, SocketEvent::Disconnected);
                        continue 'idle;
                    }
                    tokio::time::sleep(backoff_delay(attempt, config.jitter_ms)).await;
                    attempt = attempt.saturating_add(1);
                    continue 'connect;
                }
            };
            attempt = 0;
            logged_kinds.clear();

            let (mut sink, mut stream) = ws.split();

            // The login handshake opens every connection, including
            // reconnects.
            let login = ClientFrame::Login { role: MASTER_ROLE.to_string() };
            if let Err(error) = send_frame(&mut sink, &login).await {
                log_once(&mut logged_kinds, &error);
            } else {
                // Connected frame loop; ends on transport failure or Close.
                loop {
                    tokio::select! {
                        request = requests.recv() => match request {
                            None => {
                                let _ = sink.close().await;
                                return;
                            }
                            Some(SocketRequest::Close) => {
                                let _ = sink.close().await;
                                continue 'idle;
                            }
                            Some(SocketRequest::Connect) => {}
                            Some(request) => {
                                let frame = request_frame(request);
                                if let Err(error) = send_frame(&mut sink, &frame).await {
                                    log_once(&mut logged_kinds, &error);
                                    break;
                                }
                            }
                        },
                        incoming = stream.next() => match incoming {
                            Some(Ok(WsMessage::Text(text))) => handle_text(&text, &commands),
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                            Some(Err(error)) => {
                                log_once(&mut logged_kinds, &error);
                                break;
                            }
                        },
                    }
                }
            }

            notify(&commands, SocketEvent::Disconnected);
            if !config.auto_reconnect {
                continue 'idle;
            }
            tokio::time::sleep(backoff_delay(attempt, config.jitter_ms)).await;
            attempt = attempt.saturating_add(1);
        }
    }
}

// ── Frame plumbing ────────────────────────────────────────────────────────────

fn request_frame(request: SocketRequest) -> ClientFrame {
    match request {
        SocketRequest::Emit { event, message } => ClientFrame::Emit { event, message },
        SocketRequest::Subscribe { channel } => ClientFrame::Subscribe { channel },
        SocketRequest::Unsubscribe { channel } => ClientFrame::Unsubscribe { channel },
        // Connect and Close are handled by the supervisor loop itself.
        SocketRequest::Connect | SocketRequest::Close => {
            unreachable!("lifecycle requests never become frames")
        }
    }
}

async fn send_frame<S>(sink: &mut S, frame: &ClientFrame) -> Result<(), WsError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    // ClientFrame serialization is infallible: plain enums and strings.
    let json = serde_json::to_string(frame).unwrap_or_default();
    sink.send(WsMessage::Text(json)).await
}

fn handle_text(text: &str, commands: &mpsc::UnboundedSender<ClientCommand>) {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(ServerFrame::LoginAck { error: Some(error), .. }) => {
            notify(commands, SocketEvent::LoginFailed(error));
        }
        Ok(ServerFrame::LoginAck { error: None, channel: Some(channel), session_id }) => {
            notify(commands, SocketEvent::LoggedIn { session_id, channel });
        }
        Ok(ServerFrame::LoginAck { error: None, channel: None, .. }) => {
            notify(
                commands,
                SocketEvent::LoginFailed("login response carried no channel".to_string()),
            );
        }
        Ok(ServerFrame::Push { message, .. }) => {
            let _ = commands.send(ClientCommand::Inbound(message));
        }
        Err(error) => warn!("undecodable frame from broker: {error}"),
    }
}

fn notify(commands: &mpsc::UnboundedSender<ClientCommand>, event: SocketEvent) {
    let _ = commands.send(ClientCommand::SocketEvent(event));
}

// ── Failure bookkeeping ───────────────────────────────────────────────────────

/// Logs a connection error at warn level the first time its kind is seen,
/// and at debug level after that. The kind memory is cleared on a
/// successful connect.
fn log_once(logged_kinds: &mut HashSet<String>, error: &WsError) {
    let kind = error_kind(error);
    if logged_kinds.insert(kind.clone()) {
        warn!("broker connection error ({kind}): {error}");
    } else {
        debug!("broker connection error ({kind}): {error}");
    }
}

/// Buckets transport errors into coarse kinds for once-per-kind logging.
fn error_kind(error: &WsError) -> String {
    match error {
        WsError::Io(io) => format!("io:{:?}", io.kind()),
        WsError::ConnectionClosed | WsError::AlreadyClosed => "closed".to_string(),
        WsError::Protocol(_) => "protocol".to_string(),
        WsError::Url(_) => "url".to_string(),
        WsError::Http(_) | WsError::HttpFormat(_) => "http".to_string(),
        _ => "other".to_string(),
    }
}

/// Exponential-ish backoff with a uniform jitter window: 1s, 2s, 4s … capped
/// at 30s, plus up to `jitter_ms` of randomness.
fn backoff_delay(attempt: u32, jitter_ms: u64) -> Duration {
    let base = BACKOFF_BASE_MS
        .saturating_mul(1u64 << attempt.min(5))
        .min(BACKOFF_CAP_MS);
    let jitter = if jitter_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..jitter_ms) };
    Duration::from_millis(base + jitter)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
