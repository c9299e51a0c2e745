//! Socket frames: the transport sub-protocol between clients and the broker.
//!
//! Each WebSocket text frame carries exactly one JSON object discriminated by
//! a `"frame"` field. Two separate enums – one per direction – make it a
//! compile-time error to send a broker-only frame from a client or vice
//! versa.
//!
//! # Channel scheme
//!
//! One naming scheme is used system-wide:
//!
//! - [`CONTROL_CHANNEL`] (`respond`) – master-bound commands; the master
//!   subscribes here after login.
//! - [`EVENT_CHANNEL`] (`log`) – monitor-bound events; every monitor
//!   subscribes here.
//! - `sc-<connection id>` – one private channel per connection, created at
//!   connect and destroyed at disconnect.
//!
//! The client-side emit events [`EMIT_LOG`] and [`EMIT_LOG_NOID`] both
//! publish to the event channel; `log-noid` marks messages relayed before
//! the login handshake assigned a session id.

use serde::{Deserialize, Serialize};

use crate::domain::session::SessionId;
use crate::protocol::messages::RelayMessage;

/// Broadcast channel carrying commands bound for the master.
pub const CONTROL_CHANNEL: &str = "respond";

/// Broadcast channel carrying events bound for monitors.
pub const EVENT_CHANNEL: &str = "log";

/// Prefix of per-connection private channels.
pub const PRIVATE_CHANNEL_PREFIX: &str = "sc-";

/// Emit event for relays carrying an assigned session id.
pub const EMIT_LOG: &str = "log";

/// Emit event for relays sent before login assigned an id.
pub const EMIT_LOG_NOID: &str = "log-noid";

/// Role token sent in a login frame by the instrumented application.
pub const MASTER_ROLE: &str = "master";

/// Builds the private channel name for a connection id.
pub fn private_channel(id: &SessionId) -> String {
    format!("{PRIVATE_CHANNEL_PREFIX}{}", id.as_str())
}

/// Returns true when `channel` is one the broker routes: a reserved
/// broadcast channel or a per-connection private channel.
pub fn is_routable(channel: &str) -> bool {
    channel == CONTROL_CHANNEL
        || channel == EVENT_CHANNEL
        || channel.starts_with(PRIVATE_CHANNEL_PREFIX)
}

// ── Client → broker ───────────────────────────────────────────────────────────

/// All frames a client may send to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Login RPC request. Any role token other than [`MASTER_ROLE`] is a
    /// monitor.
    Login { role: String },
    /// Subscribe this connection to a channel.
    Subscribe { channel: String },
    /// Drop this connection's subscription to a channel.
    Unsubscribe { channel: String },
    /// Named emit; the broker maps the event to its target channel.
    Emit { event: String, message: RelayMessage },
    /// Publish directly to a channel.
    Publish { channel: String, message: RelayMessage },
}

// ── Broker → client ───────────────────────────────────────────────────────────

/// All frames the broker may send to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Login RPC response: `(error | null, channel name)` plus the session
    /// id assigned to this connection.
    LoginAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        session_id: SessionId,
    },
    /// A message delivered on a subscribed channel.
    Push { channel: String, message: RelayMessage },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_frame_round_trips() {
        let frame = ClientFrame::Login { role: MASTER_ROLE.to_string() };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""frame":"login""#));
        let decoded: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_emit_frame_round_trips() {
        let frame = ClientFrame::Emit {
            event: EMIT_LOG.to_string(),
            message: RelayMessage::Update { id: None },
        };
        let json = serde_json::to_string(&frame).unwrap();
        let decoded: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_login_ack_omits_absent_error() {
        let frame = ServerFrame::LoginAck {
            error: None,
            channel: Some(CONTROL_CHANNEL.to_string()),
            session_id: SessionId::new("c-1"),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("error"));
        assert!(json.contains(r#""channel":"respond""#));
    }

    #[test]
    fn test_push_frame_round_trips() {
        let frame = ServerFrame::Push {
            channel: EVENT_CHANNEL.to_string(),
            message: RelayMessage::Disconnected { id: SessionId::new("c-2") },
        };
        let json = serde_json::to_string(&frame).unwrap();
        let decoded: ServerFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_unknown_frame_is_rejected() {
        let json = r#"{"frame":"teleport"}"#;
        let result: Result<ClientFrame, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_private_channel_name() {
        assert_eq!(private_channel(&SessionId::new("abc")), "sc-abc");
    }

    #[test]
    fn test_is_routable() {
        assert!(is_routable(CONTROL_CHANNEL));
        assert!(is_routable(EVENT_CHANNEL));
        assert!(is_routable("sc-12345"));
        assert!(!is_routable("random-channel"));
    }
}
