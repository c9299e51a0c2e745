//! All statewire relay message types.
//!
//! A [`RelayMessage`] is the envelope that travels between the instrumented
//! application (the *master*), the broker, and any number of observers
//! (*monitors*). On the wire it is a flat JSON object discriminated by a
//! `"type"` field:
//!
//! ```json
//! {"type":"ACTION","id":"c1f3…","name":"checkout","action":"…","payload":"…",
//!  "nextActionId":7,"isExcess":true}
//! ```
//!
//! The `payload` and `action` fields carry codec-encoded text (see
//! [`crate::protocol::codec`]); everything else is a plain scalar. Unknown
//! `"type"` values are a deserialization error – they are rejected at the
//! boundary, never silently ignored.

use serde::{Deserialize, Serialize};

use crate::domain::session::SessionId;

/// Discriminant for a [`RelayMessage`], useful for logging and routing
/// decisions without matching every payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Init,
    Action,
    State,
    Start,
    Stop,
    Dispatch,
    Import,
    Sync,
    Update,
    Error,
    Disconnected,
}

// ── Relay envelope ────────────────────────────────────────────────────────────

/// All valid relay messages, discriminated by the wire `type` tag.
///
/// Outbound kinds (`INIT`, `ACTION`, `STATE`, `ERROR`) originate at the
/// master; the remaining kinds are control commands issued by monitors, plus
/// the broker-originated `DISCONNECTED` notice.
///
/// `id` is the originating session id. It is optional on master-originated
/// messages because a relay may fire before the login handshake has assigned
/// one (those are emitted on the `log-noid` event instead of `log`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE", rename_all_fields = "camelCase")]
pub enum RelayMessage {
    /// Master announces itself with its initial state.
    Init {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
        name: String,
        /// Codec-encoded current state.
        payload: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instance_id: Option<String>,
    },

    /// One host-dispatched action together with the state it produced –
    /// or, when sent by a monitor, a remote action request to be resolved
    /// against the master's action-creator registry (then `payload` and
    /// `nextActionId` are absent).
    Action {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
        name: String,
        /// Codec-encoded action value or creator request.
        action: String,
        /// Codec-encoded post-action state.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_action_id: Option<u64>,
        /// Sticky retention signal: true once the history has grown past the
        /// configured window, until the next stop/start cycle.
        #[serde(default, skip_serializing_if = "is_false")]
        is_excess: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instance_id: Option<String>,
    },

    /// Full filtered history snapshot.
    State {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
        name: String,
        /// Codec-encoded history.
        payload: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instance_id: Option<String>,
    },

    /// Monitor asks the master to begin relaying.
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
    },

    /// Monitor asks the master to stop relaying.
    Stop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
    },

    /// Monitor submits a structural history command (reset, jump, toggle,
    /// sweep, import). The command is codec-encoded in `action`.
    Dispatch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
        /// Codec-encoded [`HistoryCommand`].
        action: String,
    },

    /// Monitor pushes a foreign history snapshot to replace the master's.
    Import {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
        /// Codec-encoded history.
        payload: String,
    },

    /// Like `IMPORT`, but emitted when synchronizing several monitors; the
    /// master applies it only when the embedded id is not its own.
    Sync {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
        /// Codec-encoded history.
        payload: String,
    },

    /// Monitor requests a fresh `STATE` relay (e.g. after a reconnect).
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
    },

    /// Error notification; the only error path that crosses back to a
    /// remote party.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Codec-encoded error text.
        payload: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instance_id: Option<String>,
    },

    /// Broker notice that a session's transport dropped.
    Disconnected { id: SessionId },
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl RelayMessage {
    /// Returns the [`MessageKind`] discriminant for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            RelayMessage::Init { .. } => MessageKind::Init,
            RelayMessage::Action { .. } => MessageKind::Action,
            RelayMessage::State { .. } => MessageKind::State,
            RelayMessage::Start { .. } => MessageKind::Start,
            RelayMessage::Stop { .. } => MessageKind::Stop,
            RelayMessage::Dispatch { .. } => MessageKind::Dispatch,
            RelayMessage::Import { .. } => MessageKind::Import,
            RelayMessage::Sync { .. } => MessageKind::Sync,
            RelayMessage::Update { .. } => MessageKind::Update,
            RelayMessage::Error { .. } => MessageKind::Error,
            RelayMessage::Disconnected { .. } => MessageKind::Disconnected,
        }
    }

    /// The session id embedded in the message, when present.
    ///
    /// Used for the self-echo guard on `IMPORT`/`SYNC`.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            RelayMessage::Init { id, .. }
            | RelayMessage::Action { id, .. }
            | RelayMessage::State { id, .. }
            | RelayMessage::Start { id, .. }
            | RelayMessage::Stop { id, .. }
            | RelayMessage::Dispatch { id, .. }
            | RelayMessage::Import { id, .. }
            | RelayMessage::Sync { id, .. }
            | RelayMessage::Update { id, .. }
            | RelayMessage::Error { id, .. } => id.as_ref(),
            RelayMessage::Disconnected { id } => Some(id),
        }
    }
}

// ── Structural history commands ───────────────────────────────────────────────

/// Commands carried by a `DISPATCH` message, forwarded unchanged to the
/// host's history log.
///
/// The wire form is a tagged JSON object, e.g.
/// `{"type":"JUMP_TO_STATE","index":3}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryCommand {
    /// Drop all staged records.
    Reset,
    /// Move the current-state pointer to `index`.
    JumpToState { index: usize },
    /// Flip the skipped flag on one record.
    ToggleAction { id: u64 },
    /// Remove all skipped records.
    Sweep,
    /// Replace the whole history with a codec-encoded snapshot.
    ImportState { state: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
