//! Inbound command handling: one decode at the boundary, then an exhaustive
//! match producing effects for the client loop to execute.
//!
//! Keeping this a pure function (message in, effects out) makes every
//! protocol rule – the self-echo guard, the registry rejection path, the
//! lifecycle transitions – testable without a socket. Duplicate delivery is
//! harmless by construction: the same message produces the same effects, and
//! every effect is idempotent or re-checked by the executor.

use tracing::{debug, warn};

use statewire_core::protocol::codec;
use statewire_core::{HistoryCommand, RelayMessage, SessionId, Value};

use crate::domain::ActionRegistry;

/// What the client loop should do in response to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Dispatch a registry-built action through the host's normal path.
    DispatchAction(Value),
    /// Forward a structural command to the host's history log.
    ApplyCommand(HistoryCommand),
    /// Transition to monitoring and relay one full filtered state snapshot.
    StartMonitoring,
    /// Transition to stopped; the transport stays open.
    StopMonitoring,
    /// Relay a fresh full filtered state snapshot.
    SendState,
    /// Answer the sender with an `ERROR` message.
    ReplyError(String),
}

/// Maps one inbound message to the effects it requires.
pub fn handle_inbound(
    message: RelayMessage,
    local_id: Option<&SessionId>,
    registry: &ActionRegistry,
) -> Vec<Effect> {
    match message {
        RelayMessage::Action { action, .. } => match eval_remote_action(&action, registry) {
            Ok(built) => vec![Effect::DispatchAction(built)],
            Err(reason) => {
                debug!("rejected remote action: {reason}");
                vec![Effect::ReplyError(reason)]
            }
        },

        RelayMessage::Dispatch { action, .. } => match decode_command(&action) {
            Ok(command) => vec![Effect::ApplyCommand(command)],
            Err(reason) => {
                warn!("ignoring malformed dispatch command: {reason}");
                Vec::new()
            }
        },

        RelayMessage::Import { id, payload } | RelayMessage::Sync { id, payload } => {
            // Self-echo guard: our own snapshot reflected back is a no-op.
            if id.as_ref() == local_id {
                debug!("ignoring self-originated history snapshot");
                Vec::new()
            } else {
                vec![Effect::ApplyCommand(HistoryCommand::ImportState { state: payload })]
            }
        }

        RelayMessage::Start { .. } => vec![Effect::StartMonitoring],
        RelayMessage::Update { .. } => vec![Effect::SendState],
        RelayMessage::Stop { .. } | RelayMessage::Disconnected { .. } => {
            vec![Effect::StopMonitoring]
        }

        // Master-originated kinds delivered back to a master carry nothing
        // actionable; the broadcast fabric makes them possible.
        RelayMessage::Init { .. } | RelayMessage::State { .. } | RelayMessage::Error { .. } => {
            debug!("ignoring {:?} message on master session", message.kind());
            Vec::new()
        }
    }
}

fn eval_remote_action(action_text: &str, registry: &ActionRegistry) -> Result<Value, String> {
    let request = codec::decode(action_text).map_err(|e| e.to_string())?;
    registry.eval_request(&request).map_err(|e| e.to_string())
}

fn decode_command(action_text: &str) -> Result<HistoryCommand, String> {
    let value = codec::decode(action_text).map_err(|e| e.to_string())?;
    let json = value.to_json().map_err(|e| e.to_string())?;
    serde_json::from_value(json).map_err(|e| e.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
