//! Relay message construction: filter application, codec encoding, and
//! excess signaling.
//!
//! These are pure functions over the session, the configured filter, and the
//! host's history – the infrastructure layer decides when to call them and
//! where the result goes.

use statewire_core::protocol::codec::{self, Value};
use statewire_core::{ActionRecord, Filter, History, RelayMessage, Session};

/// Identity stamped on every outbound message.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Display name shown by monitors.
    pub name: String,
    /// Client-minted id distinguishing co-hosted stores.
    pub instance_id: String,
}

/// Builds the `ACTION` message for one appended record, or `None` when the
/// filter excludes it (a silent drop).
pub fn action_message(
    identity: &Identity,
    session: &Session,
    filter: &Filter,
    record: &ActionRecord,
    state: &Value,
) -> Option<RelayMessage> {
    if !filter.allows(record.action_type()) {
        return None;
    }
    Some(RelayMessage::Action {
        id: session.id().cloned(),
        name: identity.name.clone(),
        action: codec::encode(&record.action),
        payload: Some(codec::encode(state)),
        next_action_id: Some(record.id),
        is_excess: session.is_excess(),
        instance_id: Some(identity.instance_id.clone()),
    })
}

/// Builds the `STATE` message carrying the full filtered history.
pub fn state_message(
    identity: &Identity,
    session: &Session,
    filter: &Filter,
    history: &History,
) -> RelayMessage {
    RelayMessage::State {
        id: session.id().cloned(),
        name: identity.name.clone(),
        payload: codec::encode(&history.filtered(filter).to_value()),
        instance_id: Some(identity.instance_id.clone()),
    }
}

/// Builds the `INIT` message announcing this master with its current state.
pub fn init_message(identity: &Identity, session: &Session, state: &Value) -> RelayMessage {
    RelayMessage::Init {
        id: session.id().cloned(),
        name: identity.name.clone(),
        payload: codec::encode(state),
        instance_id: Some(identity.instance_id.clone()),
    }
}

/// Builds the `ERROR` message carrying an error text.
pub fn error_message(identity: &Identity, session: &Session, text: &str) -> RelayMessage {
    RelayMessage::Error {
        id: session.id().cloned(),
        name: Some(identity.name.clone()),
        payload: codec::encode(&Value::from(text)),
        instance_id: Some(identity.instance_id.clone()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use statewire_core::{Role, SessionId, Snapshot};

    fn identity() -> Identity {
        Identity { name: "demo".to_string(), instance_id: "inst-1".to_string() }
    }

    fn logged_in_session() -> Session {
        let mut session = Session::new(Role::Master);
        session.begin_connecting();
        session.complete_login(SessionId::new("c-1"), "respond".to_string());
        session
    }

    fn record(kind: &str, id_hint: u64) -> ActionRecord {
        ActionRecord {
            id: id_hint,
            action: Value::object([("type", Value::from(kind))]),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_action_message_carries_record_id_and_identity() {
        let msg = action_message(
            &identity(),
            &logged_in_session(),
            &Filter::default(),
            &record("INCREMENT", 4),
            &Value::object([("count", Value::from(4_i64))]),
        )
        .expect("unfiltered record must relay");

        let RelayMessage::Action { id, name, next_action_id, is_excess, instance_id, .. } = msg
        else {
            panic!("wrong variant");
        };
        assert_eq!(id.as_ref().map(SessionId::as_str), Some("c-1"));
        assert_eq!(name, "demo");
        assert_eq!(next_action_id, Some(4));
        assert!(!is_excess);
        assert_eq!(instance_id.as_deref(), Some("inst-1"));
    }

    #[test]
    fn test_filtered_action_is_dropped_silently() {
        let filter = Filter::new(None, vec!["NOISE".to_string()]);
        let msg = action_message(
            &identity(),
            &logged_in_session(),
            &filter,
            &record("NOISE_TICK", 1),
            &Value::Null,
        );
        assert!(msg.is_none());
    }

    #[test]
    fn test_action_message_reflects_excess_flag() {
        let mut session = logged_in_session();
        session.mark_excess();
        let msg = action_message(
            &identity(),
            &session,
            &Filter::default(),
            &record("ANY", 31),
            &Value::Null,
        )
        .unwrap();
        assert!(matches!(msg, RelayMessage::Action { is_excess: true, .. }));
    }

    #[test]
    fn test_action_message_without_login_has_no_id() {
        let session = Session::new(Role::Master);
        let msg = action_message(
            &identity(),
            &session,
            &Filter::default(),
            &record("ANY", 1),
            &Value::Null,
        )
        .unwrap();
        assert!(matches!(msg, RelayMessage::Action { id: None, .. }));
    }

    #[test]
    fn test_state_message_filters_history() {
        let mut history = History::new();
        history.append(
            Value::object([("type", Value::from("KEEP"))]),
            Snapshot::ok(Value::Null),
            0,
        );
        history.append(
            Value::object([("type", Value::from("NOISE"))]),
            Snapshot::ok(Value::Null),
            0,
        );

        let filter = Filter::new(None, vec!["NOISE".to_string()]);
        let msg = state_message(&identity(), &logged_in_session(), &filter, &history);
        let RelayMessage::State { payload, .. } = msg else { panic!("wrong variant") };

        let restored = History::from_value(&codec::decode(&payload).unwrap()).unwrap();
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_init_and_error_messages_round_trip_payload() {
        let session = logged_in_session();
        let state = Value::object([("ready", Value::Bool(true))]);

        let RelayMessage::Init { payload, .. } = init_message(&identity(), &session, &state)
        else {
            panic!("wrong variant");
        };
        assert_eq!(codec::decode(&payload).unwrap(), state);

        let RelayMessage::Error { payload, .. } =
            error_message(&identity(), &session, "boom")
        else {
            panic!("wrong variant");
        };
        assert_eq!(codec::decode(&payload).unwrap(), Value::from("boom"));
    }
}
