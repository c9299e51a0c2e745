//! The routing table: login role pairing, channel subscriptions, and
//! verbatim fan-out.
//!
//! The router is pure bookkeeping – no sockets, no tasks. Each connection is
//! represented by an unbounded sender of [`ServerFrame`]s; delivering a
//! message is a non-blocking send, so the router can be driven under a plain
//! mutex with short critical sections. That also makes the whole broker
//! state machine testable without a network.
//!
//! Routing rules:
//!
//! - `LOGIN("master")` answers with the control channel name and claims the
//!   single master slot; any other token is a monitor and gets the event
//!   channel name. A second concurrent master login is rejected.
//! - A publish to a reserved broadcast channel or a private `sc-*` channel
//!   is forwarded verbatim to that channel's subscribers, except the
//!   publisher itself. Publishes to any other channel are dropped.
//! - Disconnect destroys the connection's private channel, releases the
//!   master slot if held, and announces `DISCONNECTED` on the event channel.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use statewire_core::protocol::frames::{
    self, ServerFrame, CONTROL_CHANNEL, EMIT_LOG, EMIT_LOG_NOID, EVENT_CHANNEL,
};
use statewire_core::{RelayMessage, Role, SessionId};

/// Error type for router operations.
#[derive(Debug, Error, PartialEq)]
pub enum RouterError {
    #[error("unknown connection {0}")]
    UnknownConnection(SessionId),
}

/// Write handle for one connection.
pub type ConnectionSender = mpsc::UnboundedSender<ServerFrame>;

struct Connection {
    sender: ConnectionSender,
    role: Option<Role>,
}

/// The broker's pub/sub state.
#[derive(Default)]
pub struct Router {
    connections: HashMap<SessionId, Connection>,
    subscriptions: HashMap<String, HashSet<SessionId>>,
    active_master: Option<SessionId>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Registers a new connection with its write handle.
    pub fn connect(&mut self, id: SessionId, sender: ConnectionSender) {
        debug!("connection {id} registered");
        self.connections.insert(id, Connection { sender, role: None });
    }

    /// Handles the login RPC; always produces the ack frame to send back.
    ///
    /// A master login claims the single master slot and is auto-subscribed
    /// to its private channel; the client additionally subscribes to the
    /// returned channel name itself.
    pub fn login(&mut self, id: &SessionId, role_token: &str) -> ServerFrame {
        if !self.connections.contains_key(id) {
            return ServerFrame::LoginAck {
                error: Some("unknown connection".to_string()),
                channel: None,
                session_id: id.clone(),
            };
        }

        let role = Role::from_token(role_token);
        if role == Role::Master {
            let occupied = self
                .active_master
                .as_ref()
                .is_some_and(|master| master != id && self.connections.contains_key(master));
            if occupied {
                warn!("rejecting second master login from {id}");
                return ServerFrame::LoginAck {
                    error: Some("master already active".to_string()),
                    channel: None,
                    session_id: id.clone(),
                };
            }
            self.active_master = Some(id.clone());
        }

        if let Some(connection) = self.connections.get_mut(id) {
            connection.role = Some(role);
        }
        self.subscribe_internal(id, &frames::private_channel(id));

        let channel = match role {
            Role::Master => CONTROL_CHANNEL,
            Role::Monitor => EVENT_CHANNEL,
        };
        debug!("{id} logged in as {role:?} -> {channel}");
        ServerFrame::LoginAck {
            error: None,
            channel: Some(channel.to_string()),
            session_id: id.clone(),
        }
    }

    /// Subscribes a connection to a channel.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownConnection`] for an unregistered id.
    pub fn subscribe(&mut self, id: &SessionId, channel: &str) -> Result<(), RouterError> {
        if !self.connections.contains_key(id) {
            return Err(RouterError::UnknownConnection(id.clone()));
        }
        self.subscribe_internal(id, channel);
        Ok(())
    }

    fn subscribe_internal(&mut self, id: &SessionId, channel: &str) {
        self.subscriptions.entry(channel.to_string()).or_default().insert(id.clone());
    }

    /// Drops one subscription.
    pub fn unsubscribe(&mut self, id: &SessionId, channel: &str) {
        if let Some(subscribers) = self.subscriptions.get_mut(channel) {
            subscribers.remove(id);
            if subscribers.is_empty() {
                self.subscriptions.remove(channel);
            }
        }
    }

    /// Handles a named emit from a client. The `log` and `log-noid` events
    /// both publish to the event channel; anything else is dropped.
    pub fn emit(&mut self, from: &SessionId, event: &str, message: RelayMessage) -> usize {
        match event {
            EMIT_LOG | EMIT_LOG_NOID => self.publish(from, EVENT_CHANNEL, message),
            other => {
                debug!("dropping emit on unknown event {other:?} from {from}");
                0
            }
        }
    }

    /// Forwards a message verbatim to a channel's subscribers, excluding the
    /// publisher. Returns the number of deliveries.
    ///
    /// Only reserved broadcast channels and private channels are routed;
    /// the broker performs no payload transformation.
    pub fn publish(&mut self, from: &SessionId, channel: &str, message: RelayMessage) -> usize {
        if !frames::is_routable(channel) {
            debug!("dropping publish to unroutable channel {channel:?}");
            return 0;
        }
        let Some(subscribers) = self.subscriptions.get(channel) else {
            return 0;
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for subscriber in subscribers {
            if subscriber == from {
                continue; // no self-echo
            }
            let Some(connection) = self.connections.get(subscriber) else { continue };
            let frame = ServerFrame::Push {
                channel: channel.to_string(),
                message: message.clone(),
            };
            if connection.sender.send(frame).is_ok() {
                delivered += 1;
            } else {
                dead.push(subscriber.clone());
            }
        }
        // A closed sender means the connection task is gone; reap it.
        for id in dead {
            self.disconnect(&id);
        }
        delivered
    }

    /// Removes a connection: destroys its private channel, releases the
    /// master slot if held, and announces the disconnect on the event
    /// channel.
    pub fn disconnect(&mut self, id: &SessionId) {
        if self.connections.remove(id).is_none() {
            return;
        }
        self.subscriptions.remove(&frames::private_channel(id));
        for subscribers in self.subscriptions.values_mut() {
            subscribers.remove(id);
        }
        self.subscriptions.retain(|_, subscribers| !subscribers.is_empty());
        if self.active_master.as_ref() == Some(id) {
            self.active_master = None;
        }
        debug!("connection {id} removed");
        self.publish(id, EVENT_CHANNEL, RelayMessage::Disconnected { id: id.clone() });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn add_connection(router: &mut Router, id: &str) -> mpsc::UnboundedReceiver<ServerFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        router.connect(SessionId::new(id), tx);
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_master_login_gets_control_channel() {
        let mut router = Router::new();
        let _rx = add_connection(&mut router, "a");
        let ack = router.login(&SessionId::new("a"), "master");
        assert_eq!(
            ack,
            ServerFrame::LoginAck {
                error: None,
                channel: Some("respond".to_string()),
                session_id: SessionId::new("a"),
            }
        );
    }

    #[test]
    fn test_monitor_login_gets_event_channel() {
        let mut router = Router::new();
        let _rx = add_connection(&mut router, "b");
        let ack = router.login(&SessionId::new("b"), "monitor");
        let ServerFrame::LoginAck { error: None, channel: Some(channel), .. } = ack else {
            panic!("expected successful ack");
        };
        assert_eq!(channel, "log");
    }

    #[test]
    fn test_any_non_master_token_is_monitor() {
        let mut router = Router::new();
        let _rx = add_connection(&mut router, "b");
        let ack = router.login(&SessionId::new("b"), "whatever");
        assert!(matches!(ack, ServerFrame::LoginAck { channel: Some(c), .. } if c == "log"));
    }

    #[test]
    fn test_second_master_login_is_rejected() {
        let mut router = Router::new();
        let _a = add_connection(&mut router, "a");
        let _b = add_connection(&mut router, "b");
        router.login(&SessionId::new("a"), "master");

        let ack = router.login(&SessionId::new("b"), "master");
        assert!(matches!(ack, ServerFrame::LoginAck { error: Some(_), channel: None, .. }));
    }

    #[test]
    fn test_master_slot_frees_on_disconnect() {
        let mut router = Router::new();
        let _a = add_connection(&mut router, "a");
        let _b = add_connection(&mut router, "b");
        router.login(&SessionId::new("a"), "master");
        router.disconnect(&SessionId::new("a"));

        let ack = router.login(&SessionId::new("b"), "master");
        assert!(matches!(ack, ServerFrame::LoginAck { error: None, .. }));
    }

    #[test]
    fn test_master_relogin_on_same_connection_is_allowed() {
        let mut router = Router::new();
        let _a = add_connection(&mut router, "a");
        router.login(&SessionId::new("a"), "master");
        let ack = router.login(&SessionId::new("a"), "master");
        assert!(matches!(ack, ServerFrame::LoginAck { error: None, .. }));
    }

    #[test]
    fn test_publish_reaches_subscribers_but_not_publisher() {
        let mut router = Router::new();
        let mut a_rx = add_connection(&mut router, "a");
        let mut b_rx = add_connection(&mut router, "b");
        router.subscribe(&SessionId::new("a"), EVENT_CHANNEL).unwrap();
        router.subscribe(&SessionId::new("b"), EVENT_CHANNEL).unwrap();

        let message = RelayMessage::Update { id: Some(SessionId::new("a")) };
        let delivered = router.publish(&SessionId::new("a"), EVENT_CHANNEL, message.clone());

        assert_eq!(delivered, 1);
        assert!(drain(&mut a_rx).is_empty(), "no self-echo");
        let frames = drain(&mut b_rx);
        assert_eq!(frames, [ServerFrame::Push { channel: EVENT_CHANNEL.to_string(), message }]);
    }

    #[test]
    fn test_publish_to_unroutable_channel_is_dropped() {
        let mut router = Router::new();
        let _a = add_connection(&mut router, "a");
        router.subscribe(&SessionId::new("a"), "side-channel").unwrap();
        let delivered = router.publish(
            &SessionId::new("b"),
            "side-channel",
            RelayMessage::Update { id: None },
        );
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_emit_log_routes_to_event_channel() {
        let mut router = Router::new();
        let _master = add_connection(&mut router, "m");
        let mut monitor_rx = add_connection(&mut router, "o");
        router.subscribe(&SessionId::new("o"), EVENT_CHANNEL).unwrap();

        for event in [EMIT_LOG, EMIT_LOG_NOID] {
            let delivered = router.emit(
                &SessionId::new("m"),
                event,
                RelayMessage::Update { id: None },
            );
            assert_eq!(delivered, 1);
        }
        assert_eq!(drain(&mut monitor_rx).len(), 2);
    }

    #[test]
    fn test_emit_unknown_event_is_dropped() {
        let mut router = Router::new();
        let _m = add_connection(&mut router, "m");
        assert_eq!(
            router.emit(&SessionId::new("m"), "telemetry", RelayMessage::Update { id: None }),
            0
        );
    }

    #[test]
    fn test_login_auto_subscribes_private_channel() {
        let mut router = Router::new();
        let mut a_rx = add_connection(&mut router, "a");
        let _b = add_connection(&mut router, "b");
        router.login(&SessionId::new("a"), "master");

        let delivered =
            router.publish(&SessionId::new("b"), "sc-a", RelayMessage::Update { id: None });
        assert_eq!(delivered, 1);
        // The login ack travels outside the router, so the only frame here
        // is the private-channel push.
        assert_eq!(drain(&mut a_rx).len(), 1);
    }

    #[test]
    fn test_disconnect_announces_on_event_channel() {
        let mut router = Router::new();
        let _m = add_connection(&mut router, "m");
        let mut o_rx = add_connection(&mut router, "o");
        router.login(&SessionId::new("m"), "master");
        router.login(&SessionId::new("o"), "monitor");
        router.subscribe(&SessionId::new("o"), EVENT_CHANNEL).unwrap();

        router.disconnect(&SessionId::new("m"));
        let frames = drain(&mut o_rx);
        assert!(frames.iter().any(|frame| matches!(
            frame,
            ServerFrame::Push { channel, message: RelayMessage::Disconnected { id } }
                if channel == EVENT_CHANNEL && id.as_str() == "m"
        )));
    }

    #[test]
    fn test_disconnect_destroys_private_channel() {
        let mut router = Router::new();
        let _a = add_connection(&mut router, "a");
        let _b = add_connection(&mut router, "b");
        router.login(&SessionId::new("a"), "master");
        router.disconnect(&SessionId::new("a"));

        let delivered =
            router.publish(&SessionId::new("b"), "sc-a", RelayMessage::Update { id: None });
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_subscribe_unknown_connection_errors() {
        let mut router = Router::new();
        let result = router.subscribe(&SessionId::new("ghost"), EVENT_CHANNEL);
        assert_eq!(result, Err(RouterError::UnknownConnection(SessionId::new("ghost"))));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut router = Router::new();
        let _a = add_connection(&mut router, "a");
        let mut b_rx = add_connection(&mut router, "b");
        router.subscribe(&SessionId::new("b"), EVENT_CHANNEL).unwrap();
        router.unsubscribe(&SessionId::new("b"), EVENT_CHANNEL);

        let delivered =
            router.publish(&SessionId::new("a"), EVENT_CHANNEL, RelayMessage::Update { id: None });
        assert_eq!(delivered, 0);
        assert!(drain(&mut b_rx).is_empty());
    }

    #[test]
    fn test_dead_subscriber_is_reaped_on_publish() {
        let mut router = Router::new();
        let _a = add_connection(&mut router, "a");
        let b_rx = add_connection(&mut router, "b");
        router.subscribe(&SessionId::new("b"), EVENT_CHANNEL).unwrap();
        drop(b_rx);

        router.publish(&SessionId::new("a"), EVENT_CHANNEL, RelayMessage::Update { id: None });
        assert_eq!(router.connection_count(), 1);
    }
}
