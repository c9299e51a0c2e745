//! Session identity, roles, and the relay connection state machine.

use serde::{Deserialize, Serialize};

/// Opaque session identifier, assigned by the broker at login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two sides of a relay pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The instrumented host application; source of ACTION/STATE events.
    Master,
    /// A passive observer; consumes events and may issue control commands.
    Monitor,
}

impl Role {
    /// The wire token for this role.
    pub fn token(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Monitor => "monitor",
        }
    }

    /// Parses a login role token. Anything other than `"master"` is a
    /// monitor.
    pub fn from_token(token: &str) -> Role {
        if token == "master" {
            Role::Master
        } else {
            Role::Monitor
        }
    }
}

/// Relay client lifecycle states.
///
/// ```text
/// Stopped ──start()──▶ Connecting ──login ok──▶ Monitoring
///    ▲                                              │
///    └──────────── stop() / disconnect ─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Stopped,
    Connecting,
    Monitoring,
}

/// One logical connection between a relay participant and the broker.
///
/// Owned exclusively by the relay client on the client side, or by the
/// broker per connection on the server side. The `excess` flag is the sticky
/// retention signal: set the first time the live record count exceeds the
/// configured window, cleared only by an explicit stop→start cycle.
#[derive(Debug, Clone)]
pub struct Session {
    role: Role,
    state: ConnectionState,
    id: Option<SessionId>,
    private_channel: Option<String>,
    excess: bool,
}

impl Session {
    /// Creates a stopped session for the given role.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: ConnectionState::Stopped,
            id: None,
            private_channel: None,
            excess: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    pub fn private_channel(&self) -> Option<&str> {
        self.private_channel.as_deref()
    }

    pub fn is_excess(&self) -> bool {
        self.excess
    }

    /// Stopped → Connecting. Clears the excess flag – the only place it is
    /// ever reset.
    pub fn begin_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.excess = false;
    }

    /// Connecting → Monitoring on a successful login handshake.
    pub fn complete_login(&mut self, id: SessionId, channel: String) {
        self.id = Some(id);
        self.private_channel = Some(channel);
        self.state = ConnectionState::Monitoring;
    }

    /// Stopped → Monitoring: resume on an inbound START while the transport
    /// and login are still alive (after a keep-connected stop).
    pub fn resume_monitoring(&mut self) {
        self.state = ConnectionState::Monitoring;
    }

    /// Any → Stopped, keeping the login identity so a later START can resume
    /// without a fresh handshake.
    pub fn stop_keep_connected(&mut self) {
        self.state = ConnectionState::Stopped;
    }

    /// Any → Stopped, discarding the login identity. Used when the transport
    /// drops or the session is torn down.
    pub fn stop(&mut self) {
        self.state = ConnectionState::Stopped;
        self.id = None;
        self.private_channel = None;
    }

    /// Sets the sticky excess flag.
    pub fn mark_excess(&mut self) {
        self.excess = true;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_token_round_trips() {
        assert_eq!(Role::from_token(Role::Master.token()), Role::Master);
        assert_eq!(Role::from_token(Role::Monitor.token()), Role::Monitor);
    }

    #[test]
    fn test_any_unknown_token_is_monitor() {
        assert_eq!(Role::from_token("observer"), Role::Monitor);
        assert_eq!(Role::from_token(""), Role::Monitor);
    }

    #[test]
    fn test_new_session_is_stopped_without_identity() {
        let s = Session::new(Role::Master);
        assert_eq!(s.state(), ConnectionState::Stopped);
        assert!(s.id().is_none());
        assert!(!s.is_excess());
    }

    #[test]
    fn test_full_lifecycle_transitions() {
        let mut s = Session::new(Role::Master);
        s.begin_connecting();
        assert_eq!(s.state(), ConnectionState::Connecting);

        s.complete_login(SessionId::new("c-1"), "sc-c-1".to_string());
        assert_eq!(s.state(), ConnectionState::Monitoring);
        assert_eq!(s.id().map(SessionId::as_str), Some("c-1"));
        assert_eq!(s.private_channel(), Some("sc-c-1"));

        s.stop();
        assert_eq!(s.state(), ConnectionState::Stopped);
        assert!(s.id().is_none());
    }

    #[test]
    fn test_stop_keep_connected_preserves_identity() {
        let mut s = Session::new(Role::Master);
        s.begin_connecting();
        s.complete_login(SessionId::new("c-1"), "sc-c-1".to_string());

        s.stop_keep_connected();
        assert_eq!(s.state(), ConnectionState::Stopped);
        assert!(s.id().is_some(), "identity survives a keep-connected stop");

        s.resume_monitoring();
        assert_eq!(s.state(), ConnectionState::Monitoring);
    }

    #[test]
    fn test_excess_flag_is_sticky_until_restart() {
        let mut s = Session::new(Role::Master);
        s.begin_connecting();
        s.complete_login(SessionId::new("c-1"), "sc-c-1".to_string());

        s.mark_excess();
        assert!(s.is_excess());

        // Stopping alone does not clear the flag.
        s.stop_keep_connected();
        assert!(s.is_excess());

        // Only the next start cycle clears it.
        s.begin_connecting();
        assert!(!s.is_excess());
    }
}
