//! # statewire-core
//!
//! Shared library for statewire containing the relay wire protocol, the
//! payload codec, action filtering, and the history log.
//!
//! statewire lets an instrumented application continuously relay its
//! state-container activity – dispatched actions and the snapshots they
//! produce – to remote observers, and lets those observers send control
//! commands back (start/stop monitoring, replay or import history, dispatch
//! an action remotely). A minimal pub/sub broker pairs exactly one producing
//! session (the *master*) with any number of observing sessions
//! (*monitors*).
//!
//! This crate is used by both the relay client and the broker. It has no
//! dependencies on sockets, runtimes, or I/O:
//!
//! - **`protocol`** – What travels over the wire. [`RelayMessage`] is the
//!   envelope for relay traffic, [`protocol::frames`] is the thin framing
//!   between a client and the broker, and [`protocol::codec`] round-trips
//!   payload values that plain JSON cannot carry (undefined, NaN, cyclic
//!   references).
//!
//! - **`domain`** – Pure state shared across roles. [`Session`] is the
//!   per-connection lifecycle value, [`History`] is the host's ordered log
//!   of actions and snapshots with bounded-retention signaling, and
//!   [`Filter`] is the whitelist/blacklist predicate over action types.

pub mod domain;
pub mod protocol;

pub use domain::{
    ActionRecord, ConnectionState, Filter, History, HistoryError, Role, Session, SessionId,
    Snapshot,
};
pub use protocol::{CodecError, HistoryCommand, MessageKind, RelayMessage, Value};
