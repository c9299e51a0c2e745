//! # statewire-broker
//!
//! A minimal pub/sub router pairing exactly one producing session (the
//! *master*, an instrumented application) with any number of observing
//! sessions (*monitors*).
//!
//! The broker performs no payload transformation – it is pure routing:
//!
//! - `LOGIN("master")` answers with the control channel (`respond`); any
//!   other role token answers with the event channel (`log`).
//! - Publishes to a reserved broadcast channel or a per-connection private
//!   channel (`sc-<id>`) are forwarded verbatim to subscribers, minus the
//!   publisher.
//! - A dropped connection destroys its private channel and announces
//!   `DISCONNECTED` on the event channel.
//!
//! # Layers
//!
//! - `domain` – configuration types (TOML file schema + resolved runtime
//!   form).
//! - `application` – the [`Router`](application::Router): all pub/sub state,
//!   testable without a socket.
//! - `infrastructure` – the WebSocket accept loop and per-connection tasks.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{Router, RouterError};
pub use domain::{BrokerConfig, BrokerFileConfig};
pub use infrastructure::run_server;
