//! Infrastructure layer for the relay client: the connection supervisor,
//! the HTTP fallback path, and the client loop that owns the session.

pub mod client;
pub mod http_fallback;
pub mod socket;

pub use client::{RelayClient, RelayHandle};
pub use socket::{SocketConfig, SocketEvent, SocketRequest};
