//! Infrastructure layer for the broker: the WebSocket accept loop and
//! per-connection tasks.

pub mod ws_server;

pub use ws_server::run_server;
