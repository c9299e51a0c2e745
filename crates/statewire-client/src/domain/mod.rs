//! Domain layer for the relay client: configuration, the action-creator
//! registry, and the host seam. No I/O, no async, no sockets.

pub mod config;
pub mod host;
pub mod registry;

pub use config::{ConfigError, FilterConfig, RelayConfig, SendOnError};
pub use host::Host;
pub use registry::{ActionEvalError, ActionRegistry};
