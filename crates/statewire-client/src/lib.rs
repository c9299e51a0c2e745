//! # statewire-client
//!
//! The relay client embedded in an instrumented application. It streams the
//! host's state-container activity (actions and resulting snapshots) to
//! remote monitors through a statewire broker, and applies the control
//! commands monitors send back: start/stop monitoring, structural history
//! edits, history imports, and registry-checked remote dispatches.
//!
//! # Layers
//!
//! ```text
//! Host application
//!       │ RelayHandle (dispatch / start / stop / send / report_error)
//!       ▼
//! [statewire-client]
//!   ├── domain/           RelayConfig, ActionRegistry, the Host trait
//!   ├── application/      message building, inbound effects, triggers,
//!   │                     duplicate-error suppression (pure, socket-free)
//!   └── infrastructure/
//!         ├── client/        the owning loop: one command queue per session
//!         ├── socket/        broker connection supervisor (tokio-tungstenite)
//!         └── http_fallback/ best-effort POST when no monitor is attached
//!       ▼
//! statewire broker (WebSocket)
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use statewire_client::{ActionRegistry, RelayClient, RelayConfig};
//! # use statewire_client::Host;
//! # use statewire_core::{History, HistoryCommand, HistoryError, Value};
//! # struct MyStore;
//! # impl Host for MyStore {
//! #     fn dispatch(&mut self, _action: Value) {}
//! #     fn apply(&mut self, _c: HistoryCommand) -> Result<(), HistoryError> { Ok(()) }
//! #     fn history(&self) -> &History { unimplemented!() }
//! # }
//!
//! # async fn example() {
//! let config = RelayConfig::new("localhost", 8000);
//! let handle = RelayClient::connect(config, MyStore, ActionRegistry::new())
//!     .expect("valid configuration");
//! handle.dispatch(Value::object([("type", Value::from("INCREMENT"))]));
//! # }
//! ```
//!
//! The relay never raises into the host: transport, codec, and evaluation
//! failures are caught at the boundary, logged, and degrade to "not
//! relaying".

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::{
    ActionEvalError, ActionRegistry, ConfigError, FilterConfig, Host, RelayConfig, SendOnError,
};
pub use infrastructure::{RelayClient, RelayHandle};
