//! Application layer for the relay client.
//!
//! Pure decision and construction logic: building relay messages, mapping
//! inbound messages to effects, evaluating triggers, and suppressing
//! duplicate error reports. Everything here is synchronous and socket-free;
//! the infrastructure layer owns the tasks and the transport.

pub mod inbound;
pub mod relay;
pub mod report;
pub mod triggers;

pub use inbound::{handle_inbound, Effect};
pub use relay::Identity;
pub use report::ErrorReporter;
pub use triggers::TriggerEffect;
