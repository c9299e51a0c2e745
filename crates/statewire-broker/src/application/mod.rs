//! Application layer for the broker: the pub/sub routing state machine,
//! free of sockets and tasks.

pub mod router;

pub use router::{ConnectionSender, Router, RouterError};
