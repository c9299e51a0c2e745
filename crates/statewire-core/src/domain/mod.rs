//! Domain entities shared by the relay client and the broker: sessions,
//! filtering, and the history log.

pub mod filter;
pub mod history;
pub mod session;

pub use filter::Filter;
pub use history::{ActionRecord, History, HistoryError, Snapshot};
pub use session::{ConnectionState, Role, Session, SessionId};
