//! Protocol module containing the relay message envelope, socket frames,
//! and the payload codec.

pub mod codec;
pub mod frames;
pub mod messages;

pub use codec::{decode, encode, CodecError, Value};
pub use frames::{ClientFrame, ServerFrame};
pub use messages::{HistoryCommand, MessageKind, RelayMessage};
