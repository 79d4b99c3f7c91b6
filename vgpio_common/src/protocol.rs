//! Bridge wire protocol.
//!
//! The core and the bridge exchange tagged [`Message`]s over a broadcast
//! channel. There is no request identifier: a reply is matched to its
//! waiting caller purely by `(uid, pin)`.
//!
//! - [`codes`] - Status, direction and configuration codes, API version
//! - [`message`] - The message enum and reply helpers
//! - [`codec`] - Versioned frame encoding

pub mod codec;
pub mod codes;
pub mod message;

pub use codec::{CodecError, Frame, MAX_FRAME_LEN, decode, encode};
pub use codes::{ApiVersion, ConfigKind, Direction, Status};
pub use message::{LineReply, Message};
