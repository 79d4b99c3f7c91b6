//! Prelude module for common re-exports.
//!
//! ```rust
//! use vgpio_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, CoreConfig, LogLevel};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{BridgeError, ack_status};

// ─── Protocol ───────────────────────────────────────────────────────
pub use crate::protocol::{
    ApiVersion, CodecError, ConfigKind, Direction, LineReply, Message, Status, decode, encode,
};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{API_VERSION, PROTOCOL_VERSION, UID_BROADCAST};
