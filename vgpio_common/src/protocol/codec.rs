//! Frame codec.
//!
//! A frame is a protocol version byte followed by one [`Message`], encoded
//! with bincode (fixed-width integers, bounded length). Frames from an
//! incompatible protocol version are rejected before the message is used.

use super::message::Message;
use crate::consts::PROTOCOL_VERSION;
use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest frame accepted by [`decode`]; also a UDP datagram bound.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Versioned envelope around a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Protocol version of the sender.
    pub version: u8,
    /// Payload.
    pub message: Message,
}

/// Encoding and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Message could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// Bytes are not a valid frame.
    #[error("failed to decode frame: {0}")]
    Decode(String),

    /// Sender speaks another protocol version.
    #[error("protocol version mismatch: expected {expected}, found {found}")]
    Version {
        /// Our version
        expected: u8,
        /// Peer version
        found: u8,
    },
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_FRAME_LEN as u64)
}

/// Encode a message into a frame carrying [`PROTOCOL_VERSION`].
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let frame = Frame {
        version: PROTOCOL_VERSION,
        message: message.clone(),
    };
    options()
        .serialize(&frame)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a frame and return its message.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    let frame: Frame = options()
        .deserialize(bytes)
        .map_err(|e| CodecError::Decode(e.to_string()))?;

    if frame.version != PROTOCOL_VERSION {
        return Err(CodecError::Version {
            expected: PROTOCOL_VERSION,
            found: frame.version,
        });
    }
    Ok(frame.message)
}
