//! Message transport between the core and bridges.
//!
//! A transport sends a message to every current subscriber and hands
//! inbound messages to whoever polls it. Delivery is best-effort, at most
//! once per send and unordered.
//!
//! - [`loopback`] - In-process multicast bus
//! - [`udp`] - UDP datagrams to a configured peer list

pub mod loopback;
pub mod udp;

pub use loopback::{LoopbackBus, LoopbackPort};
pub use udp::UdpTransport;

use std::time::Duration;
use thiserror::Error;
use vgpio_common::protocol::{CodecError, Message};

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Nobody was listening. Callers waiting for a reply will time out.
    #[error("no subscribers")]
    NoSubscribers,

    /// The transport was shut down.
    #[error("transport closed")]
    Closed,

    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Bidirectional message channel.
pub trait Transport: Send + Sync {
    /// Send `message` to every subscriber.
    fn send(&self, message: &Message) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next inbound message.
    fn recv(&self, timeout: Duration) -> Result<Option<Message>, TransportError>;
}
