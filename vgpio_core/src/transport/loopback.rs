//! In-process multicast bus.
//!
//! Every [`LoopbackPort`] attached to a [`LoopbackBus`] receives every frame
//! sent by the other ports. Frames go through the wire codec so that both
//! ends see exactly what a socket peer would.

use super::{Transport, TransportError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::trace;
use vgpio_common::protocol::{Message, decode, encode};

#[derive(Debug, Default)]
struct BusInner {
    next_id: usize,
    subscribers: Vec<(usize, Sender<Vec<u8>>)>,
}

/// Shared multicast bus.
#[derive(Debug, Clone, Default)]
pub struct LoopbackBus {
    inner: Arc<Mutex<BusInner>>,
}

impl LoopbackBus {
    /// Create a bus with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new port.
    pub fn attach(&self) -> LoopbackPort {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        LoopbackPort {
            id,
            bus: Arc::clone(&self.inner),
            rx: Mutex::new(rx),
        }
    }

    /// Number of attached ports.
    pub fn port_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

/// One endpoint of a [`LoopbackBus`]. Detaches on drop.
#[derive(Debug)]
pub struct LoopbackPort {
    id: usize,
    bus: Arc<Mutex<BusInner>>,
    rx: Mutex<Receiver<Vec<u8>>>,
}

impl Transport for LoopbackPort {
    fn send(&self, message: &Message) -> Result<(), TransportError> {
        let frame = encode(message)?;
        let mut inner = self.bus.lock();
        let mut delivered = 0usize;
        inner.subscribers.retain(|(id, tx)| {
            if *id == self.id {
                return true;
            }
            match tx.send(frame.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        trace!(port = self.id, delivered, kind = message.kind(), "loopback send");

        if delivered == 0 {
            Err(TransportError::NoSubscribers)
        } else {
            Ok(())
        }
    }

    fn recv(&self, timeout: Duration) -> Result<Option<Message>, TransportError> {
        match self.rx.lock().recv_timeout(timeout) {
            Ok(frame) => Ok(Some(decode(&frame)?)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

impl Drop for LoopbackPort {
    fn drop(&mut self) {
        self.bus.lock().subscribers.retain(|(id, _)| *id != self.id);
    }
}
