//! Request/reply engine.
//!
//! [`RequestEngine::call`] turns a line operation into a message, sends it
//! and blocks on the line's wait-cell until the reply arrives or the timeout
//! expires. [`RequestEngine::dispatch`] is the inbound half: it resolves the
//! reply's chip through the registry and signals the waiting caller.
//!
//! Replies carry no request identifier. They are matched by `(uid, pin)`;
//! callers on the same chip are serialized by the chip lock, which the
//! caller must hold across `call`.

use crate::chip::{Chip, ChipGuard};
use crate::registry::ChipRegistry;
use crate::transport::{Transport, TransportError};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};
use vgpio_common::error::BridgeError;
use vgpio_common::protocol::{ConfigKind, Direction, Message};

/// A line operation sent to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Read the level.
    GetValue,
    /// Drive the level.
    SetValue(bool),
    /// Apply an electrical configuration.
    SetConfig(ConfigKind),
    /// Change direction.
    SetDirection(Direction),
}

impl Request {
    fn to_message(self, uid: u64, pin: u32) -> Message {
        match self {
            Self::GetValue => Message::GetValue { uid, pin },
            Self::SetValue(value) => Message::SetValue {
                uid,
                pin,
                value: u32::from(value),
            },
            Self::SetConfig(kind) => Message::SetConfig {
                uid,
                pin,
                config: kind.code(),
            },
            Self::SetDirection(direction) => Message::SetDirection {
                uid,
                pin,
                direction: direction.code(),
            },
        }
    }
}

/// Successful outcome of [`RequestEngine::call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// The bridge acknowledged the request.
    Done,
    /// The bridge reported this level.
    Value(bool),
}

/// Message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineCounters {
    /// Requests handed to the transport.
    pub sent: u64,
    /// Requests that got no reply in time.
    pub timed_out: u64,
    /// Replies delivered to a wait-cell.
    pub dispatched: u64,
    /// Inbound replies dropped as stale or malformed.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    timed_out: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

/// Blocking request/reply engine shared by every chip.
pub struct RequestEngine {
    transport: Arc<dyn Transport>,
    registry: Arc<ChipRegistry>,
    timeout: Duration,
    counters: Counters,
}

impl RequestEngine {
    /// Create an engine sending on `transport` and resolving replies
    /// through `registry`.
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<ChipRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            timeout,
            counters: Counters::default(),
        }
    }

    /// Reply timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Transport used for requests.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Send `request` for `pin` and wait for the reply.
    ///
    /// `guard` must be the lock of `chip`; it stays held for the whole
    /// round trip.
    ///
    /// # Errors
    /// - `InvalidLine` if `pin` is not on the chip
    /// - `TransportFailure` if sending failed for a reason other than
    ///   "no subscribers"
    /// - `Unresponsive` if no reply arrived in time
    /// - the translated bridge status otherwise
    pub fn call(
        &self,
        chip: &Chip,
        guard: &ChipGuard<'_>,
        pin: u32,
        request: Request,
    ) -> Result<Reply, BridgeError> {
        debug_assert!(chip.owns(guard));
        let cell = chip.cell(pin).ok_or(BridgeError::InvalidLine {
            pin,
            line_count: chip.line_count(),
        })?;

        let message = request.to_message(chip.uid(), pin);
        match self.transport.send(&message) {
            Ok(()) => {}
            Err(TransportError::NoSubscribers) => {
                debug!(
                    uid = chip.uid(),
                    pin,
                    "no bridge subscribed, {} will time out",
                    message.kind()
                );
            }
            Err(e) => return Err(BridgeError::TransportFailure(e.to_string())),
        }
        self.counters.sent.fetch_add(1, Ordering::Relaxed);

        let Some(outcome) = cell.wait(self.timeout) else {
            self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
            warn!(
                uid = chip.uid(),
                pin,
                "no reply to {} within {:?}",
                message.kind(),
                self.timeout
            );
            return Err(BridgeError::Unresponsive);
        };
        outcome.status.into_result()?;

        match request {
            Request::GetValue => outcome.value.map(Reply::Value).ok_or_else(|| {
                BridgeError::ProtocolViolation(format!(
                    "get-value reply for uid {} pin {} carried no value",
                    chip.uid(),
                    pin
                ))
            }),
            _ => Ok(Reply::Done),
        }
    }

    /// Deliver an inbound reply to its waiting caller.
    ///
    /// Never takes a chip lock. Returns `false` if the message was dropped.
    pub fn dispatch(&self, message: &Message) -> bool {
        let reply = match message.line_reply() {
            Some(Ok(reply)) => reply,
            Some(Err(e)) => return self.drop_reply(message, &e.to_string()),
            None => return self.drop_reply(message, "not a line reply"),
        };

        let Some(chip) = self.registry.find(reply.uid) else {
            return self.drop_reply(message, "unknown chip");
        };
        if chip.is_retired() {
            return self.drop_reply(message, "chip retired");
        }
        let Some(cell) = chip.cell(reply.pin) else {
            return self.drop_reply(message, "line out of range");
        };

        cell.post(reply.status, reply.value);
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        trace!(uid = reply.uid, pin = reply.pin, status = ?reply.status, "reply dispatched");
        true
    }

    fn drop_reply(&self, message: &Message, reason: &str) -> bool {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(uid = message.uid(), "dropping {}: {}", message.kind(), reason);
        false
    }

    /// Current counter values.
    pub fn counters(&self) -> EngineCounters {
        EngineCounters {
            sent: self.counters.sent.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}
