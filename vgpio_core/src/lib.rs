//! # vgpio Core Library
//!
//! Virtual GPIO chips whose lines live behind a remote bridge process.
//! Every line operation becomes a request to the bridge; the calling thread
//! blocks until the reply for the same `(uid, pin)` arrives or the reply
//! timeout expires.
//!
//! # Module Structure
//!
//! - [`line`] - Per-line cached state and the reply wait-cell
//! - [`chip`] - Chip: lines, lifecycle flags, chip lock
//! - [`registry`] - uid-indexed chip registry
//! - [`engine`] - Blocking request/reply engine and reply dispatch
//! - [`ops`] - GPIO operations exposed to line consumers
//! - [`framework`] - Line-consumer framework interface and the line table
//! - [`lifecycle`] - Register, deinitialize, teardown
//! - [`transport`] - Transport trait, loopback bus, UDP
//! - [`service`] - Receive loop, control worker, shutdown
//! - [`sim`] - Simulated bridge
//! - [`status`] - JSON status snapshot
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                           vgpio_core                              │
//! │  ┌──────────────┐   ┌─────────────────┐   ┌────────────────────┐  │
//! │  │ LineTable    │──►│ ChipOps         │──►│ RequestEngine      │  │
//! │  │ (framework)  │   │ (GpioOps)       │   │ call / dispatch    │  │
//! │  └──────▲───────┘   └─────────────────┘   └───┬──────────▲─────┘  │
//! │         │                                     │ send     │ reply  │
//! │  ┌──────┴───────────┐  ┌──────────────┐   ┌───▼──────────┴─────┐  │
//! │  │ LifecycleManager │◄─│ control      │◄──│ BridgeService      │  │
//! │  │ + ChipRegistry   │  │ worker       │   │ receive loop       │  │
//! │  └──────────────────┘  └──────────────┘   └────────▲───────────┘  │
//! └────────────────────────────────────────────────────┼──────────────┘
//!                                                      │ Transport
//!                                                   bridge(s)
//! ```
//!
//! # Locking
//!
//! Registry lock before chip lock, never the reverse. The chip lock is held
//! across a whole request/reply round trip, so there is at most one
//! outstanding request per chip. Reply dispatch never takes a chip lock.

#![deny(missing_docs)]

pub mod chip;
pub mod engine;
pub mod framework;
pub mod lifecycle;
pub mod line;
pub mod ops;
pub mod registry;
pub mod service;
pub mod sim;
pub mod status;
pub mod transport;

// Re-export key types for convenience
pub use crate::chip::Chip;
pub use crate::engine::RequestEngine;
pub use crate::framework::{LineFramework, LineTable};
pub use crate::lifecycle::LifecycleManager;
pub use crate::ops::{ChipOps, GpioOps, LineMode, PinConfig};
pub use crate::registry::ChipRegistry;
pub use crate::service::BridgeService;
pub use crate::sim::SimBridge;
pub use crate::transport::{LoopbackBus, Transport, UdpTransport};
