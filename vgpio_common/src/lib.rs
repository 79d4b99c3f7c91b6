//! vgpio Common Library
//!
//! Shared types for every crate in the vgpio workspace: the bridge wire
//! protocol, the domain error taxonomy and TOML configuration loading.
//!
//! # Module Structure
//!
//! - [`protocol`] - Messages, status/direction/config codes and the frame codec
//! - [`error`] - `BridgeError`, the error surfaced to line consumers
//! - [`config`] - Configuration loading trait and service configuration
//! - [`consts`] - Versions, reserved identifiers and defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use vgpio_common::prelude::*;
//!
//! let frame = encode(&Message::Deinit { uid: 7 }).unwrap();
//! assert_eq!(decode(&frame).unwrap(), Message::Deinit { uid: 7 });
//! ```

pub mod config;
pub mod consts;
pub mod error;
pub mod prelude;
pub mod protocol;
