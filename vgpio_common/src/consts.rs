//! System-wide constants for the vgpio workspace.
//!
//! Single source of truth for versions, reserved identifiers and defaults.

use crate::protocol::ApiVersion;

/// Version of the frame layout exchanged with the bridge.
pub const PROTOCOL_VERSION: u8 = 1;

/// API version reported to the bridge in every Deinit-Ack.
pub const API_VERSION: ApiVersion = ApiVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

/// Uid addressing every bridge at once. Never assigned to a chip.
pub const UID_BROADCAST: u64 = 0;

/// Default time a caller waits for a bridge reply (ms).
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 2000;

/// Default receive poll interval of the service loop (ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default status snapshot interval (ms).
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 1000;

/// Default UDP listen address of the core.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:47100";

/// Canonical service name (logging, status snapshot).
pub const SERVICE_NAME: &str = "vgpio";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vgpio/vgpio.toml";

/// Message broadcast to bridges when the core shuts down.
pub const EXIT_MESSAGE: &str = "vgpio core is no longer running";
