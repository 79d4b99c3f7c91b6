//! Numeric codes carried in protocol messages.
//!
//! Codes travel as raw `u32` on the wire so that unknown values survive
//! decoding and can be reported instead of silently rejected.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use std::fmt;

/// Outcome code of a bridge reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    /// Request executed.
    Ok = 0,
    /// Bridge cannot perform the request.
    NotSupported = 1,
    /// Bridge lost its link to the hardware.
    BrokenPipe = 2,
    /// Bridge could not understand the request.
    ProtocolError = 3,
    /// Anything else.
    Unknown = u32::MAX,
}

const_assert_eq!(core::mem::size_of::<Status>(), 4);

impl Status {
    /// Decode a wire status. Unrecognized values collapse to `Unknown`.
    #[inline]
    pub const fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::NotSupported,
            2 => Self::BrokenPipe,
            3 => Self::ProtocolError,
            _ => Self::Unknown,
        }
    }

    /// Wire value.
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// True for `Ok`.
    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Direction of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum Direction {
    /// Driven by the bridge.
    Output = 0,
    /// Sampled by the bridge.
    #[default]
    Input = 1,
    /// Released to a safe default.
    Disabled = 2,
}

impl Direction {
    /// Decode a wire direction.
    #[inline]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Output),
            1 => Some(Self::Input),
            2 => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Wire value.
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output => write!(f, "output"),
            Self::Input => write!(f, "input"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Electrical configuration the bridge understands.
///
/// Values follow the generic pin configuration parameter numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ConfigKind {
    /// No bias.
    BiasDisable = 1,
    /// Pull towards ground.
    BiasPullDown = 3,
    /// Pull towards supply.
    BiasPullUp = 5,
    /// Open drain output.
    DriveOpenDrain = 6,
    /// Open source output.
    DriveOpenSource = 7,
    /// Push-pull output.
    DrivePushPull = 8,
}

impl ConfigKind {
    /// Decode a wire configuration kind.
    #[inline]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::BiasDisable),
            3 => Some(Self::BiasPullDown),
            5 => Some(Self::BiasPullUp),
            6 => Some(Self::DriveOpenDrain),
            7 => Some(Self::DriveOpenSource),
            8 => Some(Self::DrivePushPull),
            _ => None,
        }
    }

    /// Wire value.
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Semantic version of the core API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersion {
    /// Incompatible changes.
    pub major: u8,
    /// Compatible additions.
    pub minor: u8,
    /// Fixes.
    pub patch: u8,
}

const_assert_eq!(core::mem::size_of::<ApiVersion>(), 3);

impl ApiVersion {
    /// Peers are compatible when their major versions agree.
    #[inline]
    pub const fn is_compatible(&self, other: &ApiVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        for code in 0..=3u32 {
            assert_eq!(Status::from_code(code).code(), code);
        }
        assert_eq!(Status::from_code(4), Status::Unknown);
        assert_eq!(Status::from_code(u32::MAX), Status::Unknown);
        assert!(Status::Ok.is_ok());
        assert!(!Status::BrokenPipe.is_ok());
    }

    #[test]
    fn direction_codes() {
        assert_eq!(Direction::from_code(0), Some(Direction::Output));
        assert_eq!(Direction::from_code(1), Some(Direction::Input));
        assert_eq!(Direction::from_code(2), Some(Direction::Disabled));
        assert_eq!(Direction::from_code(3), None);
        assert_eq!(Direction::default(), Direction::Input);
    }

    #[test]
    fn config_codes_skip_unlisted_parameters() {
        assert_eq!(ConfigKind::from_code(1), Some(ConfigKind::BiasDisable));
        assert_eq!(ConfigKind::from_code(2), None);
        assert_eq!(ConfigKind::from_code(4), None);
        assert_eq!(ConfigKind::from_code(8), Some(ConfigKind::DrivePushPull));
        assert_eq!(ConfigKind::DriveOpenDrain.code(), 6);
    }

    #[test]
    fn api_version_compatibility() {
        let v1 = ApiVersion { major: 1, minor: 0, patch: 0 };
        let v1b = ApiVersion { major: 1, minor: 4, patch: 2 };
        let v2 = ApiVersion { major: 2, minor: 0, patch: 0 };
        assert!(v1.is_compatible(&v1b));
        assert!(!v1.is_compatible(&v2));
        assert_eq!(v1b.to_string(), "1.4.2");
    }
}
