//! Error taxonomy surfaced to line consumers.
//!
//! Every failure of the chip registry, the lifecycle manager, the
//! request/reply engine or the GPIO operations is reported as a
//! [`BridgeError`]. Callers translate it into whatever convention their own
//! callers expect; [`BridgeError::errno`] gives the errno used in acks.

use crate::protocol::Status;
use thiserror::Error;

/// Errors reported by the vgpio core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Chip is deinitializing or was never initialized.
    #[error("chip is not ready")]
    NotReady,

    /// A line is still held by a consumer, or the chip is mid-transition.
    #[error("chip is busy")]
    Busy,

    /// The uid already names an initialized chip.
    #[error("chip uid {0} is already in use")]
    AlreadyInUse(u64),

    /// The bridge did not reply before the timeout elapsed.
    #[error("bridge is unresponsive")]
    Unresponsive,

    /// Status or configuration kind not supported.
    #[error("operation not supported")]
    Unsupported,

    /// The bridge reported a broken pipe to the hardware.
    #[error("bridge reported a broken pipe")]
    BrokenPipe,

    /// Malformed or incomplete message, or invalid registration data.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Sending a request failed for a reason other than "no subscribers".
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The bridge replied with an unknown status.
    #[error("bridge reported an unknown error")]
    Unknown,

    /// Line index outside the chip.
    #[error("line {pin} out of range (chip has {line_count} lines)")]
    InvalidLine {
        /// Requested line index
        pin: u32,
        /// Number of lines on the chip
        line_count: u32,
    },

    /// The deployment's registered-chip limit is reached.
    #[error("chip limit of {0} reached")]
    ChipLimit(usize),

    /// The line-consumer framework refused an operation.
    #[error("line framework error: {0}")]
    Framework(String),
}

impl BridgeError {
    /// Positive errno carried in Init-Ack / Deinit-Ack status fields.
    pub fn errno(&self) -> u32 {
        let errno = match self {
            Self::NotReady => libc::ENODEV,
            Self::Busy => libc::EBUSY,
            Self::AlreadyInUse(_) => libc::EEXIST,
            Self::Unresponsive => libc::ETIMEDOUT,
            Self::Unsupported => libc::EOPNOTSUPP,
            Self::BrokenPipe => libc::EPIPE,
            Self::ProtocolViolation(_) | Self::InvalidLine { .. } => libc::EINVAL,
            Self::ChipLimit(_) => libc::EPERM,
            Self::TransportFailure(_) | Self::Unknown | Self::Framework(_) => libc::EIO,
        };
        errno as u32
    }
}

impl Status {
    /// Translate a bridge status into the local outcome.
    pub fn into_result(self) -> Result<(), BridgeError> {
        match self {
            Status::Ok => Ok(()),
            Status::NotSupported => Err(BridgeError::Unsupported),
            Status::BrokenPipe => Err(BridgeError::BrokenPipe),
            Status::ProtocolError => {
                Err(BridgeError::ProtocolViolation("bridge reported a protocol error".into()))
            }
            Status::Unknown => Err(BridgeError::Unknown),
        }
    }
}

/// Ack status for a lifecycle outcome: 0 or a positive errno.
pub fn ack_status(result: &Result<(), BridgeError>) -> u32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.errno(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_translation() {
        assert_eq!(Status::Ok.into_result(), Ok(()));
        assert_eq!(Status::NotSupported.into_result(), Err(BridgeError::Unsupported));
        assert_eq!(Status::BrokenPipe.into_result(), Err(BridgeError::BrokenPipe));
        assert!(matches!(
            Status::ProtocolError.into_result(),
            Err(BridgeError::ProtocolViolation(_))
        ));
        assert_eq!(Status::Unknown.into_result(), Err(BridgeError::Unknown));
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(BridgeError::Busy.errno(), libc::EBUSY as u32);
        assert_eq!(BridgeError::AlreadyInUse(7).errno(), libc::EEXIST as u32);
        assert_eq!(BridgeError::ChipLimit(1).errno(), libc::EPERM as u32);
        assert_eq!(
            BridgeError::InvalidLine { pin: 9, line_count: 2 }.errno(),
            libc::EINVAL as u32
        );
        assert_eq!(ack_status(&Ok(())), 0);
        assert_eq!(ack_status(&Err(BridgeError::Unresponsive)), libc::ETIMEDOUT as u32);
    }

    #[test]
    fn display_names_the_uid() {
        let err = BridgeError::AlreadyInUse(42);
        assert!(err.to_string().contains("42"));
    }
}
