//! Protocol messages exchanged between the core and a bridge.

use super::codes::{ApiVersion, Status};
use crate::error::BridgeError;
use serde::{Deserialize, Serialize};

/// A single protocol message.
///
/// `Init`, `Deinit` and the `*Reply` variants travel bridge → core; the
/// rest travel core → bridge. Every message names the chip `uid` it is
/// about so bridges sharing the channel can filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Bridge asks the core to expose a chip.
    Init {
        uid: u64,
        line_count: u32,
        label: String,
        names: Vec<String>,
    },
    /// Outcome of `Init`: 0 or a positive errno.
    InitAck { uid: u64, status: u32 },
    /// Bridge asks the core to withdraw a chip.
    Deinit { uid: u64 },
    /// Outcome of `Deinit`, with the core API version.
    DeinitAck {
        uid: u64,
        status: u32,
        version: ApiVersion,
    },
    /// Read a line.
    GetValue { uid: u64, pin: u32 },
    /// Reply to `GetValue`; `value` is required when `status` is OK.
    GetValueReply {
        uid: u64,
        pin: u32,
        status: u32,
        value: Option<u32>,
    },
    /// Drive a line.
    SetValue { uid: u64, pin: u32, value: u32 },
    /// Reply to `SetValue`.
    SetValueReply { uid: u64, pin: u32, status: u32 },
    /// Change the electrical configuration of a line.
    SetConfig { uid: u64, pin: u32, config: u32 },
    /// Reply to `SetConfig`.
    SetConfigReply { uid: u64, pin: u32, status: u32 },
    /// Change the direction of a line.
    SetDirection { uid: u64, pin: u32, direction: u32 },
    /// Reply to `SetDirection`.
    SetDirectionReply { uid: u64, pin: u32, status: u32 },
    /// The core is going away. Sent to the broadcast uid.
    Exit { uid: u64, message: String },
}

/// A reply addressed to one line's waiting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineReply {
    pub uid: u64,
    pub pin: u32,
    pub status: Status,
    /// Level reported by a `GetValueReply` with an OK status.
    pub value: Option<bool>,
}

impl Message {
    /// Chip uid this message is about.
    pub fn uid(&self) -> u64 {
        match self {
            Self::Init { uid, .. }
            | Self::InitAck { uid, .. }
            | Self::Deinit { uid }
            | Self::DeinitAck { uid, .. }
            | Self::GetValue { uid, .. }
            | Self::GetValueReply { uid, .. }
            | Self::SetValue { uid, .. }
            | Self::SetValueReply { uid, .. }
            | Self::SetConfig { uid, .. }
            | Self::SetConfigReply { uid, .. }
            | Self::SetDirection { uid, .. }
            | Self::SetDirectionReply { uid, .. }
            | Self::Exit { uid, .. } => *uid,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::InitAck { .. } => "init-ack",
            Self::Deinit { .. } => "deinit",
            Self::DeinitAck { .. } => "deinit-ack",
            Self::GetValue { .. } => "get-value",
            Self::GetValueReply { .. } => "get-value-reply",
            Self::SetValue { .. } => "set-value",
            Self::SetValueReply { .. } => "set-value-reply",
            Self::SetConfig { .. } => "set-config",
            Self::SetConfigReply { .. } => "set-config-reply",
            Self::SetDirection { .. } => "set-direction",
            Self::SetDirectionReply { .. } => "set-direction-reply",
            Self::Exit { .. } => "exit",
        }
    }

    /// True for `Init` and `Deinit`.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Init { .. } | Self::Deinit { .. })
    }

    /// True for the four line requests the core sends.
    pub fn is_line_request(&self) -> bool {
        matches!(
            self,
            Self::GetValue { .. }
                | Self::SetValue { .. }
                | Self::SetConfig { .. }
                | Self::SetDirection { .. }
        )
    }

    /// True for the replies to line requests.
    pub fn is_line_reply(&self) -> bool {
        matches!(
            self,
            Self::GetValueReply { .. }
                | Self::SetValueReply { .. }
                | Self::SetConfigReply { .. }
                | Self::SetDirectionReply { .. }
        )
    }

    /// Extract the line reply carried by this message.
    ///
    /// Returns `None` for anything that is not a line reply and an error for
    /// an OK `GetValueReply` that lacks its value.
    pub fn line_reply(&self) -> Option<Result<LineReply, BridgeError>> {
        let reply = match *self {
            Self::GetValueReply {
                uid,
                pin,
                status,
                value,
            } => {
                let status = Status::from_code(status);
                let value = match (status, value) {
                    (Status::Ok, Some(v)) => Some(v != 0),
                    (Status::Ok, None) => {
                        return Some(Err(BridgeError::ProtocolViolation(format!(
                            "get-value-reply for uid {uid} pin {pin} has no value"
                        ))));
                    }
                    _ => None,
                };
                LineReply {
                    uid,
                    pin,
                    status,
                    value,
                }
            }
            Self::SetValueReply { uid, pin, status }
            | Self::SetConfigReply { uid, pin, status }
            | Self::SetDirectionReply { uid, pin, status } => LineReply {
                uid,
                pin,
                status: Status::from_code(status),
                value: None,
            },
            _ => return None,
        };
        Some(Ok(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_value_reply_requires_value_on_ok() {
        let msg = Message::GetValueReply {
            uid: 3,
            pin: 1,
            status: 0,
            value: None,
        };
        assert!(matches!(
            msg.line_reply(),
            Some(Err(BridgeError::ProtocolViolation(_)))
        ));

        let msg = Message::GetValueReply {
            uid: 3,
            pin: 1,
            status: 2,
            value: None,
        };
        let reply = msg.line_reply().unwrap().unwrap();
        assert_eq!(reply.status, Status::BrokenPipe);
        assert_eq!(reply.value, None);
    }

    #[test]
    fn nonzero_value_reads_high() {
        let msg = Message::GetValueReply {
            uid: 3,
            pin: 0,
            status: 0,
            value: Some(7),
        };
        assert_eq!(msg.line_reply().unwrap().unwrap().value, Some(true));
    }

    #[test]
    fn requests_are_not_replies() {
        assert!(Message::GetValue { uid: 1, pin: 0 }.line_reply().is_none());
        assert!(Message::Deinit { uid: 1 }.line_reply().is_none());
        assert!(Message::Deinit { uid: 1 }.is_control());
        assert!(!Message::SetValueReply { uid: 1, pin: 0, status: 0 }.is_control());
        assert!(Message::SetValueReply { uid: 1, pin: 0, status: 0 }.is_line_reply());
        assert!(Message::SetConfig { uid: 1, pin: 0, config: 1 }.is_line_request());
        assert!(!Message::Exit { uid: 0, message: String::new() }.is_line_request());
    }

    #[test]
    fn uid_and_kind() {
        let msg = Message::SetDirection {
            uid: 9,
            pin: 2,
            direction: 0,
        };
        assert_eq!(msg.uid(), 9);
        assert_eq!(msg.kind(), "set-direction");
    }
}
