//! Wire protocol tests.
//!
//! Frame encoding of every message family, status and errno translation
//! as seen by a bridge, and rejection of malformed frames.

use vgpio_common::consts::{API_VERSION, PROTOCOL_VERSION, UID_BROADCAST};
use vgpio_common::error::{BridgeError, ack_status};
use vgpio_common::protocol::{
    ApiVersion, CodecError, ConfigKind, Direction, MAX_FRAME_LEN, Message, Status, decode,
    encode,
};

#[test]
fn test_every_message_family_survives_the_codec() {
    let messages = [
        Message::Init {
            uid: 0x1122_3344_5566_7788,
            line_count: 3,
            label: "bridge-chip".into(),
            names: vec!["led".into(), "button".into(), "".into()],
        },
        Message::DeinitAck {
            uid: 5,
            status: libc::EBUSY as u32,
            version: API_VERSION,
        },
        Message::GetValueReply {
            uid: 5,
            pin: 2,
            status: Status::Ok.code(),
            value: Some(1),
        },
        Message::SetDirection {
            uid: 5,
            pin: 0,
            direction: Direction::Output.code(),
        },
        Message::Exit {
            uid: UID_BROADCAST,
            message: "bye".into(),
        },
    ];

    for message in messages {
        let frame = encode(&message).unwrap();
        assert!(frame.len() <= MAX_FRAME_LEN);
        assert_eq!(decode(&frame).unwrap(), message);
    }
}

#[test]
fn test_version_mismatch_rejected() {
    let mut frame = encode(&Message::GetValue { uid: 1, pin: 0 }).unwrap();
    frame[0] = 0;
    assert!(matches!(
        decode(&frame),
        Err(CodecError::Version {
            expected: PROTOCOL_VERSION,
            found: 0
        })
    ));
}

#[test]
fn test_garbage_rejected() {
    let garbage = [PROTOCOL_VERSION, 0xff, 0xff, 0xff, 0xff, 0x00];
    assert!(matches!(decode(&garbage), Err(CodecError::Decode(_))));
}

#[test]
fn test_unknown_status_codes_collapse() {
    for code in [4u32, 17, 1000, u32::MAX] {
        assert_eq!(Status::from_code(code), Status::Unknown);
        assert_eq!(Status::from_code(code).into_result(), Err(BridgeError::Unknown));
    }
}

#[test]
fn test_reply_without_value_is_protocol_violation() {
    let reply = Message::GetValueReply {
        uid: 9,
        pin: 0,
        status: Status::Ok.code(),
        value: None,
    };
    assert!(matches!(
        reply.line_reply(),
        Some(Err(BridgeError::ProtocolViolation(_)))
    ));
}

#[test]
fn test_ack_status_is_positive_errno() {
    let cases = [
        (BridgeError::AlreadyInUse(1), libc::EEXIST),
        (BridgeError::Busy, libc::EBUSY),
        (BridgeError::ChipLimit(1), libc::EPERM),
        (BridgeError::ProtocolViolation("x".into()), libc::EINVAL),
        (BridgeError::Framework("x".into()), libc::EIO),
    ];
    for (err, errno) in cases {
        assert_eq!(ack_status(&Err(err)), errno as u32);
    }
}

#[test]
fn test_config_codes_are_pin_config_numbers() {
    let expected = [
        (ConfigKind::BiasDisable, 1),
        (ConfigKind::BiasPullDown, 3),
        (ConfigKind::BiasPullUp, 5),
        (ConfigKind::DriveOpenDrain, 6),
        (ConfigKind::DriveOpenSource, 7),
        (ConfigKind::DrivePushPull, 8),
    ];
    for (kind, code) in expected {
        assert_eq!(kind.code(), code);
        assert_eq!(ConfigKind::from_code(code), Some(kind));
    }
}

#[test]
fn test_api_version_reported() {
    assert_eq!(API_VERSION.to_string(), "1.0.0");
    assert!(API_VERSION.is_compatible(&ApiVersion {
        major: 1,
        minor: 9,
        patch: 9
    }));
}
