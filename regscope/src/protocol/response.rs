//! Inbound acknowledgements
//!
//! Argument counts include the device id and the status slot.

use crate::{
    error::{ProtocolError, ResponseShapeError, ValueParseError},
    model::ValueSize,
    protocol::frame::{Frame, MessageId},
};

/// `device_id, status, rw_mode, bus, dev_addr, reg_addr, value`
pub const READ_ACK_ARGS: usize = 7;
/// `device_id, status`
pub const WRITE_ACK_ARGS: usize = 2;
/// `device_id, status, major.minor.revision`
pub const VERSION_ACK_ARGS: usize = 3;

/// Status token the firmware uses to report a failed command
///
/// Compared as an exact string. The firmware defines no other status values.
pub const STATUS_FAILURE: &str = "1";

const STATUS_SLOT: usize = 1;

/// Outcome reported by the device in the status slot of an acknowledgement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ack {
    Success,
    Failure,
}

impl Ack {
    fn from_status(status: &str) -> Self {
        if status == STATUS_FAILURE {
            Self::Failure
        } else {
            Self::Success
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Fail unless `frame` answers `expected` with exactly `count` arguments
pub fn check_shape(
    frame: &Frame,
    expected: MessageId,
    count: usize,
) -> Result<(), ResponseShapeError> {
    if frame.msg_id != expected {
        return Err(ResponseShapeError::UnexpectedMessage {
            expected: expected.to_string(),
            found: frame.msg_id.to_string(),
        });
    }
    if frame.args.len() != count {
        return Err(ResponseShapeError::ArgumentCount {
            expected: count,
            found: frame.args.len(),
        });
    }
    Ok(())
}

/// Status of an acknowledgement, `None` if the frame has no status slot
pub fn status(frame: &Frame) -> Option<Ack> {
    frame.args.get(STATUS_SLOT).map(|s| Ack::from_status(s))
}

/// Parse decimal `text` into the integer type `T`, widened to `u64`
fn parse_decimal<T>(text: &str) -> Result<u64, ValueParseError>
where
    T: num::Num + num::Bounded + Into<u64>,
{
    let text = text.trim();
    if text.is_empty() {
        return Err(ValueParseError::Empty);
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValueParseError::InvalidDecimal(text.to_owned()));
    }
    // Only digits remain, so the only possible failure is overflow
    T::from_str_radix(text, 10)
        .map(Into::into)
        .map_err(|_| ValueParseError::Overflow {
            text: text.to_owned(),
            bits: u64::BITS - T::max_value().into().leading_zeros(),
        })
}

/// Decode the value slot of a read acknowledgement at the integer size implied by `bits`
///
/// # Errors
///
/// - [`ValueParseError::UnsupportedWidth`] if `bits` is wider than 32
/// - The value slot is not a decimal integer, or overflows the size
pub fn parse_read_value(text: &str, bits: u32) -> Result<u64, ValueParseError> {
    match ValueSize::from_bit_width(bits) {
        ValueSize::U8 => parse_decimal::<u8>(text),
        ValueSize::U16 => parse_decimal::<u16>(text),
        ValueSize::U32 => parse_decimal::<u32>(text),
        ValueSize::U64 => Err(ValueParseError::UnsupportedWidth(bits)),
    }
}

/// Extract the register value from a read acknowledgement
///
/// The status slot is not interpreted here, see [`status`].
///
/// # Errors
///
/// - [`ResponseShapeError`] if `frame` is not an `RWI2C` frame with [`READ_ACK_ARGS`] arguments
/// - [`ValueParseError`] if the value slot does not parse, see [`parse_read_value`]
pub fn parse_read_response(frame: &Frame, bits: u32) -> Result<u64, ProtocolError> {
    check_shape(frame, MessageId::ReadWriteI2c, READ_ACK_ARGS)?;
    Ok(parse_read_value(&frame.args[READ_ACK_ARGS - 1], bits)?)
}

/// # Errors
///
/// - `frame` is not an `RWI2C` frame with [`WRITE_ACK_ARGS`] arguments
pub fn parse_write_response(frame: &Frame) -> Result<Ack, ResponseShapeError> {
    check_shape(frame, MessageId::ReadWriteI2c, WRITE_ACK_ARGS)?;
    Ok(Ack::from_status(&frame.args[STATUS_SLOT]))
}

/// Version string of a version acknowledgement, `None` if the device reported failure
///
/// # Errors
///
/// - `frame` is not a version frame with [`VERSION_ACK_ARGS`] arguments
pub fn parse_version_response(frame: &Frame) -> Result<Option<String>, ResponseShapeError> {
    let expected = match frame.msg_id {
        MessageId::ReadHwVersion | MessageId::ReadFwVersion => frame.msg_id,
        other => {
            return Err(ResponseShapeError::UnexpectedMessage {
                expected: format!("{} or {}", MessageId::ReadHwVersion, MessageId::ReadFwVersion),
                found: other.to_string(),
            })
        }
    };
    check_shape(frame, expected, VERSION_ACK_ARGS)?;
    Ok(match Ack::from_status(&frame.args[STATUS_SLOT]) {
        Ack::Success => Some(frame.args[VERSION_ACK_ARGS - 1].clone()),
        Ack::Failure => None,
    })
}

#[test]
fn parse_read_response_takes_last_slot() {
    let frame = Frame::parse("RWI2C 1,0,0,1,82,530,41").unwrap();
    assert_eq!(parse_read_response(&frame, 8).unwrap(), 41);
    assert_eq!(parse_read_response(&frame, 16).unwrap(), 41);
    assert_eq!(status(&frame), Some(Ack::Success));
}

#[test]
fn parse_read_response_rejects_wrong_argument_count() {
    let frame = Frame::parse("RWI2C 1,0,0,1,82,41").unwrap();
    assert!(matches!(
        parse_read_response(&frame, 8),
        Err(ProtocolError::Shape(ResponseShapeError::ArgumentCount {
            expected: 7,
            found: 6
        }))
    ));
}

#[test]
fn parse_read_response_checks_width() {
    let frame = Frame::parse("RWI2C 1,0,0,1,82,46,300").unwrap();
    assert!(matches!(
        parse_read_response(&frame, 8),
        Err(ProtocolError::Parse(ValueParseError::Overflow { bits: 8, .. }))
    ));
    assert_eq!(parse_read_response(&frame, 9).unwrap(), 300);
    assert!(matches!(
        parse_read_response(&frame, 64),
        Err(ProtocolError::Parse(ValueParseError::UnsupportedWidth(64)))
    ));
}

#[test]
fn parse_read_value_rejects_non_decimal() {
    assert_eq!(
        parse_read_value("0x10", 8),
        Err(ValueParseError::InvalidDecimal("0x10".to_owned()))
    );
    assert_eq!(
        parse_read_value("-1", 16),
        Err(ValueParseError::InvalidDecimal("-1".to_owned()))
    );
    assert_eq!(parse_read_value("", 16), Err(ValueParseError::Empty));
    assert_eq!(parse_read_value("4294967295", 32), Ok(u64::from(u32::MAX)));
}

#[test]
fn parse_write_response_compares_status_literally() {
    let ack = |line| parse_write_response(&Frame::parse(line).unwrap());
    assert_eq!(ack("RWI2C 1,0"), Ok(Ack::Success));
    assert_eq!(ack("RWI2C 1,1"), Ok(Ack::Failure));
    assert_eq!(ack("RWI2C 1,OK"), Ok(Ack::Success));
    assert_eq!(ack("RWI2C 1,01"), Ok(Ack::Success));
    assert_eq!(
        ack("RWI2C 1"),
        Err(ResponseShapeError::ArgumentCount {
            expected: 2,
            found: 1
        })
    );
}

#[test]
fn parse_write_response_rejects_other_messages() {
    let frame = Frame::parse("RFVER 1,0").unwrap();
    assert!(matches!(
        parse_write_response(&frame),
        Err(ResponseShapeError::UnexpectedMessage { .. })
    ));
}

#[test]
fn parse_version_response_works() {
    let version = |line| parse_version_response(&Frame::parse(line).unwrap());
    assert_eq!(version("RHVER 1,0,1.0.0"), Ok(Some("1.0.0".to_owned())));
    assert_eq!(version("RFVER 1,1,0.0.0"), Ok(None));
    assert!(version("RFVER 1,0").is_err());
    assert!(version("RWI2C 1,0,1.0.0").is_err());
}
