//! Line-oriented text frames exchanged with the device firmware
//!
//! `<MSG_ID> <arg>[,<arg>]*\n`, where the first argument is always the board's device id.

use std::fmt;

use itertools::Itertools;
use regex::Regex;
use strum::{Display, EnumIter, EnumString};

use crate::error::ResponseShapeError;

/// Line terminator of every frame
pub const FRAME_TAIL: char = '\n';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum MessageId {
    /// Read hardware version
    #[strum(serialize = "RHVER")]
    ReadHwVersion,
    /// Read firmware version
    #[strum(serialize = "RFVER")]
    ReadFwVersion,
    /// Read or write an I2C register
    #[strum(serialize = "RWI2C")]
    ReadWriteI2c,
}

/// A parsed or to-be-sent text frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub msg_id: MessageId,
    /// Every comma-separated token after the message id, device id included
    pub args: Vec<String>,
}

impl Frame {
    pub fn new(msg_id: MessageId, args: Vec<String>) -> Self {
        Self { msg_id, args }
    }

    /// Device id carried in the first argument slot
    pub fn device_id(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Render as a wire line, including the terminator
    pub fn to_line(&self) -> String {
        format!("{self}{FRAME_TAIL}")
    }

    /// Parse one received line
    ///
    /// A trailing `\r\n` or `\n` is ignored.
    ///
    /// # Errors
    ///
    /// - The line does not look like `<MSG_ID> <args>`
    /// - The message id is not known
    pub fn parse(line: &str) -> Result<Self, ResponseShapeError> {
        use lazy_static::lazy_static;
        lazy_static! {
            static ref FRAME_RE: Regex = Regex::new(
                r"(?x)
                ^([[:alnum:]]{1,5})     # message id (captured as #1)
                \x20                    # single space delimiter
                ([^[:space:]]*)$        # comma-separated arguments (captured as #2)
            ").unwrap();
        }

        let trimmed = line.trim_end_matches(&['\r', '\n'][..]);
        let captures = FRAME_RE
            .captures(trimmed)
            .ok_or_else(|| ResponseShapeError::Malformed(line.to_owned()))?;
        let msg_id = captures[1]
            .parse()
            .map_err(|_| ResponseShapeError::UnknownMessage(captures[1].to_owned()))?;
        let args = match &captures[2] {
            "" => vec![],
            args => args.split(',').map(ToOwned::to_owned).collect_vec(),
        };
        Ok(Self { msg_id, args })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.msg_id, self.args.iter().join(","))
    }
}

#[test]
fn frame_renders_as_line() {
    let frame = Frame::new(
        MessageId::ReadWriteI2c,
        ["1", "0", "1", "82", "46"].map(ToOwned::to_owned).to_vec(),
    );
    assert_eq!(frame.to_line(), "RWI2C 1,0,1,82,46\n");
}

#[test]
fn frame_parses_read_acknowledgement() {
    let frame = Frame::parse("RWI2C 1,0,0,1,82,46,5\r\n").unwrap();
    assert_eq!(frame.msg_id, MessageId::ReadWriteI2c);
    assert_eq!(frame.args, ["1", "0", "0", "1", "82", "46", "5"]);
    assert_eq!(frame.device_id(), Some("1"));
}

#[test]
fn frame_parses_message_id_with_digit() {
    let frame = Frame::parse("RWI2C 1,0").unwrap();
    assert_eq!(frame.msg_id, MessageId::ReadWriteI2c);
    assert_eq!(frame.args, ["1", "0"]);
}

#[test]
fn frame_parses_version() {
    let frame = Frame::parse("RFVER 1,0,0.1.3").unwrap();
    assert_eq!(frame.msg_id, MessageId::ReadFwVersion);
    assert_eq!(frame.args, ["1", "0", "0.1.3"]);
}

#[test]
fn frame_rejects_malformed_lines() {
    assert!(matches!(
        Frame::parse("garbage"),
        Err(ResponseShapeError::Malformed(_))
    ));
    assert!(matches!(
        Frame::parse("RWI2C  1,0"),
        Err(ResponseShapeError::Malformed(_))
    ));
    assert_eq!(
        Frame::parse("ABCDE 1,0"),
        Err(ResponseShapeError::UnknownMessage("ABCDE".to_owned()))
    );
}

#[test]
fn message_ids_round_trip_through_text() {
    use strum::IntoEnumIterator;

    for id in MessageId::iter() {
        assert_eq!(id.to_string().parse::<MessageId>().unwrap(), id);
        assert_eq!(id.to_string().len(), 5);
    }
}
