use std::{io, time::Duration};

use thiserror::Error;

/// A register or bit-field template is malformed
///
/// Raised when a template is constructed, e.g., while loading a catalog. The codec itself never
/// returns this error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("register {register:?} has unsupported bit width {bits}, must be within 1..=64")]
    RegisterWidth { register: String, bits: u32 },
    #[error("field {field:?} of register {register:?} has zero width")]
    ZeroWidthField { register: String, field: String },
    #[error("field {field:?} of register {register:?} at offset {offset} with {bits} bits does not fit in {width} bits")]
    FieldOutOfRange {
        register: String,
        field: String,
        offset: u32,
        bits: u32,
        width: u32,
    },
    #[error("register address {0:#x} is defined more than once")]
    DuplicateAddress(u64),
}

/// A value does not fit the width it is meant for
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("value {value:#x} for {target} exceeds maximum {max:#x}")]
pub struct BoundsError {
    /// What the value was meant for, e.g., a field or register name
    pub target: String,
    pub value: u64,
    pub max: u64,
}

impl BoundsError {
    pub(crate) fn new(target: impl Into<String>, value: u64, max: u64) -> Self {
        Self {
            target: target.into(),
            value,
            max,
        }
    }
}

/// Text could not be turned into an integer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueParseError {
    #[error("empty value")]
    Empty,
    #[error("invalid hexadecimal value {0:?}")]
    InvalidHex(String),
    #[error("invalid decimal value {0:?}")]
    InvalidDecimal(String),
    #[error("value {text:?} does not fit in {bits} bits")]
    Overflow { text: String, bits: u32 },
    #[error("{0}-bit values cannot be carried by the wire format")]
    UnsupportedWidth(u32),
}

/// A response frame does not have the shape the command expects
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseShapeError {
    #[error("response {0:?} is not a text frame")]
    Malformed(String),
    #[error("unknown message id {0:?}")]
    UnknownMessage(String),
    #[error("expected a {expected} response, got {found}")]
    UnexpectedMessage { expected: String, found: String },
    #[error("expected {expected} arguments in response, got {found}")]
    ArgumentCount { expected: usize, found: usize },
}

/// The serial channel cannot carry a command
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("channel is not open")]
    NotOpen,
    #[error("channel closed while a command was outstanding")]
    Closed,
    #[error("i/o error on channel")]
    Io(#[from] io::Error),
}

/// Terminal failure of a single command
///
/// Nothing in this crate retries a failed command. It is up to the caller to resend.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed response")]
    Shape(#[from] ResponseShapeError),
    #[error("cannot decode response value")]
    Parse(#[from] ValueParseError),
    #[error("channel failure")]
    Channel(#[from] ChannelError),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("value rejected before sending")]
    Bounds(#[from] BoundsError),
    #[error("device reported failure: {0}")]
    DeviceFailure(String),
}

/// Error that happened while loading a template catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot parse catalog JSON")]
    Json(#[from] json::Error),
    #[error("expected an array of registers, found {0}")]
    ExpectedArray(String),
    #[error("expected an object, found {0}")]
    ExpectedObject(String),
    #[error("field {field:?} not found in {context}")]
    FieldNotFound { field: String, context: String },
    #[error("invalid value {value:?} for {field:?} in {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
    #[error("invalid access type {0:?}")]
    InvalidAccess(String),
    #[error("invalid register template")]
    Template(#[from] TemplateError),
}

/// An edit to the working set was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("register {0:#x} is not in the working set")]
    UnknownRegister(u64),
    #[error("register {0:#x} is not in the catalog")]
    NotInCatalog(u64),
    #[error("register {register:?} has no field {selector}")]
    UnknownField { register: String, selector: String },
    #[error("field {field:?} of register {register:?} is read-only")]
    ReadOnly { register: String, field: String },
    #[error("value out of bounds")]
    Bounds(#[from] BoundsError),
}
