//! One open connection to a sensor board
//!
//! A [`Session`] owns its transport and issues one command at a time. Every command ends in a
//! terminal [`CommandState`]. Nothing is retried.

use std::time::Duration;

use log::{debug, info, warn};
use strum::Display;

use crate::{
    error::{ProtocolError, ResponseShapeError, ValueParseError},
    model::{RegisterSpec, ValueSize},
    protocol::{self, Ack, Command, DeviceTarget, Frame, MessageId, VersionKind, WireAddress, WireValue},
    transport::Transport,
};

/// Connection parameters
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// How long to wait for each response
    timeout: Duration,
    /// Device id of the board in the text protocol
    board_id: u32,
    bus: u8,
    /// I2C address of the sensor
    dev_addr: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            // Same as the firmware's own I2C timeout
            timeout: Duration::from_millis(1000),
            board_id: 1,
            bus: 1,
            dev_addr: 0x52,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn board_id(mut self, board_id: u32) -> Self {
        self.board_id = board_id;
        self
    }

    #[must_use]
    pub fn bus(mut self, bus: u8) -> Self {
        self.bus = bus;
        self
    }

    #[must_use]
    pub fn dev_addr(mut self, dev_addr: u16) -> Self {
        self.dev_addr = dev_addr;
        self
    }

    pub fn response_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn target(&self) -> DeviceTarget {
        DeviceTarget {
            board_id: self.board_id,
            bus: self.bus,
            dev_addr: self.dev_addr,
        }
    }
}

/// Progress of the command most recently issued on a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum CommandState {
    /// No command issued yet
    Idle,
    Sent,
    AwaitingResponse,
    Decoded,
    ShapeError,
    ParseError,
    Timeout,
    ChannelFailed,
}

impl CommandState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Sent | Self::AwaitingResponse)
    }

    /// Terminal state a failed command ends in
    fn from_error(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::Shape(_) => Self::ShapeError,
            ProtocolError::Parse(_) => Self::ParseError,
            ProtocolError::Channel(_) => Self::ChannelFailed,
            ProtocolError::Timeout(_) => Self::Timeout,
            // The response was well-formed, it just carried a failure status
            ProtocolError::DeviceFailure(_) => Self::Decoded,
            // Rejected before sending, the caller never sees this state
            ProtocolError::Bounds(_) => Self::Idle,
        }
    }
}

pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    state: CommandState,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            state: CommandState::Idle,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// State of the last command
    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Send `command` and wait for a response with the matching message id
    ///
    /// The returned frame has not been checked for argument count.
    ///
    /// # Errors
    ///
    /// - The channel is not open or fails
    /// - No response within the configured timeout
    /// - The response is not a frame, or answers a different message
    fn exchange(&mut self, command: &Command) -> Result<Frame, ProtocolError> {
        let stale = self.transport.drain();
        if !stale.is_empty() {
            warn!(
                "discarding {} stale line(s) before sending, first: {:?}",
                stale.len(),
                stale[0]
            );
        }

        let line = command.to_line();
        if let Err(e) = self.transport.send_line(&line) {
            self.state = CommandState::ChannelFailed;
            return Err(e.into());
        }
        self.state = CommandState::Sent;
        debug!("-> {}", line.trim_end());

        self.state = CommandState::AwaitingResponse;
        let result = self
            .transport
            .recv_line(self.config.timeout)
            .and_then(|line| {
                debug!("<- {line}");
                Ok(Frame::parse(&line)?)
            })
            .and_then(|frame| {
                if frame.msg_id != command.message_id() {
                    return Err(ResponseShapeError::UnexpectedMessage {
                        expected: command.message_id().to_string(),
                        found: frame.msg_id.to_string(),
                    }
                    .into());
                }
                Ok(frame)
            });
        match &result {
            Ok(frame) => {
                let board_id = self.config.board_id.to_string();
                if frame.device_id() != Some(board_id.as_str()) {
                    warn!(
                        "response carries device id {:?}, expected {board_id}",
                        frame.device_id()
                    );
                }
            }
            Err(e) => self.state = CommandState::from_error(e),
        }
        result
    }

    /// Run the checks that gate sending a command
    ///
    /// A rejected command is never sent, so the session is left idle.
    fn check_before_send<R>(
        &mut self,
        check: impl FnOnce() -> Result<R, ProtocolError>,
    ) -> Result<R, ProtocolError> {
        let result = check();
        if result.is_err() {
            self.state = CommandState::Idle;
        }
        result
    }

    /// Record the terminal state of a command that got as far as a response
    fn finish<R>(&mut self, result: Result<R, ProtocolError>) -> Result<R, ProtocolError> {
        self.state = match &result {
            Ok(_) => CommandState::Decoded,
            Err(e) => CommandState::from_error(e),
        };
        result
    }

    /// Read the current value of `register` from the device
    ///
    /// # Errors
    ///
    /// - `register` is wider than 32 bits or its address does not fit the wire format
    /// - The device reports failure
    /// - The channel fails or no response arrives in time
    /// - The response is not a frame or answers a different message
    /// - The response is not a read acknowledgement or its value does not fit `register`
    pub fn read_register(&mut self, register: &RegisterSpec) -> Result<u64, ProtocolError> {
        let address = self.check_before_send(|| {
            if register.value_size() == ValueSize::U64 {
                return Err(ValueParseError::UnsupportedWidth(register.bits).into());
            }
            Ok(WireAddress::new(register.address)?)
        })?;
        let command = protocol::build_read(self.config.target(), address);
        let frame = self.exchange(&command)?;
        let result = read_value(&frame, register);
        self.finish(result)
    }

    /// Write `value` into `register` on the device
    ///
    /// # Errors
    ///
    /// - `value` does not fit `register` or the wire format, nothing is sent
    /// - The channel fails or no response arrives in time
    /// - The response is not a frame or answers a different message
    /// - The response is not a write acknowledgement
    pub fn write_register(&mut self, register: &RegisterSpec, value: u64) -> Result<Ack, ProtocolError> {
        let (address, wire_value) = self.check_before_send(|| {
            Ok((
                WireAddress::new(register.address)?,
                WireValue::for_register(value, register)?,
            ))
        })?;
        let command = protocol::build_write(self.config.target(), address, wire_value);
        let frame = self.exchange(&command)?;
        let result = protocol::parse_write_response(&frame).map_err(ProtocolError::from);
        if let Ok(Ack::Failure) = result {
            warn!("device reported failure writing {value:#x} to {}", register.name);
        }
        self.finish(result)
    }

    /// # Errors
    ///
    /// - The device reports failure
    /// - The channel fails or no response arrives in time
    /// - The response is not a frame or answers a different message
    pub fn hardware_version(&mut self) -> Result<String, ProtocolError> {
        self.version(VersionKind::Hardware)
    }

    /// # Errors
    ///
    /// - The device reports failure
    /// - The channel fails or no response arrives in time
    /// - The response is not a frame or answers a different message
    pub fn firmware_version(&mut self) -> Result<String, ProtocolError> {
        self.version(VersionKind::Firmware)
    }

    fn version(&mut self, kind: VersionKind) -> Result<String, ProtocolError> {
        let command = protocol::build_version_query(self.config.board_id, kind);
        let frame = self.exchange(&command)?;
        let result = protocol::parse_version_response(&frame)
            .map_err(ProtocolError::from)
            .and_then(|version| {
                version.ok_or_else(|| ProtocolError::DeviceFailure(command.message_id().to_string()))
            });
        self.finish(result)
    }

    /// Close the channel
    pub fn close(mut self) {
        self.transport.close();
        info!("session to board {} closed", self.config.board_id);
    }
}

fn read_value(frame: &Frame, register: &RegisterSpec) -> Result<u64, ProtocolError> {
    protocol::check_shape(frame, MessageId::ReadWriteI2c, protocol::READ_ACK_ARGS)?;
    if protocol::status(frame) == Some(Ack::Failure) {
        return Err(ProtocolError::DeviceFailure(format!(
            "{} read of {}",
            MessageId::ReadWriteI2c,
            register.name
        )));
    }
    let value = protocol::parse_read_response(frame, register.bits)?;
    if value > register.mask() {
        return Err(ValueParseError::Overflow {
            text: value.to_string(),
            bits: register.bits,
        }
        .into());
    }
    Ok(value)
}

/// Transport that answers from a script, for tests
#[cfg(test)]
#[derive(Default)]
struct Scripted {
    /// `None` makes the next receive time out
    responses: std::collections::VecDeque<Option<String>>,
    stale: Vec<String>,
    sent: Vec<String>,
    closed: bool,
}

#[cfg(test)]
impl Scripted {
    fn new<'a>(responses: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        Self {
            responses: responses.into_iter().map(|r| r.map(ToOwned::to_owned)).collect(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
impl Transport for Scripted {
    fn send_line(&mut self, line: &str) -> Result<(), crate::error::ChannelError> {
        if self.closed {
            return Err(crate::error::ChannelError::NotOpen);
        }
        self.sent.push(line.to_owned());
        Ok(())
    }

    fn recv_line(&mut self, timeout: Duration) -> Result<String, ProtocolError> {
        match self.responses.pop_front() {
            Some(Some(line)) => Ok(line),
            Some(None) => Err(ProtocolError::Timeout(timeout)),
            None => Err(crate::error::ChannelError::Closed.into()),
        }
    }

    fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.stale)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

#[cfg(test)]
fn byte_register() -> RegisterSpec {
    use crate::model::{Access, BitFieldSpec};

    RegisterSpec::new(
        "I2C_SLAVE__DEVICE_ADDRESS",
        0x212,
        8,
        0x29,
        vec![BitFieldSpec::new("addr", 0, 7, Access::ReadWrite)],
    )
    .unwrap()
}

#[test]
fn read_register_decodes_value() {
    let reg = byte_register();
    let mut session = Session::new(
        Scripted::new([Some("RWI2C 1,0,0,1,82,530,41")]),
        SessionConfig::default(),
    );
    assert_eq!(session.read_register(&reg).unwrap(), 41);
    assert_eq!(session.state(), CommandState::Decoded);
    assert_eq!(session.transport.sent, ["RWI2C 1,0,1,82,530\n"]);
}

#[test]
fn read_register_reports_terminal_states() {
    let reg = byte_register();
    let mut session = Session::new(
        Scripted::new([
            None,
            Some("RWI2C 1,0,0,1,82,530"),
            Some("RWI2C 1,0,0,1,82,530,x"),
            Some("RHVER 1,0,1.0.0"),
            Some("RWI2C 1,1,0,1,82,530,0"),
        ]),
        SessionConfig::default().timeout(Duration::from_millis(5)),
    );
    assert!(matches!(session.read_register(&reg), Err(ProtocolError::Timeout(_))));
    assert_eq!(session.state(), CommandState::Timeout);
    assert!(matches!(session.read_register(&reg), Err(ProtocolError::Shape(_))));
    assert_eq!(session.state(), CommandState::ShapeError);
    assert!(matches!(session.read_register(&reg), Err(ProtocolError::Parse(_))));
    assert_eq!(session.state(), CommandState::ParseError);
    assert!(matches!(session.read_register(&reg), Err(ProtocolError::Shape(_))));
    assert_eq!(session.state(), CommandState::ShapeError);
    assert!(matches!(
        session.read_register(&reg),
        Err(ProtocolError::DeviceFailure(_))
    ));
    assert!(matches!(
        session.read_register(&reg),
        Err(ProtocolError::Channel(_))
    ));
    assert_eq!(session.state(), CommandState::ChannelFailed);
}

#[test]
fn read_register_rejects_value_wider_than_register() {
    let reg = RegisterSpec::new("R", 0x10, 12, 0, vec![]).unwrap();
    let mut session = Session::new(
        Scripted::new([Some("RWI2C 1,0,0,1,82,16,4096")]),
        SessionConfig::default(),
    );
    assert!(matches!(
        session.read_register(&reg),
        Err(ProtocolError::Parse(ValueParseError::Overflow { bits: 12, .. }))
    ));
}

#[test]
fn write_register_checks_value_before_sending() {
    let reg = byte_register();
    let mut session = Session::new(Scripted::default(), SessionConfig::default());
    assert!(matches!(
        session.write_register(&reg, 0x100),
        Err(ProtocolError::Bounds(_))
    ));
    assert!(session.transport.sent.is_empty());
    assert_eq!(session.state(), CommandState::Idle);
}

#[test]
fn rejected_command_leaves_session_idle() {
    let reg = byte_register();
    let wide = RegisterSpec::new("WIDE", 0x20, 64, 0, vec![]).unwrap();
    let far = RegisterSpec::new("FAR", 0x1_0000, 8, 0, vec![]).unwrap();
    let mut session = Session::new(
        Scripted::new([None]),
        SessionConfig::default().timeout(Duration::from_millis(5)),
    );
    assert!(matches!(session.read_register(&reg), Err(ProtocolError::Timeout(_))));
    assert_eq!(session.state(), CommandState::Timeout);

    assert!(matches!(
        session.read_register(&wide),
        Err(ProtocolError::Parse(ValueParseError::UnsupportedWidth(64)))
    ));
    assert_eq!(session.state(), CommandState::Idle);

    session.state = CommandState::Timeout;
    assert!(matches!(session.read_register(&far), Err(ProtocolError::Bounds(_))));
    assert_eq!(session.state(), CommandState::Idle);

    session.state = CommandState::Timeout;
    assert!(matches!(
        session.write_register(&reg, 0x100),
        Err(ProtocolError::Bounds(_))
    ));
    assert_eq!(session.state(), CommandState::Idle);
    assert_eq!(session.transport.sent, ["RWI2C 1,0,1,82,530\n"]);
}

#[test]
fn write_register_returns_ack() {
    let reg = byte_register();
    let mut session = Session::new(
        Scripted::new([Some("RWI2C 7,0"), Some("RWI2C 7,1")]),
        SessionConfig::default().board_id(7).bus(2).dev_addr(0x29),
    );
    assert_eq!(session.write_register(&reg, 0x2a).unwrap(), Ack::Success);
    assert_eq!(session.write_register(&reg, 0x2a).unwrap(), Ack::Failure);
    assert_eq!(session.state(), CommandState::Decoded);
    assert_eq!(session.transport.sent[0], "RWI2C 7,1,2,41,530,42\n");
}

#[test]
fn exchange_drains_stale_lines() {
    let mut transport = Scripted::new([Some("RFVER 1,0,0.1.3")]);
    transport.stale = vec!["RWI2C 1,0,0,1,82,530,41".to_owned()];
    let mut session = Session::new(transport, SessionConfig::default());
    assert_eq!(session.firmware_version().unwrap(), "0.1.3");
    assert!(session.transport.stale.is_empty());
}

#[test]
fn version_failure_is_reported() {
    let mut session = Session::new(
        Scripted::new([Some("RHVER 1,1,0.0.0")]),
        SessionConfig::default(),
    );
    assert!(matches!(
        session.hardware_version(),
        Err(ProtocolError::DeviceFailure(_))
    ));
    assert_eq!(session.state(), CommandState::Decoded);
}

#[test]
fn closed_session_fails_commands() {
    let reg = byte_register();
    let mut transport = Scripted::default();
    transport.close();
    let mut session = Session::new(transport, SessionConfig::default());
    assert!(matches!(
        session.read_register(&reg),
        Err(ProtocolError::Channel(crate::error::ChannelError::NotOpen))
    ));
    assert_eq!(session.state(), CommandState::ChannelFailed);
}
