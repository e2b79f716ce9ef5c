//! Outbound commands
//!
//! All numeric arguments travel in decimal, which is what the firmware parses.

use crate::{
    codec,
    error::BoundsError,
    model::RegisterSpec,
    protocol::frame::{Frame, MessageId},
};

/// Read/write selector of the `RWI2C` command
const RW_MODE_READ: u8 = 0;
const RW_MODE_WRITE: u8 = 1;

/// Where a command is delivered: which board, which I2C bus on it, and which part on the bus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceTarget {
    /// Device id of the board running the firmware
    pub board_id: u32,
    /// I2C bus number on the board
    pub bus: u8,
    /// I2C address of the part
    pub dev_addr: u16,
}

/// A register address as carried on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireAddress(u16);

impl WireAddress {
    /// # Errors
    ///
    /// - `address` does not fit in 16 bits
    pub fn new(address: u64) -> Result<Self, BoundsError> {
        u16::try_from(address)
            .map(Self)
            .map_err(|_| BoundsError::new("register address", address, u16::MAX.into()))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

/// A register value as carried by a write command
///
/// The wire always carries 16 bits, whatever the register's width. The value is checked here,
/// before sending, rather than left to the device to truncate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireValue(u16);

impl WireValue {
    /// Width of the value slot of a write command
    pub const BITS: u32 = u16::BITS;

    /// # Errors
    ///
    /// - `value` does not fit in the register's declared width
    /// - `value` does not fit in the 16-bit wire slot
    pub fn for_register(value: u64, register: &RegisterSpec) -> Result<Self, BoundsError> {
        let max = codec::mask(register.bits.min(Self::BITS));
        if value > max {
            return Err(BoundsError::new(register.name.clone(), value, max));
        }
        // Cannot fail: `max` is at most u16::MAX
        Ok(Self(value as u16))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

/// Which version a version query asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionKind {
    Hardware,
    Firmware,
}

/// A command ready to be sent
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Read {
        target: DeviceTarget,
        register: WireAddress,
    },
    Write {
        target: DeviceTarget,
        register: WireAddress,
        value: WireValue,
    },
    Version {
        board_id: u32,
        kind: VersionKind,
    },
}

/// Command reading one register
pub fn build_read(target: DeviceTarget, register: WireAddress) -> Command {
    Command::Read { target, register }
}

/// Command writing `value` into one register
pub fn build_write(target: DeviceTarget, register: WireAddress, value: WireValue) -> Command {
    Command::Write {
        target,
        register,
        value,
    }
}

/// Command asking the board for its hardware or firmware version
pub fn build_version_query(board_id: u32, kind: VersionKind) -> Command {
    Command::Version { board_id, kind }
}

impl Command {
    /// Message id the response to this command carries
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::Read { .. } | Self::Write { .. } => MessageId::ReadWriteI2c,
            Self::Version {
                kind: VersionKind::Hardware,
                ..
            } => MessageId::ReadHwVersion,
            Self::Version {
                kind: VersionKind::Firmware,
                ..
            } => MessageId::ReadFwVersion,
        }
    }

    pub fn to_frame(&self) -> Frame {
        let args = match self {
            Self::Read { target, register } => vec![
                target.board_id.to_string(),
                RW_MODE_READ.to_string(),
                target.bus.to_string(),
                target.dev_addr.to_string(),
                register.get().to_string(),
            ],
            Self::Write {
                target,
                register,
                value,
            } => vec![
                target.board_id.to_string(),
                RW_MODE_WRITE.to_string(),
                target.bus.to_string(),
                target.dev_addr.to_string(),
                register.get().to_string(),
                value.get().to_string(),
            ],
            Self::Version { board_id, .. } => vec![board_id.to_string()],
        };
        Frame::new(self.message_id(), args)
    }

    /// Wire line for this command, including the terminator
    pub fn to_line(&self) -> String {
        self.to_frame().to_line()
    }
}

#[cfg(test)]
const TARGET: DeviceTarget = DeviceTarget {
    board_id: 1,
    bus: 1,
    dev_addr: 0x52,
};

#[test]
fn build_read_renders_decimal_arguments() {
    let cmd = build_read(TARGET, WireAddress::new(0x2e).unwrap());
    assert_eq!(cmd.to_line(), "RWI2C 1,0,1,82,46\n");
    assert_eq!(cmd.message_id(), MessageId::ReadWriteI2c);
}

#[test]
fn build_write_renders_value_slot() {
    let cmd = build_write(
        TARGET,
        WireAddress::new(0x212).unwrap(),
        WireValue(0x29),
    );
    assert_eq!(cmd.to_line(), "RWI2C 1,1,1,82,530,41\n");
}

#[test]
fn version_queries_carry_only_board_id() {
    assert_eq!(
        build_version_query(3, VersionKind::Hardware).to_line(),
        "RHVER 3\n"
    );
    assert_eq!(
        build_version_query(3, VersionKind::Firmware).to_line(),
        "RFVER 3\n"
    );
}

#[test]
fn wire_address_must_fit_16_bits() {
    assert_eq!(WireAddress::new(0xffff).unwrap().get(), 0xffff);
    assert!(WireAddress::new(0x1_0000).is_err());
}

#[test]
fn wire_value_is_checked_against_register_and_wire_width() {
    use crate::model::Access;
    use crate::model::BitFieldSpec;

    let byte = RegisterSpec::new(
        "B",
        0,
        8,
        0,
        vec![BitFieldSpec::new("b", 0, 8, Access::ReadWrite)],
    )
    .unwrap();
    let dword = RegisterSpec::new("D", 0, 32, 0, vec![]).unwrap();

    assert_eq!(WireValue::for_register(0xff, &byte).unwrap().get(), 0xff);
    let err = WireValue::for_register(0x100, &byte).unwrap_err();
    assert_eq!(err.max, 0xff);

    assert_eq!(WireValue::for_register(0xffff, &dword).unwrap().get(), 0xffff);
    let err = WireValue::for_register(0x1_0000, &dword).unwrap_err();
    assert_eq!(err.max, 0xffff);
}
