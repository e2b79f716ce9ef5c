//! `RegisterSpec` and `BitFieldSpec` describe the shape of a register and its named sub-fields.
//! They are immutable once constructed and shared by every value that refers to them.

use std::{fmt, ops};

use strum::{Display, EnumString};

use crate::{codec, error::TemplateError};

/// Widest register supported by the model
pub const MAX_REGISTER_BITS: u32 = 64;

/// Software access rights of a bit-field
///
/// The model only tracks the flag. Whether read-only fields may be edited is decided by the
/// caller, see [`crate::EditPolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Access {
    /// read-only
    #[strum(serialize = "read-only")]
    ReadOnly,
    /// read-write
    #[strum(serialize = "read-write")]
    ReadWrite,
}

impl Access {
    /// Whether this field is software writable or not
    #[must_use]
    pub const fn is_write(&self) -> bool {
        match self {
            Self::ReadOnly => false,
            Self::ReadWrite => true,
        }
    }
}

/// A named, fixed-offset, fixed-width sub-range of a register's bits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitFieldSpec {
    /// Human-readable identifier. Not necessarily unique, e.g., `RESERVED` may repeat.
    pub name: String,
    /// Bit position of the field's least significant bit
    pub offset: u32,
    /// Field width in bits
    pub bits: u32,
    pub access: Access,
    pub description: Option<String>,
}

impl BitFieldSpec {
    pub fn new(name: impl Into<String>, offset: u32, bits: u32, access: Access) -> Self {
        Self {
            name: name.into(),
            offset,
            bits,
            access,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Bits covered by this field, e.g., `4..8` for the high nibble of a byte
    pub fn bit_range(&self) -> ops::Range<u32> {
        self.offset..self.offset + self.bits
    }

    /// Mask of the field's bits in place within the register
    pub fn mask_in_place(&self) -> u64 {
        codec::mask(self.bits) << self.offset
    }

    /// Largest value the field can hold
    pub fn max_value(&self) -> u64 {
        codec::max_value(self)
    }

    fn validate(&self, register: &str, width: u32) -> Result<(), TemplateError> {
        if self.bits == 0 {
            return Err(TemplateError::ZeroWidthField {
                register: register.to_owned(),
                field: self.name.clone(),
            });
        }
        if self
            .offset
            .checked_add(self.bits)
            .map_or(true, |end| end > width)
        {
            return Err(TemplateError::FieldOutOfRange {
                register: register.to_owned(),
                field: self.name.clone(),
                offset: self.offset,
                bits: self.bits,
                width,
            });
        }
        Ok(())
    }
}

impl fmt::Display for BitFieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bits == 1 {
            write!(f, "{}[{}]", self.name, self.offset)
        } else {
            write!(
                f,
                "{}[{}:{}]",
                self.name,
                self.offset + self.bits - 1,
                self.offset
            )
        }
    }
}

/// Immutable description of one register and its sub-fields
///
/// Fields may leave gaps and may overlap; neither is an error. Each field must however lie
/// within the register's width, which is checked on construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterSpec {
    pub name: String,
    /// Register address, unique within a catalog
    pub address: u64,
    /// Register width in bits
    pub bits: u32,
    /// Documented power-on value. Informational only.
    pub reset_value: u64,
    fields: Vec<BitFieldSpec>,
}

impl RegisterSpec {
    /// Construct a register template, sorting `fields` by ascending offset
    ///
    /// # Errors
    ///
    /// - Register width is not within `1..=64`
    /// - A field has zero width or does not fit in the register
    pub fn new(
        name: impl Into<String>,
        address: u64,
        bits: u32,
        reset_value: u64,
        mut fields: Vec<BitFieldSpec>,
    ) -> Result<Self, TemplateError> {
        let name = name.into();
        if bits == 0 || bits > MAX_REGISTER_BITS {
            return Err(TemplateError::RegisterWidth {
                register: name,
                bits,
            });
        }
        for field in &fields {
            field.validate(&name, bits)?;
        }
        // Stable, so that fields sharing an offset keep their catalog order
        fields.sort_by_key(|f| f.offset);
        Ok(Self {
            name,
            address,
            bits,
            reset_value,
            fields,
        })
    }

    pub fn fields(&self) -> &[BitFieldSpec] {
        &self.fields
    }

    /// Mask of every bit in the register
    pub fn mask(&self) -> u64 {
        codec::mask(self.bits)
    }

    /// Mask of the bits covered by at least one field
    pub fn covered_mask(&self) -> u64 {
        self.fields
            .iter()
            .fold(0, |acc, f| acc | f.mask_in_place())
    }

    /// Storage width used when the value is rendered or carried on the wire
    pub fn value_size(&self) -> ValueSize {
        ValueSize::from_bit_width(self.bits)
    }
}

/// Storage class of a value, picked from its declared bit width
///
/// Widths round up to the next supported integer, i.e., a 7-bit value is stored in a byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSize {
    U8,
    U16,
    U32,
    U64,
}

impl ValueSize {
    /// Round `bits` up to a storage class
    #[must_use]
    pub const fn from_bit_width(bits: u32) -> Self {
        match bits {
            0..=8 => Self::U8,
            9..=16 => Self::U16,
            17..=32 => Self::U32,
            _ => Self::U64,
        }
    }

    /// Number of zero-padded hex digits used to render a value of this size
    ///
    /// 64-bit values are rendered without padding.
    #[must_use]
    pub const fn hex_digits(self) -> Option<usize> {
        match self {
            Self::U8 => Some(2),
            Self::U16 => Some(4),
            Self::U32 => Some(8),
            Self::U64 => None,
        }
    }
}

#[test]
fn value_size_rounds_up() {
    assert_eq!(ValueSize::from_bit_width(1), ValueSize::U8);
    assert_eq!(ValueSize::from_bit_width(8), ValueSize::U8);
    assert_eq!(ValueSize::from_bit_width(9), ValueSize::U16);
    assert_eq!(ValueSize::from_bit_width(16), ValueSize::U16);
    assert_eq!(ValueSize::from_bit_width(24), ValueSize::U32);
    assert_eq!(ValueSize::from_bit_width(32), ValueSize::U32);
    assert_eq!(ValueSize::from_bit_width(33), ValueSize::U64);
    assert_eq!(ValueSize::from_bit_width(64), ValueSize::U64);
}

#[test]
fn access_parses_catalog_strings() {
    use std::str::FromStr;

    assert_eq!(Access::from_str("read-only").unwrap(), Access::ReadOnly);
    assert_eq!(Access::from_str("read-write").unwrap(), Access::ReadWrite);
    assert!(Access::from_str("write-only").is_err());
    assert_eq!(Access::ReadOnly.to_string(), "read-only");
    assert!(!Access::ReadOnly.is_write());
}

#[test]
fn register_spec_sorts_fields_by_offset() {
    let reg = RegisterSpec::new(
        "SYSTEM__MODE_GPIO1",
        0x11,
        8,
        0x20,
        vec![
            BitFieldSpec::new("RESERVED", 6, 2, Access::ReadOnly),
            BitFieldSpec::new("polarity", 5, 1, Access::ReadWrite),
            BitFieldSpec::new("select", 1, 4, Access::ReadWrite),
            BitFieldSpec::new("RESERVED", 0, 1, Access::ReadOnly),
        ],
    )
    .unwrap();

    let offsets: Vec<_> = reg.fields().iter().map(|f| f.offset).collect();
    assert_eq!(offsets, [0, 1, 5, 6]);
    assert_eq!(reg.covered_mask(), 0xff);
}

#[test]
fn register_spec_rejects_malformed_fields() {
    let err = RegisterSpec::new(
        "R",
        0,
        8,
        0,
        vec![BitFieldSpec::new("too_wide", 4, 5, Access::ReadWrite)],
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TemplateError::FieldOutOfRange {
            offset: 4,
            bits: 5,
            width: 8,
            ..
        }
    ));

    let err = RegisterSpec::new(
        "R",
        0,
        8,
        0,
        vec![BitFieldSpec::new("empty", 0, 0, Access::ReadWrite)],
    )
    .unwrap_err();
    assert!(matches!(err, TemplateError::ZeroWidthField { .. }));

    assert!(matches!(
        RegisterSpec::new("R", 0, 0, 0, vec![]),
        Err(TemplateError::RegisterWidth { bits: 0, .. })
    ));
    assert!(matches!(
        RegisterSpec::new("R", 0, 65, 0, vec![]),
        Err(TemplateError::RegisterWidth { bits: 65, .. })
    ));
}

#[test]
fn field_spanning_whole_64_bit_register_is_valid() {
    let reg = RegisterSpec::new(
        "WIDE",
        0,
        64,
        0,
        vec![BitFieldSpec::new("all", 0, 64, Access::ReadWrite)],
    )
    .unwrap();
    assert_eq!(reg.mask(), u64::MAX);
    assert_eq!(reg.covered_mask(), u64::MAX);
}

#[test]
fn bit_field_displays_its_range() {
    assert_eq!(
        BitFieldSpec::new("select", 1, 4, Access::ReadWrite).to_string(),
        "select[4:1]"
    );
    assert_eq!(
        BitFieldSpec::new("polarity", 5, 1, Access::ReadWrite).to_string(),
        "polarity[5]"
    );
}
