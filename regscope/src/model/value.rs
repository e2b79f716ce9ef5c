//! Runtime values attached to register templates
//!
//! A [`RegisterValue`] owns one [`BitFieldValue`] per field of its template and keeps them in
//! step with the register value: after any mutation, every field value equals the field decoded
//! from the register value.

use std::{fmt, str};

use crate::{
    codec,
    error::{BoundsError, EditError},
    model::{BitFieldSpec, RegisterSpec},
};

/// Current value of one bit-field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitFieldValue<'a> {
    spec: &'a BitFieldSpec,
    value: u64,
}

impl<'a> BitFieldValue<'a> {
    pub fn spec(&self) -> &'a BitFieldSpec {
        self.spec
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Picks a field within a register
///
/// Field names are not unique (think `RESERVED`), so fields can also be picked by position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldSelector {
    /// First field with this name
    Name(String),
    /// Field at this position, in ascending offset order
    Index(usize),
}

impl str::FromStr for FieldSelector {
    type Err = std::num::ParseIntError;

    /// `#3` selects by index, anything else by name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('#') {
            Some(index) => Ok(Self::Index(index.parse()?)),
            None => Ok(Self::Name(s.to_owned())),
        }
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name:?}"),
            Self::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// A register template paired with its current value
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterValue<'a> {
    spec: &'a RegisterSpec,
    value: u64,
    fields: Vec<BitFieldValue<'a>>,
}

impl<'a> RegisterValue<'a> {
    /// # Errors
    ///
    /// - `value` does not fit in the register's width
    pub fn new(spec: &'a RegisterSpec, value: u64) -> Result<Self, BoundsError> {
        let mut reg = Self::zeroed(spec);
        reg.set_value(value)?;
        Ok(reg)
    }

    /// Register at its documented reset value, truncated to the register width
    pub fn from_reset(spec: &'a RegisterSpec) -> Self {
        let mut reg = Self::zeroed(spec);
        reg.value = spec.reset_value & spec.mask();
        reg.decode_fields();
        reg
    }

    fn zeroed(spec: &'a RegisterSpec) -> Self {
        Self {
            spec,
            value: 0,
            fields: spec
                .fields()
                .iter()
                .map(|spec| BitFieldValue { spec, value: 0 })
                .collect(),
        }
    }

    pub fn spec(&self) -> &'a RegisterSpec {
        self.spec
    }

    pub fn address(&self) -> u64 {
        self.spec.address
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn fields(&self) -> &[BitFieldValue<'a>] {
        &self.fields
    }

    /// Position of the field picked by `selector`
    pub fn field_index(&self, selector: &FieldSelector) -> Option<usize> {
        match selector {
            FieldSelector::Name(name) => self.fields.iter().position(|f| &f.spec.name == name),
            FieldSelector::Index(index) => (*index < self.fields.len()).then_some(*index),
        }
    }

    pub fn field(&self, selector: &FieldSelector) -> Option<&BitFieldValue<'a>> {
        self.field_index(selector).map(|index| &self.fields[index])
    }

    /// Replace the whole register value, re-deriving every field
    ///
    /// # Errors
    ///
    /// - `value` does not fit in the register's width. The register is left unchanged.
    pub fn set_value(&mut self, value: u64) -> Result<(), BoundsError> {
        let max = self.spec.mask();
        if value > max {
            return Err(BoundsError::new(self.spec.name.clone(), value, max));
        }
        self.value = value;
        self.decode_fields();
        Ok(())
    }

    /// Replace the value of the field at `index`, re-deriving the register value
    ///
    /// The register value is re-encoded from all current field values, so bits outside every
    /// field read as zero afterwards.
    ///
    /// # Errors
    ///
    /// - There is no field at `index`
    /// - `value` is larger than the field's maximum. The register is left unchanged.
    pub fn set_field(&mut self, index: usize, value: u64) -> Result<(), EditError> {
        let field = self
            .fields
            .get_mut(index)
            .ok_or_else(|| EditError::UnknownField {
                register: self.spec.name.clone(),
                selector: FieldSelector::Index(index).to_string(),
            })?;
        let max = codec::max_value(field.spec);
        if value > max {
            return Err(BoundsError::new(field.spec.name.clone(), value, max).into());
        }
        field.value = value;
        self.value = codec::encode(self.fields.iter().map(|f| (f.spec, f.value)));
        // Overlapping fields may see their value change through a sibling
        self.decode_fields();
        Ok(())
    }

    /// Whether every field value matches the register value
    pub fn is_consistent(&self) -> bool {
        self.fields
            .iter()
            .all(|f| f.value == codec::decode(self.value, f.spec))
    }

    fn decode_fields(&mut self) {
        let value = self.value;
        for field in &mut self.fields {
            field.value = codec::decode(value, field.spec);
        }
        debug_assert!(self.is_consistent());
    }
}

#[cfg(test)]
use crate::model::Access;

#[cfg(test)]
fn nibbles() -> RegisterSpec {
    RegisterSpec::new(
        "NIBBLES",
        0x10,
        8,
        0x5a,
        vec![
            BitFieldSpec::new("A", 0, 4, Access::ReadWrite),
            BitFieldSpec::new("B", 4, 4, Access::ReadWrite),
        ],
    )
    .unwrap()
}

#[test]
fn new_register_value_decodes_fields() {
    let spec = nibbles();
    let reg = RegisterValue::new(&spec, 0x3a).unwrap();
    let a = reg.field(&FieldSelector::Name("A".into())).unwrap();
    let b = reg.field(&FieldSelector::Name("B".into())).unwrap();
    assert_eq!(a.value(), 0xa);
    assert_eq!(b.value(), 0x3);
    assert!(reg.is_consistent());
}

#[test]
fn from_reset_uses_reset_value() {
    let spec = nibbles();
    let reg = RegisterValue::from_reset(&spec);
    assert_eq!(reg.value(), 0x5a);
    assert_eq!(reg.fields()[0].value(), 0xa);
    assert_eq!(reg.fields()[1].value(), 0x5);
}

#[test]
fn set_value_rejects_values_wider_than_register() {
    let spec = nibbles();
    let mut reg = RegisterValue::new(&spec, 0x3a).unwrap();
    let err = reg.set_value(0x100).unwrap_err();
    assert_eq!(err.max, 0xff);
    assert_eq!(reg.value(), 0x3a);
    assert!(reg.is_consistent());
}

#[test]
fn set_field_re_encodes_register() {
    let spec = nibbles();
    let mut reg = RegisterValue::new(&spec, 0x3a).unwrap();
    reg.set_field(1, 0xc).unwrap();
    assert_eq!(reg.value(), 0xca);
    // The other field keeps its value
    assert_eq!(reg.fields()[0].value(), 0xa);
    assert!(reg.is_consistent());
}

#[test]
fn set_field_rejects_out_of_bounds_value() {
    let spec = RegisterSpec::new(
        "ALL_FIELDS",
        0x20,
        16,
        0,
        vec![
            BitFieldSpec::new("a", 0, 4, Access::ReadWrite),
            BitFieldSpec::new("b", 4, 4, Access::ReadWrite),
            BitFieldSpec::new("c", 8, 8, Access::ReadWrite),
        ],
    )
    .unwrap();
    let mut reg = RegisterValue::new(&spec, 0x1234).unwrap();
    let err = reg.set_field(0, 0x1f).unwrap_err();
    assert_eq!(
        err,
        EditError::Bounds(BoundsError {
            target: "a".to_owned(),
            value: 0x1f,
            max: 0xf
        })
    );
    assert_eq!(reg.value(), 0x1234);
    assert_eq!(reg.fields()[0].value(), 0x4);
}

#[test]
fn set_field_rejects_unknown_index() {
    let spec = nibbles();
    let mut reg = RegisterValue::new(&spec, 0).unwrap();
    assert!(matches!(
        reg.set_field(2, 0),
        Err(EditError::UnknownField { .. })
    ));
}

#[test]
fn set_field_clears_uncovered_bits() {
    let spec = RegisterSpec::new(
        "GAP",
        0,
        8,
        0,
        vec![BitFieldSpec::new("lo", 0, 4, Access::ReadWrite)],
    )
    .unwrap();
    let mut reg = RegisterValue::new(&spec, 0xf3).unwrap();
    reg.set_field(0, 0x5).unwrap();
    assert_eq!(reg.value(), 0x05);
}

#[test]
fn single_field_edit_does_not_disturb_siblings() {
    let spec = RegisterSpec::new(
        "MIXED",
        0,
        32,
        0,
        vec![
            BitFieldSpec::new("flag", 0, 1, Access::ReadWrite),
            BitFieldSpec::new("mode", 1, 3, Access::ReadWrite),
            BitFieldSpec::new("count", 4, 12, Access::ReadWrite),
            BitFieldSpec::new("RESERVED", 16, 16, Access::ReadOnly),
        ],
    )
    .unwrap();
    let start = 0xa5a5_5a5b;
    for index in 0..spec.fields().len() {
        let mut reg = RegisterValue::new(&spec, start).unwrap();
        let before: Vec<_> = reg.fields().iter().map(BitFieldValue::value).collect();
        let new_value = codec::max_value(&spec.fields()[index]) / 3;
        reg.set_field(index, new_value).unwrap();

        let rederived = RegisterValue::new(&spec, reg.value()).unwrap();
        for (i, field) in rederived.fields().iter().enumerate() {
            if i == index {
                assert_eq!(field.value(), new_value);
            } else {
                assert_eq!(field.value(), before[i]);
            }
        }
    }
}

#[test]
fn duplicate_names_are_addressable_by_index() {
    let spec = RegisterSpec::new(
        "DUPES",
        0,
        8,
        0,
        vec![
            BitFieldSpec::new("RESERVED", 0, 1, Access::ReadOnly),
            BitFieldSpec::new("enable", 1, 1, Access::ReadWrite),
            BitFieldSpec::new("RESERVED", 2, 6, Access::ReadOnly),
        ],
    )
    .unwrap();
    let mut reg = RegisterValue::new(&spec, 0).unwrap();
    assert_eq!(
        reg.field_index(&FieldSelector::Name("RESERVED".into())),
        Some(0)
    );
    reg.set_field(2, 0x3f).unwrap();
    assert_eq!(reg.value(), 0xfc);
    assert_eq!(reg.fields()[0].value(), 0);
}

#[test]
fn field_selector_parses() {
    assert_eq!("#2".parse(), Ok(FieldSelector::Index(2)));
    assert_eq!("enable".parse(), Ok(FieldSelector::Name("enable".into())));
    assert!("#x".parse::<FieldSelector>().is_err());
}
