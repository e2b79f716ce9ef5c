//! Extracts bit-field values from a register value and packs them back
//!
//! All functions are pure. Field placement is validated when a [`RegisterSpec`] is constructed,
//! so nothing here can fail.

use crate::model::{BitFieldSpec, RegisterSpec};

/// Mask of the `bits` lowest bits, saturating at 64
#[must_use]
pub const fn mask(bits: u32) -> u64 {
    if bits >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

#[test]
fn mask_works() {
    assert_eq!(mask(0), 0);
    assert_eq!(mask(1), 0b1);
    assert_eq!(mask(4), 0xf);
    assert_eq!(mask(16), 0xffff);
    assert_eq!(mask(63), u64::MAX >> 1);
    assert_eq!(mask(64), u64::MAX);
}

/// Largest value `field` can hold, i.e., `2^bits - 1`
///
/// Callers use this to reject an edited field value before it reaches [`encode`].
#[must_use]
pub fn max_value(field: &BitFieldSpec) -> u64 {
    mask(field.bits)
}

/// Extract the value of `field` from `register_value`
#[must_use]
pub fn decode(register_value: u64, field: &BitFieldSpec) -> u64 {
    (register_value >> field.offset) & mask(field.bits)
}

/// Recombine a register value from `(field, value)` pairs
///
/// Each value is shifted into place and OR'd together. Values are not re-validated: a value
/// wider than its field spills into the neighboring bits. Bits not covered by any field come
/// out as zero.
pub fn encode<'a, I>(fields: I) -> u64
where
    I: IntoIterator<Item = (&'a BitFieldSpec, u64)>,
{
    fields
        .into_iter()
        .fold(0, |acc, (field, value)| acc | (value << field.offset))
}

/// Decode every field of `register` in template order
pub fn decode_all(register_value: u64, register: &RegisterSpec) -> impl Iterator<Item = u64> + '_ {
    register
        .fields()
        .iter()
        .map(move |field| decode(register_value, field))
}

#[cfg(test)]
use crate::model::Access;

#[cfg(test)]
fn nibbles() -> RegisterSpec {
    RegisterSpec::new(
        "NIBBLES",
        0x10,
        8,
        0,
        vec![
            BitFieldSpec::new("A", 0, 4, Access::ReadWrite),
            BitFieldSpec::new("B", 4, 4, Access::ReadWrite),
        ],
    )
    .unwrap()
}

#[test]
fn decode_splits_byte_into_nibbles() {
    let reg = nibbles();
    let [a, b] = reg.fields() else {
        unreachable!()
    };
    assert_eq!(decode(0x3a, a), 0xa);
    assert_eq!(decode(0x3a, b), 0x3);
}

#[test]
fn encode_joins_nibbles() {
    let reg = nibbles();
    let [a, b] = reg.fields() else {
        unreachable!()
    };
    assert_eq!(encode([(a, 0xa), (b, 0x3)]), 0x3a);
    // Order does not matter
    assert_eq!(encode([(b, 0x3), (a, 0xa)]), 0x3a);
}

#[test]
fn encode_does_not_clamp_oversized_values() {
    let reg = nibbles();
    let [a, b] = reg.fields() else {
        unreachable!()
    };
    // 0x1f does not fit in A and bleeds into B
    assert_eq!(encode([(a, 0x1f), (b, 0x0)]), 0x1f);
}

#[test]
fn decode_never_exceeds_max_value() {
    let reg = RegisterSpec::new(
        "ODD",
        0,
        32,
        0,
        vec![
            BitFieldSpec::new("a", 0, 3, Access::ReadWrite),
            BitFieldSpec::new("b", 3, 7, Access::ReadWrite),
            BitFieldSpec::new("c", 10, 13, Access::ReadWrite),
            BitFieldSpec::new("d", 23, 9, Access::ReadWrite),
        ],
    )
    .unwrap();
    let samples = [0, 1, 0xdead_beef, 0xffff_ffff, 0x8000_0001, 0x1234_5678];
    for value in samples {
        for field in reg.fields() {
            assert!(decode(value, field) <= max_value(field));
        }
    }
}

#[test]
fn round_trip_over_covered_bits() {
    // Gaps at bits 3 and 12..16
    let reg = RegisterSpec::new(
        "GAPPY",
        0,
        16,
        0,
        vec![
            BitFieldSpec::new("lo", 0, 3, Access::ReadWrite),
            BitFieldSpec::new("mid", 4, 8, Access::ReadWrite),
        ],
    )
    .unwrap();
    let covered = reg.covered_mask();
    for value in 0..=u16::MAX as u64 {
        let decoded: Vec<_> = decode_all(value, &reg).collect();
        let encoded = encode(reg.fields().iter().zip(decoded));
        assert_eq!(encoded, value & covered, "value {value:#x}");
    }
}

#[test]
fn full_width_field_round_trips_at_64_bits() {
    let reg = RegisterSpec::new(
        "WIDE",
        0,
        64,
        0,
        vec![
            BitFieldSpec::new("lo", 0, 1, Access::ReadWrite),
            BitFieldSpec::new("hi", 1, 63, Access::ReadWrite),
        ],
    )
    .unwrap();
    let value = 0xfedc_ba98_7654_3211;
    let decoded: Vec<_> = decode_all(value, &reg).collect();
    assert_eq!(decoded, [1, value >> 1]);
    assert_eq!(encode(reg.fields().iter().zip(decoded)), value);
}

#[test]
fn max_value_is_all_ones() {
    for bits in 1..=64 {
        let field = BitFieldSpec::new("f", 0, bits, Access::ReadWrite);
        let expected = if bits == 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        };
        assert_eq!(max_value(&field), expected);
    }
}
