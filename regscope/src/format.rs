//! Fixed-width hexadecimal text for register and field values
//!
//! The digit count follows the value's declared width, matching what the device tooling has
//! always used: up to 8 bits is 2 digits, up to 16 bits is 4, up to 32 bits is 8, anything wider
//! is printed without padding.

use crate::{codec, error::ValueParseError, model::ValueSize};

/// Render `value` as uppercase hex padded for a `bits` wide value
#[must_use]
pub fn format_hex(value: u64, bits: u32) -> String {
    match ValueSize::from_bit_width(bits).hex_digits() {
        Some(digits) => format!("{value:0digits$X}"),
        None => format!("{value:X}"),
    }
}

/// Render a register address the way value files store it
#[must_use]
pub fn format_address(address: u64) -> String {
    format!("{address:08X}")
}

/// Parse free-form hexadecimal text, without a `0x` prefix
///
/// Case-insensitive, surrounding whitespace is ignored. Anything else is an error, the text is
/// never coerced into zero.
pub fn parse_hex(text: &str) -> Result<u64, ValueParseError> {
    let digits = text.trim();
    if digits.is_empty() {
        return Err(ValueParseError::Empty);
    }
    // `from_str_radix` would also take a leading sign
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValueParseError::InvalidHex(text.to_owned()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| ValueParseError::Overflow {
        text: text.to_owned(),
        bits: u64::BITS,
    })
}

/// Parse hexadecimal text and check that it fits in `bits`
pub fn parse_hex_for_width(text: &str, bits: u32) -> Result<u64, ValueParseError> {
    let value = parse_hex(text)?;
    if value > codec::mask(bits) {
        return Err(ValueParseError::Overflow {
            text: text.to_owned(),
            bits,
        });
    }
    Ok(value)
}

#[test]
fn format_hex_pads_by_width() {
    assert_eq!(format_hex(0xa, 4), "0A");
    assert_eq!(format_hex(0x3a, 8), "3A");
    assert_eq!(format_hex(0x3a, 12), "003A");
    assert_eq!(format_hex(0xbeef, 16), "BEEF");
    assert_eq!(format_hex(0x1, 17), "00000001");
    assert_eq!(format_hex(0xdead_beef, 32), "DEADBEEF");
    assert_eq!(format_hex(0x1_0000_0000, 64), "100000000");
    assert_eq!(format_hex(0x5, 40), "5");
}

#[test]
fn format_address_is_eight_digits() {
    assert_eq!(format_address(0x212), "00000212");
    assert_eq!(format_address(0x2a3), "000002A3");
}

#[test]
fn parse_hex_works() {
    assert_eq!(parse_hex("3A"), Ok(0x3a));
    assert_eq!(parse_hex("3a"), Ok(0x3a));
    assert_eq!(parse_hex(" 00ff\r"), Ok(0xff));
    assert_eq!(parse_hex("FFFFFFFFFFFFFFFF"), Ok(u64::MAX));
}

#[test]
fn parse_hex_reports_failures() {
    assert_eq!(
        parse_hex("G1"),
        Err(ValueParseError::InvalidHex("G1".to_owned()))
    );
    assert_eq!(parse_hex(""), Err(ValueParseError::Empty));
    assert!(matches!(parse_hex("0x10"), Err(ValueParseError::InvalidHex(_))));
    assert!(matches!(parse_hex("+10"), Err(ValueParseError::InvalidHex(_))));
    assert!(matches!(
        parse_hex("10000000000000000"),
        Err(ValueParseError::Overflow { bits: 64, .. })
    ));
}

#[test]
fn parse_hex_for_width_rejects_overflow() {
    assert_eq!(parse_hex_for_width("FF", 8), Ok(0xff));
    assert_eq!(
        parse_hex_for_width("1F", 4),
        Err(ValueParseError::Overflow {
            text: "1F".to_owned(),
            bits: 4
        })
    );
}

#[test]
fn formatted_values_parse_back() {
    let samples: [(u64, u32); 6] = [
        (0, 8),
        (0xff, 8),
        (0x1234, 16),
        (0xffff, 16),
        (0x0bad_cafe, 32),
        (u32::MAX as u64, 32),
    ];
    for (value, bits) in samples {
        assert_eq!(parse_hex(&format_hex(value, bits)), Ok(value));
    }
}
