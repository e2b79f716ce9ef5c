//! Address/value text files
//!
//! One register per line, `ADDRESS,VALUE`, both in hexadecimal without a prefix. Addresses are
//! written with 8 digits, values with the digit count of their register width.

use itertools::Itertools;
use log::warn;
use regex::Regex;

use crate::{format, model::RegisterValue};

/// Collect `(address, value)` pairs from value file text
///
/// Lines that are not two comma-separated hex tokens are skipped.
pub fn parse_value_lines(text: &str) -> Vec<(u64, u64)> {
    use lazy_static::lazy_static;
    lazy_static! {
        static ref LINE_RE: Regex = Regex::new(
            r"(?x)
            ^[[:space:]]*
            ([[:xdigit:]]+)         # address (captured as #1)
            [[:space:]]*,[[:space:]]*
            ([[:xdigit:]]+)         # value (captured as #2)
            [[:space:]]*$
        ").unwrap();
    }

    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let parsed = LINE_RE.captures(line).and_then(|captures| {
                let addr = format::parse_hex(&captures[1]).ok()?;
                let value = format::parse_hex(&captures[2]).ok()?;
                Some((addr, value))
            });
            if parsed.is_none() && !line.trim().is_empty() {
                warn!("skipping line {}: {line:?} is not an address/value pair", index + 1);
            }
            parsed
        })
        .collect_vec()
}

/// Render registers as value file text
pub fn render_value_lines<'r, 'a: 'r, I>(registers: I) -> String
where
    I: IntoIterator<Item = &'r RegisterValue<'a>>,
{
    registers
        .into_iter()
        .map(|reg| {
            format!(
                "{},{}\n",
                format::format_address(reg.address()),
                format::format_hex(reg.value(), reg.spec().bits)
            )
        })
        .collect()
}

#[test]
fn parse_value_lines_skips_garbage() {
    let text = "00000212,29\n\
                not a line\n\
                2A3 , 01\r\n\
                \n\
                0000003A,G1\n\
                0000006C,DEADBEEF\n\
                10,20,30\n";
    assert_eq!(
        parse_value_lines(text),
        [(0x212, 0x29), (0x2a3, 0x01), (0x6c, 0xdead_beef)]
    );
}

#[test]
fn render_value_lines_pads_by_width() {
    use crate::model::{Access, BitFieldSpec, RegisterSpec};

    let byte = RegisterSpec::new(
        "I2C_SLAVE__DEVICE_ADDRESS",
        0x212,
        8,
        0x29,
        vec![BitFieldSpec::new("addr", 0, 7, Access::ReadWrite)],
    )
    .unwrap();
    let word = RegisterSpec::new("SYSRANGE__CROSSTALK_COMPENSATION_RATE", 0x1e, 16, 0, vec![])
        .unwrap();
    let dword = RegisterSpec::new("RESULT__RANGE_RETURN_SIGNAL_COUNT", 0x6c, 32, 0, vec![])
        .unwrap();

    let regs = [
        RegisterValue::from_reset(&byte),
        RegisterValue::new(&word, 0x12).unwrap(),
        RegisterValue::new(&dword, 0xbeef).unwrap(),
    ];
    assert_eq!(
        render_value_lines(&regs),
        "00000212,29\n0000001E,0012\n0000006C,0000BEEF\n"
    );
}

#[test]
fn rendered_lines_parse_back() {
    use crate::model::RegisterSpec;

    let spec = RegisterSpec::new("R", 0x3a, 16, 0, vec![]).unwrap();
    let regs = [RegisterValue::new(&spec, 0x0bad).unwrap()];
    assert_eq!(parse_value_lines(&render_value_lines(&regs)), [(0x3a, 0x0bad)]);
}
