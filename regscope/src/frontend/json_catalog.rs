//! Template catalog parser for JSON input
//!
//! The catalog is an array of register objects:
//!
//! ```json
//! [{ "name": "FIRMWARE__BOOTUP", "address": "0x119", "bits": 8, "reset": "0x1",
//!    "fields": [{ "name": "firmware__bootup", "offset": 0, "bits": 1, "access": "read-write" },
//!               { "name": "RESERVED", "offset": 1, "bits": 7, "access": "read-only" }] }]
//! ```

use std::str::FromStr;

use json::{object::Object, JsonValue};
use log::{debug, warn};
use regex::Regex;

use crate::{
    error::CatalogError,
    model::{Access, BitFieldSpec, Catalog, RegisterSpec},
};

/// Parses a non-negative integer written as `0x`-prefixed hex or as decimal
fn parse_nonneg_int(text: &str) -> Option<u64> {
    // Compile Regexes only once as recommended by the documentation of the Regex crate
    use lazy_static::lazy_static;
    lazy_static! {
        /// Hexadecimal with a mandatory prefix
        static ref HEX_NONNEG_INT_RE: Regex = Regex::new(
            r"(?x)              # insignificant whitespace
            ^\+?                # zero or one plus sign
            (?:0x|0X)           # hexadecimal prefix
            ([[:xdigit:]]+)$    # one or more hexadecimal digits (captured as #1)
        ").unwrap();

        /// Plain decimal
        static ref DEC_NONNEG_INT_RE: Regex = Regex::new(
            r"(?x)              # insignificant whitespace
            ^\+?                # zero or one plus sign
            ([[:digit:]]+)$     # one or more decimal digits (captured as #1)
        ").unwrap();
    }

    let text = text.trim();
    if let Some(captures) = HEX_NONNEG_INT_RE.captures(text) {
        u64::from_str_radix(&captures[1], 16).ok()
    } else if let Some(captures) = DEC_NONNEG_INT_RE.captures(text) {
        captures[1].parse().ok()
    } else {
        None
    }
}

#[test]
fn parse_nonneg_int_works() {
    assert_eq!(parse_nonneg_int("0x2A3"), Some(0x2a3));
    assert_eq!(parse_nonneg_int("0X2a3"), Some(0x2a3));
    assert_eq!(parse_nonneg_int("+0x10"), Some(0x10));
    assert_eq!(parse_nonneg_int("42"), Some(42));
    assert_eq!(parse_nonneg_int(" 7 "), Some(7));
    assert_eq!(parse_nonneg_int("2A3"), None);
    assert_eq!(parse_nonneg_int("-1"), None);
    assert_eq!(parse_nonneg_int("0x"), None);
}

/// Accessors for the members of one catalog object
struct Entry<'a> {
    obj: &'a Object,
    /// Where the object is, for error messages
    context: String,
}

impl<'a> Entry<'a> {
    fn new(value: &'a JsonValue, context: String) -> Result<Self, CatalogError> {
        match value {
            JsonValue::Object(obj) => Ok(Self { obj, context }),
            other => Err(CatalogError::ExpectedObject(other.dump())),
        }
    }

    fn get(&self, field: &str) -> Result<&'a JsonValue, CatalogError> {
        self.obj
            .get(field)
            .ok_or_else(|| CatalogError::FieldNotFound {
                field: field.to_owned(),
                context: self.context.clone(),
            })
    }

    fn str(&self, field: &str) -> Result<&'a str, CatalogError> {
        let value = self.get(field)?;
        value.as_str().ok_or_else(|| self.invalid(field, value))
    }

    fn maybe_str(&self, field: &str) -> Result<Option<&'a str>, CatalogError> {
        match self.obj.get(field) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| self.invalid(field, value)),
        }
    }

    /// Integer given either as a JSON number or as a string
    fn uint(&self, field: &str) -> Result<u64, CatalogError> {
        let value = self.get(field)?;
        let parsed = match value {
            JsonValue::Number(_) => value.as_u64(),
            JsonValue::Short(_) | JsonValue::String(_) => value.as_str().and_then(parse_nonneg_int),
            _ => None,
        };
        parsed.ok_or_else(|| self.invalid(field, value))
    }

    fn u32(&self, field: &str) -> Result<u32, CatalogError> {
        let value = self.uint(field)?;
        u32::try_from(value).map_err(|_| CatalogError::InvalidValue {
            field: field.to_owned(),
            value: value.to_string(),
            context: self.context.clone(),
        })
    }

    fn invalid(&self, field: &str, value: &JsonValue) -> CatalogError {
        CatalogError::InvalidValue {
            field: field.to_owned(),
            value: value.dump(),
            context: self.context.clone(),
        }
    }
}

fn parse_field(value: &JsonValue, register: &str, index: usize) -> Result<BitFieldSpec, CatalogError> {
    let entry = Entry::new(value, format!("field #{index} of register {register:?}"))?;
    let name = entry.str("name")?;
    let access = match entry.maybe_str("access")? {
        Some(s) => Access::from_str(s).map_err(|_| CatalogError::InvalidAccess(s.to_owned()))?,
        None => {
            warn!("property 'access' is not defined for field '{name}' of register '{register}', assuming access = read-write");
            Access::ReadWrite
        }
    };
    let mut field = BitFieldSpec::new(name, entry.u32("offset")?, entry.u32("bits")?, access);
    if let Some(description) = entry.maybe_str("description")? {
        field = field.with_description(description);
    }
    Ok(field)
}

impl TryFrom<&JsonValue> for RegisterSpec {
    type Error = CatalogError;

    fn try_from(value: &JsonValue) -> Result<Self, Self::Error> {
        let entry = Entry::new(value, "register".to_owned())?;
        let name = entry.str("name")?;
        let entry = Entry {
            context: format!("register {name:?}"),
            ..entry
        };
        let reset_value = if entry.obj.get("reset").is_some() {
            entry.uint("reset")?
        } else {
            debug!("property 'reset' is not defined for register '{name}', assuming reset = 0");
            0
        };
        let fields = match entry.obj.get("fields") {
            Some(JsonValue::Array(fields)) => fields
                .iter()
                .enumerate()
                .map(|(index, field)| parse_field(field, name, index))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(CatalogError::ExpectedArray(other.dump())),
            None => vec![],
        };
        Ok(RegisterSpec::new(
            name,
            entry.uint("address")?,
            entry.u32("bits")?,
            reset_value,
            fields,
        )?)
    }
}

/// Parse a template catalog from JSON text
///
/// # Errors
///
/// - Text is not JSON, or not an array of register objects
/// - A register or field is missing a mandatory member or has a malformed one
/// - A template is malformed, see [`RegisterSpec::new`]
/// - Two registers share an address
pub fn parse_catalog(text: &str) -> Result<Catalog, CatalogError> {
    match json::parse(text)? {
        JsonValue::Array(array) => Ok(Catalog::try_from(
            array
                .iter()
                .map(RegisterSpec::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        )?),
        other => Err(CatalogError::ExpectedArray(other.dump())),
    }
}

#[cfg(test)]
use crate::error::TemplateError;

#[test]
fn parse_catalog_reads_registers_and_fields() {
    let text = indoc::indoc! {r#"
        [
            {
                "name": "I2C_SLAVE__DEVICE_ADDRESS",
                "address": "0x212",
                "bits": 8,
                "reset": "0x29",
                "fields": [
                    { "name": "RESERVED", "offset": 7, "bits": 1, "access": "read-only" },
                    {
                        "name": "super_i2c_slave__device_address",
                        "offset": 0,
                        "bits": 7,
                        "access": "read-write",
                        "description": "User programmable I2C address (7-bit)."
                    }
                ]
            },
            { "name": "SYSRANGE__START", "address": 24, "bits": 8, "fields": [] }
        ]
    "#};
    let catalog = parse_catalog(text).unwrap();
    assert_eq!(catalog.len(), 2);

    let range_start = &catalog[0];
    assert_eq!(range_start.address, 0x18);
    assert_eq!(range_start.reset_value, 0);

    let slave_addr = catalog.get(0x212).unwrap();
    assert_eq!(slave_addr.reset_value, 0x29);
    let fields = slave_addr.fields();
    assert_eq!(fields[0].name, "super_i2c_slave__device_address");
    assert_eq!(fields[0].bits, 7);
    assert_eq!(fields[0].access, Access::ReadWrite);
    assert!(fields[0].description.is_some());
    assert_eq!(fields[1].name, "RESERVED");
    assert_eq!(fields[1].access, Access::ReadOnly);
}

#[test]
fn parse_catalog_reports_template_errors() {
    let text = r#"[{ "name": "BAD", "address": 1, "bits": 8,
                     "fields": [{ "name": "f", "offset": 6, "bits": 4, "access": "read-write" }] }]"#;
    assert!(matches!(
        parse_catalog(text),
        Err(CatalogError::Template(TemplateError::FieldOutOfRange { .. }))
    ));
}

#[test]
fn parse_catalog_reports_shape_errors() {
    assert!(matches!(
        parse_catalog(r#"{ "name": "x" }"#),
        Err(CatalogError::ExpectedArray(_))
    ));
    assert!(matches!(parse_catalog("[1]"), Err(CatalogError::ExpectedObject(_))));
    assert!(matches!(
        parse_catalog(r#"[{ "name": "x", "bits": 8 }]"#),
        Err(CatalogError::FieldNotFound { .. })
    ));
    assert!(matches!(
        parse_catalog(r#"[{ "name": "x", "address": "zz", "bits": 8 }]"#),
        Err(CatalogError::InvalidValue { .. })
    ));
    assert!(matches!(
        parse_catalog(
            r#"[{ "name": "x", "address": 1, "bits": 8,
                  "fields": [{ "name": "f", "offset": 0, "bits": 1, "access": "write-only" }] }]"#
        ),
        Err(CatalogError::InvalidAccess(_))
    ));
    assert!(matches!(parse_catalog("not json"), Err(CatalogError::Json(_))));
}

#[test]
fn parse_catalog_rejects_duplicate_addresses() {
    let text = r#"[{ "name": "A", "address": 1, "bits": 8 }, { "name": "B", "address": "0x1", "bits": 8 }]"#;
    assert!(matches!(
        parse_catalog(text),
        Err(CatalogError::Template(TemplateError::DuplicateAddress(1)))
    ));
}
