//! Register templates, the catalog that holds them, and the runtime values that refer to them.

mod register;
mod value;

// Anything that's part of the public API of register or value is also part of the public API of model
pub use register::*;
pub use value::*;

use std::ops;

use crate::{error::TemplateError, filtering::ItemFilter};

/// All register templates of one device, ordered by address (newtype)
#[derive(Clone, Debug, Default)]
pub struct Catalog(Vec<RegisterSpec>);

impl Catalog {
    /// Template for the register at `address`
    pub fn get(&self, address: u64) -> Option<&RegisterSpec> {
        self.0
            .binary_search_by_key(&address, |reg| reg.address)
            .ok()
            .map(|index| &self.0[index])
    }

    /// Registers whose name passes `filter`
    pub fn filter<'a>(&'a self, filter: &'a ItemFilter) -> impl Iterator<Item = &'a RegisterSpec> {
        self.0.iter().filter(|reg| filter.is_allowed(&reg.name))
    }
}

impl TryFrom<Vec<RegisterSpec>> for Catalog {
    type Error = TemplateError;

    /// Sort `value` by address
    ///
    /// # Errors
    ///
    /// - Two registers share an address
    fn try_from(mut value: Vec<RegisterSpec>) -> Result<Self, Self::Error> {
        value.sort_by_key(|reg| reg.address);
        if let Some(dup) = value.windows(2).find(|w| w[0].address == w[1].address) {
            return Err(TemplateError::DuplicateAddress(dup[0].address));
        }
        Ok(Self(value))
    }
}

impl ops::Deref for Catalog {
    type Target = [RegisterSpec];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
fn reg(name: &str, address: u64) -> RegisterSpec {
    RegisterSpec::new(
        name,
        address,
        8,
        0,
        vec![BitFieldSpec::new(name.to_lowercase(), 0, 8, Access::ReadWrite)],
    )
    .unwrap()
}

#[test]
fn catalog_is_sorted_and_searchable() {
    let catalog = Catalog::try_from(vec![
        reg("SYSRANGE__START", 0x18),
        reg("IDENTIFICATION__MODEL_ID", 0x00),
        reg("SYSTEM__FRESH_OUT_OF_RESET", 0x16),
    ])
    .unwrap();
    let addrs: Vec<_> = catalog.iter().map(|r| r.address).collect();
    assert_eq!(addrs, [0x00, 0x16, 0x18]);
    assert_eq!(catalog.get(0x16).unwrap().name, "SYSTEM__FRESH_OUT_OF_RESET");
    assert!(catalog.get(0x17).is_none());
}

#[test]
fn catalog_rejects_duplicate_addresses() {
    let err = Catalog::try_from(vec![reg("A", 0x10), reg("B", 0x10)]).unwrap_err();
    assert_eq!(err, TemplateError::DuplicateAddress(0x10));
}

#[test]
fn catalog_filters_by_name() {
    let catalog = Catalog::try_from(vec![
        reg("SYSRANGE__START", 0x18),
        reg("SYSALS__START", 0x38),
    ])
    .unwrap();
    let filter = ItemFilter::list(None, vec!["SYSALS__START".into()]);
    let names: Vec<_> = catalog.filter(&filter).map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["SYSRANGE__START"]);
}

#[test]
fn catalog_filters_by_exact_names() {
    let catalog = Catalog::try_from(vec![
        reg("SYSRANGE__START", 0x18),
        reg("SYSRANGE__THRESH_HIGH", 0x19),
        reg("SYSALS__START", 0x38),
    ])
    .unwrap();
    let filter = ItemFilter::list(
        Some(vec!["SYSALS__START".into(), "SYSRANGE__START".into()]),
        vec![],
    );
    let names: Vec<_> = catalog.filter(&filter).map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["SYSRANGE__START", "SYSALS__START"]);
}
