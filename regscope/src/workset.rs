//! The registers an operator is currently working with

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::{
    error::EditError,
    model::{Access, Catalog, FieldSelector, RegisterValue},
};

/// Whether read-only fields accept edits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditPolicy {
    AllowReadOnly,
    #[default]
    RejectReadOnly,
}

/// Register values keyed by address, each referring to its template in one catalog
#[derive(Clone, Debug)]
pub struct WorkingSet<'c> {
    catalog: &'c Catalog,
    registers: BTreeMap<u64, RegisterValue<'c>>,
}

impl<'c> WorkingSet<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            registers: BTreeMap::new(),
        }
    }

    /// Build a working set from `(address, value)` pairs, e.g., the lines of a value file
    ///
    /// Entries whose address is not in the catalog, or whose value does not fit the register,
    /// are skipped with a warning. A later entry for the same address replaces an earlier one.
    pub fn from_entries<I>(catalog: &'c Catalog, entries: I) -> Self
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        let mut set = Self::new(catalog);
        for (address, value) in entries {
            let Some(spec) = catalog.get(address) else {
                warn!("address {address:#x} is not in the catalog, skipping");
                continue;
            };
            match RegisterValue::new(spec, value) {
                Ok(reg) => {
                    if set.registers.insert(address, reg).is_some() {
                        debug!("address {address:#x} given more than once, keeping the last value");
                    }
                }
                Err(e) => warn!("skipping entry for {}: {e}", spec.name),
            }
        }
        set
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    /// Bring the register at `address` in at its reset value
    ///
    /// A register that is already present keeps its current value.
    ///
    /// # Errors
    ///
    /// - `address` is not in the catalog
    pub fn insert(&mut self, address: u64) -> Result<&mut RegisterValue<'c>, EditError> {
        let spec = self
            .catalog
            .get(address)
            .ok_or(EditError::NotInCatalog(address))?;
        Ok(self
            .registers
            .entry(address)
            .or_insert_with(|| RegisterValue::from_reset(spec)))
    }

    /// Drop the register at `address`, returning it if it was present
    pub fn remove(&mut self, address: u64) -> Option<RegisterValue<'c>> {
        self.registers.remove(&address)
    }

    pub fn get(&self, address: u64) -> Option<&RegisterValue<'c>> {
        self.registers.get(&address)
    }

    /// Replace the whole value of a register in the set
    ///
    /// # Errors
    ///
    /// - The register is not in the working set
    /// - `value` does not fit the register
    pub fn set_register(&mut self, address: u64, value: u64) -> Result<(), EditError> {
        let reg = self
            .registers
            .get_mut(&address)
            .ok_or(EditError::UnknownRegister(address))?;
        reg.set_value(value)?;
        Ok(())
    }

    /// Replace the value of one field of a register in the set
    ///
    /// # Errors
    ///
    /// - The register is not in the working set, or has no such field
    /// - The field is read-only and `policy` rejects read-only edits
    /// - `value` does not fit the field
    pub fn edit_field(
        &mut self,
        address: u64,
        selector: &FieldSelector,
        value: u64,
        policy: EditPolicy,
    ) -> Result<(), EditError> {
        let reg = self
            .registers
            .get_mut(&address)
            .ok_or(EditError::UnknownRegister(address))?;
        let index = reg
            .field_index(selector)
            .ok_or_else(|| EditError::UnknownField {
                register: reg.spec().name.clone(),
                selector: selector.to_string(),
            })?;
        let field = reg.fields()[index].spec();
        if field.access == Access::ReadOnly && policy == EditPolicy::RejectReadOnly {
            return Err(EditError::ReadOnly {
                register: reg.spec().name.clone(),
                field: field.name.clone(),
            });
        }
        reg.set_field(index, value)
    }

    /// Registers in ascending address order
    pub fn iter(&self) -> impl Iterator<Item = &RegisterValue<'c>> {
        self.registers.values()
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

#[cfg(test)]
fn catalog() -> Catalog {
    use crate::model::{BitFieldSpec, RegisterSpec};

    Catalog::try_from(vec![
        RegisterSpec::new(
            "I2C_SLAVE__DEVICE_ADDRESS",
            0x212,
            8,
            0x29,
            vec![
                BitFieldSpec::new("super_i2c_slave__device_address", 0, 7, Access::ReadWrite),
                BitFieldSpec::new("RESERVED", 7, 1, Access::ReadOnly),
            ],
        )
        .unwrap(),
        RegisterSpec::new(
            "SYSTEM__MODE_GPIO1",
            0x11,
            8,
            0,
            vec![
                BitFieldSpec::new("RESERVED", 0, 1, Access::ReadOnly),
                BitFieldSpec::new("select", 1, 4, Access::ReadWrite),
                BitFieldSpec::new("polarity", 5, 1, Access::ReadWrite),
                BitFieldSpec::new("RESERVED", 6, 2, Access::ReadOnly),
            ],
        )
        .unwrap(),
    ])
    .unwrap()
}

#[test]
fn from_entries_skips_unknown_and_oversized() {
    let catalog = catalog();
    let set = WorkingSet::from_entries(
        &catalog,
        [(0x212, 0x29), (0x999, 1), (0x11, 0x100), (0x11, 0x10), (0x11, 0x30)],
    );
    assert_eq!(set.len(), 2);
    assert_eq!(set.get(0x11).unwrap().value(), 0x30);
    let addrs: Vec<_> = set.iter().map(RegisterValue::address).collect();
    assert_eq!(addrs, [0x11, 0x212]);
}

#[test]
fn insert_and_remove() {
    let catalog = catalog();
    let mut set = WorkingSet::new(&catalog);
    assert!(set.is_empty());
    assert_eq!(set.insert(0x212).unwrap().value(), 0x29);
    set.set_register(0x212, 0x2a).unwrap();
    // Already present, value is kept
    assert_eq!(set.insert(0x212).unwrap().value(), 0x2a);
    assert!(matches!(set.insert(0x213), Err(EditError::NotInCatalog(0x213))));
    assert_eq!(set.remove(0x212).unwrap().value(), 0x2a);
    assert!(set.remove(0x212).is_none());
}

#[test]
fn set_register_requires_membership() {
    let catalog = catalog();
    let mut set = WorkingSet::new(&catalog);
    assert_eq!(set.set_register(0x11, 0), Err(EditError::UnknownRegister(0x11)));
    set.insert(0x11).unwrap();
    assert!(matches!(set.set_register(0x11, 0x100), Err(EditError::Bounds(_))));
}

#[test]
fn edit_field_by_name_and_index() {
    let catalog = catalog();
    let mut set = WorkingSet::from_entries(&catalog, [(0x11, 0)]);
    let policy = EditPolicy::RejectReadOnly;

    set.edit_field(0x11, &"select".parse().unwrap(), 0b1000, policy).unwrap();
    set.edit_field(0x11, &FieldSelector::Index(2), 1, policy).unwrap();
    assert_eq!(set.get(0x11).unwrap().value(), 0b0011_0000);

    assert!(matches!(
        set.edit_field(0x11, &FieldSelector::Index(4), 0, policy),
        Err(EditError::UnknownField { .. })
    ));
    assert!(matches!(
        set.edit_field(0x11, &"select".parse().unwrap(), 0x10, policy),
        Err(EditError::Bounds(_))
    ));
    assert_eq!(set.get(0x11).unwrap().value(), 0b0011_0000);
}

#[test]
fn edit_field_honors_read_only_policy() {
    let catalog = catalog();
    let mut set = WorkingSet::from_entries(&catalog, [(0x11, 0)]);
    let upper_reserved = FieldSelector::Index(3);

    assert!(matches!(
        set.edit_field(0x11, &upper_reserved, 0b11, EditPolicy::RejectReadOnly),
        Err(EditError::ReadOnly { .. })
    ));
    set.edit_field(0x11, &upper_reserved, 0b11, EditPolicy::AllowReadOnly)
        .unwrap();
    assert_eq!(set.get(0x11).unwrap().value(), 0b1100_0000);
}
