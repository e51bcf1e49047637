//! Packing data recorded on a PTG.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_core::{DomainError, DomainResult, ensure_non_negative, ensure_positive};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedItem {
    pub description: String,
    pub quantity: Decimal,
}

/// One physical package (carton, pallet, crate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub package_no: u32,
    pub items: Vec<PackedItem>,
    pub gross_weight: Option<Decimal>,
    pub net_weight: Option<Decimal>,
}

impl Package {
    fn validate(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation(format!(
                "package {} has no items",
                self.package_no
            )));
        }
        for item in &self.items {
            if item.description.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "package {} has an item without description",
                    self.package_no
                )));
            }
            ensure_positive(item.quantity, "packed quantity")?;
        }
        if let Some(gross) = self.gross_weight {
            ensure_non_negative(gross, "gross weight")?;
        }
        if let Some(net) = self.net_weight {
            ensure_non_negative(net, "net weight")?;
        }
        if let (Some(gross), Some(net)) = (self.gross_weight, self.net_weight) {
            if net > gross {
                return Err(DomainError::validation(format!(
                    "package {}: net weight {net} exceeds gross weight {gross}",
                    self.package_no
                )));
            }
        }
        Ok(())
    }
}

/// Validate a full packing list: at least one package, unique numbers.
pub(crate) fn validate_packages(packages: &[Package]) -> DomainResult<()> {
    if packages.is_empty() {
        return Err(DomainError::validation("packing needs at least one package"));
    }
    let mut numbers = HashSet::new();
    for package in packages {
        if !numbers.insert(package.package_no) {
            return Err(DomainError::validation(format!(
                "package number {} is used twice",
                package.package_no
            )));
        }
        package.validate()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(no: u32, gross: Option<i64>, net: Option<i64>) -> Package {
        Package {
            package_no: no,
            items: vec![PackedItem {
                description: "Widget".to_string(),
                quantity: Decimal::from(10),
            }],
            gross_weight: gross.map(Decimal::from),
            net_weight: net.map(Decimal::from),
        }
    }

    #[test]
    fn accepts_well_formed_packages() {
        let packages = [package(1, Some(12), Some(10)), package(2, None, None)];
        assert!(validate_packages(&packages).is_ok());
    }

    #[test]
    fn rejects_empty_duplicate_and_inconsistent_packing() {
        assert!(validate_packages(&[]).is_err());
        assert!(validate_packages(&[package(1, None, None), package(1, None, None)]).is_err());
        assert!(validate_packages(&[package(1, Some(5), Some(6))]).is_err());

        let mut empty = package(3, None, None);
        empty.items.clear();
        assert!(validate_packages(&[empty]).is_err());
    }
}
