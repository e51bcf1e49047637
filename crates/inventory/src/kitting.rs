//! Kitting planner: turns a BOM and a multiplier into the grouped ledger
//! movements of a build (kit) or unbuild (de-kit).
//!
//! Planning is pure. The balance check and the append happen together inside
//! the store's commit, so a plan either lands completely or not at all.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_core::{DomainError, DomainResult, ensure_positive, in_range};

use crate::bom::BillOfMaterials;
use crate::ledger::{NewLedgerEntry, StockKey};

/// Live item-master attributes for an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub description: String,
    pub unit_weight: Option<Decimal>,
}

/// Read access to the item master (owned by an external collaborator).
pub trait ItemCatalog: Send + Sync {
    fn lookup(&self, article: &str) -> Option<ItemDetails>;
}

impl ItemCatalog for HashMap<String, ItemDetails> {
    fn lookup(&self, article: &str) -> Option<ItemDetails> {
        self.get(article).cloned()
    }
}

impl<C: ItemCatalog + ?Sized> ItemCatalog for std::sync::Arc<C> {
    fn lookup(&self, article: &str) -> Option<ItemDetails> {
        (**self).lookup(article)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KitDirection {
    /// Consume components, produce the parent.
    Kit,
    /// Consume the parent, return components to stock.
    Dekit,
}

impl KitDirection {
    pub fn reference_prefix(self) -> &'static str {
        match self {
            KitDirection::Kit => "KIT",
            KitDirection::Dekit => "DEKIT",
        }
    }
}

/// The full set of movements for one kit/de-kit run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitPlan {
    pub direction: KitDirection,
    pub reference: String,
    pub parent: StockKey,
    pub multiplier: Decimal,
    /// Component OUTs then parent IN (kit), or parent OUT then component INs
    /// (de-kit). All share `reference`.
    pub entries: Vec<NewLedgerEntry>,
    /// Total component weight moved, when every component has a weight.
    pub total_weight: Option<Decimal>,
}

/// Plan a kit or de-kit of `multiplier` parent units.
///
/// Component quantities come from the stored BOM lines; descriptions and
/// weights are read live from `catalog`, falling back to the BOM snapshot.
pub fn plan_kit(
    bom: &BillOfMaterials,
    direction: KitDirection,
    multiplier: Decimal,
    reference: impl Into<String>,
    catalog: &dyn ItemCatalog,
) -> DomainResult<KitPlan> {
    if !bom.exists() {
        return Err(DomainError::not_found(format!("bill of materials {}", bom.id_typed())));
    }
    ensure_positive(multiplier, "kit multiplier")?;
    let parent = bom.parent_key();
    parent
        .validate()
        .map_err(|_| DomainError::validation("kitting requires a parent article code"))?;
    if bom.lines().is_empty() {
        return Err(DomainError::validation("bill of materials has no components"));
    }

    let reference = reference.into();
    let mut component_entries = Vec::with_capacity(bom.lines().len());
    let mut total_weight = Some(Decimal::ZERO);

    for line in bom.lines() {
        let key = line.component_key();
        key.validate().map_err(|_| {
            DomainError::validation(format!(
                "kitting requires an article code on BOM line {}",
                line.line_no
            ))
        })?;
        let required = in_range(line.quantity.checked_mul(multiplier), "component quantity")?;

        let live = catalog.lookup(&line.component);
        let description = live
            .as_ref()
            .map(|d| d.description.clone())
            .unwrap_or_else(|| line.description.clone());
        let unit_weight = live.and_then(|d| d.unit_weight).or(line.unit_weight);
        total_weight = match (total_weight, unit_weight) {
            (Some(acc), Some(w)) => {
                let moved = w.checked_mul(required).and_then(|m| acc.checked_add(m));
                Some(in_range(moved, "kit weight")?)
            }
            _ => None,
        };

        let note = format!("{} {}: {}", direction.reference_prefix(), parent.code(), description);
        let entry = match direction {
            KitDirection::Kit => NewLedgerEntry::outbound(key, required, reference.clone()),
            KitDirection::Dekit => NewLedgerEntry::inbound(key, required, reference.clone()),
        };
        component_entries.push(entry.with_note(note));
    }

    let parent_note = format!("{} {}", direction.reference_prefix(), bom.description());
    let entries = match direction {
        KitDirection::Kit => {
            let mut entries = component_entries;
            entries.push(
                NewLedgerEntry::inbound(parent.clone(), multiplier, reference.clone())
                    .with_note(parent_note),
            );
            entries
        }
        KitDirection::Dekit => {
            let mut entries = vec![
                NewLedgerEntry::outbound(parent.clone(), multiplier, reference.clone())
                    .with_note(parent_note),
            ];
            entries.extend(component_entries);
            entries
        }
    };

    Ok(KitPlan {
        direction,
        reference,
        parent,
        multiplier,
        entries,
        total_weight,
    })
}
