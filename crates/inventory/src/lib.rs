//! Inventory domain module: the stock ledger model, bills of materials and
//! the kitting planner.
//!
//! Pure, deterministic domain logic (no IO, no storage).

pub mod bom;
pub mod kitting;
pub mod ledger;

pub use bom::{
    BillOfMaterials, BomCommand, BomCreated, BomDeleted, BomEdited, BomEvent, BomId, BomLine,
    CreateBom, DeleteBom, EditBom,
};
pub use kitting::{ItemCatalog, ItemDetails, KitDirection, KitPlan, plan_kit};
pub use ledger::{
    Direction, LedgerEntry, LedgerFilter, NewLedgerEntry, StockKey, balance, balance_after,
    net_movements,
};
