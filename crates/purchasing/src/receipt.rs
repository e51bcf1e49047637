//! Goods receipt notes (GRN). Immutable once recorded.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_inventory::{NewLedgerEntry, StockKey};

use crate::order::PurchaseOrderId;

/// One received line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrnLine {
    pub key: StockKey,
    pub quantity: Decimal,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceiptNote {
    pub grn_number: String,
    pub order_id: PurchaseOrderId,
    /// Order number at the time of receipt.
    pub order_number: String,
    pub lines: Vec<GrnLine>,
    pub note: String,
    pub received_at: DateTime<Utc>,
}

impl GoodsReceiptNote {
    /// One IN movement per received line, referenced by the GRN number.
    pub fn ledger_entries(&self) -> Vec<NewLedgerEntry> {
        self.lines
            .iter()
            .map(|line| {
                let note = if self.note.is_empty() {
                    format!("GRN against PO {}", self.order_number)
                } else {
                    format!("GRN against PO {}: {}", self.order_number, self.note)
                };
                NewLedgerEntry::inbound(line.key.clone(), line.quantity, self.grn_number.clone())
                    .with_note(note)
            })
            .collect()
    }
}

/// `GRN-YYMMDD-NN`.
pub fn grn_number(date: NaiveDate, sequence: u32) -> String {
    format!("GRN-{}-{:02}", date.format("%y%m%d"), sequence)
}

/// Sequence-counter scope for GRN numbers issued on `date`.
pub fn grn_sequence_scope(date: NaiveDate) -> String {
    format!("grn:{}", date.format("%y%m%d"))
}
