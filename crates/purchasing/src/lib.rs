//! Purchasing domain module: purchase orders, revision numbering and
//! goods receipts (event-sourced).
//!
//! Pure, deterministic domain logic (no IO, no storage).

pub mod order;
pub mod receipt;
pub mod reference;

pub use order::{
    CreatePurchaseOrder, DeletePurchaseOrder, GoodsReceived, MarkSent, PaymentRecorded,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderDeleted,
    PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderLine, PurchaseOrderLineInput,
    PurchaseOrderRevised, PurchaseOrderSaved, PurchaseOrderSent, PurchaseOrderStatus,
    ReceiveGoods, RecordPayment, RevisePurchaseOrder, SavePurchaseOrder,
};
pub use receipt::{GoodsReceiptNote, GrnLine, grn_number, grn_sequence_scope};
pub use reference::OrderReference;
