use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, PaymentApplied, PaymentState,
    ensure_non_negative, ensure_positive, in_range, round_money, typed_aggregate_id,
};
use tradeledger_events::Event;
use tradeledger_inventory::StockKey;

use crate::receipt::{GoodsReceiptNote, GrnLine};
use crate::reference::OrderReference;

typed_aggregate_id!(
    /// Purchase order identifier.
    PurchaseOrderId
);

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PurchaseOrderStatus {
    Draft,
    Saved,
    Sent,
    Partial,
    Closed,
}

impl PurchaseOrderStatus {
    pub fn is_deletable(self) -> bool {
        matches!(self, PurchaseOrderStatus::Draft | PurchaseOrderStatus::Saved)
    }

    pub fn accepts_receipts(self) -> bool {
        matches!(self, PurchaseOrderStatus::Saved | PurchaseOrderStatus::Partial)
    }
}

/// Purchase order line.
///
/// Invariant: `received_quantity <= ordered_quantity`; `received_quantity`
/// only grows, and only through goods receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub line_no: u32,
    pub key: StockKey,
    pub description: String,
    pub unit: String,
    pub ordered_quantity: Decimal,
    pub received_quantity: Decimal,
    pub unit_price: Decimal,
}

impl PurchaseOrderLine {
    pub fn is_fully_received(&self) -> bool {
        self.received_quantity >= self.ordered_quantity
    }

    pub fn line_total(&self) -> DomainResult<Decimal> {
        in_range(self.ordered_quantity.checked_mul(self.unit_price), "line total")
    }
}

/// Line as supplied by a create/revise command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLineInput {
    pub key: StockKey,
    pub description: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    reference: Option<OrderReference>,
    supplier: String,
    currency: String,
    status: PurchaseOrderStatus,
    lines: Vec<PurchaseOrderLine>,
    payment: PaymentState,
    receipts: Vec<GoodsReceiptNote>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            reference: None,
            supplier: String::new(),
            currency: String::new(),
            status: PurchaseOrderStatus::Draft,
            lines: Vec::new(),
            payment: PaymentState::default(),
            receipts: Vec::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn reference(&self) -> Option<OrderReference> {
        self.reference
    }

    /// Human-facing order number (the current intRef, revision included).
    pub fn order_number(&self) -> String {
        self.reference.map(|r| r.to_string()).unwrap_or_default()
    }

    pub fn supplier(&self) -> &str {
        &self.supplier
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    pub fn payment(&self) -> &PaymentState {
        &self.payment
    }

    pub fn grand_total(&self) -> Decimal {
        self.payment.grand_total
    }

    pub fn outstanding(&self) -> Decimal {
        self.payment.outstanding()
    }

    /// Goods receipts recorded against this order, oldest first.
    pub fn receipts(&self) -> &[GoodsReceiptNote] {
        &self.receipts
    }

    pub fn has_receipts(&self) -> bool {
        self.lines.iter().any(|l| l.received_quantity > Decimal::ZERO)
    }

    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    fn line_for(&self, key: &StockKey) -> Option<&PurchaseOrderLine> {
        self.lines.iter().find(|l| &l.key == key)
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
///
/// The reference is allocated by the caller from the daily sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub reference: OrderReference,
    pub supplier: String,
    pub currency: String,
    pub lines: Vec<PurchaseOrderLineInput>,
    /// Start in SAVED rather than DRAFT.
    pub save: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevisePurchaseOrder (replaces header and the full line set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub supplier: String,
    pub currency: String,
    pub lines: Vec<PurchaseOrderLineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SavePurchaseOrder (DRAFT -> SAVED).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkSent (SAVED -> SENT).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSent {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeletePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods (records a GRN).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub order_id: PurchaseOrderId,
    pub grn_number: String,
    pub lines: Vec<GrnLine>,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub order_id: PurchaseOrderId,
    pub amount: Decimal,
    pub paid_on: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    RevisePurchaseOrder(RevisePurchaseOrder),
    SavePurchaseOrder(SavePurchaseOrder),
    MarkSent(MarkSent),
    DeletePurchaseOrder(DeletePurchaseOrder),
    ReceiveGoods(ReceiveGoods),
    RecordPayment(RecordPayment),
}

impl PurchaseOrderCommand {
    /// The purchase order this command is addressed to.
    pub fn target(&self) -> PurchaseOrderId {
        match self {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => cmd.order_id,
            PurchaseOrderCommand::RevisePurchaseOrder(cmd) => cmd.order_id,
            PurchaseOrderCommand::SavePurchaseOrder(cmd) => cmd.order_id,
            PurchaseOrderCommand::MarkSent(cmd) => cmd.order_id,
            PurchaseOrderCommand::DeletePurchaseOrder(cmd) => cmd.order_id,
            PurchaseOrderCommand::ReceiveGoods(cmd) => cmd.order_id,
            PurchaseOrderCommand::RecordPayment(cmd) => cmd.order_id,
        }
    }
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub order_id: PurchaseOrderId,
    pub reference: OrderReference,
    pub supplier: String,
    pub currency: String,
    pub status: PurchaseOrderStatus,
    pub lines: Vec<PurchaseOrderLine>,
    pub grand_total: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderRevised {
    pub order_id: PurchaseOrderId,
    pub reference: OrderReference,
    pub supplier: String,
    pub currency: String,
    pub status: PurchaseOrderStatus,
    pub lines: Vec<PurchaseOrderLine>,
    pub grand_total: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderSaved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderSaved {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderSent {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderDeleted {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries the GRN itself; the matching IN ledger entries are committed in
/// the same change set by the infrastructure layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub order_id: PurchaseOrderId,
    pub grn: GoodsReceiptNote,
    pub status: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub order_id: PurchaseOrderId,
    pub payment: PaymentApplied,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderRevised(PurchaseOrderRevised),
    PurchaseOrderSaved(PurchaseOrderSaved),
    PurchaseOrderSent(PurchaseOrderSent),
    PurchaseOrderDeleted(PurchaseOrderDeleted),
    GoodsReceived(GoodsReceived),
    PaymentRecorded(PaymentRecorded),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseOrderRevised(_) => "purchasing.order.revised",
            PurchaseOrderEvent::PurchaseOrderSaved(_) => "purchasing.order.saved",
            PurchaseOrderEvent::PurchaseOrderSent(_) => "purchasing.order.sent",
            PurchaseOrderEvent::PurchaseOrderDeleted(_) => "purchasing.order.deleted",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
            PurchaseOrderEvent::PaymentRecorded(_) => "purchasing.order.payment_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderRevised(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderSaved(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderSent(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderDeleted(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
            PurchaseOrderEvent::PaymentRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.reference = Some(e.reference);
                self.supplier = e.supplier.clone();
                self.currency = e.currency.clone();
                self.status = e.status;
                self.lines = e.lines.clone();
                self.payment = PaymentState::new(e.grand_total);
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderRevised(e) => {
                self.reference = Some(e.reference);
                self.supplier = e.supplier.clone();
                self.currency = e.currency.clone();
                self.status = e.status;
                self.lines = e.lines.clone();
                self.payment.grand_total = e.grand_total;
            }
            PurchaseOrderEvent::PurchaseOrderSaved(_) => {
                self.status = PurchaseOrderStatus::Saved;
            }
            PurchaseOrderEvent::PurchaseOrderSent(_) => {
                self.status = PurchaseOrderStatus::Sent;
            }
            PurchaseOrderEvent::PurchaseOrderDeleted(_) => {
                self.deleted = true;
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                for received in &e.grn.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.key == received.key) {
                        line.received_quantity += received.quantity;
                    }
                }
                self.receipts.push(e.grn.clone());
                self.status = e.status;
            }
            PurchaseOrderEvent::PaymentRecorded(e) => {
                self.payment.apply(&e.payment);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.target() != self.id {
            return Err(DomainError::invalid_id(format!(
                "command for purchase order {} routed to {}",
                command.target(),
                self.id
            )));
        }
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::RevisePurchaseOrder(cmd) => self.handle_revise(cmd),
            PurchaseOrderCommand::SavePurchaseOrder(cmd) => self.handle_save(cmd),
            PurchaseOrderCommand::MarkSent(cmd) => self.handle_mark_sent(cmd),
            PurchaseOrderCommand::DeletePurchaseOrder(cmd) => self.handle_delete(cmd),
            PurchaseOrderCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
            PurchaseOrderCommand::RecordPayment(cmd) => self.handle_payment(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("purchase order {}", self.id)));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        let supplier = validate_supplier(&cmd.supplier)?;
        let lines = build_lines(&cmd.lines)?;
        let grand_total = grand_total(&lines)?;

        let status = if cmd.save {
            PurchaseOrderStatus::Saved
        } else {
            PurchaseOrderStatus::Draft
        };

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                order_id: cmd.order_id,
                reference: cmd.reference,
                supplier,
                currency: cmd.currency.trim().to_string(),
                status,
                lines,
                grand_total,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_revise(
        &self,
        cmd: &RevisePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists()?;
        let supplier = validate_supplier(&cmd.supplier)?;
        let mut lines = build_lines(&cmd.lines)?;

        // Received quantities follow their line by key; a received line can
        // neither disappear nor drop below what has already arrived.
        let new_by_key: HashMap<&StockKey, usize> =
            lines.iter().enumerate().map(|(i, l)| (&l.key, i)).collect();
        let mut carried = Vec::new();
        for existing in self.lines.iter().filter(|l| l.received_quantity > Decimal::ZERO) {
            let Some(&idx) = new_by_key.get(&existing.key) else {
                return Err(DomainError::conflict(format!(
                    "line {} has received {} and cannot be removed",
                    existing.key, existing.received_quantity
                )));
            };
            if lines[idx].ordered_quantity < existing.received_quantity {
                return Err(DomainError::conflict(format!(
                    "line {} cannot be reduced to {} below received quantity {}",
                    existing.key, lines[idx].ordered_quantity, existing.received_quantity
                )));
            }
            carried.push((idx, existing.received_quantity));
        }
        for (idx, received) in carried {
            lines[idx].received_quantity = received;
        }

        let grand_total = grand_total(&lines)?;
        if grand_total < self.payment.paid_amount {
            return Err(DomainError::conflict(format!(
                "revised total {grand_total} is below the amount already paid {}",
                self.payment.paid_amount
            )));
        }

        let status = if lines.iter().any(|l| l.received_quantity > Decimal::ZERO) {
            receipt_status(&lines)
        } else {
            self.status
        };

        let reference = self
            .reference
            .ok_or_else(|| DomainError::invariant("purchase order has no reference"))?
            .next_revision();

        Ok(vec![PurchaseOrderEvent::PurchaseOrderRevised(
            PurchaseOrderRevised {
                order_id: self.id,
                reference,
                supplier,
                currency: cmd.currency.trim().to_string(),
                status,
                lines,
                grand_total,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_save(&self, cmd: &SavePurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists()?;
        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::conflict("only draft purchase orders can be saved"));
        }
        Ok(vec![PurchaseOrderEvent::PurchaseOrderSaved(PurchaseOrderSaved {
            order_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_sent(&self, cmd: &MarkSent) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists()?;
        if self.status != PurchaseOrderStatus::Saved {
            return Err(DomainError::conflict(
                "only saved purchase orders can be sent to the supplier",
            ));
        }
        Ok(vec![PurchaseOrderEvent::PurchaseOrderSent(PurchaseOrderSent {
            order_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(
        &self,
        cmd: &DeletePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists()?;
        if !self.status.is_deletable() {
            return Err(DomainError::conflict(format!(
                "purchase order in status {:?} cannot be deleted",
                self.status
            )));
        }
        Ok(vec![PurchaseOrderEvent::PurchaseOrderDeleted(
            PurchaseOrderDeleted {
                order_id: self.id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_receive(&self, cmd: &ReceiveGoods) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists()?;

        if cmd.grn_number.trim().is_empty() {
            return Err(DomainError::validation("GRN number cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("GRN needs at least one line"));
        }
        let mut seen = HashSet::new();
        for line in &cmd.lines {
            line.key.validate()?;
            ensure_positive(line.quantity, "received quantity")?;
            if !seen.insert(&line.key) {
                return Err(DomainError::validation(format!(
                    "GRN lists {} more than once",
                    line.key
                )));
            }
        }

        if !self.status.accepts_receipts() {
            return Err(DomainError::conflict(format!(
                "purchase order in status {:?} cannot receive goods",
                self.status
            )));
        }

        // Check every line before deciding anything: all-or-nothing.
        let mut after = self.lines.clone();
        for received in &cmd.lines {
            let Some(line) = self.line_for(&received.key) else {
                return Err(DomainError::conflict(format!(
                    "{} is not on purchase order {}",
                    received.key,
                    self.order_number()
                )));
            };
            let total = line
                .received_quantity
                .checked_add(received.quantity)
                .filter(|total| *total <= line.ordered_quantity);
            let Some(total) = total else {
                return Err(DomainError::conflict(format!(
                    "receiving {} of {} would exceed ordered {} (already received {})",
                    received.quantity, received.key, line.ordered_quantity, line.received_quantity
                )));
            };
            if let Some(l) = after.iter_mut().find(|l| l.key == received.key) {
                l.received_quantity = total;
            }
        }

        let grn = GoodsReceiptNote {
            grn_number: cmd.grn_number.trim().to_string(),
            order_id: self.id,
            order_number: self.order_number(),
            lines: cmd.lines.clone(),
            note: cmd.note.trim().to_string(),
            received_at: cmd.occurred_at,
        };

        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            order_id: self.id,
            grn,
            status: receipt_status(&after),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists()?;
        let payment = self.payment.record(cmd.amount, cmd.paid_on, cmd.occurred_at)?;
        Ok(vec![PurchaseOrderEvent::PaymentRecorded(PaymentRecorded {
            order_id: self.id,
            payment,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validate_supplier(supplier: &str) -> Result<String, DomainError> {
    let supplier = supplier.trim();
    if supplier.is_empty() {
        return Err(DomainError::validation("supplier name cannot be empty"));
    }
    Ok(supplier.to_string())
}

fn build_lines(inputs: &[PurchaseOrderLineInput]) -> Result<Vec<PurchaseOrderLine>, DomainError> {
    if inputs.is_empty() {
        return Err(DomainError::validation(
            "purchase order needs at least one line item",
        ));
    }
    let mut seen = HashSet::new();
    let mut lines = Vec::with_capacity(inputs.len());
    for (idx, input) in inputs.iter().enumerate() {
        input.key.validate()?;
        if !seen.insert(&input.key) {
            return Err(DomainError::validation(format!(
                "{} appears on more than one line",
                input.key
            )));
        }
        ensure_positive(input.quantity, "ordered quantity")?;
        ensure_non_negative(input.unit_price, "unit price")?;
        lines.push(PurchaseOrderLine {
            line_no: idx as u32 + 1,
            key: input.key.clone(),
            description: input.description.trim().to_string(),
            unit: input.unit.trim().to_string(),
            ordered_quantity: input.quantity,
            received_quantity: Decimal::ZERO,
            unit_price: input.unit_price,
        });
    }
    Ok(lines)
}

fn grand_total(lines: &[PurchaseOrderLine]) -> DomainResult<Decimal> {
    let sum = lines.iter().try_fold(Decimal::ZERO, |acc, line| {
        in_range(acc.checked_add(line.line_total()?), "order total")
    })?;
    Ok(round_money(sum))
}

/// CLOSED once every line is fully received, PARTIAL otherwise.
fn receipt_status(lines: &[PurchaseOrderLine]) -> PurchaseOrderStatus {
    if lines.iter().all(PurchaseOrderLine::is_fully_received) {
        PurchaseOrderStatus::Closed
    } else {
        PurchaseOrderStatus::Partial
    }
}
