use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use tradeledger_core::{Aggregate, AggregateId, DomainError};
use tradeledger_purchasing::{
    CreatePurchaseOrder, DeletePurchaseOrder, GoodsReceiptNote, GrnLine, MarkSent, OrderReference,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId, PurchaseOrderLineInput, ReceiveGoods,
    RecordPayment, RevisePurchaseOrder, SavePurchaseOrder, grn_number, grn_sequence_scope,
};

use crate::command_dispatcher::{CommandDispatcher, decide_on};
use crate::error::{EngineError, EngineResult};
use crate::services::log_rejection;
use crate::store::{ChangeSet, SequenceStore, SharedStore, UnitOfWork};

const PURCHASE_ORDER: &str = "purchasing.order";

/// Header and lines of a new purchase order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrderInput {
    pub supplier: String,
    pub currency: String,
    pub lines: Vec<PurchaseOrderLineInput>,
    /// Create directly in SAVED instead of DRAFT.
    pub save: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrnRequest {
    pub lines: Vec<GrnLine>,
    pub note: String,
}

/// Purchase order lifecycle, goods receipts and supplier payments.
#[derive(Clone)]
pub struct ProcurementService {
    store: SharedStore,
    dispatcher: CommandDispatcher<SharedStore>,
}

fn make_order(id: AggregateId) -> PurchaseOrder {
    PurchaseOrder::empty(PurchaseOrderId::new(id))
}

impl ProcurementService {
    pub fn new(store: SharedStore) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store.clone()),
            store,
        }
    }

    /// Create an order numbered `YYMMDD.NN` for today.
    #[instrument(skip(self, input), fields(supplier = %input.supplier, lines = input.lines.len()))]
    pub fn create_po(&self, input: PurchaseOrderInput) -> EngineResult<PurchaseOrder> {
        let result = self.create_po_on(Utc::now().date_naive(), input);
        match &result {
            Ok(order) => info!(order_number = %order.order_number(), "purchase order created"),
            Err(err) => log_rejection("po.create", err),
        }
        result
    }

    fn create_po_on(
        &self,
        date: NaiveDate,
        input: PurchaseOrderInput,
    ) -> EngineResult<PurchaseOrder> {
        let order_id = PurchaseOrderId::generate();
        let command = |reference| {
            PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                order_id,
                reference,
                supplier: input.supplier.clone(),
                currency: input.currency.clone(),
                lines: input.lines.clone(),
                save: input.save,
                occurred_at: Utc::now(),
            })
        };

        // Reject bad input before a daily sequence number is consumed.
        make_order(order_id.0).handle(&command(OrderReference::new(date, 1)?))?;

        let sequence = self
            .store
            .next_sequence(&OrderReference::sequence_scope(date))?;
        let reference = OrderReference::new(date, sequence)?;
        let (order, _) =
            self.dispatcher
                .dispatch(order_id.0, PURCHASE_ORDER, &command(reference), make_order)?;
        Ok(order)
    }

    /// Replace header and lines; the reference gains the next `R<k>` suffix.
    #[instrument(skip(self, input), fields(order_id = %order_id, lines = input.lines.len()))]
    pub fn revise_po(
        &self,
        order_id: PurchaseOrderId,
        input: PurchaseOrderInput,
    ) -> EngineResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::RevisePurchaseOrder(RevisePurchaseOrder {
            order_id,
            supplier: input.supplier,
            currency: input.currency,
            lines: input.lines,
            occurred_at: Utc::now(),
        });
        self.run(order_id, command, "po.revise")
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn save_po(&self, order_id: PurchaseOrderId) -> EngineResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::SavePurchaseOrder(SavePurchaseOrder {
            order_id,
            occurred_at: Utc::now(),
        });
        self.run(order_id, command, "po.save")
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn mark_sent(&self, order_id: PurchaseOrderId) -> EngineResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::MarkSent(MarkSent {
            order_id,
            occurred_at: Utc::now(),
        });
        self.run(order_id, command, "po.send")
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn delete_po(&self, order_id: PurchaseOrderId) -> EngineResult<()> {
        let command = PurchaseOrderCommand::DeletePurchaseOrder(DeletePurchaseOrder {
            order_id,
            occurred_at: Utc::now(),
        });
        self.run(order_id, command, "po.delete").map(|_| ())
    }

    /// Record a goods receipt: the order's received quantities and the stock
    /// ledger move together or not at all.
    #[instrument(skip(self, request), fields(order_id = %order_id, lines = request.lines.len()))]
    pub fn create_grn(
        &self,
        order_id: PurchaseOrderId,
        request: GrnRequest,
    ) -> EngineResult<GoodsReceiptNote> {
        let result = self.create_grn_inner(order_id, request);
        match &result {
            Ok(grn) => info!(
                grn_number = %grn.grn_number,
                order_number = %grn.order_number,
                "goods received"
            ),
            Err(err) => log_rejection("po.receive", err),
        }
        result
    }

    fn create_grn_inner(
        &self,
        order_id: PurchaseOrderId,
        request: GrnRequest,
    ) -> EngineResult<GoodsReceiptNote> {
        let order = self.dispatcher.load(order_id.0, make_order)?;
        let today = Utc::now().date_naive();
        let command = |number: String| {
            PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
                order_id,
                grn_number: number,
                lines: request.lines.clone(),
                note: request.note.clone(),
                occurred_at: Utc::now(),
            })
        };

        order.handle(&command(grn_number(today, 1)))?;

        let sequence = self.store.next_sequence(&grn_sequence_scope(today))?;
        let receive = command(grn_number(today, sequence));
        let decision = decide_on(order, order_id.0, PURCHASE_ORDER, &receive)?;
        let grn = decision
            .aggregate
            .receipts()
            .last()
            .cloned()
            .ok_or_else(|| EngineError::Storage("receipt missing after decision".to_string()))?;

        let changes = ChangeSet::new()
            .with_stream(
                decision.append.aggregate_id,
                decision.append.expected,
                decision.append.events,
            )
            .with_entries(grn.ledger_entries());
        self.store.commit(changes)?;
        Ok(grn)
    }

    /// Apply a supplier payment, capped at the outstanding amount.
    #[instrument(skip(self), fields(order_id = %order_id, %amount))]
    pub fn record_payment(
        &self,
        order_id: PurchaseOrderId,
        amount: Decimal,
        paid_on: Option<DateTime<Utc>>,
    ) -> EngineResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::RecordPayment(RecordPayment {
            order_id,
            amount,
            paid_on,
            occurred_at: Utc::now(),
        });
        self.run(order_id, command, "po.payment")
    }

    pub fn get_po(&self, order_id: PurchaseOrderId) -> EngineResult<PurchaseOrder> {
        let order = self.dispatcher.load(order_id.0, make_order)?;
        if !order.exists() {
            return Err(DomainError::not_found(format!("purchase order {order_id}")).into());
        }
        Ok(order)
    }

    /// Receipts recorded against the order, oldest first.
    pub fn goods_receipts(&self, order_id: PurchaseOrderId) -> EngineResult<Vec<GoodsReceiptNote>> {
        Ok(self.get_po(order_id)?.receipts().to_vec())
    }

    fn run(
        &self,
        order_id: PurchaseOrderId,
        command: PurchaseOrderCommand,
        operation: &'static str,
    ) -> EngineResult<PurchaseOrder> {
        let result = self
            .dispatcher
            .dispatch(order_id.0, PURCHASE_ORDER, &command, make_order)
            .map(|(order, _)| order);
        match &result {
            Ok(order) => info!(
                operation,
                order_number = %order.order_number(),
                status = ?order.status(),
                "purchase order updated"
            ),
            Err(err) => log_rejection(operation, err),
        }
        result
    }
}
