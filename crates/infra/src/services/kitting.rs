use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use tradeledger_core::{AggregateRoot, DomainError, ExpectedVersion};
use tradeledger_inventory::{
    BillOfMaterials, BomCommand, BomId, BomLine, CreateBom, DeleteBom, EditBom, ItemCatalog,
    KitDirection, LedgerEntry, StockKey, plan_kit,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::EngineResult;
use crate::services::log_rejection;
use crate::store::{ChangeSet, SharedStore, UnitOfWork};

const BOM: &str = "inventory.bom";

/// A component line as entered; missing attributes are snapshotted from the
/// item catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BomLineInput {
    pub component: String,
    pub quantity: Decimal,
    pub description: Option<String>,
    pub unit_weight: Option<Decimal>,
}

impl BomLineInput {
    pub fn new(component: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            component: component.into(),
            quantity,
            description: None,
            unit_weight: None,
        }
    }
}

/// Ledger effects of one kit or de-kit run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitOutcome {
    pub direction: KitDirection,
    /// Shared by every entry of the run.
    pub reference: String,
    pub parent: StockKey,
    pub multiplier: Decimal,
    pub entries: Vec<LedgerEntry>,
    pub total_weight: Option<Decimal>,
}

/// BOM maintenance plus the kitting/de-kitting transaction.
#[derive(Clone)]
pub struct KittingService {
    store: SharedStore,
    dispatcher: CommandDispatcher<SharedStore>,
    catalog: Arc<dyn ItemCatalog>,
}

fn make_bom(id: tradeledger_core::AggregateId) -> BillOfMaterials {
    BillOfMaterials::empty(BomId::new(id))
}

impl KittingService {
    pub fn new(store: SharedStore, catalog: Arc<dyn ItemCatalog>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store.clone()),
            store,
            catalog,
        }
    }

    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub fn create_bom(
        &self,
        parent_article: &str,
        description: &str,
        lines: Vec<BomLineInput>,
    ) -> EngineResult<BillOfMaterials> {
        let id = BomId::generate();
        let command = BomCommand::CreateBom(CreateBom {
            bom_id: id,
            parent_article: parent_article.to_string(),
            description: description.to_string(),
            lines: self.snapshot_lines(lines),
            occurred_at: Utc::now(),
        });
        self.run(id, command, "bom.create")
    }

    #[instrument(skip(self, lines), fields(bom_id = %id, lines = lines.len()))]
    pub fn edit_bom(
        &self,
        id: BomId,
        description: &str,
        lines: Vec<BomLineInput>,
    ) -> EngineResult<BillOfMaterials> {
        let command = BomCommand::EditBom(EditBom {
            bom_id: id,
            description: description.to_string(),
            lines: self.snapshot_lines(lines),
            occurred_at: Utc::now(),
        });
        self.run(id, command, "bom.edit")
    }

    #[instrument(skip(self), fields(bom_id = %id))]
    pub fn delete_bom(&self, id: BomId) -> EngineResult<()> {
        let command = BomCommand::DeleteBom(DeleteBom {
            bom_id: id,
            occurred_at: Utc::now(),
        });
        self.run(id, command, "bom.delete").map(|_| ())
    }

    pub fn get_bom(&self, id: BomId) -> EngineResult<BillOfMaterials> {
        let bom = self.dispatcher.load(id.0, make_bom)?;
        if !bom.exists() {
            return Err(DomainError::not_found(format!("bill of materials {id}")).into());
        }
        Ok(bom)
    }

    /// Build `multiplier` parent units from their components.
    #[instrument(skip(self), fields(bom_id = %bom_id, %multiplier))]
    pub fn kit(&self, bom_id: BomId, multiplier: Decimal) -> EngineResult<KitOutcome> {
        self.run_kit(bom_id, KitDirection::Kit, multiplier)
    }

    /// Break `multiplier` parent units back into their components.
    #[instrument(skip(self), fields(bom_id = %bom_id, %multiplier))]
    pub fn dekit(&self, bom_id: BomId, multiplier: Decimal) -> EngineResult<KitOutcome> {
        self.run_kit(bom_id, KitDirection::Dekit, multiplier)
    }

    fn run_kit(
        &self,
        bom_id: BomId,
        direction: KitDirection,
        multiplier: Decimal,
    ) -> EngineResult<KitOutcome> {
        let result = self.run_kit_inner(bom_id, direction, multiplier);
        match &result {
            Ok(outcome) => info!(
                reference = %outcome.reference,
                entries = outcome.entries.len(),
                "kit run committed"
            ),
            Err(err) => log_rejection(direction.reference_prefix(), err),
        }
        result
    }

    fn run_kit_inner(
        &self,
        bom_id: BomId,
        direction: KitDirection,
        multiplier: Decimal,
    ) -> EngineResult<KitOutcome> {
        let bom = self.dispatcher.load(bom_id.0, make_bom)?;
        let reference = format!("{}-{}", direction.reference_prefix(), Uuid::now_v7().simple());
        let plan = plan_kit(&bom, direction, multiplier, reference, self.catalog.as_ref())?;

        // The recipe must still be the one that was planned against.
        let changes = ChangeSet::new()
            .with_stream(bom_id.0, ExpectedVersion::Exact(bom.version()), vec![])
            .with_entries(plan.entries);
        let receipt = self.store.commit(changes)?;

        Ok(KitOutcome {
            direction: plan.direction,
            reference: plan.reference,
            parent: plan.parent,
            multiplier: plan.multiplier,
            entries: receipt.entries,
            total_weight: plan.total_weight,
        })
    }

    fn run(
        &self,
        id: BomId,
        command: BomCommand,
        operation: &'static str,
    ) -> EngineResult<BillOfMaterials> {
        let result = self
            .dispatcher
            .dispatch(id.0, BOM, &command, make_bom)
            .map(|(bom, _)| bom);
        match &result {
            Ok(bom) => info!(
                operation,
                bom_id = %id,
                version = bom.version(),
                "bill of materials updated"
            ),
            Err(err) => log_rejection(operation, err),
        }
        result
    }

    fn snapshot_lines(&self, lines: Vec<BomLineInput>) -> Vec<BomLine> {
        lines
            .into_iter()
            .map(|input| {
                let live = self.catalog.lookup(input.component.trim());
                let description = input
                    .description
                    .or_else(|| live.as_ref().map(|d| d.description.clone()))
                    .unwrap_or_default();
                let unit_weight = input.unit_weight.or(live.and_then(|d| d.unit_weight));
                BomLine {
                    line_no: 0,
                    component: input.component,
                    description,
                    unit_weight,
                    quantity: input.quantity,
                }
            })
            .collect()
    }
}
