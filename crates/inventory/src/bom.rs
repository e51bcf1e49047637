use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_core::{Aggregate, AggregateRoot, DomainError, ensure_positive, typed_aggregate_id};
use tradeledger_events::Event;

use crate::ledger::StockKey;

typed_aggregate_id!(
    /// Bill-of-materials identifier.
    BomId
);

/// One component line of a recipe.
///
/// Description and unit weight are snapshots taken when the BOM was saved;
/// later edits to the item master do not change a saved recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLine {
    pub line_no: u32,
    /// Component article code.
    pub component: String,
    pub description: String,
    pub unit_weight: Option<Decimal>,
    /// Component units consumed per parent unit.
    pub quantity: Decimal,
}

impl BomLine {
    pub fn component_key(&self) -> StockKey {
        StockKey::Article(self.component.clone())
    }
}

/// Aggregate root: BillOfMaterials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillOfMaterials {
    id: BomId,
    parent_article: String,
    description: String,
    lines: Vec<BomLine>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl BillOfMaterials {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BomId) -> Self {
        Self {
            id,
            parent_article: String::new(),
            description: String::new(),
            lines: Vec::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> BomId {
        self.id
    }

    pub fn parent_article(&self) -> &str {
        &self.parent_article
    }

    pub fn parent_key(&self) -> StockKey {
        StockKey::Article(self.parent_article.clone())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn lines(&self) -> &[BomLine] {
        &self.lines
    }

    /// Created and not deleted.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl AggregateRoot for BillOfMaterials {
    type Id = BomId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBom {
    pub bom_id: BomId,
    pub parent_article: String,
    pub description: String,
    pub lines: Vec<BomLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EditBom (replaces description and the full line set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditBom {
    pub bom_id: BomId,
    pub description: String,
    pub lines: Vec<BomLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteBom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBom {
    pub bom_id: BomId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BomCommand {
    CreateBom(CreateBom),
    EditBom(EditBom),
    DeleteBom(DeleteBom),
}

impl BomCommand {
    /// The bill of materials this command is addressed to.
    pub fn target(&self) -> BomId {
        match self {
            BomCommand::CreateBom(cmd) => cmd.bom_id,
            BomCommand::EditBom(cmd) => cmd.bom_id,
            BomCommand::DeleteBom(cmd) => cmd.bom_id,
        }
    }
}

/// Event: BomCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomCreated {
    pub bom_id: BomId,
    pub parent_article: String,
    pub description: String,
    pub lines: Vec<BomLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BomEdited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomEdited {
    pub bom_id: BomId,
    pub description: String,
    pub lines: Vec<BomLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BomDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomDeleted {
    pub bom_id: BomId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BomEvent {
    BomCreated(BomCreated),
    BomEdited(BomEdited),
    BomDeleted(BomDeleted),
}

impl Event for BomEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BomEvent::BomCreated(_) => "inventory.bom.created",
            BomEvent::BomEdited(_) => "inventory.bom.edited",
            BomEvent::BomDeleted(_) => "inventory.bom.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BomEvent::BomCreated(e) => e.occurred_at,
            BomEvent::BomEdited(e) => e.occurred_at,
            BomEvent::BomDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BillOfMaterials {
    type Command = BomCommand;
    type Event = BomEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BomEvent::BomCreated(e) => {
                self.id = e.bom_id;
                self.parent_article = e.parent_article.clone();
                self.description = e.description.clone();
                self.lines = e.lines.clone();
                self.created = true;
            }
            BomEvent::BomEdited(e) => {
                self.description = e.description.clone();
                self.lines = e.lines.clone();
            }
            BomEvent::BomDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.target() != self.id {
            return Err(DomainError::invalid_id(format!(
                "command for bill of materials {} routed to {}",
                command.target(),
                self.id
            )));
        }
        match command {
            BomCommand::CreateBom(cmd) => self.handle_create(cmd),
            BomCommand::EditBom(cmd) => self.handle_edit(cmd),
            BomCommand::DeleteBom(cmd) => self.handle_delete(cmd),
        }
    }
}

impl BillOfMaterials {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("bill of materials {}", self.id)));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateBom) -> Result<Vec<BomEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("bill of materials already exists"));
        }
        let parent_article = cmd.parent_article.trim();
        if parent_article.is_empty() {
            return Err(DomainError::validation("parent article cannot be empty"));
        }
        let lines = normalize_lines(parent_article, &cmd.lines)?;

        Ok(vec![BomEvent::BomCreated(BomCreated {
            bom_id: cmd.bom_id,
            parent_article: parent_article.to_string(),
            description: cmd.description.trim().to_string(),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit(&self, cmd: &EditBom) -> Result<Vec<BomEvent>, DomainError> {
        self.ensure_exists()?;
        let lines = normalize_lines(&self.parent_article, &cmd.lines)?;

        Ok(vec![BomEvent::BomEdited(BomEdited {
            bom_id: self.id,
            description: cmd.description.trim().to_string(),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteBom) -> Result<Vec<BomEvent>, DomainError> {
        self.ensure_exists()?;
        Ok(vec![BomEvent::BomDeleted(BomDeleted {
            bom_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Validate a line set and renumber it 1..n in the given order.
fn normalize_lines(parent_article: &str, lines: &[BomLine]) -> Result<Vec<BomLine>, DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation(
            "bill of materials needs at least one component",
        ));
    }

    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let component = line.component.trim();
        if component.is_empty() {
            return Err(DomainError::validation(format!(
                "component article cannot be empty (line {})",
                idx + 1
            )));
        }
        if component == parent_article {
            return Err(DomainError::validation(
                "a component cannot be the parent article itself",
            ));
        }
        if !seen.insert(component.to_string()) {
            return Err(DomainError::validation(format!(
                "component '{component}' appears more than once"
            )));
        }
        ensure_positive(line.quantity, "component quantity")?;

        normalized.push(BomLine {
            line_no: idx as u32 + 1,
            component: component.to_string(),
            description: line.description.clone(),
            unit_weight: line.unit_weight,
            quantity: line.quantity,
        });
    }
    Ok(normalized)
}
