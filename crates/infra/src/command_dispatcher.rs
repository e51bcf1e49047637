//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream
//!   ↓
//! 2. Rehydrate (apply historical events)
//!   ↓
//! 3. Handle (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::after_load(version), alone or inside a ChangeSet
//! ```
//!
//! A concurrent writer makes step 4 fail with a conflict; nothing is retried
//! here. Retry policy belongs to the caller.

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use tradeledger_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};

use crate::error::{EngineError, EngineResult};
use crate::store::{EventStore, StoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// Aggregate state after a decision, plus the stream append that persists it.
#[derive(Debug)]
pub struct Decision<A> {
    /// State with the decided events already applied.
    pub aggregate: A,
    pub append: StreamAppend,
}

/// Reusable command execution engine.
#[derive(Debug, Clone)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Load and rehydrate an aggregate.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> EngineResult<A>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Load, rehydrate and handle `command` without persisting anything.
    pub fn decide<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> EngineResult<Decision<A>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: tradeledger_events::Event + Serialize + DeserializeOwned,
    {
        let aggregate = self.load(aggregate_id, make_aggregate)?;
        decide_on(aggregate, aggregate_id, aggregate_type, command)
    }

    /// Decide and append in one step (single-stream commands).
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> EngineResult<(A, Vec<StoredEvent>)>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: tradeledger_events::Event + Serialize + DeserializeOwned,
    {
        let decision = self.decide(aggregate_id, aggregate_type, command, make_aggregate)?;
        let committed = self
            .store
            .append(decision.append.events, decision.append.expected)?;
        Ok((decision.aggregate, committed))
    }
}

/// Handle `command` against an already rehydrated aggregate.
pub fn decide_on<A>(
    mut aggregate: A,
    aggregate_id: AggregateId,
    aggregate_type: &str,
    command: &A::Command,
) -> EngineResult<Decision<A>>
where
    A: Aggregate<Error = DomainError>,
    A::Event: tradeledger_events::Event + Serialize,
{
    let expected = ExpectedVersion::after_load(aggregate.version());
    let decided = aggregate.handle(command)?;

    let events = decided
        .iter()
        .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
        .collect::<Result<Vec<_>, _>>()?;
    for ev in &decided {
        aggregate.apply(ev);
    }

    Ok(Decision {
        aggregate,
        append: StreamAppend {
            aggregate_id,
            expected,
            events,
        },
    })
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> EngineResult<()> {
    // Sequence numbers must run 1, 2, 3, ... for this aggregate only.
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(StoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))
            .into());
        }
        if e.sequence_number != idx as u64 + 1 {
            return Err(StoreError::InvalidAppend(format!(
                "gap in loaded stream at index {idx} (sequence_number={})",
                e.sequence_number
            ))
            .into());
        }
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> EngineResult<()>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone()).map_err(|e| {
            EngineError::Storage(format!(
                "cannot decode {} #{}: {e}",
                stored.event_type, stored.sequence_number
            ))
        })?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tradeledger_core::AggregateRoot;
    use tradeledger_inventory::{BillOfMaterials, BomCommand, BomId, BomLine, CreateBom, EditBom};

    use crate::store::InMemoryStore;

    fn line(component: &str) -> BomLine {
        BomLine {
            line_no: 0,
            component: component.to_string(),
            description: String::new(),
            unit_weight: None,
            quantity: Decimal::ONE,
        }
    }

    #[test]
    fn dispatch_persists_and_rehydrates() {
        let dispatcher = CommandDispatcher::new(InMemoryStore::new());
        let id = BomId::generate();
        let create = BomCommand::CreateBom(CreateBom {
            bom_id: id,
            parent_article: "DESK".to_string(),
            description: "Desk".to_string(),
            lines: vec![line("LEG")],
            occurred_at: Utc::now(),
        });

        let (bom, committed) = dispatcher
            .dispatch(id.0, "inventory.bom", &create, |aid| BillOfMaterials::empty(BomId::new(aid)))
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(bom.version(), 1);

        let loaded: BillOfMaterials = dispatcher
            .load(id.0, |aid| BillOfMaterials::empty(BomId::new(aid)))
            .unwrap();
        assert_eq!(loaded, bom);
    }

    #[test]
    fn stale_decision_is_a_conflict() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let dispatcher = CommandDispatcher::new(store.clone());
        let id = BomId::generate();
        let make = |aid| BillOfMaterials::empty(BomId::new(aid));
        dispatcher
            .dispatch(
                id.0,
                "inventory.bom",
                &BomCommand::CreateBom(CreateBom {
                    bom_id: id,
                    parent_article: "DESK".to_string(),
                    description: String::new(),
                    lines: vec![line("LEG")],
                    occurred_at: Utc::now(),
                }),
                make,
            )
            .unwrap();

        let edit = |component: &str| {
            BomCommand::EditBom(EditBom {
                bom_id: id,
                description: String::new(),
                lines: vec![line(component)],
                occurred_at: Utc::now(),
            })
        };
        let first = dispatcher.decide(id.0, "inventory.bom", &edit("TOP"), make).unwrap();
        let second = dispatcher.decide(id.0, "inventory.bom", &edit("RAIL"), make).unwrap();

        store.append(first.append.events, first.append.expected).unwrap();
        let err: EngineError = store
            .append(second.append.events, second.append.expected)
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }
}
