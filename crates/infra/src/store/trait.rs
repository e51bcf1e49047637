use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use tradeledger_core::{AggregateId, ExpectedVersion};
use tradeledger_inventory::{
    LedgerEntry, LedgerFilter, NewLedgerEntry, StockKey, balance_after, net_movements,
};

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Built from a typed domain event with [`UncommittedEvent::from_typed`], which
/// serializes the payload and captures the metadata needed to decode it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream.
///
/// `sequence_number` is stream-scoped, starts at 1 and has no gaps; the
/// sequence number of the last event is the stream version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }
}

/// Appends to one aggregate stream inside a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub aggregate_id: AggregateId,
    pub expected: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
}

/// Everything one business operation writes.
///
/// Committed all-or-nothing: either every stream append and every ledger entry
/// becomes visible, or none does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub streams: Vec<StreamAppend>,
    pub ledger: Vec<NewLedgerEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(
        mut self,
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        events: Vec<UncommittedEvent>,
    ) -> Self {
        self.streams.push(StreamAppend {
            aggregate_id,
            expected,
            events,
        });
        self
    }

    pub fn with_entries(mut self, entries: impl IntoIterator<Item = NewLedgerEntry>) -> Self {
        self.ledger.extend(entries);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty() && self.streams.iter().all(|s| s.events.is_empty())
    }

    /// Structural checks shared by every backend; run before taking any lock.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mut seen = std::collections::HashSet::new();
        for stream in &self.streams {
            if !seen.insert(stream.aggregate_id) {
                return Err(StoreError::InvalidAppend(format!(
                    "change set appends to stream {} twice",
                    stream.aggregate_id
                )));
            }
            let Some(first) = stream.events.first() else {
                continue;
            };
            for (idx, e) in stream.events.iter().enumerate() {
                if e.aggregate_id != stream.aggregate_id {
                    return Err(StoreError::InvalidAppend(format!(
                        "event at index {idx} targets {} inside the stream of {}",
                        e.aggregate_id, stream.aggregate_id
                    )));
                }
                if e.aggregate_type != first.aggregate_type {
                    return Err(StoreError::AggregateTypeMismatch(format!(
                        "batch contains multiple aggregate_types (index {idx})"
                    )));
                }
            }
        }
        for entry in &self.ledger {
            entry
                .validate()
                .map_err(|e| StoreError::InvalidAppend(e.to_string()))?;
        }
        Ok(())
    }

    /// Net movement per key of the ledger part, in lock order.
    pub fn net_movements(&self) -> Result<BTreeMap<StockKey, Decimal>, StoreError> {
        net_movements(&self.ledger).map_err(|e| StoreError::OutOfRange(e.to_string()))
    }

    /// `key`'s balance once this change set's entries land on `available`.
    pub fn balance_after(&self, available: Decimal, key: &StockKey) -> Result<Decimal, StoreError> {
        balance_after(available, &self.ledger, key)
            .map_err(|e| StoreError::OutOfRange(e.to_string()))
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub events: Vec<StoredEvent>,
    pub entries: Vec<LedgerEntry>,
}

/// Store operation error.
///
/// Infrastructure failures and store-enforced guards, as opposed to domain
/// errors (validation, business rules).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("insufficient stock for {key}: available {available}, requested {requested}")]
    InsufficientStock {
        key: StockKey,
        available: Decimal,
        requested: Decimal,
    },

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// A quantity or balance would leave the `Decimal` range.
    #[error("quantity out of range: {0}")]
    OutOfRange(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only event streams, one per aggregate instance.
///
/// `load_stream` returns events in sequence order, or an empty vector for a
/// stream that does not exist yet.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, StoreError>;
}

/// Read side of the stock ledger. Writes go through [`UnitOfWork::commit`].
///
/// Reads see every commit that finished before the call started and never a
/// partial one.
pub trait LedgerStore: Send + Sync {
    /// Σ IN − Σ OUT over every committed entry for `key`.
    fn balance(&self, key: &StockKey) -> Result<Decimal, StoreError>;

    /// Matching entries in commit order.
    fn list_entries(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// Atomic per-scope counters (daily PO references, GRN and document numbers).
pub trait SequenceStore: Send + Sync {
    /// Next value for `scope`, starting at 1. Never hands out the same value twice.
    fn next_sequence(&self, scope: &str) -> Result<u32, StoreError>;
}

/// All-or-nothing commit of a [`ChangeSet`].
///
/// Implementations must, inside one serialised unit:
/// - check each stream's `ExpectedVersion`
/// - for every key with a net outward movement, check `balance + net >= 0`
///   (writers to the same key are serialised, so concurrent OUTs cannot both
///   pass the same check)
/// - then persist every event and entry, or nothing
pub trait UnitOfWork: Send + Sync {
    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError>;
}

/// Everything the workflow services need from a backend.
pub trait EngineStore: EventStore + LedgerStore + SequenceStore + UnitOfWork {}

impl<T> EngineStore for T where T: EventStore + LedgerStore + SequenceStore + UnitOfWork {}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, StoreError> {
        (**self).load_stream(aggregate_id)
    }
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn balance(&self, key: &StockKey) -> Result<Decimal, StoreError> {
        (**self).balance(key)
    }

    fn list_entries(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).list_entries(filter)
    }
}

impl<S> SequenceStore for Arc<S>
where
    S: SequenceStore + ?Sized,
{
    fn next_sequence(&self, scope: &str) -> Result<u32, StoreError> {
        (**self).next_sequence(scope)
    }
}

impl<S> UnitOfWork for Arc<S>
where
    S: UnitOfWork + ?Sized,
{
    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        (**self).commit(changes)
    }
}

impl UncommittedEvent {
    /// Convenience constructor from a typed domain event.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, StoreError>
    where
        E: tradeledger_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| StoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Helper for backends: single-stream append expressed as a change set.
pub(crate) fn single_stream(
    events: Vec<UncommittedEvent>,
    expected_version: ExpectedVersion,
) -> Option<ChangeSet> {
    let aggregate_id = events.first()?.aggregate_id;
    Some(ChangeSet::new().with_stream(aggregate_id, expected_version, events))
}
