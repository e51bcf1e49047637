use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use tradeledger_core::{AggregateId, ExpectedVersion};
use tradeledger_inventory::{LedgerEntry, LedgerFilter, StockKey, balance};

use super::r#trait::{
    ChangeSet, CommitReceipt, EventStore, LedgerStore, SequenceStore, StoreError, StoredEvent,
    UncommittedEvent, UnitOfWork, single_stream,
};

#[derive(Debug, Default)]
struct State {
    streams: HashMap<AggregateId, Vec<StoredEvent>>,
    ledger: Vec<LedgerEntry>,
    sequences: HashMap<String, u32>,
}

/// In-memory store: event streams, stock ledger and sequence counters behind
/// one lock.
///
/// Intended for tests/dev. Every commit holds the write lock for its whole
/// check-then-append, which serialises writers to every key.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("lock poisoned".to_string())
    }
}

impl UnitOfWork for InMemoryStore {
    #[instrument(
        level = "debug",
        skip(self, changes),
        fields(streams = changes.streams.len(), entries = changes.ledger.len()),
        err
    )]
    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        changes.validate()?;
        if changes.is_empty() {
            return Ok(CommitReceipt::default());
        }

        let movements = changes.net_movements()?;
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;

        // 1) Every check first; nothing is written until all pass.
        for append in &changes.streams {
            let stream = state
                .streams
                .get(&append.aggregate_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let current = Self::current_version(stream);
            if !append.expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    append.aggregate_id, append.expected
                )));
            }
            if let (Some(existing), Some(incoming)) = (stream.first(), append.events.first()) {
                if existing.aggregate_type != incoming.aggregate_type {
                    return Err(StoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, incoming.aggregate_type
                    )));
                }
            }
        }

        for (key, net) in movements {
            let available = balance(&state.ledger, &key);
            let after = changes.balance_after(available, &key)?;
            if net < Decimal::ZERO && after < Decimal::ZERO {
                return Err(StoreError::InsufficientStock {
                    key,
                    available,
                    requested: -net,
                });
            }
        }

        // 2) Apply.
        let now = Utc::now();
        let mut receipt = CommitReceipt::default();

        for append in changes.streams {
            let stream = state.streams.entry(append.aggregate_id).or_default();
            let mut next = Self::current_version(stream) + 1;
            for e in append.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                stream.push(stored.clone());
                receipt.events.push(stored);
            }
        }

        let mut sequence = state.ledger.len() as u64;
        for entry in changes.ledger {
            sequence += 1;
            let committed = entry.commit(Uuid::now_v7(), sequence, now);
            state.ledger.push(committed.clone());
            receipt.entries.push(committed);
        }

        Ok(receipt)
    }
}

impl EventStore for InMemoryStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        match single_stream(events, expected_version) {
            Some(changes) => Ok(self.commit(changes)?.events),
            None => Ok(vec![]),
        }
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }
}

impl LedgerStore for InMemoryStore {
    fn balance(&self, key: &StockKey) -> Result<Decimal, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(balance(&state.ledger, key))
    }

    fn list_entries(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .ledger
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }
}

impl SequenceStore for InMemoryStore {
    fn next_sequence(&self, scope: &str) -> Result<u32, StoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let counter = state.sequences.entry(scope.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
