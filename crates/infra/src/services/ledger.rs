use rust_decimal::Decimal;
use tracing::{info, instrument};

use tradeledger_core::DomainError;
use tradeledger_inventory::{LedgerEntry, LedgerFilter, NewLedgerEntry, StockKey};

use crate::error::{EngineError, EngineResult};
use crate::services::log_rejection;
use crate::store::{ChangeSet, LedgerStore, SharedStore, UnitOfWork};

/// Direct access to the stock ledger: manual movements, balances, listings.
#[derive(Clone)]
pub struct LedgerService {
    store: SharedStore,
}

impl LedgerService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Append manual movements as one atomic unit.
    ///
    /// OUT entries go through the same balance check as kitting: if any key
    /// would end below zero, nothing is written.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub fn record(&self, entries: Vec<NewLedgerEntry>) -> EngineResult<Vec<LedgerEntry>> {
        let result = self.record_inner(entries);
        match &result {
            Ok(committed) => info!(count = committed.len(), "ledger entries recorded"),
            Err(err) => log_rejection("ledger.record", err),
        }
        result
    }

    fn record_inner(&self, entries: Vec<NewLedgerEntry>) -> EngineResult<Vec<LedgerEntry>> {
        if entries.is_empty() {
            return Err(DomainError::validation("at least one ledger entry is required").into());
        }
        for entry in &entries {
            entry.validate()?;
            if entry.reference.trim().is_empty() {
                return Err(DomainError::validation("ledger entries need a reference").into());
            }
        }
        let receipt = self.store.commit(ChangeSet::new().with_entries(entries))?;
        Ok(receipt.entries)
    }

    pub fn balance(&self, key: &StockKey) -> EngineResult<Decimal> {
        key.validate()?;
        Ok(self.store.balance(key)?)
    }

    pub fn list(&self, filter: &LedgerFilter) -> EngineResult<Vec<LedgerEntry>> {
        if let Some(key) = &filter.key {
            key.validate()?;
        }
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(EngineError::Validation(format!(
                    "date range is inverted ({from} > {to})"
                )));
            }
        }
        Ok(self.store.list_entries(filter)?)
    }
}
