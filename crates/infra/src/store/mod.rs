//! Durable store boundary: aggregate event streams, the stock ledger and
//! sequence counters, committed together through change sets.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

use std::sync::Arc;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{
    ChangeSet, CommitReceipt, EngineStore, EventStore, LedgerStore, SequenceStore, StoreError,
    StoredEvent, StreamAppend, UncommittedEvent, UnitOfWork,
};

/// Store handle shared by the workflow services.
pub type SharedStore = Arc<dyn EngineStore>;
