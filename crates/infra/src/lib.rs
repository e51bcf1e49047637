//! Infrastructure layer: durable store backends, the command pipeline,
//! configuration and the workflow services built on top of them.

pub mod command_dispatcher;
pub mod config;
pub mod error;
pub mod services;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{EngineConfig, open_store};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use services::{
    BomLineInput, GrnRequest, KitOutcome, KittingService, LedgerService, ProcurementService,
    PurchaseOrderInput, QuotationInput, SalesService,
};
pub use store::{InMemoryStore, PostgresStore, SharedStore};
