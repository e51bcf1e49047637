//! Workflow services: the operations external collaborators call.
//!
//! Each operation is one bounded, all-or-nothing unit of work against the
//! store. Failures come back as [`EngineError`](crate::error::EngineError);
//! nothing is retried here.

pub mod kitting;
pub mod ledger;
pub mod procurement;
pub mod sales;

pub use kitting::{BomLineInput, KitOutcome, KittingService};
pub use ledger::LedgerService;
pub use procurement::{GrnRequest, ProcurementService, PurchaseOrderInput};
pub use sales::{QuotationInput, SalesService};

use tracing::{error, warn};

use crate::error::{EngineError, ErrorKind};

/// Business rejections are warnings; store failures are errors.
pub(crate) fn log_rejection(operation: &'static str, err: &EngineError) {
    match err.kind() {
        ErrorKind::Storage => error!(operation, error = %err, "operation failed in the store"),
        kind => warn!(operation, ?kind, error = %err, "operation rejected"),
    }
}
