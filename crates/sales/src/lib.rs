//! Sales documents domain module (event-sourced).
//!
//! Quotations and the documents converted from them (order confirmation,
//! proforma invoice, PTG, invoice, CIPL), implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod conversion;
pub mod document;
pub mod packing;

pub use conversion::{
    DocumentStatus, DocumentType, PaymentTerms, check_conversion, conversion_allowed,
};
pub use document::{
    ConversionSeed, CreateConverted, CreateQuotation, DocumentConverted, DocumentCreated,
    DocumentTotals, MarkConverted, PackingRecorded, PaymentRecorded, QuotationStatusChanged,
    RecordPacking, RecordPayment, SalesDocument, SalesDocumentCommand, SalesDocumentEvent,
    SalesDocumentId, SalesLine, SalesLineInput, SetQuotationStatus, SourceRef, document_number,
    document_sequence_scope,
};
pub use packing::{PackedItem, Package};
