use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use tradeledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use tradeledger_sales::{
    CreateConverted, CreateQuotation, DocumentStatus, DocumentType, MarkConverted, Package,
    PaymentTerms, RecordPacking, RecordPayment, SalesDocument, SalesDocumentCommand,
    SalesDocumentId, SalesLineInput, SetQuotationStatus, document_number, document_sequence_scope,
};

use crate::command_dispatcher::{CommandDispatcher, decide_on};
use crate::error::EngineResult;
use crate::services::log_rejection;
use crate::store::{ChangeSet, SequenceStore, SharedStore, StreamAppend, UnitOfWork};

const SALES_DOCUMENT: &str = "sales.document";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotationInput {
    pub customer: String,
    pub terms: PaymentTerms,
    pub lines: Vec<SalesLineInput>,
    /// Percent, applied to the subtotal.
    pub tax_rate: Decimal,
    pub freight: Decimal,
}

/// Quotation to CIPL document chain, packing and customer payments.
#[derive(Clone)]
pub struct SalesService {
    store: SharedStore,
    dispatcher: CommandDispatcher<SharedStore>,
}

fn make_document(id: AggregateId) -> SalesDocument {
    SalesDocument::empty(SalesDocumentId::new(id))
}

impl SalesService {
    pub fn new(store: SharedStore) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store.clone()),
            store,
        }
    }

    #[instrument(skip(self, input), fields(customer = %input.customer, lines = input.lines.len()))]
    pub fn create_quotation(&self, input: QuotationInput) -> EngineResult<SalesDocument> {
        let result = self.create_quotation_inner(input);
        match &result {
            Ok(doc) => info!(number = %doc.number(), "quotation created"),
            Err(err) => log_rejection("sales.quotation", err),
        }
        result
    }

    fn create_quotation_inner(&self, input: QuotationInput) -> EngineResult<SalesDocument> {
        let document_id = SalesDocumentId::generate();
        let today = Utc::now().date_naive();
        let command = |number: String| {
            SalesDocumentCommand::CreateQuotation(CreateQuotation {
                document_id,
                number,
                customer: input.customer.clone(),
                terms: input.terms,
                lines: input.lines.clone(),
                tax_rate: input.tax_rate,
                freight: input.freight,
                occurred_at: Utc::now(),
            })
        };

        make_document(document_id.0).handle(&command(document_number(
            DocumentType::Quotation,
            today,
            1,
        )))?;

        let sequence = self
            .store
            .next_sequence(&document_sequence_scope(DocumentType::Quotation, today))?;
        let number = document_number(DocumentType::Quotation, today, sequence);
        let (doc, _) = self.dispatcher.dispatch(
            document_id.0,
            SALES_DOCUMENT,
            &command(number),
            make_document,
        )?;
        Ok(doc)
    }

    /// Move a quotation between DRAFT and FINAL.
    #[instrument(skip(self), fields(document_id = %document_id, ?status))]
    pub fn set_quotation_status(
        &self,
        document_id: SalesDocumentId,
        status: DocumentStatus,
    ) -> EngineResult<SalesDocument> {
        let command = SalesDocumentCommand::SetQuotationStatus(SetQuotationStatus {
            document_id,
            status,
            occurred_at: Utc::now(),
        });
        self.run(document_id, command, "sales.status")
    }

    /// Create the next document of the chain from `source_id`.
    ///
    /// The successor inherits customer, terms, lines and totals. A source
    /// quotation is marked CONVERTED in the same commit; any other source
    /// must be unchanged between load and commit.
    #[instrument(skip(self), fields(source_id = %source_id, %target))]
    pub fn convert(
        &self,
        source_id: SalesDocumentId,
        target: DocumentType,
    ) -> EngineResult<SalesDocument> {
        let result = self.convert_inner(source_id, target);
        match &result {
            Ok(doc) => info!(
                number = %doc.number(),
                source = doc.source().map(|s| s.number.as_str()).unwrap_or_default(),
                "document converted"
            ),
            Err(err) => log_rejection("sales.convert", err),
        }
        result
    }

    fn convert_inner(
        &self,
        source_id: SalesDocumentId,
        target: DocumentType,
    ) -> EngineResult<SalesDocument> {
        let source = self.dispatcher.load(source_id.0, make_document)?;
        let seed = source.conversion_seed(target)?;
        let successor_id = SalesDocumentId::generate();
        let now = Utc::now();

        let source_append = if source.doc_type() == DocumentType::Quotation {
            let mark = SalesDocumentCommand::MarkConverted(MarkConverted {
                document_id: source_id,
                successor_id,
                target,
                occurred_at: now,
            });
            decide_on(source, source_id.0, SALES_DOCUMENT, &mark)?.append
        } else {
            StreamAppend {
                aggregate_id: source_id.0,
                expected: ExpectedVersion::Exact(source.version()),
                events: vec![],
            }
        };

        let today = now.date_naive();
        let sequence = self
            .store
            .next_sequence(&document_sequence_scope(target, today))?;
        let create = SalesDocumentCommand::CreateConverted(CreateConverted {
            document_id: successor_id,
            number: document_number(target, today, sequence),
            seed,
            occurred_at: now,
        });
        let successor = decide_on(
            make_document(successor_id.0),
            successor_id.0,
            SALES_DOCUMENT,
            &create,
        )?;

        let changes = ChangeSet::new()
            .with_stream(
                successor.append.aggregate_id,
                successor.append.expected,
                successor.append.events,
            )
            .with_stream(
                source_append.aggregate_id,
                source_append.expected,
                source_append.events,
            );
        self.store.commit(changes)?;
        Ok(successor.aggregate)
    }

    /// Attach the package list to a PTG, completing it.
    #[instrument(
        skip(self, packages),
        fields(document_id = %document_id, packages = packages.len())
    )]
    pub fn record_packing(
        &self,
        document_id: SalesDocumentId,
        packages: Vec<Package>,
    ) -> EngineResult<SalesDocument> {
        let command = SalesDocumentCommand::RecordPacking(RecordPacking {
            document_id,
            packages,
            occurred_at: Utc::now(),
        });
        self.run(document_id, command, "sales.packing")
    }

    #[instrument(skip(self), fields(document_id = %document_id, %amount))]
    pub fn record_payment(
        &self,
        document_id: SalesDocumentId,
        amount: Decimal,
        paid_on: Option<DateTime<Utc>>,
    ) -> EngineResult<SalesDocument> {
        let command = SalesDocumentCommand::RecordPayment(RecordPayment {
            document_id,
            amount,
            paid_on,
            occurred_at: Utc::now(),
        });
        self.run(document_id, command, "sales.payment")
    }

    pub fn get(&self, document_id: SalesDocumentId) -> EngineResult<SalesDocument> {
        let doc = self.dispatcher.load(document_id.0, make_document)?;
        if !doc.exists() {
            return Err(DomainError::not_found(format!("sales document {document_id}")).into());
        }
        Ok(doc)
    }

    fn run(
        &self,
        document_id: SalesDocumentId,
        command: SalesDocumentCommand,
        operation: &'static str,
    ) -> EngineResult<SalesDocument> {
        let result = self
            .dispatcher
            .dispatch(document_id.0, SALES_DOCUMENT, &command, make_document)
            .map(|(doc, _)| doc);
        match &result {
            Ok(doc) => info!(
                operation,
                number = %doc.number(),
                status = ?doc.status(),
                "sales document updated"
            ),
            Err(err) => log_rejection(operation, err),
        }
        result
    }
}
