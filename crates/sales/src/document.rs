use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, PaymentApplied, PaymentState,
    ensure_non_negative, ensure_positive, in_range, round_money, typed_aggregate_id,
};
use tradeledger_events::Event;

use crate::conversion::{DocumentStatus, DocumentType, PaymentTerms, check_conversion};
use crate::packing::{Package, validate_packages};

typed_aggregate_id!(
    /// Sales document identifier (any document type).
    SalesDocumentId
);

/// `<PREFIX>-YYMMDD-NN`, e.g. `OC-250214-02`.
pub fn document_number(doc_type: DocumentType, date: NaiveDate, sequence: u32) -> String {
    format!("{}-{}-{:02}", doc_type.prefix(), date.format("%y%m%d"), sequence)
}

/// Sequence-counter scope for documents of `doc_type` numbered on `date`.
pub fn document_sequence_scope(doc_type: DocumentType, date: NaiveDate) -> String {
    format!("sales:{}:{}", doc_type.prefix(), date.format("%y%m%d"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesLine {
    pub line_no: u32,
    pub description: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesLineInput {
    pub description: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Computed money fields. Copied verbatim on conversion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    /// Percent, e.g. `18` for 18%.
    pub tax_rate: Decimal,
    pub freight: Decimal,
    pub grand_total: Decimal,
}

impl DocumentTotals {
    /// Fails when an amount leaves the `Decimal` range.
    pub fn compute(
        lines: &[SalesLine],
        tax_rate: Decimal,
        freight: Decimal,
    ) -> DomainResult<Self> {
        let subtotal = lines.iter().try_fold(Decimal::ZERO, |acc, l| {
            let line_total = in_range(l.quantity.checked_mul(l.unit_price), "line total")?;
            in_range(acc.checked_add(line_total), "subtotal")
        })?;
        let tax = in_range(subtotal.checked_mul(tax_rate), "tax")? / Decimal::ONE_HUNDRED;
        let grand_total = subtotal.checked_add(tax).and_then(|t| t.checked_add(freight));
        Ok(Self {
            subtotal: round_money(subtotal),
            tax_rate,
            freight,
            grand_total: round_money(in_range(grand_total, "grand total")?),
        })
    }
}

/// Back-reference from a converted document to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: SalesDocumentId,
    pub doc_type: DocumentType,
    pub number: String,
}

/// Everything a successor inherits from its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSeed {
    pub source: SourceRef,
    pub target: DocumentType,
    pub customer: String,
    pub terms: PaymentTerms,
    pub lines: Vec<SalesLine>,
    pub totals: DocumentTotals,
}

/// Aggregate root: SalesDocument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesDocument {
    id: SalesDocumentId,
    doc_type: DocumentType,
    number: String,
    customer: String,
    terms: PaymentTerms,
    status: DocumentStatus,
    lines: Vec<SalesLine>,
    totals: DocumentTotals,
    payment: PaymentState,
    source: Option<SourceRef>,
    packages: Vec<Package>,
    version: u64,
    created: bool,
}

impl SalesDocument {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SalesDocumentId) -> Self {
        Self {
            id,
            doc_type: DocumentType::Quotation,
            number: String::new(),
            customer: String::new(),
            terms: PaymentTerms::Advance,
            status: DocumentStatus::Draft,
            lines: Vec::new(),
            totals: DocumentTotals::default(),
            payment: PaymentState::default(),
            source: None,
            packages: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalesDocumentId {
        self.id
    }

    pub fn doc_type(&self) -> DocumentType {
        self.doc_type
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn customer(&self) -> &str {
        &self.customer
    }

    pub fn terms(&self) -> PaymentTerms {
        self.terms
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    pub fn lines(&self) -> &[SalesLine] {
        &self.lines
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn payment(&self) -> &PaymentState {
        &self.payment
    }

    pub fn outstanding(&self) -> Decimal {
        self.payment.outstanding()
    }

    pub fn source(&self) -> Option<&SourceRef> {
        self.source.as_ref()
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// Check the conversion edge and snapshot what the successor inherits.
    ///
    /// Pure: the caller creates the successor from the seed and, for a
    /// quotation, marks this document converted in the same commit.
    pub fn conversion_seed(&self, target: DocumentType) -> DomainResult<ConversionSeed> {
        self.ensure_exists()?;
        check_conversion(self.doc_type, self.status, self.terms, target)?;
        Ok(ConversionSeed {
            source: SourceRef {
                document_id: self.id,
                doc_type: self.doc_type,
                number: self.number.clone(),
            },
            target,
            customer: self.customer.clone(),
            terms: self.terms,
            lines: self.lines.clone(),
            totals: self.totals.clone(),
        })
    }

    fn ensure_exists(&self) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found(format!("sales document {}", self.id)));
        }
        Ok(())
    }
}

impl AggregateRoot for SalesDocument {
    type Id = SalesDocumentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateQuotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuotation {
    pub document_id: SalesDocumentId,
    pub number: String,
    pub customer: String,
    pub terms: PaymentTerms,
    pub lines: Vec<SalesLineInput>,
    pub tax_rate: Decimal,
    pub freight: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CreateConverted (successor side of a conversion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConverted {
    pub document_id: SalesDocumentId,
    pub number: String,
    pub seed: ConversionSeed,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetQuotationStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetQuotationStatus {
    pub document_id: SalesDocumentId,
    pub status: DocumentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkConverted (quotation side of a conversion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkConverted {
    pub document_id: SalesDocumentId,
    pub successor_id: SalesDocumentId,
    pub target: DocumentType,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPacking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPacking {
    pub document_id: SalesDocumentId,
    pub packages: Vec<Package>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub document_id: SalesDocumentId,
    pub amount: Decimal,
    pub paid_on: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesDocumentCommand {
    CreateQuotation(CreateQuotation),
    CreateConverted(CreateConverted),
    SetQuotationStatus(SetQuotationStatus),
    MarkConverted(MarkConverted),
    RecordPacking(RecordPacking),
    RecordPayment(RecordPayment),
}

impl SalesDocumentCommand {
    /// The sales document this command is addressed to.
    pub fn target(&self) -> SalesDocumentId {
        match self {
            SalesDocumentCommand::CreateQuotation(cmd) => cmd.document_id,
            SalesDocumentCommand::CreateConverted(cmd) => cmd.document_id,
            SalesDocumentCommand::SetQuotationStatus(cmd) => cmd.document_id,
            SalesDocumentCommand::MarkConverted(cmd) => cmd.document_id,
            SalesDocumentCommand::RecordPacking(cmd) => cmd.document_id,
            SalesDocumentCommand::RecordPayment(cmd) => cmd.document_id,
        }
    }
}

/// Event: DocumentCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCreated {
    pub document_id: SalesDocumentId,
    pub doc_type: DocumentType,
    pub number: String,
    pub customer: String,
    pub terms: PaymentTerms,
    pub status: DocumentStatus,
    pub lines: Vec<SalesLine>,
    pub totals: DocumentTotals,
    pub source: Option<SourceRef>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuotationStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationStatusChanged {
    pub document_id: SalesDocumentId,
    pub status: DocumentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DocumentConverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConverted {
    pub document_id: SalesDocumentId,
    pub successor_id: SalesDocumentId,
    pub target: DocumentType,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PackingRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingRecorded {
    pub document_id: SalesDocumentId,
    pub packages: Vec<Package>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub document_id: SalesDocumentId,
    pub payment: PaymentApplied,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesDocumentEvent {
    DocumentCreated(DocumentCreated),
    QuotationStatusChanged(QuotationStatusChanged),
    DocumentConverted(DocumentConverted),
    PackingRecorded(PackingRecorded),
    PaymentRecorded(PaymentRecorded),
}

impl Event for SalesDocumentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesDocumentEvent::DocumentCreated(_) => "sales.document.created",
            SalesDocumentEvent::QuotationStatusChanged(_) => {
                "sales.document.quotation_status_changed"
            }
            SalesDocumentEvent::DocumentConverted(_) => "sales.document.converted",
            SalesDocumentEvent::PackingRecorded(_) => "sales.document.packing_recorded",
            SalesDocumentEvent::PaymentRecorded(_) => "sales.document.payment_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesDocumentEvent::DocumentCreated(e) => e.occurred_at,
            SalesDocumentEvent::QuotationStatusChanged(e) => e.occurred_at,
            SalesDocumentEvent::DocumentConverted(e) => e.occurred_at,
            SalesDocumentEvent::PackingRecorded(e) => e.occurred_at,
            SalesDocumentEvent::PaymentRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesDocument {
    type Command = SalesDocumentCommand;
    type Event = SalesDocumentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesDocumentEvent::DocumentCreated(e) => {
                self.id = e.document_id;
                self.doc_type = e.doc_type;
                self.number = e.number.clone();
                self.customer = e.customer.clone();
                self.terms = e.terms;
                self.status = e.status;
                self.lines = e.lines.clone();
                self.totals = e.totals.clone();
                self.payment = PaymentState::new(e.totals.grand_total);
                self.source = e.source.clone();
                self.created = true;
            }
            SalesDocumentEvent::QuotationStatusChanged(e) => {
                self.status = e.status;
            }
            SalesDocumentEvent::DocumentConverted(_) => {
                self.status = DocumentStatus::Converted;
            }
            SalesDocumentEvent::PackingRecorded(e) => {
                self.packages = e.packages.clone();
                self.status = DocumentStatus::Completed;
            }
            SalesDocumentEvent::PaymentRecorded(e) => {
                self.payment.apply(&e.payment);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.target() != self.id {
            return Err(DomainError::invalid_id(format!(
                "command for sales document {} routed to {}",
                command.target(),
                self.id
            )));
        }
        match command {
            SalesDocumentCommand::CreateQuotation(cmd) => self.handle_create_quotation(cmd),
            SalesDocumentCommand::CreateConverted(cmd) => self.handle_create_converted(cmd),
            SalesDocumentCommand::SetQuotationStatus(cmd) => self.handle_set_status(cmd),
            SalesDocumentCommand::MarkConverted(cmd) => self.handle_mark_converted(cmd),
            SalesDocumentCommand::RecordPacking(cmd) => self.handle_packing(cmd),
            SalesDocumentCommand::RecordPayment(cmd) => self.handle_payment(cmd),
        }
    }
}

impl SalesDocument {
    fn ensure_new(&self) -> DomainResult<()> {
        if self.created {
            return Err(DomainError::conflict("sales document already exists"));
        }
        Ok(())
    }

    fn handle_create_quotation(
        &self,
        cmd: &CreateQuotation,
    ) -> DomainResult<Vec<SalesDocumentEvent>> {
        self.ensure_new()?;
        let customer = cmd.customer.trim();
        if customer.is_empty() {
            return Err(DomainError::validation("customer cannot be empty"));
        }
        let lines = build_lines(&cmd.lines)?;
        ensure_non_negative(cmd.tax_rate, "tax rate")?;
        ensure_non_negative(cmd.freight, "freight")?;
        let totals = DocumentTotals::compute(&lines, cmd.tax_rate, cmd.freight)?;

        Ok(vec![SalesDocumentEvent::DocumentCreated(DocumentCreated {
            document_id: cmd.document_id,
            doc_type: DocumentType::Quotation,
            number: cmd.number.clone(),
            customer: customer.to_string(),
            terms: cmd.terms,
            status: DocumentStatus::Draft,
            lines,
            totals,
            source: None,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_create_converted(
        &self,
        cmd: &CreateConverted,
    ) -> DomainResult<Vec<SalesDocumentEvent>> {
        self.ensure_new()?;
        let seed = &cmd.seed;
        if seed.target == DocumentType::Quotation {
            return Err(DomainError::conflict("a quotation cannot be created by conversion"));
        }

        Ok(vec![SalesDocumentEvent::DocumentCreated(DocumentCreated {
            document_id: cmd.document_id,
            doc_type: seed.target,
            number: cmd.number.clone(),
            customer: seed.customer.clone(),
            terms: seed.terms,
            status: DocumentStatus::Open,
            lines: seed.lines.clone(),
            totals: seed.totals.clone(),
            source: Some(seed.source.clone()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_status(&self, cmd: &SetQuotationStatus) -> DomainResult<Vec<SalesDocumentEvent>> {
        self.ensure_exists()?;
        if self.doc_type != DocumentType::Quotation {
            return Err(DomainError::conflict(format!(
                "status can only be set on a quotation, not on {}",
                self.doc_type
            )));
        }
        if !matches!(cmd.status, DocumentStatus::Draft | DocumentStatus::Final) {
            return Err(DomainError::validation(format!(
                "quotation status must be DRAFT or FINAL, got {:?}",
                cmd.status
            )));
        }
        if self.status == DocumentStatus::Converted {
            return Err(DomainError::conflict("a converted quotation cannot change status"));
        }

        Ok(vec![SalesDocumentEvent::QuotationStatusChanged(
            QuotationStatusChanged {
                document_id: self.id,
                status: cmd.status,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_mark_converted(&self, cmd: &MarkConverted) -> DomainResult<Vec<SalesDocumentEvent>> {
        self.ensure_exists()?;
        if self.doc_type != DocumentType::Quotation {
            return Err(DomainError::invariant(format!(
                "only quotations record their conversion, not {}",
                self.doc_type
            )));
        }
        check_conversion(self.doc_type, self.status, self.terms, cmd.target)?;

        Ok(vec![SalesDocumentEvent::DocumentConverted(DocumentConverted {
            document_id: self.id,
            successor_id: cmd.successor_id,
            target: cmd.target,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_packing(&self, cmd: &RecordPacking) -> DomainResult<Vec<SalesDocumentEvent>> {
        self.ensure_exists()?;
        if self.doc_type != DocumentType::Ptg {
            return Err(DomainError::conflict(format!(
                "packing can only be recorded on a PTG, not on {}",
                self.doc_type
            )));
        }
        validate_packages(&cmd.packages)?;

        Ok(vec![SalesDocumentEvent::PackingRecorded(PackingRecorded {
            document_id: self.id,
            packages: cmd.packages.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> DomainResult<Vec<SalesDocumentEvent>> {
        self.ensure_exists()?;
        let payment = self.payment.record(cmd.amount, cmd.paid_on, cmd.occurred_at)?;
        Ok(vec![SalesDocumentEvent::PaymentRecorded(PaymentRecorded {
            document_id: self.id,
            payment,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn build_lines(inputs: &[SalesLineInput]) -> DomainResult<Vec<SalesLine>> {
    if inputs.is_empty() {
        return Err(DomainError::validation("document needs at least one line item"));
    }
    inputs
        .iter()
        .enumerate()
        .map(|(idx, input)| {
            if input.description.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "line {} needs a description",
                    idx + 1
                )));
            }
            ensure_positive(input.quantity, "quantity")?;
            ensure_non_negative(input.unit_price, "unit price")?;
            Ok(SalesLine {
                line_no: idx as u32 + 1,
                description: input.description.trim().to_string(),
                unit: input.unit.trim().to_string(),
                quantity: input.quantity,
                unit_price: input.unit_price,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::PackedItem;

    fn run(doc: &mut SalesDocument, cmd: SalesDocumentCommand) -> DomainResult<()> {
        let events = doc.handle(&cmd)?;
        for e in &events {
            doc.apply(e);
        }
        Ok(())
    }

    fn quotation(terms: PaymentTerms) -> SalesDocument {
        let id = SalesDocumentId::generate();
        let mut doc = SalesDocument::empty(id);
        run(
            &mut doc,
            SalesDocumentCommand::CreateQuotation(CreateQuotation {
                document_id: id,
                number: "QT-250214-01".to_string(),
                customer: "Northwind".to_string(),
                terms,
                lines: vec![SalesLineInput {
                    description: "Widget".to_string(),
                    unit: "pcs".to_string(),
                    quantity: Decimal::from(10),
                    unit_price: Decimal::from(100),
                }],
                tax_rate: Decimal::ZERO,
                freight: Decimal::ZERO,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        doc
    }

    fn convert(source: &mut SalesDocument, target: DocumentType) -> DomainResult<SalesDocument> {
        let seed = source.conversion_seed(target)?;
        let id = SalesDocumentId::generate();
        let mut successor = SalesDocument::empty(id);
        run(
            &mut successor,
            SalesDocumentCommand::CreateConverted(CreateConverted {
                document_id: id,
                number: format!("{}-250214-01", target.prefix()),
                seed,
                occurred_at: Utc::now(),
            }),
        )?;
        if source.doc_type() == DocumentType::Quotation {
            let source_id = source.id_typed();
            run(
                source,
                SalesDocumentCommand::MarkConverted(MarkConverted {
                    document_id: source_id,
                    successor_id: id,
                    target,
                    occurred_at: Utc::now(),
                }),
            )?;
        }
        Ok(successor)
    }

    fn pack(doc: &mut SalesDocument) -> DomainResult<()> {
        let id = doc.id_typed();
        run(
            doc,
            SalesDocumentCommand::RecordPacking(RecordPacking {
                document_id: id,
                packages: vec![Package {
                    package_no: 1,
                    items: vec![PackedItem {
                        description: "Widget".to_string(),
                        quantity: Decimal::from(10),
                    }],
                    gross_weight: None,
                    net_weight: None,
                }],
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn numbers_and_totals() {
        let day = NaiveDate::from_ymd_opt(2025, 2, 14).unwrap();
        assert_eq!(document_number(DocumentType::Invoice, day, 4), "INV-250214-04");
        assert_eq!(document_sequence_scope(DocumentType::Ptg, day), "sales:PTG:250214");

        let lines = vec![SalesLine {
            line_no: 1,
            description: "Widget".to_string(),
            unit: "pcs".to_string(),
            quantity: Decimal::from(3),
            unit_price: Decimal::new(3333, 2),
        }];
        let totals = DocumentTotals::compute(&lines, Decimal::from(18), Decimal::from(5)).unwrap();
        assert_eq!(totals.subtotal, Decimal::new(9999, 2));
        // 99.99 + 17.9982 + 5 = 122.9882
        assert_eq!(totals.grand_total, Decimal::new(12299, 2));
    }

    #[test]
    fn totals_past_the_decimal_range_are_rejected() {
        let line = |quantity: i64, unit_price: Decimal| SalesLine {
            line_no: 1,
            description: "Widget".to_string(),
            unit: "pcs".to_string(),
            quantity: Decimal::from(quantity),
            unit_price,
        };
        let overflowing = [
            (vec![line(2, Decimal::MAX)], Decimal::ZERO, Decimal::ZERO),
            (vec![line(1, Decimal::MAX), line(1, Decimal::MAX)], Decimal::ZERO, Decimal::ZERO),
            (vec![line(1, Decimal::MAX)], Decimal::from(200), Decimal::ZERO),
            (vec![line(1, Decimal::MAX)], Decimal::ZERO, Decimal::MAX),
        ];
        for (lines, tax_rate, freight) in overflowing {
            let err = DocumentTotals::compute(&lines, tax_rate, freight).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }

        let id = SalesDocumentId::generate();
        let doc = SalesDocument::empty(id);
        let create = SalesDocumentCommand::CreateQuotation(CreateQuotation {
            document_id: id,
            number: "QT-250214-01".to_string(),
            customer: "Northwind".to_string(),
            terms: PaymentTerms::Credit,
            lines: vec![SalesLineInput {
                description: "Widget".to_string(),
                unit: "pcs".to_string(),
                quantity: Decimal::from(3),
                unit_price: Decimal::MAX,
            }],
            tax_rate: Decimal::ZERO,
            freight: Decimal::ZERO,
            occurred_at: Utc::now(),
        });
        assert!(matches!(doc.handle(&create), Err(DomainError::Validation(_))));
    }

    #[test]
    fn quotation_to_ptg_is_rejected() {
        let mut qt = quotation(PaymentTerms::Credit);
        let err = convert(&mut qt, DocumentType::Ptg).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(qt.status(), DocumentStatus::Draft);
    }

    #[test]
    fn quotation_conversion_marks_source_and_copies_content() {
        let mut qt = quotation(PaymentTerms::Credit);
        let oc = convert(&mut qt, DocumentType::OrderConfirmation).unwrap();

        assert_eq!(qt.status(), DocumentStatus::Converted);
        assert_eq!(oc.doc_type(), DocumentType::OrderConfirmation);
        assert_eq!(oc.status(), DocumentStatus::Open);
        assert_eq!(oc.customer(), qt.customer());
        assert_eq!(oc.lines(), qt.lines());
        assert_eq!(oc.totals(), qt.totals());
        assert_eq!(oc.source().map(|s| s.document_id), Some(qt.id_typed()));
    }

    #[test]
    fn credit_order_confirmation_goes_to_ptg_not_proforma() {
        let mut qt = quotation(PaymentTerms::Credit);
        let mut oc = convert(&mut qt, DocumentType::OrderConfirmation).unwrap();
        let version = oc.version();

        assert!(matches!(
            convert(&mut oc, DocumentType::ProformaInvoice),
            Err(DomainError::Conflict(_))
        ));
        let ptg = convert(&mut oc, DocumentType::Ptg).unwrap();
        assert_eq!(ptg.doc_type(), DocumentType::Ptg);
        assert!(ptg.packages().is_empty());
        // Non-quotation sources stay untouched.
        assert_eq!(oc.version(), version);
        assert_eq!(oc.status(), DocumentStatus::Open);
    }

    #[test]
    fn ptg_invoicing_requires_packing() {
        let mut qt = quotation(PaymentTerms::Advance);
        let mut oc = convert(&mut qt, DocumentType::OrderConfirmation).unwrap();
        let mut pi = convert(&mut oc, DocumentType::ProformaInvoice).unwrap();
        let mut ptg = convert(&mut pi, DocumentType::Ptg).unwrap();

        assert!(matches!(convert(&mut ptg, DocumentType::Invoice), Err(DomainError::Conflict(_))));
        pack(&mut ptg).unwrap();
        assert_eq!(ptg.status(), DocumentStatus::Completed);

        let mut invoice = convert(&mut ptg, DocumentType::Invoice).unwrap();
        let cipl = convert(&mut invoice, DocumentType::Cipl).unwrap();
        assert_eq!(cipl.totals().grand_total, Decimal::from(1000));
    }

    #[test]
    fn packing_only_on_ptg() {
        let mut qt = quotation(PaymentTerms::Advance);
        assert!(matches!(pack(&mut qt), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn quotation_status_is_draft_or_final_only() {
        let mut qt = quotation(PaymentTerms::Advance);
        let id = qt.id_typed();
        let set = |status| {
            SalesDocumentCommand::SetQuotationStatus(SetQuotationStatus {
                document_id: id,
                status,
                occurred_at: Utc::now(),
            })
        };

        run(&mut qt, set(DocumentStatus::Final)).unwrap();
        assert_eq!(qt.status(), DocumentStatus::Final);
        run(&mut qt, set(DocumentStatus::Draft)).unwrap();
        assert!(matches!(
            run(&mut qt, set(DocumentStatus::Completed)),
            Err(DomainError::Validation(_))
        ));

        convert(&mut qt, DocumentType::OrderConfirmation).unwrap();
        assert!(matches!(run(&mut qt, set(DocumentStatus::Final)), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn command_for_another_document_is_rejected() {
        let mut qt = quotation(PaymentTerms::Advance);
        let pay_elsewhere = SalesDocumentCommand::RecordPayment(RecordPayment {
            document_id: SalesDocumentId::generate(),
            amount: Decimal::from(100),
            paid_on: None,
            occurred_at: Utc::now(),
        });
        assert!(matches!(run(&mut qt, pay_elsewhere), Err(DomainError::InvalidId(_))));
        assert_eq!(qt.payment().paid_amount, Decimal::ZERO);
    }

    #[test]
    fn payment_rules_apply_to_sales_documents() {
        let mut qt = quotation(PaymentTerms::Advance);
        let id = qt.id_typed();
        let pay = |amount: i64| {
            SalesDocumentCommand::RecordPayment(RecordPayment {
                document_id: id,
                amount: Decimal::from(amount),
                paid_on: None,
                occurred_at: Utc::now(),
            })
        };

        assert!(matches!(run(&mut qt, pay(1200)), Err(DomainError::Conflict(_))));
        assert!(matches!(run(&mut qt, pay(0)), Err(DomainError::Validation(_))));
        run(&mut qt, pay(400)).unwrap();
        assert!(qt.payment().paid_date.is_none());
        run(&mut qt, pay(600)).unwrap();
        assert_eq!(qt.outstanding(), Decimal::ZERO);
        assert!(qt.payment().paid_date.is_some());
    }

    proptest::proptest! {
        #[test]
        fn grand_total_never_undercuts_subtotal(
            qty in 1i64..1_000,
            price_cents in 0i64..1_000_000,
            tax_bp in 0i64..5_000,
            freight_cents in 0i64..100_000,
        ) {
            let lines = vec![SalesLine {
                line_no: 1,
                description: "item".to_string(),
                unit: "pcs".to_string(),
                quantity: Decimal::from(qty),
                unit_price: Decimal::new(price_cents, 2),
            }];
            let tax_rate = Decimal::new(tax_bp, 2);
            let totals = DocumentTotals::compute(&lines, tax_rate, Decimal::new(freight_cents, 2))
                .unwrap();
            proptest::prop_assert!(totals.grand_total >= totals.subtotal);
            proptest::prop_assert!(totals.subtotal.scale() <= 2);
            proptest::prop_assert!(totals.grand_total.scale() <= 2);
        }
    }
}
