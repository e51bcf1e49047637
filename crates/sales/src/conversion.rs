//! Document types and the one-way conversion graph between them.

use serde::{Deserialize, Serialize};

use tradeledger_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Quotation,
    OrderConfirmation,
    ProformaInvoice,
    /// Packing / goods-to-go document.
    Ptg,
    Invoice,
    /// Commercial invoice and packing list.
    Cipl,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        DocumentType::Quotation,
        DocumentType::OrderConfirmation,
        DocumentType::ProformaInvoice,
        DocumentType::Ptg,
        DocumentType::Invoice,
        DocumentType::Cipl,
    ];

    /// Document-number prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentType::Quotation => "QT",
            DocumentType::OrderConfirmation => "OC",
            DocumentType::ProformaInvoice => "PI",
            DocumentType::Ptg => "PTG",
            DocumentType::Invoice => "INV",
            DocumentType::Cipl => "CIPL",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Quotation => "QUOTATION",
            DocumentType::OrderConfirmation => "ORDER_CONFIRMATION",
            DocumentType::ProformaInvoice => "PROFORMA_INVOICE",
            DocumentType::Ptg => "PTG",
            DocumentType::Invoice => "INVOICE",
            DocumentType::Cipl => "CIPL",
        }
    }
}

impl core::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status values. DRAFT/FINAL apply to quotations; OPEN/CONVERTED/COMPLETED
/// to everything else (CONVERTED also marks a converted quotation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Draft,
    Final,
    Open,
    Converted,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentTerms {
    Advance,
    Credit,
}

/// The conversion edge table.
///
/// Gated on the source's type, its current status and its payment terms.
pub fn conversion_allowed(
    source: DocumentType,
    status: DocumentStatus,
    terms: PaymentTerms,
    target: DocumentType,
) -> bool {
    use DocumentType::*;

    match (source, target) {
        (Quotation, OrderConfirmation) => true,
        (OrderConfirmation, ProformaInvoice) => terms == PaymentTerms::Advance,
        (OrderConfirmation, Ptg) => terms == PaymentTerms::Credit,
        (ProformaInvoice, Ptg) => true,
        (Ptg, Invoice) => status == DocumentStatus::Completed,
        (Invoice, Cipl) => true,
        _ => false,
    }
}

/// [`conversion_allowed`] as a `Conflict` carrying the rejected edge.
pub fn check_conversion(
    source: DocumentType,
    status: DocumentStatus,
    terms: PaymentTerms,
    target: DocumentType,
) -> DomainResult<()> {
    if conversion_allowed(source, status, terms, target) {
        Ok(())
    } else {
        Err(DomainError::conflict(format!(
            "cannot convert {source} ({status:?}, {terms:?}) to {target}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DocumentType::*;

    const STATUSES: [DocumentStatus; 5] = [
        DocumentStatus::Draft,
        DocumentStatus::Final,
        DocumentStatus::Open,
        DocumentStatus::Converted,
        DocumentStatus::Completed,
    ];
    const TERMS: [PaymentTerms; 2] = [PaymentTerms::Advance, PaymentTerms::Credit];

    #[test]
    fn quotation_converts_only_to_order_confirmation() {
        for status in STATUSES {
            for terms in TERMS {
                for target in DocumentType::ALL {
                    assert_eq!(
                        conversion_allowed(Quotation, status, terms, target),
                        target == OrderConfirmation,
                        "{status:?} {terms:?} -> {target}"
                    );
                }
            }
        }
    }

    #[test]
    fn order_confirmation_branches_on_terms() {
        let open = DocumentStatus::Open;
        let (advance, credit) = (PaymentTerms::Advance, PaymentTerms::Credit);
        assert!(conversion_allowed(OrderConfirmation, open, advance, ProformaInvoice));
        assert!(!conversion_allowed(OrderConfirmation, open, advance, Ptg));
        assert!(!conversion_allowed(OrderConfirmation, open, credit, ProformaInvoice));
        assert!(conversion_allowed(OrderConfirmation, open, credit, Ptg));
    }

    #[test]
    fn ptg_needs_completion_before_invoicing() {
        for terms in TERMS {
            for status in STATUSES {
                assert_eq!(
                    conversion_allowed(Ptg, status, terms, Invoice),
                    status == DocumentStatus::Completed
                );
            }
        }
    }

    #[test]
    fn remaining_edges_are_unconditional() {
        for terms in TERMS {
            assert!(conversion_allowed(ProformaInvoice, DocumentStatus::Open, terms, Ptg));
            assert!(conversion_allowed(Invoice, DocumentStatus::Open, terms, Cipl));
        }
    }

    #[test]
    fn edge_count_is_exactly_six() {
        let mut edges = std::collections::HashSet::new();
        for source in DocumentType::ALL {
            for target in DocumentType::ALL {
                for status in STATUSES {
                    for terms in TERMS {
                        if conversion_allowed(source, status, terms, target) {
                            edges.insert((source, target));
                        }
                    }
                }
            }
        }
        assert_eq!(edges.len(), 6);
        assert!(!edges.contains(&(Cipl, Invoice)));
        assert!(!edges.contains(&(Quotation, Ptg)));
    }

    #[test]
    fn rejection_is_a_conflict() {
        let err = check_conversion(Quotation, DocumentStatus::Draft, PaymentTerms::Credit, Ptg)
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
