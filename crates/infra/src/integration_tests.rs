//! End-to-end workflows over the in-memory backend.
//!
//! Verifies:
//! - kitting moves components and parent in one all-or-nothing unit
//! - concurrent OUT movements never drive a balance negative
//! - goods receipts update the order and the ledger together
//! - the sales document chain and its conversion guards

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;

    use tradeledger_inventory::{
        Direction, ItemCatalog, ItemDetails, LedgerFilter, NewLedgerEntry, StockKey,
    };
    use tradeledger_purchasing::{GrnLine, PurchaseOrderLineInput, PurchaseOrderStatus};
    use tradeledger_sales::{
        DocumentStatus, DocumentType, PackedItem, Package, PaymentTerms, SalesLineInput,
    };

    use crate::error::ErrorKind;
    use crate::services::{
        BomLineInput, GrnRequest, KittingService, LedgerService, ProcurementService,
        PurchaseOrderInput, QuotationInput, SalesService,
    };
    use crate::store::{InMemoryStore, SharedStore};

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn article(code: &str) -> StockKey {
        StockKey::article(code).unwrap()
    }

    fn store() -> SharedStore {
        Arc::new(InMemoryStore::new())
    }

    fn catalog() -> Arc<dyn ItemCatalog> {
        let mut items = HashMap::new();
        items.insert(
            "LEG".to_string(),
            ItemDetails {
                description: "Oak leg".to_string(),
                unit_weight: Some(Decimal::new(25, 1)),
            },
        );
        items.insert(
            "TOP".to_string(),
            ItemDetails {
                description: "Oak top".to_string(),
                unit_weight: Some(dec(10)),
            },
        );
        Arc::new(items)
    }

    fn desk_bom(kitting: &KittingService) -> tradeledger_inventory::BomId {
        kitting
            .create_bom(
                "DESK",
                "Oak desk",
                vec![BomLineInput::new("LEG", dec(4)), BomLineInput::new("TOP", dec(1))],
            )
            .unwrap()
            .id_typed()
    }

    fn stock(ledger: &LedgerService, code: &str, quantity: i64) {
        ledger
            .record(vec![NewLedgerEntry::inbound(article(code), dec(quantity), "OPENING")])
            .unwrap();
    }

    #[test]
    fn kit_consumes_components_and_produces_parent() {
        let store = store();
        let ledger = LedgerService::new(store.clone());
        let kitting = KittingService::new(store, catalog());
        let bom = desk_bom(&kitting);
        stock(&ledger, "LEG", 8);
        stock(&ledger, "TOP", 2);

        let outcome = kitting.kit(bom, dec(2)).unwrap();

        assert_eq!(outcome.entries.len(), 3);
        assert!(outcome.reference.starts_with("KIT-"));
        assert!(outcome.entries.iter().all(|e| e.reference == outcome.reference));
        assert_eq!(outcome.total_weight, Some(dec(40)));
        assert_eq!(ledger.balance(&article("LEG")).unwrap(), Decimal::ZERO);
        assert_eq!(ledger.balance(&article("TOP")).unwrap(), Decimal::ZERO);
        assert_eq!(ledger.balance(&article("DESK")).unwrap(), dec(2));

        let dekit = kitting.dekit(bom, Decimal::ONE).unwrap();
        assert!(dekit.reference.starts_with("DEKIT-"));
        assert_eq!(ledger.balance(&article("DESK")).unwrap(), Decimal::ONE);
        assert_eq!(ledger.balance(&article("LEG")).unwrap(), dec(4));
        assert_eq!(ledger.balance(&article("TOP")).unwrap(), Decimal::ONE);
    }

    #[test]
    fn kit_short_by_one_unit_writes_nothing() {
        let store = store();
        let ledger = LedgerService::new(store.clone());
        let kitting = KittingService::new(store, catalog());
        let bom = desk_bom(&kitting);
        stock(&ledger, "LEG", 7);
        stock(&ledger, "TOP", 2);
        let before = ledger.list(&LedgerFilter::default()).unwrap();

        let err = kitting.kit(bom, dec(2)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.message().contains("article:LEG"));
        assert_eq!(ledger.list(&LedgerFilter::default()).unwrap(), before);
        assert_eq!(ledger.balance(&article("DESK")).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn oversized_movements_leave_the_ledger_usable() {
        let ledger = LedgerService::new(store());
        let sku = |code: &str| StockKey::sku(code).unwrap();
        let half = Decimal::MAX / dec(2) + Decimal::ONE;

        let err = ledger
            .record(vec![
                NewLedgerEntry::inbound(sku("A"), half, "BIG"),
                NewLedgerEntry::inbound(sku("A"), half, "BIG"),
            ])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        ledger.record(vec![NewLedgerEntry::inbound(sku("B"), dec(3), "GRN")]).unwrap();
        assert_eq!(ledger.balance(&sku("B")).unwrap(), dec(3));
        assert_eq!(ledger.balance(&sku("A")).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn kit_multiplier_past_the_decimal_range_is_rejected() {
        let store = store();
        let ledger = LedgerService::new(store.clone());
        let kitting = KittingService::new(store, catalog());
        let bom = desk_bom(&kitting);
        stock(&ledger, "LEG", 4);

        let err = kitting.kit(bom, Decimal::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(kitting.kit(bom, Decimal::ONE).unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(ledger.balance(&article("LEG")).unwrap(), dec(4));
    }

    #[test]
    fn kitting_unknown_or_deleted_bom_is_not_found() {
        let store = store();
        let kitting = KittingService::new(store, catalog());
        let bom = desk_bom(&kitting);
        kitting.delete_bom(bom).unwrap();

        assert_eq!(kitting.kit(bom, Decimal::ONE).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(kitting.get_bom(bom).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn bom_lines_snapshot_catalog_attributes() {
        let kitting = KittingService::new(store(), catalog());
        let bom = desk_bom(&kitting);

        let edited = kitting
            .edit_bom(
                bom,
                "Oak desk, wide",
                vec![
                    BomLineInput::new("LEG", dec(4)),
                    BomLineInput {
                        description: Some("Wide top".to_string()),
                        ..BomLineInput::new("TOP", dec(1))
                    },
                ],
            )
            .unwrap();

        assert_eq!(edited.lines()[0].description, "Oak leg");
        assert_eq!(edited.lines()[0].unit_weight, Some(Decimal::new(25, 1)));
        assert_eq!(edited.lines()[1].description, "Wide top");
        assert_eq!(kitting.get_bom(bom).unwrap(), edited);
    }

    #[test]
    fn concurrent_outbound_never_overdraws() {
        let ledger = LedgerService::new(store());
        let key = StockKey::sku("BOLT-M8").unwrap();
        ledger
            .record(vec![NewLedgerEntry::inbound(key.clone(), dec(5), "OPENING")])
            .unwrap();

        let accepted = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let ledger = ledger.clone();
                let key = key.clone();
                let accepted = &accepted;
                scope.spawn(move || {
                    let out = NewLedgerEntry::outbound(key, Decimal::ONE, format!("PICK-{worker}"));
                    match ledger.record(vec![out]) {
                        Ok(_) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict),
                    }
                });
            }
        });

        assert_eq!(accepted.load(Ordering::SeqCst), 5);
        assert_eq!(ledger.balance(&key).unwrap(), Decimal::ZERO);
        let outs = ledger
            .list(&LedgerFilter {
                key: Some(key),
                direction: Some(Direction::Out),
                ..LedgerFilter::default()
            })
            .unwrap();
        assert_eq!(outs.len(), 5);
    }

    fn po_input(lines: &[(&str, i64, i64)]) -> PurchaseOrderInput {
        PurchaseOrderInput {
            supplier: "Acme Timber".to_string(),
            currency: "USD".to_string(),
            lines: lines
                .iter()
                .map(|(code, qty, price)| PurchaseOrderLineInput {
                    key: article(code),
                    description: String::new(),
                    unit: "pcs".to_string(),
                    quantity: dec(*qty),
                    unit_price: dec(*price),
                })
                .collect(),
            save: true,
        }
    }

    fn grn(lines: &[(&str, i64)]) -> GrnRequest {
        GrnRequest {
            lines: lines
                .iter()
                .map(|(code, qty)| GrnLine {
                    key: article(code),
                    quantity: dec(*qty),
                    unit: "pcs".to_string(),
                })
                .collect(),
            note: String::new(),
        }
    }

    #[test]
    fn receipts_and_revisions_flow_into_the_ledger() {
        let store = store();
        let ledger = LedgerService::new(store.clone());
        let procurement = ProcurementService::new(store);

        let order = procurement
            .create_po(po_input(&[("LEG", 10, 5), ("TOP", 2, 40)]))
            .unwrap();
        assert_eq!(order.grand_total(), dec(130));
        let id = order.id_typed();

        let first = procurement.create_grn(id, grn(&[("LEG", 4)])).unwrap();
        assert!(first.grn_number.starts_with("GRN-"));
        assert!(first.grn_number.ends_with("-01"));
        assert_eq!(first.order_number, order.order_number());
        assert_eq!(procurement.get_po(id).unwrap().status(), PurchaseOrderStatus::Partial);
        assert_eq!(ledger.balance(&article("LEG")).unwrap(), dec(4));

        let entries = ledger.list(&LedgerFilter::for_key(article("LEG"))).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reference, first.grn_number);

        // Cut LEG down to what already arrived.
        let revised = procurement
            .revise_po(id, po_input(&[("LEG", 4, 5), ("TOP", 2, 40)]))
            .unwrap();
        assert_eq!(revised.order_number(), format!("{}R1", order.order_number()));
        assert_eq!(revised.status(), PurchaseOrderStatus::Partial);

        let second = procurement.create_grn(id, grn(&[("TOP", 2)])).unwrap();
        assert!(second.grn_number.ends_with("-02"));
        assert_eq!(procurement.get_po(id).unwrap().status(), PurchaseOrderStatus::Closed);
        assert_eq!(ledger.balance(&article("TOP")).unwrap(), dec(2));
        assert_eq!(procurement.goods_receipts(id).unwrap(), vec![first, second]);
    }

    #[test]
    fn over_receipt_is_rejected_without_side_effects() {
        let store = store();
        let ledger = LedgerService::new(store.clone());
        let procurement = ProcurementService::new(store);
        let id = procurement
            .create_po(po_input(&[("LEG", 10, 5), ("TOP", 2, 40)]))
            .unwrap()
            .id_typed();

        let err = procurement
            .create_grn(id, grn(&[("TOP", 1), ("LEG", 11)]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(ledger.balance(&article("TOP")).unwrap(), Decimal::ZERO);
        assert!(procurement.goods_receipts(id).unwrap().is_empty());

        // The rejected attempt did not consume a GRN number.
        let accepted = procurement.create_grn(id, grn(&[("LEG", 10)])).unwrap();
        assert!(accepted.grn_number.ends_with("-01"));
    }

    #[test]
    fn receipts_require_a_saved_order() {
        let procurement = ProcurementService::new(store());
        let draft = procurement
            .create_po(PurchaseOrderInput {
                save: false,
                ..po_input(&[("LEG", 10, 5)])
            })
            .unwrap()
            .id_typed();
        assert_eq!(
            procurement.create_grn(draft, grn(&[("LEG", 1)])).unwrap_err().kind(),
            ErrorKind::Conflict
        );

        procurement.save_po(draft).unwrap();
        procurement.mark_sent(draft).unwrap();
        assert_eq!(
            procurement.create_grn(draft, grn(&[("LEG", 1)])).unwrap_err().kind(),
            ErrorKind::Conflict
        );
        assert_eq!(procurement.delete_po(draft).unwrap_err().kind(), ErrorKind::Conflict);
    }

    #[test]
    fn purchase_payments_are_capped_at_the_total() {
        let procurement = ProcurementService::new(store());
        let id = procurement
            .create_po(po_input(&[("LEG", 10, 5)]))
            .unwrap()
            .id_typed();

        let paid = procurement.record_payment(id, dec(20), None).unwrap();
        assert_eq!(paid.outstanding(), dec(30));
        assert!(paid.payment().paid_date.is_none());

        let err = procurement.record_payment(id, dec(31), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let settled = procurement.record_payment(id, dec(30), None).unwrap();
        assert_eq!(settled.outstanding(), Decimal::ZERO);
        assert!(settled.payment().paid_date.is_some());

        // A revision may not drop the total below what was paid.
        let err = procurement
            .revise_po(id, po_input(&[("LEG", 5, 5)]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    fn quotation(terms: PaymentTerms) -> QuotationInput {
        QuotationInput {
            customer: "Nordic Interiors".to_string(),
            terms,
            lines: vec![SalesLineInput {
                description: "Oak desk".to_string(),
                unit: "pcs".to_string(),
                quantity: dec(2),
                unit_price: dec(100),
            }],
            tax_rate: dec(10),
            freight: dec(5),
        }
    }

    fn carton() -> Vec<Package> {
        vec![Package {
            package_no: 1,
            items: vec![PackedItem {
                description: "Oak desk".to_string(),
                quantity: dec(2),
            }],
            gross_weight: Some(dec(90)),
            net_weight: Some(dec(80)),
        }]
    }

    #[test]
    fn advance_chain_runs_from_quotation_to_cipl() {
        let sales = SalesService::new(store());
        let qt = sales.create_quotation(quotation(PaymentTerms::Advance)).unwrap();
        assert!(qt.number().starts_with("QT-"));
        assert_eq!(qt.totals().grand_total, dec(225));
        sales
            .set_quotation_status(qt.id_typed(), DocumentStatus::Final)
            .unwrap();

        let oc = sales.convert(qt.id_typed(), DocumentType::OrderConfirmation).unwrap();
        assert!(oc.number().starts_with("OC-"));
        assert_eq!(oc.status(), DocumentStatus::Open);
        assert_eq!(oc.source().map(|s| s.number.as_str()), Some(qt.number()));
        assert_eq!(sales.get(qt.id_typed()).unwrap().status(), DocumentStatus::Converted);

        // Advance terms go through a proforma, never straight to packing.
        assert_eq!(
            sales.convert(oc.id_typed(), DocumentType::Ptg).unwrap_err().kind(),
            ErrorKind::Conflict
        );
        let pi = sales.convert(oc.id_typed(), DocumentType::ProformaInvoice).unwrap();
        let ptg = sales.convert(pi.id_typed(), DocumentType::Ptg).unwrap();

        assert_eq!(
            sales.convert(ptg.id_typed(), DocumentType::Invoice).unwrap_err().kind(),
            ErrorKind::Conflict
        );
        let packed = sales.record_packing(ptg.id_typed(), carton()).unwrap();
        assert_eq!(packed.status(), DocumentStatus::Completed);

        let inv = sales.convert(ptg.id_typed(), DocumentType::Invoice).unwrap();
        let cipl = sales.convert(inv.id_typed(), DocumentType::Cipl).unwrap();
        assert!(cipl.number().starts_with("CIPL-"));
        assert_eq!(cipl.totals(), qt.totals());
        assert_eq!(cipl.lines(), qt.lines());
        assert_eq!(cipl.customer(), "Nordic Interiors");
    }

    #[test]
    fn credit_terms_skip_the_proforma() {
        let sales = SalesService::new(store());
        let qt = sales.create_quotation(quotation(PaymentTerms::Credit)).unwrap();
        let oc = sales.convert(qt.id_typed(), DocumentType::OrderConfirmation).unwrap();

        assert_eq!(
            sales
                .convert(oc.id_typed(), DocumentType::ProformaInvoice)
                .unwrap_err()
                .kind(),
            ErrorKind::Conflict
        );
        let ptg = sales.convert(oc.id_typed(), DocumentType::Ptg).unwrap();
        assert_eq!(ptg.terms(), PaymentTerms::Credit);
    }

    #[test]
    fn converted_quotation_status_is_locked() {
        let sales = SalesService::new(store());
        let qt = sales.create_quotation(quotation(PaymentTerms::Advance)).unwrap();
        sales.convert(qt.id_typed(), DocumentType::OrderConfirmation).unwrap();

        let err = sales
            .set_quotation_status(qt.id_typed(), DocumentStatus::Draft)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            sales.convert(qt.id_typed(), DocumentType::Invoice).unwrap_err().kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn sales_payments_track_outstanding_per_document() {
        let sales = SalesService::new(store());
        let qt = sales.create_quotation(quotation(PaymentTerms::Advance)).unwrap();
        let oc = sales.convert(qt.id_typed(), DocumentType::OrderConfirmation).unwrap();
        let pi = sales.convert(oc.id_typed(), DocumentType::ProformaInvoice).unwrap();

        let paid = sales.record_payment(pi.id_typed(), dec(100), None).unwrap();
        assert_eq!(paid.outstanding(), dec(125));
        assert_eq!(
            sales.record_payment(pi.id_typed(), dec(126), None).unwrap_err().kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            sales.record_payment(pi.id_typed(), Decimal::ZERO, None).unwrap_err().kind(),
            ErrorKind::Validation
        );

        // Payments stay on the document they were recorded against.
        let ptg = sales.convert(pi.id_typed(), DocumentType::Ptg).unwrap();
        assert_eq!(ptg.outstanding(), dec(225));
    }

    #[test]
    fn invalid_quotation_is_rejected() {
        let sales = SalesService::new(store());
        let err = sales
            .create_quotation(QuotationInput {
                customer: "  ".to_string(),
                ..quotation(PaymentTerms::Credit)
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let qt = sales.create_quotation(quotation(PaymentTerms::Credit)).unwrap();
        assert!(qt.number().ends_with("-01"));
    }
}
