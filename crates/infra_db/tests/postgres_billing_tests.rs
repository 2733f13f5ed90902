//! PostgreSQL adapter tests
//!
//! Each test starts its own PostgreSQL container and is ignored by default.
//! Run them with `cargo test -p infra_db -- --ignored` on a machine with Docker.

use std::sync::Arc;

use chrono::NaiveDate;
use core_kernel::{AdapterHealth, ClientId, EmployeeId, HealthCheckable, Money};
use domain_billing::{
    BillingError, InvoiceAssembler, InvoiceService, InvoiceStatus, InvoiceType, PaymentLedger,
    PaymentStatus,
};
use infra_db::PostgresBillingAdapter;
use rust_decimal_macros::dec;
use test_utils::{db_test, ContractBuilder, NewPaymentBuilder, TemporalFixtures};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn service_for(adapter: &Arc<PostgresBillingAdapter>) -> InvoiceService {
    let assembler = InvoiceAssembler::new(adapter.clone(), adapter.clone(), adapter.clone());
    InvoiceService::new(assembler, adapter.clone())
}

// ============================================================================
// Invoices
// ============================================================================

db_test!(test_issue_and_reload_invoice, |db| {
    let client_id = db.insert_client().await.unwrap();
    let employee_id = db.insert_employee().await.unwrap();
    db.insert_contract(client_id, &ContractBuilder::accommodation().build())
        .await
        .unwrap();

    let adapter = Arc::new(PostgresBillingAdapter::new(db.pool().clone()));
    let service = service_for(&adapter);

    let invoice = service
        .issue_invoice_on(
            ClientId::new(client_id),
            TemporalFixtures::window_start(),
            TemporalFixtures::window_end(),
            EmployeeId::new(employee_id),
            TemporalFixtures::invoice_date(),
        )
        .await
        .unwrap();

    assert_eq!(invoice.invoice_number, "INV-20240402-0001");
    assert_eq!(invoice.due_date, date(2024, 5, 2));
    assert_eq!(invoice.status, InvoiceStatus::Outstanding);
    assert_eq!(invoice.total_amount.amount(), dec!(3015.32));

    let summary = service.get_invoice_summary(invoice.id).await.unwrap();
    assert_eq!(summary.invoice.line_items.len(), 1);
    let line = &summary.invoice.line_items[0];
    assert_eq!(line.periods.len(), 1);
    assert_eq!(line.periods[0].start_date, date(2024, 3, 1));
    assert_eq!(line.periods[0].end_date, date(2024, 3, 28));
    assert_eq!(line.totals.vat_amount.amount(), dec!(523.32));
    assert!(summary.total_paid.is_zero());
});

db_test!(test_billed_days_are_not_invoiced_twice, |db| {
    let client_id = db.insert_client().await.unwrap();
    let employee_id = db.insert_employee().await.unwrap();
    db.insert_contract(client_id, &ContractBuilder::accommodation().build())
        .await
        .unwrap();

    let adapter = Arc::new(PostgresBillingAdapter::new(db.pool().clone()));
    let service = service_for(&adapter);
    let client = ClientId::new(client_id);
    let employee = EmployeeId::new(employee_id);

    service
        .issue_invoice_on(client, date(2024, 3, 10), date(2024, 3, 19), employee, date(2024, 4, 2))
        .await
        .unwrap();

    let again = service
        .issue_invoice_on(client, date(2024, 3, 10), date(2024, 3, 19), employee, date(2024, 4, 2))
        .await;
    assert!(matches!(again, Err(BillingError::Validation(_))));

    let wider = service
        .issue_invoice_on(client, date(2024, 3, 1), date(2024, 3, 28), employee, date(2024, 4, 2))
        .await
        .unwrap();
    assert_eq!(wider.invoice_number, "INV-20240402-0002");
    assert_eq!(wider.line_items[0].periods.len(), 2);
    assert_eq!(wider.pre_vat_total.amount(), dec!(1602.00));
});

db_test!(test_concurrent_issuing_bills_days_once, |db| {
    let client_id = db.insert_client().await.unwrap();
    let employee_id = db.insert_employee().await.unwrap();
    db.insert_contract(client_id, &ContractBuilder::accommodation().build())
        .await
        .unwrap();

    let adapter = Arc::new(PostgresBillingAdapter::new(db.pool().clone()));
    let first = service_for(&adapter);
    let second = service_for(&adapter);
    let client = ClientId::new(client_id);
    let employee = EmployeeId::new(employee_id);
    let start = TemporalFixtures::window_start();
    let end = TemporalFixtures::window_end();
    let day = TemporalFixtures::invoice_date();

    let (a, b) = tokio::join!(
        first.issue_invoice_on(client, start, end, employee, day),
        second.issue_invoice_on(client, start, end, employee, day),
    );

    let issued = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(issued, 1);
    for result in [a, b] {
        if let Err(e) = result {
            assert!(
                matches!(e, BillingError::Conflict(_) | BillingError::Validation(_)),
                "unexpected error: {e}"
            );
        }
    }

    let invoices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(invoices, 1);
});

db_test!(test_credit_note_cancels_invoice_and_frees_days, |db| {
    let client_id = db.insert_client().await.unwrap();
    let employee_id = db.insert_employee().await.unwrap();
    db.insert_contract(client_id, &ContractBuilder::accommodation().build())
        .await
        .unwrap();

    let adapter = Arc::new(PostgresBillingAdapter::new(db.pool().clone()));
    let service = service_for(&adapter);
    let client = ClientId::new(client_id);
    let employee = EmployeeId::new(employee_id);
    let start = TemporalFixtures::window_start();
    let end = TemporalFixtures::window_end();

    let invoice = service
        .issue_invoice_on(client, start, end, employee, date(2024, 4, 2))
        .await
        .unwrap();

    let note = service
        .credit_invoice_on(invoice.id, employee, date(2024, 4, 10))
        .await
        .unwrap();
    assert_eq!(note.invoice_type, InvoiceType::CreditNote);
    assert_eq!(note.credited_invoice_id, Some(invoice.id));
    assert_eq!(note.invoice_number, "INV-20240410-0001");
    assert_eq!(note.total_amount.amount(), dec!(-3015.32));

    let stored = service.get_invoice_summary(note.id).await.unwrap().invoice;
    assert_eq!(stored.line_items[0].periods[0].totals.total.amount(), dec!(-3015.32));
    assert_eq!(stored.issued_by, Some(employee));

    let original = service.get_invoice_summary(invoice.id).await.unwrap().invoice;
    assert_eq!(original.status, InvoiceStatus::Canceled);

    let again = service.credit_invoice_on(invoice.id, employee, date(2024, 4, 11)).await;
    assert!(matches!(again, Err(BillingError::Validation(_))));

    let reissued = service
        .issue_invoice_on(client, start, end, employee, date(2024, 4, 10))
        .await
        .unwrap();
    assert_eq!(reissued.invoice_number, "INV-20240410-0002");
    assert_eq!(reissued.total_amount.amount(), dec!(3015.32));
});

db_test!(test_unknown_invoice_is_not_found, |db| {
    let adapter = Arc::new(PostgresBillingAdapter::new(db.pool().clone()));
    let service = service_for(&adapter);

    let result = service.get_invoice_summary(core_kernel::InvoiceId::new(404)).await;
    assert!(matches!(result, Err(BillingError::NotFound { .. })));
});

// ============================================================================
// Payments
// ============================================================================

db_test!(test_payment_lifecycle_reconciles_status, |db| {
    let client_id = db.insert_client().await.unwrap();
    let employee_id = db.insert_employee().await.unwrap();
    db.insert_contract(client_id, &ContractBuilder::accommodation().build())
        .await
        .unwrap();

    let adapter = Arc::new(PostgresBillingAdapter::new(db.pool().clone()));
    let service = service_for(&adapter);
    let ledger = PaymentLedger::new(adapter.clone());
    let employee = EmployeeId::new(employee_id);

    let invoice = service
        .issue_invoice_on(
            ClientId::new(client_id),
            TemporalFixtures::window_start(),
            TemporalFixtures::window_end(),
            employee,
            TemporalFixtures::invoice_date(),
        )
        .await
        .unwrap();

    let pending = ledger
        .create_payment(
            invoice.id,
            NewPaymentBuilder::new(Money::new(dec!(1000.00)))
                .status(PaymentStatus::Pending)
                .build(),
            employee,
        )
        .await
        .unwrap();
    assert!(!pending.invoice_status_changed);

    let paid = ledger
        .create_payment(
            invoice.id,
            NewPaymentBuilder::new(Money::new(dec!(3015.32))).build(),
            employee,
        )
        .await
        .unwrap();
    assert!(paid.invoice_status_changed);
    assert_eq!(paid.current_invoice_status, InvoiceStatus::Paid);

    let deleted = ledger
        .delete_payment(invoice.id, paid.payment.id, employee)
        .await
        .unwrap();
    assert_eq!(deleted.current_invoice_status, InvoiceStatus::Outstanding);

    let payments = ledger.list_payments(invoice.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(db.audit_entry_count(invoice.id.value()).await.unwrap(), 3);
});

db_test!(test_failed_insert_leaves_no_audit_entry, |db| {
    let client_id = db.insert_client().await.unwrap();
    let employee_id = db.insert_employee().await.unwrap();
    db.insert_contract(client_id, &ContractBuilder::accommodation().build())
        .await
        .unwrap();

    let adapter = Arc::new(PostgresBillingAdapter::new(db.pool().clone()));
    let service = service_for(&adapter);
    let ledger = PaymentLedger::new(adapter.clone());

    let invoice = service
        .issue_invoice_on(
            ClientId::new(client_id),
            TemporalFixtures::window_start(),
            TemporalFixtures::window_end(),
            EmployeeId::new(employee_id),
            TemporalFixtures::invoice_date(),
        )
        .await
        .unwrap();

    // Unknown employee: the foreign key rejects the payment row
    let result = ledger
        .create_payment(
            invoice.id,
            NewPaymentBuilder::new(Money::new(dec!(10.00))).build(),
            EmployeeId::new(999_999),
        )
        .await;
    assert!(result.is_err());
    assert_eq!(db.audit_entry_count(invoice.id.value()).await.unwrap(), 0);
});

db_test!(test_adapter_health_check, |db| {
    let adapter = PostgresBillingAdapter::new(db.pool().clone());
    let result = adapter.health_check().await;
    assert_eq!(result.status, AdapterHealth::Healthy);
});
