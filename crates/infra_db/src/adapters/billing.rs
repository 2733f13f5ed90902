//! PostgreSQL Billing Adapter
//!
//! This module provides the database adapter for the billing domain. One
//! `PostgresBillingAdapter` implements every billing port over a shared
//! connection pool:
//!
//! - `ContractPort` and `AppointmentPort` through the `CareRepository`
//! - `BillingHistoryPort`, `InvoiceStore` and `PaymentStore` through the
//!   `BillingRepository`
//!
//! Payment mutations run in a [`PgPaymentTransaction`], a thin wrapper over a
//! SQLx transaction whose first statement locks the invoice row.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillingAdapter;
//! use domain_billing::{PaymentLedger, PaymentStore};
//! use std::sync::Arc;
//!
//! let adapter = Arc::new(PostgresBillingAdapter::new(pool));
//! let ledger = PaymentLedger::new(adapter.clone());
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use core_kernel::{
    AdapterHealth, AppointmentId, ClientId, ContractId, DateRange, DomainPort, EmployeeId,
    HalfOpenRange,
    HealthCheckResult, HealthCheckable, InvoiceId, Money, OperationMetadata, PaymentId, PortError,
    VatRate,
};
use domain_billing::calculation::ChargeTotals;
use domain_billing::invoice::{format_invoice_number, parse_invoice_sequence};
use domain_billing::{
    Appointment, AppointmentPort, BillingHistoryPort, CareType, Contract, ContractPort,
    ContractWarning, HoursType, Invoice, InvoiceBalance, InvoiceLineItem, InvoiceStatus,
    InvoiceStore, InvoiceType, LinePeriod, NewCreditNote, NewInvoice, NewPayment, Payment, PaymentAuditAction,
    PaymentAuditEntry, PaymentMethod, PaymentStatus, PaymentStore, PaymentTransaction,
    PriceTimeUnit,
};

use crate::error::{db_to_port_error, DatabaseError};
use crate::repositories::billing::{
    self as billing_sql, BillingRepository, InvoiceLinePeriodRow, InvoiceLineRow, InvoiceRow,
    InvoiceWithLines, NewAuditRecord, NewInvoiceLine, NewInvoiceLinePeriod, NewInvoiceRecord,
    NewPaymentRecord, PaymentRow,
    InvoiceStatus as DbInvoiceStatus, InvoiceType as DbInvoiceType, PaymentAuditAction as DbPaymentAuditAction,
    PaymentMethod as DbPaymentMethod, PaymentStatus as DbPaymentStatus,
};
use crate::repositories::care::{
    AppointmentRow, CareRepository, ContractRow, CareType as DbCareType,
    HoursType as DbHoursType, PriceTimeUnit as DbPriceTimeUnit,
};

/// PostgreSQL-backed implementation of the billing ports
///
/// # Health Checking
///
/// Health checks run `SELECT 1` against the pool.
///
/// # Error Handling
///
/// Database errors are translated with [`db_to_port_error`]; a missing row
/// becomes `PortError::NotFound`, a constraint violation
/// `PortError::Validation`, a connection problem a transient error.
#[derive(Debug, Clone)]
pub struct PostgresBillingAdapter {
    care: CareRepository,
    billing: BillingRepository,
    pool: PgPool,
}

impl PostgresBillingAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            care: CareRepository::new(pool.clone()),
            billing: BillingRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns the underlying billing repository
    pub fn repository(&self) -> &BillingRepository {
        &self.billing
    }
}

impl DomainPort for PostgresBillingAdapter {}

#[async_trait]
impl HealthCheckable for PostgresBillingAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        };
        HealthCheckResult {
            adapter_id: "postgres-billing-adapter".to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ContractPort for PostgresBillingAdapter {
    #[instrument(skip(self, _metadata), fields(client_id = %client_id))]
    async fn list_client_contracts(
        &self,
        client_id: ClientId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Contract>, PortError> {
        let rows = self
            .care
            .list_contracts_for_client(client_id.value())
            .await
            .map_err(db_to_port_error)?;

        debug!(count = rows.len(), "loaded contracts");
        rows.into_iter().map(row_to_contract).collect()
    }
}

#[async_trait]
impl AppointmentPort for PostgresBillingAdapter {
    #[instrument(skip(self, _metadata), fields(client_id = %client_id))]
    async fn list_client_appointments(
        &self,
        client_id: ClientId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Appointment>, PortError> {
        let rows = self
            .care
            .list_appointments_starting_between(client_id.value(), from, to)
            .await
            .map_err(db_to_port_error)?;

        Ok(rows.into_iter().map(row_to_appointment).collect())
    }
}

#[async_trait]
impl BillingHistoryPort for PostgresBillingAdapter {
    #[instrument(skip(self, _metadata), fields(contract_id = %contract_id))]
    async fn billed_periods(
        &self,
        contract_id: ContractId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<HalfOpenRange>, PortError> {
        let rows = self
            .billing
            .billed_periods(contract_id.value())
            .await
            .map_err(db_to_port_error)?;

        rows.into_iter()
            .map(|(start, end)| {
                DateRange::new(start, end)
                    .and_then(|period| period.to_half_open())
                    .map_err(|e| {
                        PortError::internal(format!("invalid billed period of {}: {}", contract_id, e))
                    })
            })
            .collect()
    }
}

#[async_trait]
impl InvoiceStore for PostgresBillingAdapter {
    #[instrument(skip(self, invoice, _metadata), fields(client_id = %invoice.draft.client_id))]
    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Invoice, PortError> {
        let record = new_invoice_record(&invoice).map_err(db_to_port_error)?;
        let invoice_date = invoice.invoice_date;

        let row = self
            .billing
            .create_invoice(record, move |last_number| {
                let sequence = last_number.and_then(parse_invoice_sequence).unwrap_or(0) + 1;
                format_invoice_number(invoice_date, sequence)
            })
            .await
            .map_err(db_to_port_error)?;

        let mut stored = row_to_invoice_header(row)?;
        stored.line_items = invoice.draft.line_items;
        Ok(stored)
    }

    #[instrument(skip(self, credit_note, _metadata), fields(credited = %credit_note.credited_invoice_id))]
    async fn create_credit_note(
        &self,
        credit_note: NewCreditNote,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Invoice, PortError> {
        let record = credit_note_record(&credit_note).map_err(db_to_port_error)?;
        let invoice_date = credit_note.invoice_date;

        let row = self
            .billing
            .create_credit_note(record, move |last_number| {
                let sequence = last_number.and_then(parse_invoice_sequence).unwrap_or(0) + 1;
                format_invoice_number(invoice_date, sequence)
            })
            .await
            .map_err(db_to_port_error)?;

        let mut stored = row_to_invoice_header(row)?;
        stored.line_items = credit_note.line_items;
        Ok(stored)
    }

    #[instrument(skip(self, _metadata), fields(invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        invoice_id: InvoiceId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Invoice, PortError> {
        let data = self
            .billing
            .get_invoice(invoice_id.value())
            .await
            .map_err(db_to_port_error)?;

        row_to_invoice(data)
    }

    async fn completed_payment_total(
        &self,
        invoice_id: InvoiceId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Money, PortError> {
        let total = billing_sql::completed_payment_total(self.billing.pool(), invoice_id.value())
            .await
            .map_err(db_to_port_error)?;
        Ok(Money::new(total))
    }
}

#[async_trait]
impl PaymentStore for PostgresBillingAdapter {
    #[instrument(skip(self, _metadata), fields(invoice_id = %invoice_id))]
    async fn list_payments(
        &self,
        invoice_id: InvoiceId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Payment>, PortError> {
        let rows = self
            .billing
            .list_payments(invoice_id.value())
            .await
            .map_err(db_to_port_error)?;

        Ok(rows.into_iter().map(row_to_payment).collect())
    }

    #[instrument(skip(self, _metadata), fields(payment_id = %payment_id))]
    async fn get_payment(
        &self,
        payment_id: PaymentId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Payment, PortError> {
        billing_sql::get_payment(&self.pool, payment_id.value())
            .await
            .map(row_to_payment)
            .map_err(db_to_port_error)
    }

    async fn begin(
        &self,
        metadata: Option<OperationMetadata>,
    ) -> Result<Box<dyn PaymentTransaction>, PortError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_to_port_error(e.into()))?;

        let correlation_id = metadata.and_then(|m| m.correlation_id);
        debug!(correlation_id = ?correlation_id, "payment transaction started");
        Ok(Box::new(PgPaymentTransaction { tx }))
    }
}

/// A payment mutation in progress
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PgPaymentTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PaymentTransaction for PgPaymentTransaction {
    async fn lock_invoice(&mut self, invoice_id: InvoiceId) -> Result<InvoiceBalance, PortError> {
        let row = billing_sql::lock_invoice(&mut *self.tx, invoice_id.value())
            .await
            .map_err(db_to_port_error)?;

        Ok(InvoiceBalance {
            invoice_id: InvoiceId::new(row.id),
            total_amount: Money::new(row.total_amount),
            status: row.status.into(),
        })
    }

    async fn get_payment(&mut self, payment_id: PaymentId) -> Result<Payment, PortError> {
        billing_sql::get_payment(&mut *self.tx, payment_id.value())
            .await
            .map(row_to_payment)
            .map_err(db_to_port_error)
    }

    async fn insert_payment(
        &mut self,
        invoice_id: InvoiceId,
        payment: &NewPayment,
        recorded_by: EmployeeId,
    ) -> Result<Payment, PortError> {
        let record = NewPaymentRecord {
            invoice_id: invoice_id.value(),
            amount: payment.amount.amount(),
            payment_status: payment.payment_status.into(),
            payment_method: payment.payment_method.map(Into::into),
            payment_date: payment.payment_date,
            payment_reference: payment.payment_reference.clone(),
            notes: payment.notes.clone(),
            recorded_by: recorded_by.value(),
        };

        billing_sql::insert_payment(&mut *self.tx, &record)
            .await
            .map(row_to_payment)
            .map_err(db_to_port_error)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<Payment, PortError> {
        billing_sql::update_payment(&mut *self.tx, &payment_to_row(payment))
            .await
            .map(row_to_payment)
            .map_err(db_to_port_error)
    }

    async fn delete_payment(&mut self, payment_id: PaymentId) -> Result<(), PortError> {
        billing_sql::delete_payment(&mut *self.tx, payment_id.value())
            .await
            .map_err(db_to_port_error)
    }

    async fn completed_payment_total(&mut self, invoice_id: InvoiceId) -> Result<Money, PortError> {
        let total = billing_sql::completed_payment_total(&mut *self.tx, invoice_id.value())
            .await
            .map_err(db_to_port_error)?;
        Ok(Money::new(total))
    }

    async fn set_invoice_status(
        &mut self,
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    ) -> Result<(), PortError> {
        billing_sql::set_invoice_status(&mut *self.tx, invoice_id.value(), status.into())
            .await
            .map_err(db_to_port_error)
    }

    async fn record_audit(&mut self, entry: &PaymentAuditEntry) -> Result<(), PortError> {
        let record = audit_record(entry).map_err(db_to_port_error)?;
        billing_sql::insert_audit_entry(&mut *self.tx, &record)
            .await
            .map_err(db_to_port_error)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx.commit().await.map_err(|e| db_to_port_error(e.into()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        self.tx.rollback().await.map_err(|e| db_to_port_error(e.into()))
    }
}

// ============================================================================
// Enum mapping
// ============================================================================

/// Implements `From` in both directions between a database enum and its
/// domain twin with identically named variants
macro_rules! map_enum {
    ($db:ident, $domain:ident { $($variant:ident),+ $(,)? }) => {
        impl From<$db> for $domain {
            fn from(value: $db) -> Self {
                match value {
                    $($db::$variant => $domain::$variant,)+
                }
            }
        }

        impl From<$domain> for $db {
            fn from(value: $domain) -> Self {
                match value {
                    $($domain::$variant => $db::$variant,)+
                }
            }
        }
    };
}

map_enum!(DbCareType, CareType { Accommodation, Ambulante });
map_enum!(DbPriceTimeUnit, PriceTimeUnit { Minute, Hourly, Daily, Weekly, Monthly });
map_enum!(DbHoursType, HoursType { Weekly, AllPeriod });
map_enum!(DbInvoiceStatus, InvoiceStatus {
    Outstanding, PartiallyPaid, Paid, Overpaid, Expired, Imported, Concept, Canceled,
});
map_enum!(DbInvoiceType, InvoiceType { Standard, CreditNote });
map_enum!(DbPaymentStatus, PaymentStatus { Completed, Pending, Failed, Reversed, Refunded });
map_enum!(DbPaymentMethod, PaymentMethod { BankTransfer, CreditCard, Check, Cash, Other });
map_enum!(DbPaymentAuditAction, PaymentAuditAction { Created, Updated, Deleted });

// ============================================================================
// Row conversion
// ============================================================================

fn vat_rate(value: i32) -> Result<VatRate, PortError> {
    VatRate::from_percentage(value).map_err(|e| PortError::internal(format!("stored VAT rate: {}", e)))
}

fn row_to_contract(row: ContractRow) -> Result<Contract, PortError> {
    Ok(Contract {
        id: ContractId::new(row.id),
        client_id: ClientId::new(row.client_id),
        care_type: row.care_type.into(),
        price: Money::new(row.price),
        price_time_unit: row.price_time_unit.into(),
        vat: vat_rate(row.vat)?,
        start_date: row.start_date,
        end_date: row.end_date,
        hours: row.hours,
        hours_type: row.hours_type.map(Into::into),
    })
}

fn row_to_appointment(row: AppointmentRow) -> Appointment {
    Appointment {
        id: AppointmentId::new(row.id),
        client_id: ClientId::new(row.client_id),
        start_time: row.start_time,
        end_time: row.end_time,
    }
}

fn row_to_payment(row: PaymentRow) -> Payment {
    Payment {
        id: PaymentId::new(row.id),
        invoice_id: InvoiceId::new(row.invoice_id),
        amount: Money::new(row.amount),
        payment_status: row.payment_status.into(),
        payment_method: row.payment_method.map(Into::into),
        payment_date: row.payment_date,
        payment_reference: row.payment_reference,
        notes: row.notes,
        recorded_by: EmployeeId::new(row.recorded_by),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn payment_to_row(payment: &Payment) -> PaymentRow {
    PaymentRow {
        id: payment.id.value(),
        invoice_id: payment.invoice_id.value(),
        amount: payment.amount.amount(),
        payment_status: payment.payment_status.into(),
        payment_method: payment.payment_method.map(Into::into),
        payment_date: payment.payment_date,
        payment_reference: payment.payment_reference.clone(),
        notes: payment.notes.clone(),
        recorded_by: payment.recorded_by.value(),
        created_at: payment.created_at,
        updated_at: payment.updated_at,
    }
}

fn audit_record(entry: &PaymentAuditEntry) -> Result<NewAuditRecord, DatabaseError> {
    Ok(NewAuditRecord {
        invoice_id: entry.invoice_id.value(),
        payment_id: entry.payment_id.value(),
        action: entry.action.into(),
        employee_id: entry.employee_id.value(),
        old_values: entry.before.as_ref().map(serde_json::to_value).transpose()?,
        new_values: entry.after.as_ref().map(serde_json::to_value).transpose()?,
    })
}

fn line_records(items: &[InvoiceLineItem]) -> Result<Vec<NewInvoiceLine>, DatabaseError> {
    items
        .iter()
        .map(|item| {
            Ok(NewInvoiceLine {
                contract_id: item.contract_id.value(),
                care_type: item.care_type.into(),
                start_date: item.start_date,
                end_date: item.end_date,
                price: item.price.amount(),
                price_time_unit: item.price_time_unit.into(),
                vat: item.vat.percentage(),
                pre_vat_total: item.totals.pre_vat_total.amount(),
                vat_amount: item.totals.vat_amount.amount(),
                total: item.totals.total.amount(),
                warnings: serde_json::to_value(&item.warnings)?,
                periods: item
                    .periods
                    .iter()
                    .map(|p| NewInvoiceLinePeriod {
                        start_date: p.start_date,
                        end_date: p.end_date,
                        accommodation_time_frame: p.accommodation_time_frame.clone(),
                        ambulante_total_minutes: p.ambulante_total_minutes,
                        pre_vat_total: p.totals.pre_vat_total.amount(),
                        vat_amount: p.totals.vat_amount.amount(),
                        total: p.totals.total.amount(),
                    })
                    .collect(),
            })
        })
        .collect()
}

fn new_invoice_record(invoice: &NewInvoice) -> Result<NewInvoiceRecord, DatabaseError> {
    let draft = &invoice.draft;
    Ok(NewInvoiceRecord {
        client_id: draft.client_id.value(),
        invoice_date: invoice.invoice_date,
        due_date: invoice.due_date,
        period_start: draft.start_date,
        period_end: draft.end_date,
        invoice_type: DbInvoiceType::Standard,
        credited_invoice_id: None,
        issued_by: Some(invoice.issued_by.value()),
        pre_vat_total: draft.pre_vat_total.amount(),
        vat_amount: draft.vat_amount.amount(),
        total_amount: draft.total_amount.amount(),
        warning_count: i32::try_from(draft.warning_count).unwrap_or(i32::MAX),
        lines: line_records(&draft.line_items)?,
    })
}

fn credit_note_record(note: &NewCreditNote) -> Result<NewInvoiceRecord, DatabaseError> {
    Ok(NewInvoiceRecord {
        client_id: note.client_id.value(),
        invoice_date: note.invoice_date,
        due_date: note.due_date,
        period_start: note.period_start,
        period_end: note.period_end,
        invoice_type: DbInvoiceType::CreditNote,
        credited_invoice_id: Some(note.credited_invoice_id.value()),
        issued_by: Some(note.issued_by.value()),
        pre_vat_total: note.pre_vat_total.amount(),
        vat_amount: note.vat_amount.amount(),
        total_amount: note.total_amount.amount(),
        warning_count: 0,
        lines: line_records(&note.line_items)?,
    })
}

fn totals(pre_vat_total: rust_decimal::Decimal, vat_amount: rust_decimal::Decimal, total: rust_decimal::Decimal) -> ChargeTotals {
    ChargeTotals {
        pre_vat_total: Money::new(pre_vat_total),
        vat_amount: Money::new(vat_amount),
        total: Money::new(total),
    }
}

fn row_to_invoice_header(row: InvoiceRow) -> Result<Invoice, PortError> {
    Ok(Invoice {
        id: InvoiceId::new(row.id),
        client_id: ClientId::new(row.client_id),
        invoice_number: row.invoice_number,
        invoice_date: row.invoice_date,
        due_date: row.due_date,
        invoice_type: row.invoice_type.into(),
        status: row.status.into(),
        period_start: row.period_start,
        period_end: row.period_end,
        credited_invoice_id: row.credited_invoice_id.map(InvoiceId::new),
        issued_by: row.issued_by.map(EmployeeId::new),
        line_items: Vec::new(),
        pre_vat_total: Money::new(row.pre_vat_total),
        vat_amount: Money::new(row.vat_amount),
        total_amount: Money::new(row.total_amount),
        warning_count: usize::try_from(row.warning_count)
            .map_err(|_| PortError::internal("negative warning count stored"))?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn row_to_line_period(row: InvoiceLinePeriodRow) -> LinePeriod {
    LinePeriod {
        start_date: row.start_date,
        end_date: row.end_date,
        accommodation_time_frame: row.accommodation_time_frame,
        ambulante_total_minutes: row.ambulante_total_minutes,
        totals: totals(row.pre_vat_total, row.vat_amount, row.total),
    }
}

fn row_to_line_item(row: InvoiceLineRow, periods: Vec<LinePeriod>) -> Result<InvoiceLineItem, PortError> {
    let warnings: Vec<ContractWarning> = serde_json::from_value(row.warnings)
        .map_err(|e| db_to_port_error(DatabaseError::from(e)))?;

    Ok(InvoiceLineItem {
        contract_id: ContractId::new(row.contract_id),
        care_type: row.care_type.into(),
        start_date: row.start_date,
        end_date: row.end_date,
        periods,
        price: Money::new(row.price),
        price_time_unit: row.price_time_unit.into(),
        vat: vat_rate(row.vat)?,
        totals: totals(row.pre_vat_total, row.vat_amount, row.total),
        warnings,
    })
}

fn row_to_invoice(data: InvoiceWithLines) -> Result<Invoice, PortError> {
    let mut periods_by_line: HashMap<i64, Vec<LinePeriod>> = HashMap::new();
    for row in data.periods {
        periods_by_line
            .entry(row.invoice_line_id)
            .or_default()
            .push(row_to_line_period(row));
    }

    let mut invoice = row_to_invoice_header(data.invoice)?;
    invoice.line_items = data
        .lines
        .into_iter()
        .map(|line| {
            let periods = periods_by_line.remove(&line.id).unwrap_or_default();
            row_to_line_item(line, periods)
        })
        .collect::<Result<_, _>>()?;
    Ok(invoice)
}
