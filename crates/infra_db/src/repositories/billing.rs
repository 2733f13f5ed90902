//! Billing repository implementation
//!
//! Database access for invoices, their line items, payments and the payment
//! audit log. Single-statement operations are free functions generic over
//! the executor so the same SQL serves both pool reads and statements inside
//! an open payment transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgExecutor, PgPool};
use tracing::{debug, instrument};

use crate::error::DatabaseError;
use crate::repositories::care::{CareType, PriceTimeUnit};

/// Advisory lock key serializing invoice and credit note issuing
const INVOICE_ISSUE_LOCK: i64 = 0x1_4E56_0001;

const INVOICE_COLUMNS: &str = r#"
    id, client_id, invoice_number, invoice_date, due_date, period_start,
    period_end, status, invoice_type, credited_invoice_id, issued_by,
    pre_vat_total, vat_amount, total_amount, warning_count, created_at, updated_at
"#;

const PAYMENT_COLUMNS: &str = r#"
    id, invoice_id, amount, payment_status, payment_method, payment_date,
    payment_reference, notes, recorded_by, created_at, updated_at
"#;

/// Repository for invoices and payments
#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    /// Creates a new BillingRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Stores an invoice with all its lines and periods in one transaction
    ///
    /// Runs under the issue lock, so concurrent issuers are serialized. Under
    /// the lock every line period is checked against the periods already
    /// billed for its contract; an overlap fails with
    /// `DatabaseError::Conflict` and nothing is stored. The invoice number is
    /// derived by `number_for` from the highest number already issued on the
    /// same date.
    ///
    /// # Returns
    ///
    /// The stored header row
    #[instrument(skip(self, invoice, number_for), fields(client_id = invoice.client_id))]
    pub async fn create_invoice(
        &self,
        invoice: NewInvoiceRecord,
        number_for: impl FnOnce(Option<&str>) -> String + Send,
    ) -> Result<InvoiceRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        lock_issuing(&mut *tx).await?;

        for line in &invoice.lines {
            for period in &line.periods {
                let billed = billed_overlap_exists(
                    &mut *tx,
                    line.contract_id,
                    period.start_date,
                    period.end_date,
                )
                .await?;
                if billed {
                    return Err(DatabaseError::Conflict(format!(
                        "contract {} is already billed between {} and {}",
                        line.contract_id, period.start_date, period.end_date
                    )));
                }
            }
        }

        let row = insert_invoice(&mut *tx, &invoice, number_for).await?;
        tx.commit().await?;
        debug!(invoice_id = row.id, invoice_number = %row.invoice_number, "invoice stored");
        Ok(row)
    }

    /// Stores a credit note and cancels the invoice it credits
    ///
    /// Under the issue lock, the credited invoice is locked and must still be
    /// an uncanceled standard invoice, otherwise this fails with
    /// `DatabaseError::Conflict`.
    #[instrument(skip(self, credit_note, number_for), fields(credited = ?credit_note.credited_invoice_id))]
    pub async fn create_credit_note(
        &self,
        credit_note: NewInvoiceRecord,
        number_for: impl FnOnce(Option<&str>) -> String + Send,
    ) -> Result<InvoiceRow, DatabaseError> {
        let credited_id = credit_note.credited_invoice_id.ok_or_else(|| {
            DatabaseError::invalid_data("credit note without credited invoice")
        })?;

        let mut tx = self.pool.begin().await?;
        lock_issuing(&mut *tx).await?;

        let (invoice_type, status) = sqlx::query_as::<_, (InvoiceType, InvoiceStatus)>(
            "SELECT invoice_type, status FROM invoices WHERE id = $1 FOR UPDATE",
        )
        .bind(credited_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Invoice", credited_id))?;

        if invoice_type != InvoiceType::Standard || status == InvoiceStatus::Canceled {
            return Err(DatabaseError::Conflict(format!(
                "invoice {} can no longer be credited",
                credited_id
            )));
        }

        let row = insert_invoice(&mut *tx, &credit_note, number_for).await?;
        set_invoice_status(&mut *tx, credited_id, InvoiceStatus::Canceled).await?;

        tx.commit().await?;
        debug!(
            credit_note_id = row.id,
            credited_invoice_id = credited_id,
            invoice_number = %row.invoice_number,
            "credit note stored"
        );
        Ok(row)
    }

    /// Loads an invoice header with its lines and their periods
    #[instrument(skip(self))]
    pub async fn get_invoice(&self, invoice_id: i64) -> Result<InvoiceWithLines, DatabaseError> {
        let invoice = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE id = $1",
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Invoice", invoice_id))?;

        let lines = sqlx::query_as::<_, InvoiceLineRow>(
            r#"
            SELECT
                id, invoice_id, position, contract_id, care_type, start_date, end_date,
                price, price_time_unit, vat, pre_vat_total, vat_amount, total, warnings
            FROM invoice_lines
            WHERE invoice_id = $1
            ORDER BY position
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        let line_ids: Vec<i64> = lines.iter().map(|l| l.id).collect();
        let periods = sqlx::query_as::<_, InvoiceLinePeriodRow>(
            r#"
            SELECT
                id, invoice_line_id, start_date, end_date, accommodation_time_frame,
                ambulante_total_minutes, pre_vat_total, vat_amount, total
            FROM invoice_line_periods
            WHERE invoice_line_id = ANY($1)
            ORDER BY invoice_line_id, start_date
            "#,
        )
        .bind(&line_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(InvoiceWithLines {
            invoice,
            lines,
            periods,
        })
    }

    /// Inclusive date ranges of every invoiced period of a contract
    ///
    /// Canceled invoices and credit notes are left out.
    #[instrument(skip(self))]
    pub async fn billed_periods(&self, contract_id: i64) -> Result<Vec<(NaiveDate, NaiveDate)>, DatabaseError> {
        let rows = sqlx::query_as::<_, (NaiveDate, NaiveDate)>(
            r#"
            SELECT p.start_date, p.end_date
            FROM invoice_line_periods p
            JOIN invoice_lines l ON l.id = p.invoice_line_id
            JOIN invoices i ON i.id = l.invoice_id
            WHERE l.contract_id = $1
              AND i.invoice_type = 'standard'
              AND i.status <> 'canceled'
            "#,
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Lists an invoice's payments, oldest payment date first
    #[instrument(skip(self))]
    pub async fn list_payments(&self, invoice_id: i64) -> Result<Vec<PaymentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE invoice_id = $1 ORDER BY payment_date, id",
            PAYMENT_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Takes the transaction-scoped issue lock
async fn lock_issuing(conn: &mut PgConnection) -> Result<(), DatabaseError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(INVOICE_ISSUE_LOCK)
        .execute(conn)
        .await?;
    Ok(())
}

/// Whether any counted invoice bills a day of `[start, end]` for the contract
async fn billed_overlap_exists(
    conn: &mut PgConnection,
    contract_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<bool, DatabaseError> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM invoice_line_periods p
            JOIN invoice_lines l ON l.id = p.invoice_line_id
            JOIN invoices i ON i.id = l.invoice_id
            WHERE l.contract_id = $1
              AND i.invoice_type = 'standard'
              AND i.status <> 'canceled'
              AND p.start_date <= $3
              AND p.end_date >= $2
        )
        "#,
    )
    .bind(contract_id)
    .bind(start)
    .bind(end)
    .fetch_one(conn)
    .await?;

    Ok(exists)
}

/// Numbers and inserts an invoice header with its lines
///
/// The caller must hold the issue lock.
async fn insert_invoice(
    conn: &mut PgConnection,
    invoice: &NewInvoiceRecord,
    number_for: impl FnOnce(Option<&str>) -> String + Send,
) -> Result<InvoiceRow, DatabaseError> {
    let last_number: Option<String> = sqlx::query_scalar(
        "SELECT MAX(invoice_number) FROM invoices WHERE invoice_date = $1",
    )
    .bind(invoice.invoice_date)
    .fetch_one(&mut *conn)
    .await?;
    let invoice_number = number_for(last_number.as_deref());

    let row = sqlx::query_as::<_, InvoiceRow>(&format!(
        r#"
        INSERT INTO invoices (
            client_id, invoice_number, invoice_date, due_date, period_start,
            period_end, status, invoice_type, credited_invoice_id, issued_by,
            pre_vat_total, vat_amount, total_amount, warning_count
        ) VALUES ($1, $2, $3, $4, $5, $6, 'outstanding', $7, $8, $9, $10, $11, $12, $13)
        RETURNING {}
        "#,
        INVOICE_COLUMNS
    ))
    .bind(invoice.client_id)
    .bind(&invoice_number)
    .bind(invoice.invoice_date)
    .bind(invoice.due_date)
    .bind(invoice.period_start)
    .bind(invoice.period_end)
    .bind(invoice.invoice_type)
    .bind(invoice.credited_invoice_id)
    .bind(invoice.issued_by)
    .bind(invoice.pre_vat_total)
    .bind(invoice.vat_amount)
    .bind(invoice.total_amount)
    .bind(invoice.warning_count)
    .fetch_one(&mut *conn)
    .await?;

    for (position, line) in invoice.lines.iter().enumerate() {
        insert_line(&mut *conn, row.id, position as i32, line).await?;
    }
    Ok(row)
}

async fn insert_line(
    conn: &mut PgConnection,
    invoice_id: i64,
    position: i32,
    line: &NewInvoiceLine,
) -> Result<(), DatabaseError> {
    let line_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoice_lines (
            invoice_id, position, contract_id, care_type, start_date, end_date,
            price, price_time_unit, vat, pre_vat_total, vat_amount, total, warnings
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id
        "#,
    )
    .bind(invoice_id)
    .bind(position)
    .bind(line.contract_id)
    .bind(line.care_type)
    .bind(line.start_date)
    .bind(line.end_date)
    .bind(line.price)
    .bind(line.price_time_unit)
    .bind(line.vat)
    .bind(line.pre_vat_total)
    .bind(line.vat_amount)
    .bind(line.total)
    .bind(&line.warnings)
    .fetch_one(&mut *conn)
    .await?;

    for period in &line.periods {
        sqlx::query(
            r#"
            INSERT INTO invoice_line_periods (
                invoice_line_id, start_date, end_date, accommodation_time_frame,
                ambulante_total_minutes, pre_vat_total, vat_amount, total
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(line_id)
        .bind(period.start_date)
        .bind(period.end_date)
        .bind(&period.accommodation_time_frame)
        .bind(period.ambulante_total_minutes)
        .bind(period.pre_vat_total)
        .bind(period.vat_amount)
        .bind(period.total)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// ============================================================================
// Statements shared by pool reads and payment transactions
// ============================================================================

/// Locks an invoice row until the surrounding transaction ends
pub async fn lock_invoice<'e, E>(executor: E, invoice_id: i64) -> Result<InvoiceBalanceRow, DatabaseError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, InvoiceBalanceRow>(
        "SELECT id, total_amount, status FROM invoices WHERE id = $1 FOR UPDATE",
    )
    .bind(invoice_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found("Invoice", invoice_id))
}

/// Sum of an invoice's completed payments
pub async fn completed_payment_total<'e, E>(executor: E, invoice_id: i64) -> Result<Decimal, DatabaseError>
where
    E: PgExecutor<'e>,
{
    let total: Decimal = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM payments
        WHERE invoice_id = $1 AND payment_status = 'completed'
        "#,
    )
    .bind(invoice_id)
    .fetch_one(executor)
    .await?;

    Ok(total)
}

pub async fn get_payment<'e, E>(executor: E, payment_id: i64) -> Result<PaymentRow, DatabaseError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {} FROM payments WHERE id = $1",
        PAYMENT_COLUMNS
    ))
    .bind(payment_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found("Payment", payment_id))
}

pub async fn insert_payment<'e, E>(executor: E, payment: &NewPaymentRecord) -> Result<PaymentRow, DatabaseError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        r#"
        INSERT INTO payments (
            invoice_id, amount, payment_status, payment_method, payment_date,
            payment_reference, notes, recorded_by
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    ))
    .bind(payment.invoice_id)
    .bind(payment.amount)
    .bind(payment.payment_status)
    .bind(payment.payment_method)
    .bind(payment.payment_date)
    .bind(&payment.payment_reference)
    .bind(&payment.notes)
    .bind(payment.recorded_by)
    .fetch_one(executor)
    .await?;

    Ok(row)
}

/// Overwrites the mutable columns of a payment
pub async fn update_payment<'e, E>(executor: E, payment: &PaymentRow) -> Result<PaymentRow, DatabaseError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PaymentRow>(&format!(
        r#"
        UPDATE payments SET
            amount = $2,
            payment_status = $3,
            payment_method = $4,
            payment_date = $5,
            payment_reference = $6,
            notes = $7,
            recorded_by = $8,
            updated_at = $9
        WHERE id = $1
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    ))
    .bind(payment.id)
    .bind(payment.amount)
    .bind(payment.payment_status)
    .bind(payment.payment_method)
    .bind(payment.payment_date)
    .bind(&payment.payment_reference)
    .bind(&payment.notes)
    .bind(payment.recorded_by)
    .bind(payment.updated_at)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found("Payment", payment.id))
}

pub async fn delete_payment<'e, E>(executor: E, payment_id: i64) -> Result<(), DatabaseError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM payments WHERE id = $1")
        .bind(payment_id)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("Payment", payment_id));
    }
    Ok(())
}

pub async fn set_invoice_status<'e, E>(
    executor: E,
    invoice_id: i64,
    status: InvoiceStatus,
) -> Result<(), DatabaseError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("UPDATE invoices SET status = $2, updated_at = now() WHERE id = $1")
        .bind(invoice_id)
        .bind(status)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("Invoice", invoice_id));
    }
    Ok(())
}

pub async fn insert_audit_entry<'e, E>(executor: E, entry: &NewAuditRecord) -> Result<(), DatabaseError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO payment_audit_log (
            invoice_id, payment_id, action, employee_id, old_values, new_values
        ) VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.invoice_id)
    .bind(entry.payment_id)
    .bind(entry.action)
    .bind(entry.employee_id)
    .bind(&entry.old_values)
    .bind(&entry.new_values)
    .execute(executor)
    .await?;

    Ok(())
}

// ============================================================================
// Database types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
pub enum InvoiceStatus {
    Outstanding,
    PartiallyPaid,
    Paid,
    Overpaid,
    Expired,
    Imported,
    Concept,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "invoice_type", rename_all = "snake_case")]
pub enum InvoiceType {
    Standard,
    CreditNote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Pending,
    Failed,
    Reversed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    CreditCard,
    Check,
    Cash,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "payment_audit_action", rename_all = "snake_case")]
pub enum PaymentAuditAction {
    Created,
    Updated,
    Deleted,
}

/// Database row for an invoice header
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: i64,
    pub client_id: i64,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: InvoiceStatus,
    pub invoice_type: InvoiceType,
    pub credited_invoice_id: Option<i64>,
    pub issued_by: Option<i64>,
    pub pre_vat_total: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    pub warning_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for an invoice line
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceLineRow {
    pub id: i64,
    pub invoice_id: i64,
    pub position: i32,
    pub contract_id: i64,
    pub care_type: CareType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: Decimal,
    pub price_time_unit: PriceTimeUnit,
    pub vat: i32,
    pub pre_vat_total: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
    pub warnings: serde_json::Value,
}

/// Database row for one billed period of an invoice line
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceLinePeriodRow {
    pub id: i64,
    pub invoice_line_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub accommodation_time_frame: Option<String>,
    pub ambulante_total_minutes: Option<i64>,
    pub pre_vat_total: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

/// An invoice header with its lines and their periods
#[derive(Debug, Clone)]
pub struct InvoiceWithLines {
    pub invoice: InvoiceRow,
    pub lines: Vec<InvoiceLineRow>,
    pub periods: Vec<InvoiceLinePeriodRow>,
}

/// The columns payment reconciliation needs, read under the row lock
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceBalanceRow {
    pub id: i64,
    pub total_amount: Decimal,
    pub status: InvoiceStatus,
}

/// Database row for a payment
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: i64,
    pub invoice_id: i64,
    pub amount: Decimal,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_date: NaiveDate,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for storing a new invoice or credit note
#[derive(Debug, Clone)]
pub struct NewInvoiceRecord {
    pub client_id: i64,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub invoice_type: InvoiceType,
    pub credited_invoice_id: Option<i64>,
    pub issued_by: Option<i64>,
    pub pre_vat_total: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    pub warning_count: i32,
    pub lines: Vec<NewInvoiceLine>,
}

#[derive(Debug, Clone)]
pub struct NewInvoiceLine {
    pub contract_id: i64,
    pub care_type: CareType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: Decimal,
    pub price_time_unit: PriceTimeUnit,
    pub vat: i32,
    pub pre_vat_total: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
    pub warnings: serde_json::Value,
    pub periods: Vec<NewInvoiceLinePeriod>,
}

#[derive(Debug, Clone)]
pub struct NewInvoiceLinePeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub accommodation_time_frame: Option<String>,
    pub ambulante_total_minutes: Option<i64>,
    pub pre_vat_total: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

/// Data for inserting a payment
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub invoice_id: i64,
    pub amount: Decimal,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_date: NaiveDate,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: i64,
}

/// Data for one payment audit log row
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub invoice_id: i64,
    pub payment_id: i64,
    pub action: PaymentAuditAction,
    pub employee_id: i64,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
}
