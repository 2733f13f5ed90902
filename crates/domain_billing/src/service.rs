//! Invoice issuing and invoice reads

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use core_kernel::{ClientId, EmployeeId, InvoiceId, Money};

use crate::assembler::InvoiceAssembler;
use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceDraft, NewInvoice};
use crate::ports::InvoiceStore;

/// Days between invoice date and due date unless configured otherwise
pub const DEFAULT_DUE_DAYS: i64 = 30;

/// An invoice with what has been paid on it so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub invoice: Invoice,
    /// Sum of completed payments
    pub total_paid: Money,
    /// `total_paid` as a percentage of the invoice total
    pub completion_percentage: Decimal,
}

/// Issues invoices from assembled drafts
#[derive(Clone)]
pub struct InvoiceService {
    assembler: InvoiceAssembler,
    invoices: Arc<dyn InvoiceStore>,
    due_days: i64,
}

impl InvoiceService {
    pub fn new(assembler: InvoiceAssembler, invoices: Arc<dyn InvoiceStore>) -> Self {
        Self {
            assembler,
            invoices,
            due_days: DEFAULT_DUE_DAYS,
        }
    }

    pub fn with_due_days(mut self, due_days: i64) -> Self {
        self.due_days = due_days;
        self
    }

    pub fn due_days(&self) -> i64 {
        self.due_days
    }

    /// Builds a draft without storing anything
    pub async fn generate_draft(
        &self,
        client_id: ClientId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<InvoiceDraft, BillingError> {
        self.assembler.generate_invoice(client_id, start_date, end_date).await
    }

    /// Generates and stores an invoice dated today
    pub async fn issue_invoice(
        &self,
        client_id: ClientId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        issued_by: EmployeeId,
    ) -> Result<Invoice, BillingError> {
        self.issue_invoice_on(client_id, start_date, end_date, issued_by, Utc::now().date_naive())
            .await
    }

    /// Generates and stores an invoice with the given invoice date
    ///
    /// # Errors
    ///
    /// * `Validation` - the draft has no line items
    /// * `Conflict` - another invoice billed some of the same days first
    /// * anything `generate_invoice` returns
    #[instrument(skip(self), fields(client_id = %client_id, issued_by = %issued_by))]
    pub async fn issue_invoice_on(
        &self,
        client_id: ClientId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        issued_by: EmployeeId,
        invoice_date: NaiveDate,
    ) -> Result<Invoice, BillingError> {
        let draft = self.assembler.generate_invoice(client_id, start_date, end_date).await?;
        if !draft.has_line_items() {
            return Err(BillingError::validation(
                "no billable items found for client in the specified date range",
            ));
        }

        let due_date = invoice_date + Duration::days(self.due_days);
        let invoice = self
            .invoices
            .create_invoice(
                NewInvoice {
                    draft,
                    invoice_date,
                    due_date,
                    issued_by,
                },
                None,
            )
            .await?;

        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            total = %invoice.total_amount,
            warnings = invoice.warning_count,
            "invoice issued"
        );
        Ok(invoice)
    }

    /// Issues a credit note dated today for an invoice
    pub async fn credit_invoice(
        &self,
        invoice_id: InvoiceId,
        credited_by: EmployeeId,
    ) -> Result<Invoice, BillingError> {
        self.credit_invoice_on(invoice_id, credited_by, Utc::now().date_naive())
            .await
    }

    /// Issues a credit note withdrawing an invoice and cancels the invoice
    ///
    /// The credit note mirrors the invoice with negated amounts, gets the
    /// next number for `invoice_date` and is due `due_days` later. The days
    /// it covers become billable again.
    ///
    /// # Errors
    ///
    /// * `NotFound` - no such invoice
    /// * `Validation` - the invoice is a credit note or already canceled
    /// * `Conflict` - the invoice was credited concurrently
    #[instrument(skip(self), fields(invoice_id = %invoice_id, credited_by = %credited_by))]
    pub async fn credit_invoice_on(
        &self,
        invoice_id: InvoiceId,
        credited_by: EmployeeId,
        invoice_date: NaiveDate,
    ) -> Result<Invoice, BillingError> {
        let original = self.invoices.get_invoice(invoice_id, None).await?;
        let due_date = invoice_date + Duration::days(self.due_days);
        let credit_note = original.credit_note(invoice_date, due_date, credited_by)?;

        let stored = self.invoices.create_credit_note(credit_note, None).await?;

        info!(
            credit_note_id = %stored.id,
            invoice_number = %stored.invoice_number,
            credited_invoice = %original.invoice_number,
            total = %stored.total_amount,
            "credit note issued"
        );
        Ok(stored)
    }

    /// Loads an invoice with its paid amount and completion percentage
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice_summary(&self, invoice_id: InvoiceId) -> Result<InvoiceSummary, BillingError> {
        let invoice = self.invoices.get_invoice(invoice_id, None).await?;
        let total_paid = self.invoices.completed_payment_total(invoice_id, None).await?;
        let completion_percentage = total_paid.percentage_of(invoice.total_amount);

        Ok(InvoiceSummary {
            invoice,
            total_paid,
            completion_percentage,
        })
    }
}
