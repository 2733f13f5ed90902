//! Invoices and invoice drafts
//!
//! A draft is what the assembler produces: line items and warnings, no
//! number and no dates. Issuing a draft turns it into an `Invoice`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{
    ClientId, ContractId, DateRange, EmployeeId, HalfOpenRange, InvoiceId, Money, TemporalError,
    VatRate,
};

use crate::calculation::ChargeTotals;
use crate::error::BillingError;
use crate::contract::{CareType, PriceTimeUnit};
use crate::warning::ContractWarning;

/// Invoice status
///
/// The first four variants follow from the payments received and are
/// maintained by the reconciler. `Expired`, `Imported` and `Concept` are set
/// by administrative processes outside billing. `Canceled` is set when a
/// credit note is issued against the invoice and is never changed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Nothing (or only a negligible amount) has been paid
    Outstanding,
    /// Paid, but short of the total by more than the tolerance
    PartiallyPaid,
    /// Paid within the tolerance of the total
    Paid,
    /// Paid more than the total plus the tolerance
    Overpaid,
    /// Past its due date
    Expired,
    /// Brought in from a previous system
    Imported,
    /// Prepared but not sent
    Concept,
    /// Withdrawn by a credit note
    Canceled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Outstanding => "outstanding",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overpaid => "overpaid",
            InvoiceStatus::Expired => "expired",
            InvoiceStatus::Imported => "imported",
            InvoiceStatus::Concept => "concept",
            InvoiceStatus::Canceled => "canceled",
        }
    }

    /// Whether the status is derived from payments
    pub fn is_payment_derived(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Outstanding
                | InvoiceStatus::PartiallyPaid
                | InvoiceStatus::Paid
                | InvoiceStatus::Overpaid
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outstanding" => Ok(InvoiceStatus::Outstanding),
            "partially_paid" => Ok(InvoiceStatus::PartiallyPaid),
            "paid" => Ok(InvoiceStatus::Paid),
            "overpaid" => Ok(InvoiceStatus::Overpaid),
            "expired" => Ok(InvoiceStatus::Expired),
            "imported" => Ok(InvoiceStatus::Imported),
            "concept" => Ok(InvoiceStatus::Concept),
            "canceled" => Ok(InvoiceStatus::Canceled),
            other => Err(format!("unknown invoice status: {}", other)),
        }
    }
}

/// Whether an invoice charges the client or withdraws an earlier charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Standard,
    CreditNote,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Standard => "standard",
            InvoiceType::CreditNote => "credit_note",
        }
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(InvoiceType::Standard),
            "credit_note" => Ok(InvoiceType::CreditNote),
            other => Err(format!("unknown invoice type: {}", other)),
        }
    }
}

/// One billed period of a line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePeriod {
    /// First billed day
    pub start_date: NaiveDate,
    /// Last billed day, inclusive
    pub end_date: NaiveDate,
    /// Set for accommodation periods
    pub accommodation_time_frame: Option<String>,
    /// Set for ambulante periods
    pub ambulante_total_minutes: Option<i64>,
    #[serde(flatten)]
    pub totals: ChargeTotals,
}

impl LinePeriod {
    /// The billed days as a half-open range
    pub fn billed_range(&self) -> Result<HalfOpenRange, TemporalError> {
        DateRange::new(self.start_date, self.end_date)?.to_half_open()
    }
}

/// The charge for one contract on an invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub contract_id: ContractId,
    pub care_type: CareType,
    /// First day of the earliest period
    pub start_date: NaiveDate,
    /// Last day of the latest period, inclusive
    pub end_date: NaiveDate,
    pub periods: Vec<LinePeriod>,
    pub price: Money,
    pub price_time_unit: PriceTimeUnit,
    pub vat: VatRate,
    #[serde(flatten)]
    pub totals: ChargeTotals,
    pub warnings: Vec<ContractWarning>,
}

impl InvoiceLineItem {
    /// Total minutes over all ambulante periods
    pub fn ambulante_total_minutes(&self) -> Option<i64> {
        let minutes: Vec<i64> = self
            .periods
            .iter()
            .filter_map(|p| p.ambulante_total_minutes)
            .collect();
        (!minutes.is_empty()).then(|| minutes.iter().sum())
    }
}

/// An unpersisted invoice for a client and window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub client_id: ClientId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub line_items: Vec<InvoiceLineItem>,
    pub pre_vat_total: Money,
    pub vat_amount: Money,
    pub total_amount: Money,
    /// Every warning raised while billing, including those of contracts
    /// that produced no line item
    pub warnings: Vec<ContractWarning>,
    pub warning_count: usize,
}

impl InvoiceDraft {
    pub fn new(client_id: ClientId, window: DateRange) -> Self {
        Self {
            client_id,
            start_date: window.start,
            end_date: window.end,
            line_items: Vec::new(),
            pre_vat_total: Money::zero(),
            vat_amount: Money::zero(),
            total_amount: Money::zero(),
            warnings: Vec::new(),
            warning_count: 0,
        }
    }

    /// Adds a line item and updates the totals
    pub fn add_line_item(&mut self, item: InvoiceLineItem) {
        self.line_items.push(item);
        self.recalculate_totals();
    }

    pub fn add_warnings(&mut self, warnings: impl IntoIterator<Item = ContractWarning>) {
        self.warnings.extend(warnings);
        self.warning_count = self.warnings.len();
    }

    pub fn has_line_items(&self) -> bool {
        !self.line_items.is_empty()
    }

    /// Billing window of the draft
    pub fn window(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    fn recalculate_totals(&mut self) {
        let totals: ChargeTotals = self.line_items.iter().map(|item| item.totals).sum();
        self.pre_vat_total = totals.pre_vat_total;
        self.vat_amount = totals.vat_amount;
        self.total_amount = totals.total;
    }
}

/// A draft ready to be stored, with the dates the issuer chose
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub draft: InvoiceDraft,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub issued_by: EmployeeId,
}

/// A credit note ready to be stored
///
/// Built from the invoice it credits by [`Invoice::credit_note`]. Storing it
/// cancels that invoice in the same transaction.
#[derive(Debug, Clone)]
pub struct NewCreditNote {
    pub credited_invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Line items of the credited invoice with negated amounts
    pub line_items: Vec<InvoiceLineItem>,
    pub pre_vat_total: Money,
    pub vat_amount: Money,
    pub total_amount: Money,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub issued_by: EmployeeId,
}

/// A persisted invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub client_id: ClientId,
    /// Human readable number, `INV-YYYYMMDD-NNNN`
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub invoice_type: InvoiceType,
    pub status: InvoiceStatus,
    /// First day of the billing window
    pub period_start: NaiveDate,
    /// Last day of the billing window, inclusive
    pub period_end: NaiveDate,
    /// For a credit note, the invoice it withdraws
    pub credited_invoice_id: Option<InvoiceId>,
    /// Unset for invoices brought in from elsewhere
    pub issued_by: Option<EmployeeId>,
    pub line_items: Vec<InvoiceLineItem>,
    pub pre_vat_total: Money,
    pub vat_amount: Money,
    pub total_amount: Money,
    pub warning_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        today > self.due_date
            && matches!(
                self.status,
                InvoiceStatus::Outstanding | InvoiceStatus::PartiallyPaid
            )
    }

    /// Whether the days on this invoice count as billed
    pub fn bills_its_periods(&self) -> bool {
        self.invoice_type == InvoiceType::Standard && self.status != InvoiceStatus::Canceled
    }

    /// Builds the credit note withdrawing this invoice
    ///
    /// Prices and totals of every line item and period are negated; periods
    /// and dates are kept. Warnings are dropped.
    ///
    /// # Errors
    ///
    /// * `Validation` - this is a credit note itself, or already canceled
    pub fn credit_note(
        &self,
        invoice_date: NaiveDate,
        due_date: NaiveDate,
        issued_by: EmployeeId,
    ) -> Result<NewCreditNote, BillingError> {
        if self.invoice_type == InvoiceType::CreditNote {
            return Err(BillingError::validation("cannot credit a credit note"));
        }
        if self.status == InvoiceStatus::Canceled {
            return Err(BillingError::validation(format!(
                "invoice {} is already canceled",
                self.invoice_number
            )));
        }

        let line_items = self
            .line_items
            .iter()
            .map(|item| InvoiceLineItem {
                periods: item
                    .periods
                    .iter()
                    .map(|p| LinePeriod {
                        totals: -p.totals,
                        ..p.clone()
                    })
                    .collect(),
                price: -item.price,
                totals: -item.totals,
                warnings: Vec::new(),
                ..item.clone()
            })
            .collect();

        Ok(NewCreditNote {
            credited_invoice_id: self.id,
            client_id: self.client_id,
            period_start: self.period_start,
            period_end: self.period_end,
            line_items,
            pre_vat_total: -self.pre_vat_total,
            vat_amount: -self.vat_amount,
            total_amount: -self.total_amount,
            invoice_date,
            due_date,
            issued_by,
        })
    }
}

/// The part of an invoice that payment reconciliation reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceBalance {
    pub invoice_id: InvoiceId,
    pub total_amount: Money,
    pub status: InvoiceStatus,
}

/// Formats an invoice number from the issue date and the day's sequence
pub fn format_invoice_number(invoice_date: NaiveDate, sequence: u32) -> String {
    format!("INV-{}-{:04}", invoice_date.format("%Y%m%d"), sequence)
}

/// Extracts the day sequence from a number produced by `format_invoice_number`
pub fn parse_invoice_sequence(invoice_number: &str) -> Option<u32> {
    invoice_number.rsplit('-').next()?.parse().ok()
}
