//! Payments recorded against invoices
//!
//! Payments are entered by staff. Only `Completed` payments count towards
//! an invoice's paid amount.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{EmployeeId, InvoiceId, Money, PaymentId};

use crate::error::BillingError;

/// Payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    CreditCard,
    Check,
    Cash,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Check => "check",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "check" => Ok(PaymentMethod::Check),
            "cash" => Ok(PaymentMethod::Cash),
            "other" => Ok(PaymentMethod::Other),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Money received; counts towards the invoice
    Completed,
    /// Announced but not yet received
    Pending,
    /// Attempted and failed
    Failed,
    /// Taken back by the payer's bank
    Reversed,
    /// Returned to the payer
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Reversed => "reversed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(PaymentStatus::Completed),
            "pending" => Ok(PaymentStatus::Pending),
            "failed" => Ok(PaymentStatus::Failed),
            "reversed" => Ok(PaymentStatus::Reversed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// A payment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_date: NaiveDate,
    /// Bank or cheque reference
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    /// Employee who last recorded or changed the payment
    pub recorded_by: EmployeeId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn belongs_to(&self, invoice_id: InvoiceId) -> bool {
        self.invoice_id == invoice_id
    }

    /// Amount this payment contributes to its invoice's paid total
    pub fn counted_amount(&self) -> Money {
        if self.payment_status.is_completed() {
            self.amount
        } else {
            Money::zero()
        }
    }
}

/// Input for recording a payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub amount: Money,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_date: NaiveDate,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

impl NewPayment {
    /// A completed payment made today with no further details
    pub fn completed(amount: Money) -> Self {
        Self {
            amount,
            payment_status: PaymentStatus::Completed,
            payment_method: None,
            payment_date: Utc::now().date_naive(),
            payment_reference: None,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), BillingError> {
        validate_amount(self.amount)
    }
}

/// Partial update of a payment; `None` leaves a field as it is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentChanges {
    pub amount: Option<Money>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

impl PaymentChanges {
    pub fn validate(&self) -> Result<(), BillingError> {
        match self.amount {
            Some(amount) => validate_amount(amount),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns `payment` with the changes applied
    pub fn apply_to(&self, payment: &Payment, recorded_by: EmployeeId, now: DateTime<Utc>) -> Payment {
        Payment {
            amount: self.amount.unwrap_or(payment.amount),
            payment_status: self.payment_status.unwrap_or(payment.payment_status),
            payment_method: self.payment_method.or(payment.payment_method),
            payment_date: self.payment_date.unwrap_or(payment.payment_date),
            payment_reference: self
                .payment_reference
                .clone()
                .or_else(|| payment.payment_reference.clone()),
            notes: self.notes.clone().or_else(|| payment.notes.clone()),
            recorded_by,
            updated_at: now,
            ..payment.clone()
        }
    }
}

fn validate_amount(amount: Money) -> Result<(), BillingError> {
    if amount.is_negative() {
        return Err(BillingError::validation(format!(
            "payment amount must not be negative, got {}",
            amount
        )));
    }
    Ok(())
}

/// What happened to a payment, for the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAuditAction {
    Created,
    Updated,
    Deleted,
}

impl PaymentAuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentAuditAction::Created => "created",
            PaymentAuditAction::Updated => "updated",
            PaymentAuditAction::Deleted => "deleted",
        }
    }
}

/// Audit record written in the same transaction as the payment mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAuditEntry {
    pub invoice_id: InvoiceId,
    pub payment_id: PaymentId,
    pub action: PaymentAuditAction,
    pub employee_id: EmployeeId,
    pub before: Option<Payment>,
    pub after: Option<Payment>,
}
