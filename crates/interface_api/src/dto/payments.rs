//! Payment DTOs

use chrono::{DateTime, NaiveDate, Utc};
use core_kernel::Money;
use domain_billing::{
    InvoiceStatus, NewPayment, Payment, PaymentChanges, PaymentDeletionResult, PaymentMethod,
    PaymentMutationResult, PaymentStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::non_negative;

fn default_status() -> PaymentStatus {
    PaymentStatus::Completed
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    #[validate(custom(function = "non_negative"))]
    pub amount: Decimal,
    #[serde(default = "default_status")]
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_date: NaiveDate,
    #[validate(length(max = 255))]
    pub payment_reference: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl From<CreatePaymentRequest> for NewPayment {
    fn from(req: CreatePaymentRequest) -> Self {
        NewPayment {
            amount: Money::new(req.amount),
            payment_status: req.payment_status,
            payment_method: req.payment_method,
            payment_date: req.payment_date,
            payment_reference: req.payment_reference,
            notes: req.notes,
        }
    }
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePaymentRequest {
    #[validate(custom(function = "non_negative"))]
    pub amount: Option<Decimal>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_date: Option<NaiveDate>,
    #[validate(length(max = 255))]
    pub payment_reference: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl From<UpdatePaymentRequest> for PaymentChanges {
    fn from(req: UpdatePaymentRequest) -> Self {
        PaymentChanges {
            amount: req.amount.map(Money::new),
            payment_status: req.payment_status,
            payment_method: req.payment_method,
            payment_date: req.payment_date,
            payment_reference: req.payment_reference,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
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

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id.value(),
            invoice_id: p.invoice_id.value(),
            amount: p.amount.amount(),
            payment_status: p.payment_status,
            payment_method: p.payment_method,
            payment_date: p.payment_date,
            payment_reference: p.payment_reference,
            notes: p.notes,
            recorded_by: p.recorded_by.value(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentMutationResponse {
    pub payment: PaymentResponse,
    pub invoice_status_changed: bool,
    pub previous_invoice_status: InvoiceStatus,
    pub current_invoice_status: InvoiceStatus,
}

impl From<PaymentMutationResult> for PaymentMutationResponse {
    fn from(r: PaymentMutationResult) -> Self {
        Self {
            payment: r.payment.into(),
            invoice_status_changed: r.invoice_status_changed,
            previous_invoice_status: r.previous_invoice_status,
            current_invoice_status: r.current_invoice_status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentDeletionResponse {
    pub deleted_payment_id: i64,
    pub invoice_id: i64,
    pub deleted_amount: Decimal,
    pub deleted_payment_status: PaymentStatus,
    pub invoice_status_changed: bool,
    pub previous_invoice_status: InvoiceStatus,
    pub current_invoice_status: InvoiceStatus,
}

impl From<PaymentDeletionResult> for PaymentDeletionResponse {
    fn from(r: PaymentDeletionResult) -> Self {
        Self {
            deleted_payment_id: r.deleted_payment_id.value(),
            invoice_id: r.invoice_id.value(),
            deleted_amount: r.deleted_amount.amount(),
            deleted_payment_status: r.deleted_payment_status,
            invoice_status_changed: r.invoice_status_changed,
            previous_invoice_status: r.previous_invoice_status,
            current_invoice_status: r.current_invoice_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_defaults_to_completed() {
        let req: CreatePaymentRequest =
            serde_json::from_str(r#"{"amount": "100.00", "payment_date": "2024-04-02"}"#).unwrap();
        assert_eq!(req.payment_status, PaymentStatus::Completed);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_negative_amount_fails_validation() {
        let req: CreatePaymentRequest =
            serde_json::from_str(r#"{"amount": "-5", "payment_date": "2024-04-02"}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_update_maps_only_given_fields() {
        let req = UpdatePaymentRequest {
            amount: Some(dec!(12.50)),
            ..Default::default()
        };
        let changes = PaymentChanges::from(req);
        assert_eq!(changes.amount, Some(Money::new(dec!(12.50))));
        assert!(changes.payment_status.is_none());
    }
}
