//! Invoice status reconciliation
//!
//! An invoice's payment status is a pure function of its total and the sum
//! of its completed payments. Small differences in either direction, up to
//! [`PAYMENT_TOLERANCE`], still count as paid.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use core_kernel::Money;

use crate::error::BillingError;
use crate::invoice::{InvoiceBalance, InvoiceStatus};
use crate::payment::PaymentStatus;
use crate::ports::PaymentTransaction;

/// Margin within which an invoice counts as paid
pub const PAYMENT_TOLERANCE: Decimal = dec!(50);

/// Derives an invoice's status from its total and the amount paid
///
/// Rules, first match wins:
/// 1. `total_paid <= 50` is `Outstanding`
/// 2. `total_paid - invoice_total < -50` is `PartiallyPaid`
/// 3. a difference within `[-50, 50]` is `Paid`
/// 4. `total_paid - invoice_total > 50` is `Overpaid`
///
/// # Errors
///
/// Returns `BillingError::Internal` if no rule matches, which means the
/// rules above no longer cover every input.
pub fn determine_invoice_status(
    invoice_total: Money,
    total_paid: Money,
) -> Result<InvoiceStatus, BillingError> {
    let paid = total_paid.amount();
    let diff = paid - invoice_total.amount();

    if paid <= PAYMENT_TOLERANCE {
        Ok(InvoiceStatus::Outstanding)
    } else if diff < -PAYMENT_TOLERANCE {
        Ok(InvoiceStatus::PartiallyPaid)
    } else if diff >= -PAYMENT_TOLERANCE && diff <= PAYMENT_TOLERANCE {
        Ok(InvoiceStatus::Paid)
    } else if diff > PAYMENT_TOLERANCE {
        Ok(InvoiceStatus::Overpaid)
    } else {
        error!(
            invoice_total = %invoice_total,
            total_paid = %total_paid,
            "invoice status rules did not match"
        );
        Err(BillingError::internal(format!(
            "no invoice status for total {} and paid {}",
            invoice_total, total_paid
        )))
    }
}

/// Whether a payment mutation can affect its invoice's status
///
/// `before` is the payment's status before the mutation (`None` on create),
/// `after` its status afterwards (`None` on delete).
pub fn requires_reconciliation(before: Option<PaymentStatus>, after: Option<PaymentStatus>) -> bool {
    before.is_some_and(|s| s.is_completed()) || after.is_some_and(|s| s.is_completed())
}

/// Invoice status before and after a payment mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub previous_status: InvoiceStatus,
    pub current_status: InvoiceStatus,
    pub changed: bool,
}

impl ReconciliationOutcome {
    /// Outcome when reconciliation was not needed
    pub fn unchanged(status: InvoiceStatus) -> Self {
        Self {
            previous_status: status,
            current_status: status,
            changed: false,
        }
    }
}

/// Recomputes and stores an invoice's status inside an open payment transaction
///
/// Reads the completed-payment sum through `tx`, so it sees the mutation
/// made earlier in the same transaction. The invoice must already be locked
/// by the caller. The status row is only written when it changes. A
/// canceled invoice keeps its status whatever is paid on it.
pub async fn reconcile_invoice(
    tx: &mut dyn PaymentTransaction,
    invoice: &InvoiceBalance,
) -> Result<ReconciliationOutcome, BillingError> {
    if invoice.status == InvoiceStatus::Canceled {
        debug!(invoice_id = %invoice.invoice_id, "invoice is canceled, status kept");
        return Ok(ReconciliationOutcome::unchanged(invoice.status));
    }

    let total_paid = tx.completed_payment_total(invoice.invoice_id).await?;
    let derived = determine_invoice_status(invoice.total_amount, total_paid)?;

    debug!(
        invoice_id = %invoice.invoice_id,
        total = %invoice.total_amount,
        paid = %total_paid,
        previous = %invoice.status,
        derived = %derived,
        "reconciled invoice status"
    );

    if derived == invoice.status {
        return Ok(ReconciliationOutcome::unchanged(invoice.status));
    }

    tx.set_invoice_status(invoice.invoice_id, derived).await?;
    Ok(ReconciliationOutcome {
        previous_status: invoice.status,
        current_status: derived,
        changed: true,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn tolerance_band_is_respected(
            total_cents in 0i64..=10_000_000,
            paid_cents in 0i64..=10_000_000,
        ) {
            let total = Money::from_cents(total_cents);
            let paid = Money::from_cents(paid_cents);
            let diff = paid.amount() - total.amount();

            let result = determine_invoice_status(total, paid).unwrap();
            let expected = if paid.amount() <= PAYMENT_TOLERANCE {
                InvoiceStatus::Outstanding
            } else if diff < -PAYMENT_TOLERANCE {
                InvoiceStatus::PartiallyPaid
            } else if diff > PAYMENT_TOLERANCE {
                InvoiceStatus::Overpaid
            } else {
                InvoiceStatus::Paid
            };
            prop_assert_eq!(result, expected);
        }

        #[test]
        fn determine_status_is_idempotent(
            total_cents in 0i64..=10_000_000,
            paid_cents in 0i64..=10_000_000,
        ) {
            let total = Money::from_cents(total_cents);
            let paid = Money::from_cents(paid_cents);

            let first = determine_invoice_status(total, paid).unwrap();
            let second = determine_invoice_status(total, paid).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn only_payment_derived_statuses_are_produced(
            total_cents in 0i64..=10_000_000,
            paid_cents in 0i64..=10_000_000,
        ) {
            let status = determine_invoice_status(
                Money::from_cents(total_cents),
                Money::from_cents(paid_cents),
            ).unwrap();
            prop_assert!(status.is_payment_derived());
        }
    }
}
