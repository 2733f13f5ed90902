//! Payment ledger
//!
//! Every payment mutation runs in one transaction together with its audit
//! record and, when the mutation can change the paid amount, the invoice
//! status update. Either all of it is committed or none of it.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use core_kernel::{EmployeeId, InvoiceId, Money, OperationMetadata, PaymentId};

use crate::error::BillingError;
use crate::invoice::{InvoiceBalance, InvoiceStatus};
use crate::payment::{
    NewPayment, Payment, PaymentAuditAction, PaymentAuditEntry, PaymentChanges, PaymentStatus,
};
use crate::ports::{PaymentStore, PaymentTransaction};
use crate::reconciliation::{reconcile_invoice, requires_reconciliation, ReconciliationOutcome};

/// Result of creating or updating a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMutationResult {
    pub payment: Payment,
    pub invoice_status_changed: bool,
    pub previous_invoice_status: InvoiceStatus,
    pub current_invoice_status: InvoiceStatus,
}

impl PaymentMutationResult {
    fn new(payment: Payment, outcome: ReconciliationOutcome) -> Self {
        Self {
            payment,
            invoice_status_changed: outcome.changed,
            previous_invoice_status: outcome.previous_status,
            current_invoice_status: outcome.current_status,
        }
    }
}

/// Result of deleting a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDeletionResult {
    pub deleted_payment_id: PaymentId,
    pub invoice_id: InvoiceId,
    pub deleted_amount: Money,
    pub deleted_payment_status: PaymentStatus,
    pub invoice_status_changed: bool,
    pub previous_invoice_status: InvoiceStatus,
    pub current_invoice_status: InvoiceStatus,
}

/// Records, changes and removes payments while keeping invoice statuses current
#[derive(Clone)]
pub struct PaymentLedger {
    store: Arc<dyn PaymentStore>,
}

impl PaymentLedger {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    /// Lists the payments of an invoice, oldest payment date first
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn list_payments(&self, invoice_id: InvoiceId) -> Result<Vec<Payment>, BillingError> {
        Ok(self.store.list_payments(invoice_id, None).await?)
    }

    /// Loads one payment of an invoice
    ///
    /// # Errors
    ///
    /// * `NotFound` - no such payment
    /// * `Validation` - the payment belongs to another invoice
    #[instrument(skip(self), fields(invoice_id = %invoice_id, payment_id = %payment_id))]
    pub async fn get_payment(
        &self,
        invoice_id: InvoiceId,
        payment_id: PaymentId,
    ) -> Result<Payment, BillingError> {
        let payment = self.store.get_payment(payment_id, None).await?;
        ensure_ownership(&payment, invoice_id)?;
        Ok(payment)
    }

    /// Records a payment against an invoice
    ///
    /// Reconciles the invoice if the payment is completed.
    ///
    /// # Errors
    ///
    /// * `Validation` - negative amount
    /// * `NotFound` - the invoice does not exist
    /// * `Transaction` / `Storage` - the store failed; nothing was written
    #[instrument(skip(self, payment), fields(invoice_id = %invoice_id, recorded_by = %recorded_by))]
    pub async fn create_payment(
        &self,
        invoice_id: InvoiceId,
        payment: NewPayment,
        recorded_by: EmployeeId,
    ) -> Result<PaymentMutationResult, BillingError> {
        payment.validate()?;

        let (mut tx, invoice) = self.begin_locked(invoice_id).await?;
        let result = insert_in(tx.as_mut(), &invoice, &payment, recorded_by).await;
        let result = finish(tx, invoice_id, result).await?;

        info!(
            payment_id = %result.payment.id,
            amount = %result.payment.amount,
            invoice_status = %result.current_invoice_status,
            "payment recorded"
        );
        Ok(result)
    }

    /// Applies changes to a payment
    ///
    /// Reconciles the invoice if the payment was completed before or after
    /// the change.
    ///
    /// # Errors
    ///
    /// * `Validation` - negative amount, or the payment belongs to another invoice
    /// * `NotFound` - the invoice or payment does not exist
    #[instrument(skip(self, changes), fields(invoice_id = %invoice_id, payment_id = %payment_id))]
    pub async fn update_payment(
        &self,
        invoice_id: InvoiceId,
        payment_id: PaymentId,
        changes: PaymentChanges,
        recorded_by: EmployeeId,
    ) -> Result<PaymentMutationResult, BillingError> {
        changes.validate()?;

        let (mut tx, invoice) = self.begin_locked(invoice_id).await?;
        let result = update_in(tx.as_mut(), &invoice, payment_id, &changes, recorded_by).await;
        let result = finish(tx, invoice_id, result).await?;

        info!(
            payment_id = %payment_id,
            invoice_status = %result.current_invoice_status,
            status_changed = result.invoice_status_changed,
            "payment updated"
        );
        Ok(result)
    }

    /// Removes a payment
    ///
    /// Reconciles the invoice if the removed payment was completed.
    ///
    /// # Errors
    ///
    /// * `Validation` - the payment belongs to another invoice
    /// * `NotFound` - the invoice or payment does not exist
    #[instrument(skip(self), fields(invoice_id = %invoice_id, payment_id = %payment_id))]
    pub async fn delete_payment(
        &self,
        invoice_id: InvoiceId,
        payment_id: PaymentId,
        recorded_by: EmployeeId,
    ) -> Result<PaymentDeletionResult, BillingError> {
        let (mut tx, invoice) = self.begin_locked(invoice_id).await?;
        let result = delete_in(tx.as_mut(), &invoice, payment_id, recorded_by).await;
        let result = finish(tx, invoice_id, result).await?;

        info!(
            payment_id = %payment_id,
            amount = %result.deleted_amount,
            invoice_status = %result.current_invoice_status,
            "payment deleted"
        );
        Ok(result)
    }

    /// Opens a transaction and locks the invoice in it
    async fn begin_locked(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<(Box<dyn PaymentTransaction>, InvoiceBalance), BillingError> {
        let metadata = OperationMetadata::with_correlation_id(format!("payment-{}", invoice_id))
            .with_context("invoice_id", invoice_id.to_string());
        let mut tx = self
            .store
            .begin(Some(metadata))
            .await
            .map_err(|e| BillingError::Transaction(format!("could not begin transaction: {}", e)))?;

        match tx.lock_invoice(invoice_id).await {
            Ok(invoice) => Ok((tx, invoice)),
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    error!(
                        invoice_id = %invoice_id,
                        error = %rollback_error,
                        "rollback after failed invoice lock failed"
                    );
                }
                Err(e.into())
            }
        }
    }
}

/// Commits on success, rolls back on failure
async fn finish<T>(
    tx: Box<dyn PaymentTransaction>,
    invoice_id: InvoiceId,
    result: Result<T, BillingError>,
) -> Result<T, BillingError> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| BillingError::Transaction(format!("commit failed: {}", e)))?;
            Ok(value)
        }
        Err(e) => {
            error!(invoice_id = %invoice_id, error = %e, "payment mutation failed, rolling back");
            if let Err(rollback_error) = tx.rollback().await {
                error!(invoice_id = %invoice_id, error = %rollback_error, "rollback failed");
            }
            Err(e)
        }
    }
}

async fn insert_in(
    tx: &mut dyn PaymentTransaction,
    invoice: &InvoiceBalance,
    payment: &NewPayment,
    recorded_by: EmployeeId,
) -> Result<PaymentMutationResult, BillingError> {
    let created = tx.insert_payment(invoice.invoice_id, payment, recorded_by).await?;
    tx.record_audit(&PaymentAuditEntry {
        invoice_id: invoice.invoice_id,
        payment_id: created.id,
        action: PaymentAuditAction::Created,
        employee_id: recorded_by,
        before: None,
        after: Some(created.clone()),
    })
    .await?;

    let outcome = reconcile_if_needed(tx, invoice, None, Some(created.payment_status)).await?;
    Ok(PaymentMutationResult::new(created, outcome))
}

async fn update_in(
    tx: &mut dyn PaymentTransaction,
    invoice: &InvoiceBalance,
    payment_id: PaymentId,
    changes: &PaymentChanges,
    recorded_by: EmployeeId,
) -> Result<PaymentMutationResult, BillingError> {
    let existing = tx.get_payment(payment_id).await?;
    ensure_ownership(&existing, invoice.invoice_id)?;

    let changed = changes.apply_to(&existing, recorded_by, Utc::now());
    let updated = tx.update_payment(&changed).await?;
    tx.record_audit(&PaymentAuditEntry {
        invoice_id: invoice.invoice_id,
        payment_id,
        action: PaymentAuditAction::Updated,
        employee_id: recorded_by,
        before: Some(existing.clone()),
        after: Some(updated.clone()),
    })
    .await?;

    let outcome = reconcile_if_needed(
        tx,
        invoice,
        Some(existing.payment_status),
        Some(updated.payment_status),
    )
    .await?;
    Ok(PaymentMutationResult::new(updated, outcome))
}

async fn delete_in(
    tx: &mut dyn PaymentTransaction,
    invoice: &InvoiceBalance,
    payment_id: PaymentId,
    recorded_by: EmployeeId,
) -> Result<PaymentDeletionResult, BillingError> {
    let existing = tx.get_payment(payment_id).await?;
    ensure_ownership(&existing, invoice.invoice_id)?;

    tx.delete_payment(payment_id).await?;
    tx.record_audit(&PaymentAuditEntry {
        invoice_id: invoice.invoice_id,
        payment_id,
        action: PaymentAuditAction::Deleted,
        employee_id: recorded_by,
        before: Some(existing.clone()),
        after: None,
    })
    .await?;

    let outcome = reconcile_if_needed(tx, invoice, Some(existing.payment_status), None).await?;
    Ok(PaymentDeletionResult {
        deleted_payment_id: payment_id,
        invoice_id: invoice.invoice_id,
        deleted_amount: existing.amount,
        deleted_payment_status: existing.payment_status,
        invoice_status_changed: outcome.changed,
        previous_invoice_status: outcome.previous_status,
        current_invoice_status: outcome.current_status,
    })
}

fn ensure_ownership(payment: &Payment, invoice_id: InvoiceId) -> Result<(), BillingError> {
    if !payment.belongs_to(invoice_id) {
        return Err(BillingError::validation(
            "payment does not belong to specified invoice",
        ));
    }
    Ok(())
}

async fn reconcile_if_needed(
    tx: &mut dyn PaymentTransaction,
    invoice: &InvoiceBalance,
    before: Option<PaymentStatus>,
    after: Option<PaymentStatus>,
) -> Result<ReconciliationOutcome, BillingError> {
    if requires_reconciliation(before, after) {
        reconcile_invoice(tx, invoice).await
    } else {
        Ok(ReconciliationOutcome::unchanged(invoice.status))
    }
}
