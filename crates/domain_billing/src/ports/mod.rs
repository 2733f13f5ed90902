//! Billing Domain Ports
//!
//! This module defines what the billing core needs from the outside world.
//! The Postgres adapters in `infra_db` implement every trait here; the
//! in-memory [`mock::InMemoryBillingStore`] implements them for tests.
//!
//! # Transactions
//!
//! Payment mutations run inside a [`PaymentTransaction`] obtained from
//! [`PaymentStore::begin`]. The first call on a transaction must be
//! [`PaymentTransaction::lock_invoice`], which serializes concurrent
//! mutations of the same invoice. Dropping a transaction without calling
//! `commit` discards everything done through it.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut tx = store.begin(None).await?;
//! let invoice = tx.lock_invoice(invoice_id).await?;
//! tx.insert_payment(invoice_id, &new_payment, recorded_by).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{
    ClientId, ContractId, DomainPort, HalfOpenRange, HealthCheckable, InvoiceId, Money,
    OperationMetadata, PaymentId, PortError, EmployeeId,
};

use crate::appointment::Appointment;
use crate::contract::Contract;
use crate::invoice::{Invoice, InvoiceBalance, InvoiceStatus, NewCreditNote, NewInvoice};
use crate::payment::{NewPayment, Payment, PaymentAuditEntry};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Read access to client contracts
#[async_trait]
pub trait ContractPort: DomainPort + HealthCheckable {
    /// Lists all contracts of a client, in any state
    ///
    /// # Arguments
    ///
    /// * `client_id` - The client whose contracts to load
    /// * `metadata` - Optional operation metadata for tracing
    ///
    /// # Returns
    ///
    /// The contracts, possibly empty
    async fn list_client_contracts(
        &self,
        client_id: ClientId,
        metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Contract>, PortError>;
}

/// Read access to the appointment schedule
#[async_trait]
pub trait AppointmentPort: DomainPort + HealthCheckable {
    /// Lists a client's appointments starting in `[from, to)`
    async fn list_client_appointments(
        &self,
        client_id: ClientId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Appointment>, PortError>;
}

/// Which days of a contract earlier invoices already charged for
#[async_trait]
pub trait BillingHistoryPort: DomainPort + HealthCheckable {
    /// Returns the billed periods of a contract, in no particular order
    ///
    /// Periods of canceled invoices and of credit notes are left out, so
    /// crediting an invoice makes its days billable again.
    async fn billed_periods(
        &self,
        contract_id: ContractId,
        metadata: Option<OperationMetadata>,
    ) -> Result<Vec<HalfOpenRange>, PortError>;
}

/// Persistence of issued invoices
#[async_trait]
pub trait InvoiceStore: DomainPort + HealthCheckable {
    /// Stores an invoice with its line items and assigns its number
    ///
    /// The number is `INV-YYYYMMDD-NNNN` where `NNNN` is one more than the
    /// highest sequence already used for the invoice date.
    ///
    /// Concurrent calls are serialized. Before storing, every line period is
    /// checked against the periods already billed for its contract, and a
    /// `PortError::Conflict` is returned if one overlaps.
    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        metadata: Option<OperationMetadata>,
    ) -> Result<Invoice, PortError>;

    /// Stores a credit note and cancels the invoice it credits, atomically
    ///
    /// Returns `PortError::Conflict` if the credited invoice was canceled or
    /// credited after the note was built.
    async fn create_credit_note(
        &self,
        credit_note: NewCreditNote,
        metadata: Option<OperationMetadata>,
    ) -> Result<Invoice, PortError>;

    /// Loads an invoice with its line items
    ///
    /// # Returns
    ///
    /// The invoice if found, or `PortError::NotFound`
    async fn get_invoice(
        &self,
        invoice_id: InvoiceId,
        metadata: Option<OperationMetadata>,
    ) -> Result<Invoice, PortError>;

    /// Sum of the invoice's completed payments
    async fn completed_payment_total(
        &self,
        invoice_id: InvoiceId,
        metadata: Option<OperationMetadata>,
    ) -> Result<Money, PortError>;
}

/// Payment reads and the entry point for payment transactions
#[async_trait]
pub trait PaymentStore: DomainPort + HealthCheckable {
    /// Lists an invoice's payments, oldest payment date first
    async fn list_payments(
        &self,
        invoice_id: InvoiceId,
        metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Payment>, PortError>;

    /// Loads a single payment
    async fn get_payment(
        &self,
        payment_id: PaymentId,
        metadata: Option<OperationMetadata>,
    ) -> Result<Payment, PortError>;

    /// Opens a transaction for a payment mutation
    async fn begin(
        &self,
        metadata: Option<OperationMetadata>,
    ) -> Result<Box<dyn PaymentTransaction>, PortError>;
}

/// One atomic payment mutation together with its invoice status update
#[async_trait]
pub trait PaymentTransaction: Send {
    /// Locks the invoice row until commit or rollback and returns its balance
    async fn lock_invoice(&mut self, invoice_id: InvoiceId) -> Result<InvoiceBalance, PortError>;

    async fn get_payment(&mut self, payment_id: PaymentId) -> Result<Payment, PortError>;

    async fn insert_payment(
        &mut self,
        invoice_id: InvoiceId,
        payment: &NewPayment,
        recorded_by: EmployeeId,
    ) -> Result<Payment, PortError>;

    /// Overwrites every mutable field of the stored payment with `payment`
    async fn update_payment(&mut self, payment: &Payment) -> Result<Payment, PortError>;

    async fn delete_payment(&mut self, payment_id: PaymentId) -> Result<(), PortError>;

    /// Sum of completed payments as seen inside this transaction
    async fn completed_payment_total(&mut self, invoice_id: InvoiceId) -> Result<Money, PortError>;

    async fn set_invoice_status(
        &mut self,
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    ) -> Result<(), PortError>;

    async fn record_audit(&mut self, entry: &PaymentAuditEntry) -> Result<(), PortError>;

    async fn commit(self: Box<Self>) -> Result<(), PortError>;

    async fn rollback(self: Box<Self>) -> Result<(), PortError>;
}
