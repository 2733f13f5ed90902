//! Billing Domain - Care Billing and Payment Reconciliation
//!
//! This crate turns care contracts and appointments into invoices and keeps
//! each invoice's payment status consistent with the payments recorded
//! against it.
//!
//! # Billing
//!
//! - **Accommodation** contracts are charged for elapsed time in the
//!   billing window at their price per minute, hour, day, week or month
//! - **Ambulante** contracts are charged for the summed duration of the
//!   client's appointments
//!
//! Days already charged on an earlier invoice are never charged again. A
//! contract that cannot be billed produces a warning on the draft instead of
//! failing the whole invoice.
//!
//! # Payments
//!
//! Payments are created, changed and removed through the [`PaymentLedger`].
//! Each mutation runs in a single transaction with its audit record and the
//! resulting invoice status update.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{InvoiceAssembler, PaymentLedger, NewPayment};
//!
//! let draft = assembler.generate_invoice(client_id, start, end).await?;
//!
//! let result = ledger
//!     .create_payment(invoice_id, NewPayment::completed(amount), employee_id)
//!     .await?;
//! assert!(result.invoice_status_changed);
//! ```

pub mod appointment;
pub mod assembler;
pub mod calculation;
pub mod contract;
pub mod error;
pub mod invoice;
pub mod ledger;
pub mod payment;
pub mod period;
pub mod ports;
pub mod reconciliation;
pub mod service;
pub mod warning;

pub use appointment::Appointment;
pub use assembler::InvoiceAssembler;
pub use calculation::{
    calculate_accommodation, calculate_ambulante, AccommodationCharge, AmbulanteCharge,
    CalculationError, ChargeTotals,
};
pub use contract::{CareType, Contract, HoursType, PriceTimeUnit, RateTerms};
pub use error::BillingError;
pub use invoice::{
    Invoice, InvoiceBalance, InvoiceDraft, InvoiceLineItem, InvoiceStatus, InvoiceType,
    LinePeriod, NewCreditNote, NewInvoice,
};
pub use ledger::{PaymentDeletionResult, PaymentLedger, PaymentMutationResult};
pub use payment::{
    NewPayment, Payment, PaymentAuditAction, PaymentAuditEntry, PaymentChanges, PaymentMethod,
    PaymentStatus,
};
pub use period::{contract_coverage, resolve_billable_periods};
pub use ports::{
    AppointmentPort, BillingHistoryPort, ContractPort, InvoiceStore, PaymentStore,
    PaymentTransaction,
};
pub use reconciliation::{
    determine_invoice_status, requires_reconciliation, ReconciliationOutcome, PAYMENT_TOLERANCE,
};
pub use service::{InvoiceService, InvoiceSummary, DEFAULT_DUE_DAYS};
pub use warning::{ContractWarning, WarningKind};

#[cfg(any(test, feature = "mock"))]
pub use ports::mock::InMemoryBillingStore;
