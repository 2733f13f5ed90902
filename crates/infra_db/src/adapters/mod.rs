//! Domain Adapters
//!
//! This module provides adapter implementations for domain ports,
//! connecting the billing domain to the PostgreSQL database layer.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillingAdapter;
//! use domain_billing::InvoiceStore;
//!
//! let adapter = PostgresBillingAdapter::new(pool);
//! let invoice = adapter.get_invoice(invoice_id, None).await?;
//! ```

pub mod billing;

pub use billing::{PgPaymentTransaction, PostgresBillingAdapter};
