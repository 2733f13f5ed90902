//! Infrastructure Database Layer
//!
//! This crate provides the PostgreSQL persistence for care billing using SQLx:
//! contracts and appointments are read from the care tables, invoices and
//! payments are written to the billing tables.
//!
//! # Architecture
//!
//! The crate follows the repository pattern. Repositories own the SQL and
//! return row types; adapters translate rows to `domain_billing` types and
//! implement its ports.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresBillingAdapter};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/care_billing")).await?;
//! run_migrations(&pool).await?;
//! let adapter = PostgresBillingAdapter::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, create_pool_from_url, run_migrations, DatabaseConfig};
pub use error::{DatabaseError, db_to_port_error};
pub use adapters::{PostgresBillingAdapter, PgPaymentTransaction};
