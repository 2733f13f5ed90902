//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! care billing test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data for common values
//! - `builders`: Builders for contracts, appointments and payments
//! - `database`: Database test helpers and container management
//! - `assertions`: Custom assertion helpers for billing types
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
