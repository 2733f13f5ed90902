//! Repository implementations
//!
//! Repositories encapsulate SQL queries and map result sets onto row types.
//! Statements that must run inside a caller's transaction are free functions
//! generic over the executor.

pub mod care;
pub mod billing;

pub use care::CareRepository;
pub use billing::BillingRepository;
