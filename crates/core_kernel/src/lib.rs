//! Core Kernel - Foundational types and utilities for the care billing system
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money types with precise decimal arithmetic
//! - Calendar ranges for contract and billing periods
//! - Common identifiers and value objects
//! - Port infrastructure shared by all adapters

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;

pub use money::{Money, VatRate, MoneyError};
pub use temporal::{DateRange, HalfOpenRange, Timezone, TemporalError};
pub use identifiers::{
    ClientId, ContractId, InvoiceId, InvoiceLineId, PaymentId,
    EmployeeId, AppointmentId, IdParseError,
};
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult,
    AdapterHealth, OperationMetadata,
};
