//! Billing domain errors

use core_kernel::{PortError, TemporalError};
use thiserror::Error;

use crate::calculation::CalculationError;

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Bad input from the caller
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// A single contract's charge could not be computed
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// A broken invariant inside the billing core
    #[error("Internal error: {0}")]
    Internal(String),

    /// The request raced another write and lost
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Begin, commit or rollback of a payment transaction failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The backing store failed for a reason other than a missing row
    #[error("Storage error: {0}")]
    Storage(#[source] PortError),
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        BillingError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        BillingError::Internal(message.into())
    }

    /// Returns true if the caller sent something it can fix
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BillingError::Validation(_) | BillingError::NotFound { .. } | BillingError::Conflict(_)
        )
    }
}

impl From<PortError> for BillingError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity_type, id } => BillingError::NotFound {
                entity: entity_type,
                id,
            },
            PortError::Validation { message, .. } => BillingError::Validation(message),
            PortError::Conflict { message } => BillingError::Conflict(message),
            other => BillingError::Storage(other),
        }
    }
}

impl From<TemporalError> for BillingError {
    fn from(error: TemporalError) -> Self {
        BillingError::Validation(error.to_string())
    }
}
