//! Per-contract billing warnings
//!
//! A contract that cannot be billed does not fail the invoice; it leaves a
//! warning behind instead.

use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::ContractId;

use crate::calculation::CalculationError;

/// What went wrong while billing a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The charge could not be computed from the contract terms
    CalculationFailed,
    /// An upstream lookup (appointments, billing history) failed
    DataUnavailable,
    /// Nothing to bill in a period, e.g. no appointments
    MissingData,
    /// The contract produced more than one billable period
    MultiplePeriods,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::CalculationFailed => "calculation_failed",
            WarningKind::DataUnavailable => "data_unavailable",
            WarningKind::MissingData => "missing_data",
            WarningKind::MultiplePeriods => "multiple_periods",
        }
    }
}

/// A structured, non-fatal problem found while billing one contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractWarning {
    pub contract_id: ContractId,
    pub kind: WarningKind,
    pub message: String,
}

impl ContractWarning {
    pub fn new(contract_id: ContractId, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            contract_id,
            kind,
            message: message.into(),
        }
    }

    pub fn calculation(contract_id: ContractId, error: &CalculationError) -> Self {
        Self::new(contract_id, WarningKind::CalculationFailed, error.to_string())
    }

    pub fn data_unavailable(contract_id: ContractId, message: impl Into<String>) -> Self {
        Self::new(contract_id, WarningKind::DataUnavailable, message)
    }

    pub fn missing_data(contract_id: ContractId, message: impl Into<String>) -> Self {
        Self::new(contract_id, WarningKind::MissingData, message)
    }

    /// Whether the warning means part of the contract went unbilled
    pub fn is_failure(&self) -> bool {
        !matches!(self.kind, WarningKind::MultiplePeriods)
    }
}

impl fmt::Display for ContractWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.contract_id, self.kind.as_str(), self.message)
    }
}
