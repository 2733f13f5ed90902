//! Strongly-typed identifiers for domain entities
//!
//! Records are keyed by PostgreSQL `BIGSERIAL` columns. Wrapping the raw
//! `i64` in a newtype per entity prevents passing a contract id where an
//! invoice id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when an identifier string cannot be parsed
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid {kind} identifier: {value}")]
pub struct IdParseError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database key
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the underlying database key
            pub const fn value(&self) -> i64 {
                self.0
            }

            /// Database keys start at 1; zero and negative values never identify a row
            pub const fn is_valid(&self) -> bool {
                self.0 > 0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                raw.parse::<i64>().map(Self).map_err(|_| IdParseError {
                    kind: $prefix,
                    value: s.to_string(),
                })
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

// Care records
define_id!(ClientId, "CLI");
define_id!(ContractId, "CTR");
define_id!(AppointmentId, "APT");
define_id!(EmployeeId, "EMP");

// Billing records
define_id!(InvoiceId, "INV");
define_id!(InvoiceLineId, "INVL");
define_id!(PaymentId, "PAY");
