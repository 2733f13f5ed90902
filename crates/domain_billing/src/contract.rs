//! Care contracts as seen by billing
//!
//! A contract fixes the rate a client is charged for one kind of care.
//! Billing only reads contracts; creating and amending them happens
//! elsewhere.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{ClientId, ContractId, Money, VatRate};

/// How a contract's care is delivered, which decides how it is charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareType {
    /// Residential care, billed by elapsed time
    Accommodation,
    /// Visiting care, billed by appointment duration
    Ambulante,
}

impl CareType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CareType::Accommodation => "accommodation",
            CareType::Ambulante => "ambulante",
        }
    }
}

impl fmt::Display for CareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CareType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accommodation" => Ok(CareType::Accommodation),
            "ambulante" => Ok(CareType::Ambulante),
            other => Err(format!("unknown care type: {}", other)),
        }
    }
}

/// The time unit a contract price is quoted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTimeUnit {
    Minute,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl PriceTimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTimeUnit::Minute => "minute",
            PriceTimeUnit::Hourly => "hourly",
            PriceTimeUnit::Daily => "daily",
            PriceTimeUnit::Weekly => "weekly",
            PriceTimeUnit::Monthly => "monthly",
        }
    }
}

impl fmt::Display for PriceTimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceTimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minute" => Ok(PriceTimeUnit::Minute),
            "hourly" => Ok(PriceTimeUnit::Hourly),
            "daily" => Ok(PriceTimeUnit::Daily),
            "weekly" => Ok(PriceTimeUnit::Weekly),
            "monthly" => Ok(PriceTimeUnit::Monthly),
            other => Err(format!("unknown price time unit: {}", other)),
        }
    }
}

/// Period the contracted `hours` refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoursType {
    Weekly,
    AllPeriod,
}

/// The pricing terms the calculator needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateTerms {
    pub price: Money,
    pub unit: PriceTimeUnit,
    pub vat: VatRate,
}

/// A client's care agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub client_id: ClientId,
    pub care_type: CareType,
    /// Rate per `price_time_unit`
    pub price: Money,
    pub price_time_unit: PriceTimeUnit,
    pub vat: VatRate,
    pub start_date: NaiveDate,
    /// Last day of care, inclusive; `None` for open-ended contracts
    pub end_date: Option<NaiveDate>,
    /// Contracted hours; informational only
    pub hours: Option<Decimal>,
    pub hours_type: Option<HoursType>,
}

impl Contract {
    pub fn rate_terms(&self) -> RateTerms {
        RateTerms {
            price: self.price,
            unit: self.price_time_unit,
            vat: self.vat,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.end_date.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_care_type_round_trip() {
        for care_type in [CareType::Accommodation, CareType::Ambulante] {
            assert_eq!(care_type.as_str().parse::<CareType>().unwrap(), care_type);
        }
        assert!("residential".parse::<CareType>().is_err());
    }

    #[test]
    fn test_price_time_unit_serde_matches_as_str() {
        let json = serde_json::to_string(&PriceTimeUnit::Hourly).unwrap();
        assert_eq!(json, "\"hourly\"");
        assert_eq!("weekly".parse::<PriceTimeUnit>().unwrap(), PriceTimeUnit::Weekly);
    }
}
