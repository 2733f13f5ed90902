//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for the billing domain.
//! These fixtures are designed to be consistent and predictable for unit tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{ClientId, ContractId, DateRange, EmployeeId, HalfOpenRange, Money, VatRate};
use rust_decimal_macros::dec;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Standard daily accommodation rate
    pub fn daily_rate() -> Money {
        Money::new(dec!(89.00))
    }

    /// Standard hourly ambulante rate
    pub fn hourly_rate() -> Money {
        Money::new(dec!(60.00))
    }

    pub fn eur_100() -> Money {
        Money::new(dec!(100.00))
    }

    pub fn zero() -> Money {
        Money::zero()
    }
}

/// Fixture for VAT rates
pub struct VatFixtures;

impl VatFixtures {
    /// The standard 21% rate
    pub fn standard() -> VatRate {
        VatRate::from_percentage(21).unwrap()
    }

    /// The reduced 9% rate
    pub fn reduced() -> VatRate {
        VatRate::from_percentage(9).unwrap()
    }

    pub fn exempt() -> VatRate {
        VatRate::exempt()
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Contract start (Jan 1, 2024)
    pub fn contract_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    /// First day of the standard billing window (Mar 1, 2024)
    pub fn window_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    /// Last day of the standard billing window (Mar 28, 2024)
    pub fn window_end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 28).unwrap()
    }

    /// The standard 28 day billing window
    pub fn billing_window() -> DateRange {
        DateRange::new(Self::window_start(), Self::window_end()).unwrap()
    }

    /// The billing window as a half-open range
    pub fn billing_range() -> HalfOpenRange {
        Self::billing_window().to_half_open().unwrap()
    }

    /// Date invoices are issued on
    pub fn invoice_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()
    }

    /// 09:00 UTC on the given day of March 2024
    pub fn march_morning(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }
}

/// Fixture for identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn client_id() -> ClientId {
        ClientId::new(1)
    }

    pub fn contract_id() -> ContractId {
        ContractId::new(1)
    }

    /// The employee recording payments
    pub fn employee_id() -> EmployeeId {
        EmployeeId::new(7)
    }
}
