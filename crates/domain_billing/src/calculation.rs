//! Contract charge calculation
//!
//! Pure functions turning a contract's rate terms plus either a billable
//! period (accommodation) or a number of minutes (ambulante) into a charge.
//! The same inputs always give the same charge; nothing here performs I/O.
//!
//! # Rounding
//!
//! The pre-VAT amount is rounded to cents first. VAT is computed on the
//! rounded amount and rounded to cents, and the total is their sum, so
//! `pre_vat_total + vat_amount == total` holds exactly on every line.

use chrono::{Datelike, Duration, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Neg};
use thiserror::Error;

use core_kernel::{HalfOpenRange, Money, VatRate};

use crate::contract::{CareType, PriceTimeUnit, RateTerms};

const MINUTES_PER_HOUR: i64 = 60;
const HOURS_PER_DAY: i64 = 24;
const DAYS_PER_WEEK: i64 = 7;

/// Reasons a single charge cannot be computed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalculationError {
    #[error("billable period {0} is empty")]
    EmptyPeriod(String),

    #[error("price must be positive, got {0}")]
    NonPositivePrice(Money),

    #[error("total minutes must be positive, got {0}")]
    NonPositiveMinutes(i64),

    #[error("price time unit '{unit}' is not supported for {care_type} care")]
    UnsupportedUnit {
        care_type: CareType,
        unit: PriceTimeUnit,
    },

    #[error("date arithmetic overflowed near {0}")]
    DateOverflow(NaiveDate),
}

/// Money amounts of a charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChargeTotals {
    pub pre_vat_total: Money,
    pub vat_amount: Money,
    pub total: Money,
}

impl ChargeTotals {
    /// Rounds `pre_vat` to cents and adds VAT on top
    pub fn from_pre_vat(pre_vat: Money, vat: VatRate) -> Self {
        let pre_vat_total = pre_vat.round_to_cents();
        let vat_amount = vat.apply(&pre_vat_total).round_to_cents();
        Self {
            pre_vat_total,
            vat_amount,
            total: pre_vat_total + vat_amount,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

impl Neg for ChargeTotals {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            pre_vat_total: -self.pre_vat_total,
            vat_amount: -self.vat_amount,
            total: -self.total,
        }
    }
}

impl Add for ChargeTotals {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            pre_vat_total: self.pre_vat_total + other.pre_vat_total,
            vat_amount: self.vat_amount + other.vat_amount,
            total: self.total + other.total,
        }
    }
}

impl std::iter::Sum for ChargeTotals {
    fn sum<I: Iterator<Item = ChargeTotals>>(iter: I) -> Self {
        iter.fold(ChargeTotals::zero(), Add::add)
    }
}

/// Charge for one accommodation period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccommodationCharge {
    pub totals: ChargeTotals,
    /// Human readable span, e.g. "4 weeks" or "12 days"
    pub time_frame: String,
}

/// Charge for the appointments of one ambulante period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbulanteCharge {
    pub totals: ChargeTotals,
    pub total_minutes: i64,
}

/// Computes the charge for an accommodation contract over `[start, end)`
///
/// # Arguments
///
/// * `terms` - Price, time unit and VAT of the contract
/// * `period` - The billable period, end exclusive
///
/// # Errors
///
/// Returns `CalculationError` if the period is empty or the price is not positive
pub fn calculate_accommodation(
    terms: &RateTerms,
    period: &HalfOpenRange,
) -> Result<AccommodationCharge, CalculationError> {
    ensure_positive_price(terms)?;

    let days = period.days();
    if days <= 0 {
        return Err(CalculationError::EmptyPeriod(period.to_string()));
    }

    let price = terms.price.amount();
    let (pre_vat, time_frame) = match terms.unit {
        PriceTimeUnit::Daily => (price * Decimal::from(days), plural(days, "day")),
        PriceTimeUnit::Weekly => {
            let weeks = days / DAYS_PER_WEEK;
            let rest = days % DAYS_PER_WEEK;
            let label = match (weeks, rest) {
                (_, 0) => plural(weeks, "week"),
                (0, _) => plural(rest, "day"),
                _ => format!("{}, {}", plural(weeks, "week"), plural(rest, "day")),
            };
            (price * Decimal::from(days) / Decimal::from(DAYS_PER_WEEK), label)
        }
        PriceTimeUnit::Monthly => monthly_charge(price, period)?,
        PriceTimeUnit::Hourly => {
            let hours = days * HOURS_PER_DAY;
            (price * Decimal::from(hours), plural(hours, "hour"))
        }
        PriceTimeUnit::Minute => {
            let minutes = days * HOURS_PER_DAY * MINUTES_PER_HOUR;
            (price * Decimal::from(minutes), plural(minutes, "minute"))
        }
    };

    Ok(AccommodationCharge {
        totals: ChargeTotals::from_pre_vat(Money::new(pre_vat), terms.vat),
        time_frame,
    })
}

/// Computes the charge for an ambulante contract from summed appointment minutes
///
/// Only `minute` and `hourly` prices make sense for visit-based care.
///
/// # Errors
///
/// Returns `CalculationError` on non-positive minutes or price, or an
/// unsupported time unit
pub fn calculate_ambulante(
    terms: &RateTerms,
    total_minutes: i64,
) -> Result<AmbulanteCharge, CalculationError> {
    ensure_positive_price(terms)?;
    if total_minutes <= 0 {
        return Err(CalculationError::NonPositiveMinutes(total_minutes));
    }

    let price = terms.price.amount();
    let minutes = Decimal::from(total_minutes);
    let pre_vat = match terms.unit {
        PriceTimeUnit::Minute => price * minutes,
        PriceTimeUnit::Hourly => price * minutes / Decimal::from(MINUTES_PER_HOUR),
        unit @ (PriceTimeUnit::Daily | PriceTimeUnit::Weekly | PriceTimeUnit::Monthly) => {
            return Err(CalculationError::UnsupportedUnit {
                care_type: CareType::Ambulante,
                unit,
            });
        }
    };

    Ok(AmbulanteCharge {
        totals: ChargeTotals::from_pre_vat(Money::new(pre_vat), terms.vat),
        total_minutes,
    })
}

fn ensure_positive_price(terms: &RateTerms) -> Result<(), CalculationError> {
    if terms.price.is_positive() {
        Ok(())
    } else {
        Err(CalculationError::NonPositivePrice(terms.price))
    }
}

/// Each day costs `price / days in its calendar month`
fn monthly_charge(price: Decimal, period: &HalfOpenRange) -> Result<(Decimal, String), CalculationError> {
    let mut amount = Decimal::ZERO;
    let mut whole_months = 0i64;
    let mut cursor = period.start;

    while cursor < period.end {
        let month_start = cursor - Duration::days(i64::from(cursor.day0()));
        let next_month = month_start
            .checked_add_months(Months::new(1))
            .ok_or(CalculationError::DateOverflow(month_start))?;
        let days_in_month = (next_month - month_start).num_days();
        let piece_end = next_month.min(period.end);
        let piece_days = (piece_end - cursor).num_days();

        if piece_days == days_in_month {
            whole_months += 1;
            amount += price;
        } else {
            amount += price * Decimal::from(piece_days) / Decimal::from(days_in_month);
        }
        cursor = piece_end;
    }

    let covers_whole_months = period.start.day() == 1 && period.end.day() == 1;
    let label = if covers_whole_months {
        plural(whole_months, "month")
    } else {
        plural(period.days(), "day")
    };
    Ok((amount, label))
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn terms(price: Decimal, unit: PriceTimeUnit, vat: i32) -> RateTerms {
        RateTerms {
            price: Money::new(price),
            unit,
            vat: VatRate::from_percentage(vat).unwrap(),
        }
    }

    fn period(start: NaiveDate, end: NaiveDate) -> HalfOpenRange {
        HalfOpenRange::new(start, end).unwrap()
    }

    #[test]
    fn test_daily_accommodation_28_days() {
        let charge = calculate_accommodation(
            &terms(dec!(89), PriceTimeUnit::Daily, 20),
            &period(d(2024, 3, 1), d(2024, 3, 29)),
        )
        .unwrap();

        assert_eq!(charge.totals.pre_vat_total.amount(), dec!(2492));
        assert_eq!(charge.totals.vat_amount.amount(), dec!(498.40));
        assert_eq!(charge.totals.total.amount(), dec!(2990.40));
        assert_eq!(charge.time_frame, "28 days");
    }

    #[test]
    fn test_weekly_accommodation_prorates_per_day() {
        let charge = calculate_accommodation(
            &terms(dec!(700), PriceTimeUnit::Weekly, 0),
            &period(d(2024, 3, 1), d(2024, 3, 11)),
        )
        .unwrap();

        assert_eq!(charge.totals.pre_vat_total.amount(), dec!(1000));
        assert_eq!(charge.time_frame, "1 week, 3 days");
    }

    #[test]
    fn test_weekly_accommodation_under_a_week_counts_days() {
        let charge = calculate_accommodation(
            &terms(dec!(700), PriceTimeUnit::Weekly, 0),
            &period(d(2024, 3, 1), d(2024, 3, 4)),
        )
        .unwrap();

        assert_eq!(charge.totals.pre_vat_total.amount(), dec!(300));
        assert_eq!(charge.time_frame, "3 days");
    }

    #[test]
    fn test_monthly_accommodation_full_month_costs_price() {
        let charge = calculate_accommodation(
            &terms(dec!(3100), PriceTimeUnit::Monthly, 0),
            &period(d(2024, 2, 1), d(2024, 3, 1)),
        )
        .unwrap();

        assert_eq!(charge.totals.pre_vat_total.amount(), dec!(3100));
        assert_eq!(charge.time_frame, "1 month");
    }

    #[test]
    fn test_monthly_accommodation_partial_months() {
        // 10 days of a 31-day month and 15 days of a 30-day month
        let charge = calculate_accommodation(
            &terms(dec!(3100), PriceTimeUnit::Monthly, 0),
            &period(d(2024, 3, 22), d(2024, 4, 16)),
        )
        .unwrap();

        assert_eq!(charge.totals.pre_vat_total.amount(), dec!(2550));
        assert_eq!(charge.time_frame, "25 days");
    }

    #[test]
    fn test_accommodation_rejects_empty_period() {
        let empty = HalfOpenRange { start: d(2024, 1, 5), end: d(2024, 1, 5) };
        let result = calculate_accommodation(&terms(dec!(89), PriceTimeUnit::Daily, 0), &empty);
        assert!(matches!(result, Err(CalculationError::EmptyPeriod(_))));
    }

    #[test]
    fn test_accommodation_rejects_zero_price() {
        let result = calculate_accommodation(
            &terms(dec!(0), PriceTimeUnit::Daily, 0),
            &period(d(2024, 1, 1), d(2024, 1, 2)),
        );
        assert!(matches!(result, Err(CalculationError::NonPositivePrice(_))));
    }

    #[test]
    fn test_ambulante_hourly() {
        let charge = calculate_ambulante(&terms(dec!(60), PriceTimeUnit::Hourly, 9), 90).unwrap();

        assert_eq!(charge.totals.pre_vat_total.amount(), dec!(90));
        assert_eq!(charge.totals.vat_amount.amount(), dec!(8.10));
        assert_eq!(charge.totals.total.amount(), dec!(98.10));
    }

    #[test]
    fn test_ambulante_minute() {
        let charge = calculate_ambulante(&terms(dec!(1.25), PriceTimeUnit::Minute, 0), 45).unwrap();
        assert_eq!(charge.totals.total.amount(), dec!(56.25));
        assert_eq!(charge.total_minutes, 45);
    }

    #[test]
    fn test_ambulante_rejects_daily_unit() {
        let result = calculate_ambulante(&terms(dec!(100), PriceTimeUnit::Daily, 0), 60);
        assert_eq!(
            result,
            Err(CalculationError::UnsupportedUnit {
                care_type: CareType::Ambulante,
                unit: PriceTimeUnit::Daily,
            })
        );
    }

    #[test]
    fn test_ambulante_rejects_zero_minutes() {
        let result = calculate_ambulante(&terms(dec!(60), PriceTimeUnit::Hourly, 0), 0);
        assert_eq!(result, Err(CalculationError::NonPositiveMinutes(0)));
    }

    #[test]
    fn test_rounding_vat_on_rounded_pre_vat() {
        // 89 / 7 * 3 = 38.142857...
        let charge = calculate_accommodation(
            &terms(dec!(89), PriceTimeUnit::Weekly, 21),
            &period(d(2024, 1, 1), d(2024, 1, 4)),
        )
        .unwrap();

        assert_eq!(charge.totals.pre_vat_total.amount(), dec!(38.14));
        assert_eq!(charge.totals.vat_amount.amount(), dec!(8.01));
        assert_eq!(charge.totals.total.amount(), dec!(46.15));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn accommodation_is_deterministic_and_consistent(
            price_cents in 1i64..1_000_000,
            days in 1i64..400,
            vat in 0i32..=30,
        ) {
            let terms = RateTerms {
                price: Money::from_cents(price_cents),
                unit: PriceTimeUnit::Daily,
                vat: VatRate::from_percentage(vat).unwrap(),
            };
            let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let period = HalfOpenRange { start, end: start + Duration::days(days) };

            let first = calculate_accommodation(&terms, &period).unwrap();
            let second = calculate_accommodation(&terms, &period).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(
                first.totals.pre_vat_total + first.totals.vat_amount,
                first.totals.total
            );
        }

        #[test]
        fn monthly_full_year_equals_twelve_prices(price_cents in 1i64..1_000_000) {
            let terms = RateTerms {
                price: Money::from_cents(price_cents),
                unit: PriceTimeUnit::Monthly,
                vat: VatRate::exempt(),
            };
            let year = HalfOpenRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            };

            let charge = calculate_accommodation(&terms, &year).unwrap();
            prop_assert_eq!(charge.totals.pre_vat_total, Money::from_cents(price_cents * 12));
            prop_assert_eq!(charge.time_frame, "12 months");
        }
    }
}
