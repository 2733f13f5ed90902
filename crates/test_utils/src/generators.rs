//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::{Duration, NaiveDate};
use core_kernel::{HalfOpenRange, Money, VatRate};
use domain_billing::{PaymentStatus, PriceTimeUnit};
use proptest::prelude::*;

/// Strategy for non-negative amounts in cents
pub fn cents_strategy() -> impl Strategy<Value = i64> {
    0i64..100_000_000i64
}

/// Strategy for non-negative Money values
pub fn money_strategy() -> impl Strategy<Value = Money> {
    cents_strategy().prop_map(Money::from_cents)
}

/// Strategy for VAT rates between 0% and 100%
pub fn vat_rate_strategy() -> impl Strategy<Value = VatRate> {
    (0i32..=100i32).prop_map(|p| VatRate::from_percentage(p).unwrap())
}

pub fn price_time_unit_strategy() -> impl Strategy<Value = PriceTimeUnit> {
    prop_oneof![
        Just(PriceTimeUnit::Minute),
        Just(PriceTimeUnit::Hourly),
        Just(PriceTimeUnit::Daily),
        Just(PriceTimeUnit::Weekly),
        Just(PriceTimeUnit::Monthly),
    ]
}

pub fn payment_status_strategy() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Completed),
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Failed),
        Just(PaymentStatus::Reversed),
        Just(PaymentStatus::Refunded),
    ]
}

/// Strategy for dates between 2020 and roughly 2030
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..3650i64).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(offset)
    })
}

/// Strategy for non-empty half-open date ranges of up to a year
pub fn half_open_range_strategy() -> impl Strategy<Value = HalfOpenRange> {
    (date_strategy(), 1i64..366i64).prop_map(|(start, days)| {
        HalfOpenRange::new(start, start + Duration::days(days)).unwrap()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_money_is_not_negative(money in money_strategy()) {
            prop_assert!(!money.is_negative());
        }

        #[test]
        fn generated_ranges_are_not_empty(range in half_open_range_strategy()) {
            prop_assert!(range.days() >= 1);
        }
    }
}
