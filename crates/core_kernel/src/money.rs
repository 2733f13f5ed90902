//! Money types with precise decimal arithmetic
//!
//! The billing system works in a single currency, so `Money` is a thin
//! wrapper over `rust_decimal::Decimal`. Amounts are stored with 4 decimal
//! places internally and rounded to cents where they are presented or
//! persisted as invoice totals.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use thiserror::Error;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid VAT percentage: {0}")]
    InvalidVat(i32),

    #[error("Division by zero")]
    DivisionByZero,
}

/// A monetary amount in the billing currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a new Money value
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp(4))
    }

    /// Creates Money from an integer amount in cents
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Creates a zero amount
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Rounds to cents, half away from zero
    pub fn round_to_cents(&self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Multiplies by a scalar (e.g., a number of rate units)
    pub fn multiply(&self, factor: Decimal) -> Self {
        Self::new(self.0 * factor)
    }

    /// Divides by a scalar
    pub fn divide(&self, divisor: Decimal) -> Result<Self, MoneyError> {
        if divisor.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }
        Ok(Self::new(self.0 / divisor))
    }

    /// Returns `self` as a percentage of `whole`, or zero when `whole` is zero
    pub fn percentage_of(&self, whole: Money) -> Decimal {
        if whole.is_zero() {
            return Decimal::ZERO;
        }
        (self.0 / whole.0 * dec!(100)).round_dp(2)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.0 - other.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, factor: Decimal) -> Self {
        self.multiply(factor)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// A whole-number VAT percentage as stored on contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct VatRate(i32);

impl VatRate {
    /// Creates a rate from a percentage (e.g., 21 for 21%)
    pub fn from_percentage(percentage: i32) -> Result<Self, MoneyError> {
        if !(0..=100).contains(&percentage) {
            return Err(MoneyError::InvalidVat(percentage));
        }
        Ok(Self(percentage))
    }

    /// A zero rate for VAT-exempt care
    pub fn exempt() -> Self {
        Self(0)
    }

    /// Returns the rate as a percentage
    pub fn percentage(&self) -> i32 {
        self.0
    }

    /// Returns the rate as a fraction (e.g., 0.21 for 21%)
    pub fn as_fraction(&self) -> Decimal {
        Decimal::from(self.0) / dec!(100)
    }

    /// Computes the VAT charged on a pre-VAT amount
    pub fn apply(&self, pre_vat: &Money) -> Money {
        pre_vat.multiply(self.as_fraction())
    }
}

impl TryFrom<i32> for VatRate {
    type Error = MoneyError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_percentage(value)
    }
}

impl From<VatRate> for i32 {
    fn from(rate: VatRate) -> i32 {
        rate.0
    }
}

impl fmt::Display for VatRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation() {
        let m = Money::new(dec!(100.50));
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_money_from_cents() {
        let m = Money::from_cents(10050);
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(dec!(100.00));
        let b = Money::new(dec!(50.00));

        assert_eq!((a + b).amount(), dec!(150.00));
        assert_eq!((a - b).amount(), dec!(50.00));
        assert_eq!((b - a).amount(), dec!(-50.00));
    }

    #[test]
    fn test_round_to_cents_half_away_from_zero() {
        assert_eq!(Money::new(dec!(2.345)).round_to_cents().amount(), dec!(2.35));
        assert_eq!(Money::new(dec!(-2.345)).round_to_cents().amount(), dec!(-2.35));
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [dec!(1.10), dec!(2.20), dec!(3.30)]
            .into_iter()
            .map(Money::new)
            .sum();
        assert_eq!(total.amount(), dec!(6.60));
    }

    #[test]
    fn test_percentage_of() {
        let paid = Money::new(dec!(500));
        assert_eq!(paid.percentage_of(Money::new(dec!(1000))), dec!(50));
        assert_eq!(paid.percentage_of(Money::zero()), Decimal::ZERO);
    }

    #[test]
    fn test_vat_application() {
        let vat = VatRate::from_percentage(20).unwrap();
        let pre_vat = Money::new(dec!(2492));

        assert_eq!(vat.apply(&pre_vat).amount(), dec!(498.4));
    }

    #[test]
    fn test_vat_rejects_out_of_range() {
        assert_eq!(VatRate::from_percentage(-1), Err(MoneyError::InvalidVat(-1)));
        assert_eq!(VatRate::from_percentage(101), Err(MoneyError::InvalidVat(101)));
    }

    #[test]
    fn test_vat_serde_validates() {
        let rate: VatRate = serde_json::from_str("9").unwrap();
        assert_eq!(rate.percentage(), 9);
        assert!(serde_json::from_str::<VatRate>("-4").is_err());
    }
}
