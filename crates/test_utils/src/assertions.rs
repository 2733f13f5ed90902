//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for billing types that give
//! more meaningful error messages than standard assertions.

use core_kernel::{HalfOpenRange, Money};
use domain_billing::{InvoiceDraft, WarningKind};
use rust_decimal::Decimal;

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Panics
///
/// Panics if the amounts differ by more than `tolerance`
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual,
        expected,
        diff,
        tolerance
    );
}

/// Asserts that a Money value has exactly the given amount
pub fn assert_money_eq(actual: &Money, expected: Decimal) {
    assert_eq!(
        actual.amount(),
        expected,
        "Expected {} but got {}",
        expected,
        actual
    );
}

/// Asserts that a draft's totals equal the sums of its line items
pub fn assert_draft_totals_consistent(draft: &InvoiceDraft) {
    let pre_vat: Money = draft.line_items.iter().map(|l| l.totals.pre_vat_total).sum();
    let vat: Money = draft.line_items.iter().map(|l| l.totals.vat_amount).sum();
    let total: Money = draft.line_items.iter().map(|l| l.totals.total).sum();

    assert_eq!(draft.pre_vat_total, pre_vat, "pre-VAT total does not match line items");
    assert_eq!(draft.vat_amount, vat, "VAT amount does not match line items");
    assert_eq!(draft.total_amount, total, "total does not match line items");
    assert_eq!(
        draft.total_amount,
        draft.pre_vat_total + draft.vat_amount,
        "total is not pre-VAT plus VAT"
    );
}

/// Asserts that a draft carries at least one warning of the given kind
pub fn assert_has_warning(draft: &InvoiceDraft, kind: WarningKind) {
    assert!(
        draft.warnings.iter().any(|w| w.kind == kind),
        "Expected a {:?} warning, got {:?}",
        kind,
        draft.warnings
    );
}

/// Asserts that no two ranges share a day
pub fn assert_ranges_disjoint(ranges: &[HalfOpenRange]) {
    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            assert!(!a.overlaps(b), "Ranges overlap: {:?} and {:?}", a, b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn range(start: u32, end: u32) -> HalfOpenRange {
        HalfOpenRange::new(
            NaiveDate::from_ymd_opt(2024, 3, start).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, end).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_money_approx_eq_within_tolerance() {
        assert_money_approx_eq(&Money::new(dec!(10.00)), &Money::new(dec!(10.01)), dec!(0.01));
    }

    #[test]
    #[should_panic(expected = "differ by more than tolerance")]
    fn test_money_approx_eq_outside_tolerance() {
        assert_money_approx_eq(&Money::new(dec!(10.00)), &Money::new(dec!(10.05)), dec!(0.01));
    }

    #[test]
    fn test_adjacent_ranges_are_disjoint() {
        assert_ranges_disjoint(&[range(1, 5), range(5, 9)]);
    }

    #[test]
    #[should_panic(expected = "Ranges overlap")]
    fn test_overlapping_ranges_panic() {
        assert_ranges_disjoint(&[range(1, 6), range(5, 9)]);
    }
}
