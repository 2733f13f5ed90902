//! Billable period resolution
//!
//! Works out which days of a contract fall inside an invoicing window and
//! have not been invoiced before. All arithmetic is on half-open day ranges.

use core_kernel::{DateRange, HalfOpenRange, TemporalError};

use crate::contract::Contract;

/// The days a contract is in force, clipped to `window`
///
/// Open-ended contracts run until the end of the window. Returns `None`
/// when the contract and the window share no day.
///
/// # Errors
///
/// * `TemporalError::InvalidPeriod` - the contract ends before it starts
/// * `TemporalError::OutOfRange` - the contract ends on the last representable day
pub fn contract_coverage(
    contract: &Contract,
    window: &HalfOpenRange,
) -> Result<Option<HalfOpenRange>, TemporalError> {
    let contract_range = match contract.end_date {
        Some(end) => DateRange::new(contract.start_date, end)?.to_half_open()?,
        None => {
            if contract.start_date >= window.end {
                return Ok(None);
            }
            HalfOpenRange {
                start: contract.start_date,
                end: window.end,
            }
        }
    };

    Ok(contract_range.intersect(window))
}

/// Resolves the billable periods of a contract for an invoicing window
///
/// The result is ordered and disjoint. Days already covered by earlier
/// invoices (`already_billed`) are left out, so calling this again with an
/// advancing window never bills a day twice. An empty result is not an
/// error.
///
/// # Arguments
///
/// * `contract` - The contract being billed
/// * `window` - The invoicing window, both ends inclusive
/// * `already_billed` - Periods of this contract on earlier invoices
///
/// # Errors
///
/// Returns `TemporalError` if the contract dates are inconsistent
pub fn resolve_billable_periods(
    contract: &Contract,
    window: &DateRange,
    already_billed: &[HalfOpenRange],
) -> Result<Vec<HalfOpenRange>, TemporalError> {
    let Some(coverage) = contract_coverage(contract, &window.to_half_open()?)? else {
        return Ok(Vec::new());
    };

    Ok(coverage.subtract_all(already_billed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use core_kernel::{ClientId, ContractId, Money, VatRate};

    use crate::contract::{CareType, PriceTimeUnit};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn contract(start: NaiveDate, end: Option<NaiveDate>) -> Contract {
        Contract {
            id: ContractId::new(1),
            client_id: ClientId::new(1),
            care_type: CareType::Accommodation,
            price: Money::new(dec!(89)),
            price_time_unit: PriceTimeUnit::Daily,
            vat: VatRate::exempt(),
            start_date: start,
            end_date: end,
            hours: None,
            hours_type: None,
        }
    }

    fn window(start: NaiveDate, end: NaiveDate) -> DateRange {
        DateRange::new(start, end).unwrap()
    }

    #[test]
    fn test_window_inside_contract() {
        let c = contract(d(2024, 1, 1), Some(d(2024, 12, 31)));
        let periods = resolve_billable_periods(&c, &window(d(2024, 3, 1), d(2024, 3, 28)), &[]).unwrap();

        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start, d(2024, 3, 1));
        assert_eq!(periods[0].days(), 28);
    }

    #[test]
    fn test_clipped_at_contract_start_and_end() {
        let c = contract(d(2024, 3, 10), Some(d(2024, 3, 20)));
        let periods = resolve_billable_periods(&c, &window(d(2024, 3, 1), d(2024, 3, 31)), &[]).unwrap();

        assert_eq!(periods, vec![HalfOpenRange::new(d(2024, 3, 10), d(2024, 3, 21)).unwrap()]);
    }

    #[test]
    fn test_no_overlap_is_empty_not_error() {
        let c = contract(d(2023, 1, 1), Some(d(2023, 12, 31)));
        let periods = resolve_billable_periods(&c, &window(d(2024, 1, 1), d(2024, 1, 31)), &[]).unwrap();
        assert!(periods.is_empty());
    }

    #[test]
    fn test_open_ended_contract_runs_to_window_end() {
        let c = contract(d(2024, 1, 15), None);
        let periods = resolve_billable_periods(&c, &window(d(2024, 1, 1), d(2024, 1, 31)), &[]).unwrap();

        assert_eq!(periods[0].start, d(2024, 1, 15));
        assert_eq!(periods[0].end, d(2024, 2, 1));
    }

    #[test]
    fn test_open_ended_contract_starting_after_window() {
        let c = contract(d(2024, 2, 15), None);
        let periods = resolve_billable_periods(&c, &window(d(2024, 1, 1), d(2024, 1, 31)), &[]).unwrap();
        assert!(periods.is_empty());
    }

    #[test]
    fn test_inverted_contract_dates_fail() {
        let c = contract(d(2024, 3, 1), Some(d(2024, 2, 1)));
        let result = resolve_billable_periods(&c, &window(d(2024, 1, 1), d(2024, 12, 31)), &[]);
        assert!(matches!(result, Err(TemporalError::InvalidPeriod { .. })));
    }

    #[test]
    fn test_contract_ending_on_last_representable_day_fails() {
        let c = contract(d(2024, 1, 1), Some(NaiveDate::MAX));
        let result = resolve_billable_periods(&c, &window(d(2024, 1, 1), d(2024, 1, 31)), &[]);
        assert!(matches!(result, Err(TemporalError::OutOfRange(_))));
    }

    #[test]
    fn test_already_billed_days_are_excluded() {
        let c = contract(d(2024, 1, 1), None);
        let billed = [HalfOpenRange::new(d(2024, 1, 1), d(2024, 1, 15)).unwrap()];

        let periods = resolve_billable_periods(&c, &window(d(2024, 1, 1), d(2024, 1, 31)), &billed).unwrap();
        assert_eq!(periods, vec![HalfOpenRange::new(d(2024, 1, 15), d(2024, 2, 1)).unwrap()]);
    }

    #[test]
    fn test_gap_in_billing_history_gives_multiple_periods() {
        let c = contract(d(2024, 1, 1), None);
        let billed = [HalfOpenRange::new(d(2024, 1, 10), d(2024, 1, 20)).unwrap()];

        let periods = resolve_billable_periods(&c, &window(d(2024, 1, 1), d(2024, 1, 31)), &billed).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods.iter().map(HalfOpenRange::days).sum::<i64>(), 21);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use core_kernel::{ClientId, ContractId, Money, VatRate};

    use crate::contract::{CareType, PriceTimeUnit};

    proptest! {
        #[test]
        fn periods_stay_inside_contract_and_window(
            contract_offset in 0i64..200,
            contract_len in 0i64..200,
            window_offset in 0i64..200,
            window_len in 0i64..60,
        ) {
            let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let contract = Contract {
                id: ContractId::new(1),
                client_id: ClientId::new(1),
                care_type: CareType::Accommodation,
                price: Money::new(dec!(10)),
                price_time_unit: PriceTimeUnit::Daily,
                vat: VatRate::exempt(),
                start_date: base + Duration::days(contract_offset),
                end_date: Some(base + Duration::days(contract_offset + contract_len)),
                hours: None,
                hours_type: None,
            };
            let window = DateRange::new(
                base + Duration::days(window_offset),
                base + Duration::days(window_offset + window_len),
            ).unwrap();

            let periods = resolve_billable_periods(&contract, &window, &[]).unwrap();
            prop_assert!(periods.len() <= 1);
            for period in periods {
                prop_assert!(period.start >= contract.start_date && period.start >= window.start);
                prop_assert!(period.last_day() <= window.end);
                prop_assert!(Some(period.last_day()) <= contract.end_date);
            }
        }
    }
}
