//! Calendar ranges for contracts and billing windows
//!
//! Two shapes of range are used throughout the system:
//! - `DateRange`: an inclusive pair of calendar days, as entered by staff
//!   (contract start/end, invoicing window)
//! - `HalfOpenRange`: `[start, end)` in whole days, the form all period
//!   arithmetic is done in, so adjacent ranges never share a day

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },

    #[error("Empty period starting {0}")]
    EmptyPeriod(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Date out of range: {0}")]
    OutOfRange(String),
}

/// Timezone in which calendar days are interpreted
///
/// Appointments are stored as UTC instants; billing periods are calendar
/// days. This wrapper converts between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Timezone {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tz::from_str(s)
            .map(Timezone)
            .map_err(|_| TemporalError::UnknownTimezone(s.to_string()))
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Gets the first instant of the given day in this timezone as UTC
    ///
    /// On days where local midnight does not exist (DST gap) the naive
    /// midnight is interpreted as UTC.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        midnight
            .and_local_timezone(self.0)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| midnight.and_utc())
    }

    /// Converts a half-open day range into the UTC instants it covers
    pub fn instants(&self, range: &HalfOpenRange) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start_of_day(range.start), self.start_of_day(range.end))
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// An inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of calendar days covered, counting both ends
    pub fn day_count(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The same days as a `[start, end + 1)` range
    ///
    /// # Errors
    ///
    /// Returns `TemporalError::OutOfRange` when `end` is the last representable day
    pub fn to_half_open(&self) -> Result<HalfOpenRange, TemporalError> {
        let end = self
            .end
            .succ_opt()
            .ok_or_else(|| TemporalError::OutOfRange(self.end.to_string()))?;
        Ok(HalfOpenRange {
            start: self.start,
            end,
        })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// A non-empty `[start, end)` range of whole days
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HalfOpenRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl HalfOpenRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        if start == end {
            return Err(TemporalError::EmptyPeriod(start.to_string()));
        }
        Ok(Self { start, end })
    }

    /// Number of whole days in the range
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Last day included in the range
    pub fn last_day(&self) -> NaiveDate {
        self.end - Duration::days(1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn overlaps(&self, other: &HalfOpenRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The days present in both ranges, if any
    pub fn intersect(&self, other: &HalfOpenRange) -> Option<HalfOpenRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(HalfOpenRange { start, end })
    }

    /// The days of `self` not in `other`, as zero, one or two ranges in order
    pub fn subtract(&self, other: &HalfOpenRange) -> Vec<HalfOpenRange> {
        if !self.overlaps(other) {
            return vec![*self];
        }

        let mut remaining = Vec::with_capacity(2);
        if self.start < other.start {
            remaining.push(HalfOpenRange { start: self.start, end: other.start });
        }
        if other.end < self.end {
            remaining.push(HalfOpenRange { start: other.end, end: self.end });
        }
        remaining
    }

    /// Removes every range in `excluded` from `self`, returning the ordered remainder
    pub fn subtract_all<'a, I>(&self, excluded: I) -> Vec<HalfOpenRange>
    where
        I: IntoIterator<Item = &'a HalfOpenRange>,
    {
        let mut remaining = vec![*self];
        for cut in excluded {
            remaining = remaining
                .iter()
                .flat_map(|piece| piece.subtract(cut))
                .collect();
            if remaining.is_empty() {
                break;
            }
        }
        remaining.sort();
        remaining
    }

    /// The same days as an inclusive calendar range
    pub fn to_date_range(&self) -> DateRange {
        DateRange {
            start: self.start,
            end: self.last_day(),
        }
    }
}

impl fmt::Display for HalfOpenRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_range_day_count_is_inclusive() {
        let range = DateRange::new(d(2024, 3, 1), d(2024, 3, 28)).unwrap();
        assert_eq!(range.day_count(), 28);
        assert_eq!(range.to_half_open().unwrap().days(), 28);
    }

    #[test]
    fn test_to_half_open_at_last_representable_day() {
        let range = DateRange::new(d(2024, 3, 1), NaiveDate::MAX).unwrap();
        assert!(matches!(range.to_half_open(), Err(TemporalError::OutOfRange(_))));
    }

    #[test]
    fn test_half_open_rejects_empty() {
        assert!(matches!(
            HalfOpenRange::new(d(2024, 1, 1), d(2024, 1, 1)),
            Err(TemporalError::EmptyPeriod(_))
        ));
    }

    #[test]
    fn test_intersect_clips_both_bounds() {
        let contract = HalfOpenRange::new(d(2024, 1, 10), d(2024, 3, 1)).unwrap();
        let window = HalfOpenRange::new(d(2024, 2, 1), d(2024, 4, 1)).unwrap();

        let overlap = contract.intersect(&window).unwrap();
        assert_eq!(overlap.start, d(2024, 2, 1));
        assert_eq!(overlap.end, d(2024, 3, 1));
    }

    #[test]
    fn test_adjacent_ranges_do_not_overlap() {
        let a = HalfOpenRange::new(d(2024, 1, 1), d(2024, 2, 1)).unwrap();
        let b = HalfOpenRange::new(d(2024, 2, 1), d(2024, 3, 1)).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn test_subtract_middle_splits_in_two() {
        let month = HalfOpenRange::new(d(2024, 1, 1), d(2024, 2, 1)).unwrap();
        let billed = HalfOpenRange::new(d(2024, 1, 10), d(2024, 1, 20)).unwrap();

        let rest = month.subtract(&billed);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].days() + rest[1].days(), 31 - 10);
    }

    #[test]
    fn test_subtract_all_covering_leaves_nothing() {
        let month = HalfOpenRange::new(d(2024, 1, 1), d(2024, 2, 1)).unwrap();
        let first = HalfOpenRange::new(d(2023, 12, 1), d(2024, 1, 16)).unwrap();
        let second = HalfOpenRange::new(d(2024, 1, 16), d(2024, 3, 1)).unwrap();

        assert!(month.subtract_all([&first, &second]).is_empty());
    }

    #[test]
    fn test_timezone_start_of_day() {
        let tz: Timezone = "Europe/Amsterdam".parse().unwrap();
        let start = tz.start_of_day(d(2024, 7, 1));
        assert_eq!(start.to_rfc3339(), "2024-06-30T22:00:00+00:00");
    }

    #[test]
    fn test_unknown_timezone() {
        assert!(matches!(
            "Mars/Olympus".parse::<Timezone>(),
            Err(TemporalError::UnknownTimezone(_))
        ));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn range_strategy() -> impl Strategy<Value = HalfOpenRange> {
        (0i64..400, 1i64..120).prop_map(|(offset, len)| {
            let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let start = base + Duration::days(offset);
            HalfOpenRange { start, end: start + Duration::days(len) }
        })
    }

    proptest! {
        #[test]
        fn subtract_never_keeps_excluded_days(a in range_strategy(), b in range_strategy()) {
            for piece in a.subtract(&b) {
                prop_assert!(!piece.overlaps(&b));
                prop_assert!(piece.start >= a.start && piece.end <= a.end);
            }
        }

        #[test]
        fn subtract_and_intersect_partition_the_range(a in range_strategy(), b in range_strategy()) {
            let kept: i64 = a.subtract(&b).iter().map(HalfOpenRange::days).sum();
            let cut = a.intersect(&b).map_or(0, |r| r.days());
            prop_assert_eq!(kept + cut, a.days());
        }
    }
}
