//! Fiscal periods and the posting gate.
//!
//! A period is a calendar month owned by a tenant. It moves one way, from
//! OPEN to CLOSED; a period with no stored row is OPEN.

use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::{LedgerError, ValidationError};

const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

/// A fiscal period (year + month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FiscalPeriod {
    year: i32,
    month: u32,
}

impl FiscalPeriod {
    /// Creates a period; the year must be within 2000..=2100.
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) || !(1..=12).contains(&month) {
            return Err(ValidationError::InvalidPeriod { year, month });
        }
        Ok(Self { year, month })
    }

    /// Returns the period containing `date`.
    pub fn from_date(date: NaiveDate) -> Result<Self, ValidationError> {
        Self::new(date.year(), date.month())
    }

    /// Calendar year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month, 1-based.
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// First day of the period.
    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the period.
    #[must_use]
    pub fn end_date(&self) -> NaiveDate {
        self.next_unchecked()
            .start_date()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    /// Returns true if `date` falls inside the period.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// The following period, if still within the supported range.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        let next = self.next_unchecked();
        Self::new(next.year, next.month).ok()
    }

    /// The preceding period, if still within the supported range.
    #[must_use]
    pub fn previous(&self) -> Option<Self> {
        let (year, month) = if self.month == 1 {
            (self.year - 1, 12)
        } else {
            (self.year, self.month - 1)
        };
        Self::new(year, month).ok()
    }

    const fn next_unchecked(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl FromStr for FiscalPeriod {
    type Err = ValidationError;

    /// Parses `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidPeriod { year: 0, month: 0 };
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for FiscalPeriod {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FiscalPeriod> for String {
    fn from(period: FiscalPeriod) -> Self {
        period.to_string()
    }
}

/// Whether a period still accepts postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodStatus {
    /// Postings and back-valuations allowed.
    #[default]
    Open,
    /// Immutable; no entry may be dated into it.
    Closed,
}

impl PeriodStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    /// Returns true if postings are allowed.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(LedgerError::Storage(format!(
                "unknown fiscal period status {other:?}"
            ))),
        }
    }
}

/// Fails with [`LedgerError::PeriodClosed`] unless `status` is OPEN.
pub fn ensure_open(period: FiscalPeriod, status: PeriodStatus) -> Result<(), LedgerError> {
    if status.is_open() {
        Ok(())
    } else {
        Err(LedgerError::PeriodClosed { period })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(1999, 12)]
    #[case(2101, 1)]
    #[case(2024, 0)]
    #[case(2024, 13)]
    fn test_rejects_out_of_range(#[case] year: i32, #[case] month: u32) {
        assert_eq!(
            FiscalPeriod::new(year, month),
            Err(ValidationError::InvalidPeriod { year, month })
        );
    }

    #[rstest]
    #[case(2024, 1, date(2024, 1, 1), date(2024, 1, 31))]
    #[case(2024, 2, date(2024, 2, 1), date(2024, 2, 29))]
    #[case(2023, 2, date(2023, 2, 1), date(2023, 2, 28))]
    #[case(2024, 12, date(2024, 12, 1), date(2024, 12, 31))]
    fn test_period_bounds(
        #[case] year: i32,
        #[case] month: u32,
        #[case] start: NaiveDate,
        #[case] end: NaiveDate,
    ) {
        let period = FiscalPeriod::new(year, month).unwrap();
        assert_eq!(period.start_date(), start);
        assert_eq!(period.end_date(), end);
    }

    #[test]
    fn test_next_and_previous_wrap_years() {
        let dec = FiscalPeriod::new(2023, 12).unwrap();
        let jan = FiscalPeriod::new(2024, 1).unwrap();
        assert_eq!(dec.next(), Some(jan));
        assert_eq!(jan.previous(), Some(dec));
        assert_eq!(FiscalPeriod::new(2100, 12).unwrap().next(), None);
        assert_eq!(FiscalPeriod::new(2000, 1).unwrap().previous(), None);
    }

    #[rstest]
    #[case("2024-01", Some((2024, 1)))]
    #[case("2100-12", Some((2100, 12)))]
    #[case("2024-1", None)]
    #[case("24-01", None)]
    #[case("2024-13", None)]
    #[case("2024/01", None)]
    fn test_parse(#[case] input: &str, #[case] expected: Option<(i32, u32)>) {
        let parsed = input.parse::<FiscalPeriod>().ok().map(|p| (p.year(), p.month()));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_display_and_serde() {
        let period = FiscalPeriod::new(2024, 3).unwrap();
        assert_eq!(period.to_string(), "2024-03");
        assert_eq!(serde_json::to_string(&period).unwrap(), "\"2024-03\"");
    }

    #[test]
    fn test_ensure_open() {
        let period = FiscalPeriod::new(2024, 3).unwrap();
        assert!(ensure_open(period, PeriodStatus::Open).is_ok());
        assert!(matches!(
            ensure_open(period, PeriodStatus::Closed),
            Err(LedgerError::PeriodClosed { period: p }) if p == period
        ));
    }

    #[test]
    fn test_status_round_trips_through_storage_form() {
        for status in [PeriodStatus::Open, PeriodStatus::Closed] {
            assert_eq!(status.as_str().parse::<PeriodStatus>().unwrap(), status);
        }
        assert!("SOFT_CLOSE".parse::<PeriodStatus>().is_err());
    }

    fn in_range_date() -> impl Strategy<Value = NaiveDate> {
        (2000i32..=2100, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| date(y, m, d))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// **Property: a date's period contains it**
        ///
        /// *For any* supported date, `from_date` yields a period whose bounds
        /// enclose that date.
        #[test]
        fn prop_from_date_contains_date(d in in_range_date()) {
            let period = FiscalPeriod::from_date(d).unwrap();
            prop_assert!(period.contains(d));
            prop_assert!(period.start_date() <= d && d <= period.end_date());
        }

        /// **Property: next and previous are inverse**
        #[test]
        fn prop_next_previous_inverse(d in in_range_date()) {
            let period = FiscalPeriod::from_date(d).unwrap();
            if let Some(next) = period.next() {
                prop_assert_eq!(next.previous(), Some(period));
                prop_assert_eq!(next.start_date(), period.end_date().succ_opt().unwrap());
            }
        }
    }
}
