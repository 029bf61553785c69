// server/src/calendar.rs
//
// Calendar-date value type used by the streak tracker. All daily logic
// (streak continuation, "contributed today" checks) compares whole days in a
// single canonical time zone (UTC), never raw timestamps, so the day boundary
// is unambiguous regardless of DST or client clocks.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use spacetimedb::{SpacetimeType, Timestamp};
use std::fmt;

/// A date with no time component, stored as whole days since the Unix epoch.
/// Subtraction returns an integer day count.
#[derive(SpacetimeType, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CalendarDate {
    pub days_since_epoch: i32,
}

impl CalendarDate {
    /// Truncates a timestamp to its UTC calendar date.
    pub fn from_timestamp(ts: Timestamp) -> CalendarDate {
        let secs = ts.to_micros_since_unix_epoch().div_euclid(1_000_000);
        let date = DateTime::<Utc>::from_timestamp(secs, 0)
            .map(|dt| dt.date_naive())
            .unwrap_or_default();
        CalendarDate::from_naive(date)
    }

    pub fn from_naive(date: NaiveDate) -> CalendarDate {
        let days = date.signed_duration_since(NaiveDate::default()).num_days();
        CalendarDate {
            days_since_epoch: days as i32,
        }
    }

    /// Builds a date from year/month/day; `None` for invalid combinations.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<CalendarDate> {
        NaiveDate::from_ymd_opt(year, month, day).map(CalendarDate::from_naive)
    }

    /// Whole days from `earlier` to `self`. Negative when `earlier` is
    /// actually in the future relative to `self`.
    pub fn days_since(&self, earlier: CalendarDate) -> i64 {
        self.days_since_epoch as i64 - earlier.days_since_epoch as i64
    }

    fn to_naive(self) -> Option<NaiveDate> {
        NaiveDate::default().checked_add_signed(chrono::Duration::days(self.days_since_epoch as i64))
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Some(d) => write!(f, "{:04}-{:02}-{:02}", d.year(), d.month(), d.day()),
            None => write!(f, "epoch{:+}d", self.days_since_epoch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(micros: i64) -> Timestamp {
        Timestamp::from_micros_since_unix_epoch(micros)
    }

    #[test]
    fn epoch_is_day_zero() {
        assert_eq!(CalendarDate::from_timestamp(ts(0)).days_since_epoch, 0);
    }

    #[test]
    fn truncation_respects_the_utc_day_boundary() {
        let last_micro_of_day_zero = 86_400_000_000 - 1;
        assert_eq!(
            CalendarDate::from_timestamp(ts(last_micro_of_day_zero)).days_since_epoch,
            0
        );
        assert_eq!(
            CalendarDate::from_timestamp(ts(86_400_000_000)).days_since_epoch,
            1
        );
    }

    #[test]
    fn subtraction_counts_whole_days() {
        let a = CalendarDate::from_ymd(2024, 3, 1).unwrap();
        let b = CalendarDate::from_ymd(2024, 2, 28).unwrap();
        // 2024 is a leap year, so Feb 29 sits between them.
        assert_eq!(a.days_since(b), 2);
        assert_eq!(b.days_since(a), -2);
    }

    #[test]
    fn displays_as_iso_date() {
        let d = CalendarDate::from_ymd(2025, 8, 23).unwrap();
        assert_eq!(d.to_string(), "2025-08-23");
    }
}
