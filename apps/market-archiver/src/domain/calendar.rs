//! Trading Calendar
//!
//! Inclusive date ranges that iterate forward or backward depending on the
//! order of their endpoints, plus the weekend filter used to select archive
//! days. Exchange holidays are not modeled; a holiday shows up as an empty
//! bar file, which also marks the day as fetched.

use chrono::{Datelike, NaiveDate, Weekday};

/// Inclusive range of dates between `start` and `end`.
///
/// Runs backward when `start` is after `end`, matching how archives are
/// usually filled from the present toward history.
#[must_use]
pub fn date_range(start: NaiveDate, end: NaiveDate) -> DateRange {
    DateRange {
        next: Some(start),
        end,
        descending: start > end,
    }
}

/// Whether the date falls on a Saturday or Sunday.
#[must_use]
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Inclusive range of dates between `start` and `end`, weekends removed.
pub fn trading_days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    date_range(start, end).filter(|d| !is_weekend(*d))
}

/// Iterator returned by [`date_range`].
#[derive(Debug, Clone)]
pub struct DateRange {
    next: Option<NaiveDate>,
    end: NaiveDate,
    descending: bool,
}

impl Iterator for DateRange {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        self.next = if current == self.end {
            None
        } else if self.descending {
            current.pred_opt()
        } else {
            current.succ_opt()
        };
        Some(current)
    }
}
