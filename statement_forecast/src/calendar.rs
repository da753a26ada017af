//! Quarterly reporting calendar
//!
//! Every series is normalized to calendar quarters; a period is identified by
//! its quarter-end date (Mar 31, Jun 30, Sep 30, Dec 31).

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One calendar quarter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quarter {
    year: i32,
    quarter: u32,
}

impl Quarter {
    /// Quarter containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: (date.month() - 1) / 3 + 1,
        }
    }

    /// Build from a year and a quarter number in `1..=4`
    pub fn new(year: i32, quarter: u32) -> Option<Self> {
        if !(1..=4).contains(&quarter) {
            return None;
        }
        // Reject years whose quarter-end is outside chrono's range.
        Self::end_of(year, quarter)?;
        Some(Self { year, quarter })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u32 {
        self.quarter
    }

    fn end_of(year: i32, quarter: u32) -> Option<NaiveDate> {
        let (month, day) = match quarter {
            1 => (3, 31),
            2 => (6, 30),
            3 => (9, 30),
            _ => (12, 31),
        };
        NaiveDate::from_ymd_opt(year, month, day)
    }

    /// Last calendar day of the quarter
    pub fn end_date(&self) -> NaiveDate {
        // `new`, `from_date` and `plus` only admit quarters whose end date
        // exists, so the fallback is never taken.
        Self::end_of(self.year, self.quarter).unwrap_or(NaiveDate::MAX)
    }

    /// Quarters since year 0, Q1
    pub fn ordinal(&self) -> i64 {
        self.year as i64 * 4 + (self.quarter as i64 - 1)
    }

    /// Quarter `n` steps later, or `None` past the supported calendar
    pub fn plus(&self, n: i64) -> Option<Self> {
        let ordinal = self.ordinal().checked_add(n)?;
        let year = i32::try_from(ordinal.div_euclid(4)).ok()?;
        Self::new(year, ordinal.rem_euclid(4) as u32 + 1)
    }

    /// Next quarter
    pub fn succ(&self) -> Option<Self> {
        self.plus(1)
    }

    /// Number of quarters from `self` to `other` (negative if `other` is earlier)
    pub fn distance_to(&self, other: &Quarter) -> i64 {
        other.ordinal() - self.ordinal()
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

/// Snap a period date onto its quarter-end
pub fn quarter_end(date: NaiveDate) -> NaiveDate {
    Quarter::from_date(date).end_date()
}

/// `count` quarter-end dates following the quarter of `last`, or `None` if
/// they run past the supported calendar
pub fn following_quarter_ends(last: NaiveDate, count: usize) -> Option<Vec<NaiveDate>> {
    let start = Quarter::from_date(last);
    (1..=count as i64)
        .map(|step| start.plus(step).map(|q| q.end_date()))
        .collect()
}
