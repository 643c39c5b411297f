use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result, ValidationError};

/// Timezone whose start of day defines a movement's calendar date.
pub const MOVEMENT_DATE_TZ: Tz = chrono_tz::UTC;

/// Converts a UTC instant to the calendar date a movement belongs to.
///
/// This is the single source of truth for bucketing movements by day. The
/// relevance filter, the by-date index, the storage `movement_date` column and
/// chunk assignment all go through it; using anything else to derive a
/// movement's date makes that movement invisible to the calculator.
pub fn movement_date_from_utc(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&MOVEMENT_DATE_TZ).date_naive()
}

pub fn get_days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if start > end {
        return Vec::new();
    }
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        days.push(current);
        if let Some(next) = current.succ_opt() {
            current = next;
        } else {
            break;
        }
    }
    days
}

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Date range start {} is after end {}",
                start, end
            ))));
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        get_days_between(self.start, self.end)
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Splits the range into consecutive sub-ranges of at most `width_days` days.
    pub fn split(&self, width_days: u32) -> Vec<DateRange> {
        let width = u64::from(width_days.max(1));
        let mut parts = Vec::new();
        let mut start = self.start;
        loop {
            let tentative_end = start
                .checked_add_days(Days::new(width - 1))
                .unwrap_or(self.end);
            let end = tentative_end.min(self.end);
            parts.push(DateRange { start, end });
            match end.succ_opt() {
                Some(next) if next <= self.end => start = next,
                _ => break,
            }
        }
        parts
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
