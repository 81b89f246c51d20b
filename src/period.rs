use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Month, NaiveDate};

/// A Monday-to-Sunday week. Weeks that straddle two months stay whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    // Monday = 1 .. Sunday = 7
    let index = date.weekday().number_from_monday() as i64;
    date - Duration::days(index - 1)
}

pub fn week_range(date: NaiveDate) -> WeekRange {
    let start = week_start(date);
    let end = start + Duration::days(6);
    WeekRange {
        start,
        end,
        label: format!("{} - {}", start.format("%b %-d"), end.format("%b %-d")),
    }
}

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    first_day: NaiveDate,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            first_day: date - Duration::days(date.day0() as i64),
        }
    }

    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| Self { first_day })
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        MonthKey::of(date) == *self
    }

    /// `January_2025`, used in export file names.
    pub fn file_stem(&self) -> String {
        self.to_string().replace(' ', "_")
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first_day.format("%B %Y"))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised month `{0}` (expected e.g. \"January 2025\" or 2025-01)")]
pub struct ParseMonthError(String);

impl FromStr for MonthKey {
    type Err = ParseMonthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let err = || ParseMonthError(trimmed.to_string());

        if let Some((year, month)) = trimmed.split_once('-') {
            if let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<u32>()) {
                return MonthKey::new(year, month).ok_or_else(err);
            }
        }

        let mut parts = trimmed.split_whitespace();
        let (Some(name), Some(year), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(err());
        };
        let month = Month::from_str(name).map_err(|_| err())?;
        let year = year.parse::<i32>().map_err(|_| err())?;
        MonthKey::new(year, month.number_from_month()).ok_or_else(err)
    }
}

/// Every week touching `month`, plus the weeks of any dated logs inside it,
/// keyed and sorted by week start.
pub fn weeks_in_month<I>(month: MonthKey, log_dates: I) -> Vec<WeekRange>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut weeks: BTreeMap<NaiveDate, WeekRange> = BTreeMap::new();

    for date in log_dates {
        if month.contains(date) {
            let range = week_range(date);
            weeks.insert(range.start, range);
        }
    }

    let first = month.first_day();
    let mut current = week_start(first);
    while current < first || month.contains(current) {
        let range = week_range(current);
        weeks.insert(range.start, range);
        current += Duration::days(7);
    }

    weeks.into_values().collect()
}

/// The current month plus every month that has at least one log.
pub fn months_available<I>(today: NaiveDate, log_dates: I) -> Vec<MonthKey>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut months = BTreeSet::new();
    months.insert(MonthKey::of(today));
    months.extend(log_dates.into_iter().map(MonthKey::of));
    months.into_iter().collect()
}
