//! Civil-calendar helpers.
//!
//! All arithmetic is zone-naive: dates and times are local wall-clock values.

use crate::{BucketKey, Error, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// Combine a date with a time of day
pub fn at(day: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    day.and_time(time)
}

/// Midnight at the start of `day`
pub fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

/// Midnight at the start of the following day (exclusive end of `day`)
pub fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    day.succ_opt()
        .map(start_of_day)
        .unwrap_or(NaiveDateTime::MAX)
}

/// Whether `instant` falls within `[day 00:00, day+1 00:00)`
pub fn is_within_day(instant: NaiveDateTime, day: NaiveDate) -> bool {
    instant >= start_of_day(day) && instant < end_of_day(day)
}

/// Intersect a requested range with a validity window
///
/// Returns `None` when the intersection is empty.
pub fn clip(
    period_start: NaiveDate,
    period_end: NaiveDate,
    valid_from: NaiveDate,
    valid_until: Option<NaiveDate>,
) -> Option<(NaiveDate, NaiveDate)> {
    let start = period_start.max(valid_from);
    let end = valid_until.map_or(period_end, |until| period_end.min(until));

    if start > end {
        None
    } else {
        Some((start, end))
    }
}

/// Iterate every date in `[start, end]`, ascending
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

/// Monday-to-Sunday week containing `day`
pub fn week_containing(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = day.weekday().num_days_from_monday() as i64;
    let monday = day - Duration::days(offset);
    let sunday = monday + Duration::days(6);
    (monday, sunday)
}

/// January 1st to December 31st of the year containing `day`
pub fn year_containing(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let year = day.year();
    let first = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(day);
    let last = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(day);
    (first, last)
}

/// Bucket key for the day itself
pub fn day_key(day: NaiveDate) -> BucketKey {
    BucketKey::Day(day)
}

/// Bucket key for the month containing `day`
pub fn month_key(day: NaiveDate) -> BucketKey {
    BucketKey::Month {
        year: day.year(),
        month: day.month(),
    }
}

/// Short weekday label ("Mon")
pub fn weekday_label(day: NaiveDate) -> String {
    day.format("%a").to_string()
}

/// Short month label ("Jan")
pub fn month_label(day: NaiveDate) -> String {
    day.format("%b").to_string()
}

/// Whether `day` falls on one of `weekdays`
pub fn is_on_weekday(day: NaiveDate, weekdays: &[Weekday]) -> bool {
    weekdays.contains(&day.weekday())
}

// ============================================================================
// Boundary parsing
// ============================================================================

/// Parse an ISO-8601 local date (`2024-03-01`)
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| Error::Parse(format!("Invalid date '{}': {}", s, e)))
}

/// Parse an ISO-8601 local time (`08:30` or `08:30:00`)
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| Error::Parse(format!("Invalid time '{}': {}", s, e)))
}

/// Parse an ISO-8601 local date-time (`2024-03-01T08:30:00`)
///
/// A space separator and missing seconds are tolerated.
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| Error::Parse(format!("Invalid date-time '{}'", s)))
}

/// Render a date-time in the canonical textual form used by the reminder log
pub fn format_datetime(instant: NaiveDateTime) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S").to_string()
}
