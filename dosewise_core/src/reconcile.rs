//! Reconciliation of expected doses against acknowledged reminders.
//!
//! Produces the daily progress shown for "today" and the bucketed taken
//! counts behind the week and year charts.

use crate::calendar;
use crate::generator::ExpectedDoses;
use crate::{BucketKey, Bucketing, ChartBucket, ChartSummary, DoseProgress, ReminderInstance};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};

/// Default axis floor for day-granularity charts
pub const DAY_AXIS_FLOOR: usize = 5;

/// Default axis floor for month-granularity charts
pub const MONTH_AXIS_FLOOR: usize = 30;

impl Bucketing {
    /// Minimum `max_scheduled` so sparse schedules don't collapse the axis
    pub fn default_axis_floor(self) -> usize {
        match self {
            Bucketing::ByDay => DAY_AXIS_FLOOR,
            Bucketing::ByMonth => MONTH_AXIS_FLOOR,
        }
    }

    /// Bucket a day belongs to
    pub fn key_for(self, day: NaiveDate) -> BucketKey {
        match self {
            Bucketing::ByDay => calendar::day_key(day),
            Bucketing::ByMonth => calendar::month_key(day),
        }
    }

    fn label_for(self, day: NaiveDate) -> String {
        match self {
            Bucketing::ByDay => calendar::weekday_label(day),
            Bucketing::ByMonth => calendar::month_label(day),
        }
    }
}

/// When a record counts as taken
///
/// Records flagged taken without an acknowledgment time are a data-quality
/// anomaly: they are logged and left out of every count.
fn acknowledged_at(record: &ReminderInstance) -> Option<NaiveDateTime> {
    if !record.is_taken {
        return None;
    }

    match record.taken_at {
        Some(at) => Some(at),
        None => {
            tracing::warn!(
                "Reminder {} for {} is marked taken without a timestamp; skipping",
                record.id,
                record.medication_id
            );
            None
        }
    }
}

/// Progress for one day
///
/// `expected` holds the day's scheduled instants; `taken` counts records
/// acknowledged within the day's bounds.
pub fn daily_progress(
    day: NaiveDate,
    expected: &[NaiveDateTime],
    actual: &[ReminderInstance],
) -> DoseProgress {
    let taken = actual
        .iter()
        .filter_map(acknowledged_at)
        .filter(|at| calendar::is_within_day(*at, day))
        .count();

    DoseProgress::new(expected.len(), taken)
}

/// Bucket taken counts over the days in `expected`
///
/// Uses the default axis floor for `bucketing`.
pub fn aggregate<F>(
    expected: &ExpectedDoses,
    actual: &[ReminderInstance],
    bucketing: Bucketing,
    highlight: F,
) -> ChartSummary
where
    F: Fn(&BucketKey) -> bool,
{
    aggregate_with_floor(
        expected,
        actual,
        bucketing,
        highlight,
        bucketing.default_axis_floor(),
    )
}

/// Bucket taken counts with an explicit axis floor for `max_scheduled`
pub fn aggregate_with_floor<F>(
    expected: &ExpectedDoses,
    actual: &[ReminderInstance],
    bucketing: Bucketing,
    highlight: F,
    axis_floor: usize,
) -> ChartSummary
where
    F: Fn(&BucketKey) -> bool,
{
    // key -> (label, scheduled, taken); BTreeMap keeps buckets chronological
    let mut buckets: BTreeMap<BucketKey, (String, usize, usize)> = BTreeMap::new();

    for (day, instants) in expected {
        let entry = buckets
            .entry(bucketing.key_for(*day))
            .or_insert_with(|| (bucketing.label_for(*day), 0, 0));
        entry.1 += instants.len();
    }

    let covered: BTreeSet<NaiveDate> = expected.keys().copied().collect();
    for at in actual.iter().filter_map(acknowledged_at) {
        let day = at.date();
        if !covered.contains(&day) {
            continue;
        }
        if let Some(entry) = buckets.get_mut(&bucketing.key_for(day)) {
            entry.2 += 1;
        }
    }

    let max_scheduled = buckets
        .values()
        .map(|(_, scheduled, _)| *scheduled)
        .max()
        .unwrap_or(0)
        .max(axis_floor);

    let buckets = buckets
        .into_iter()
        .map(|(key, (label, _, taken))| ChartBucket {
            highlighted: highlight(&key),
            key,
            label,
            taken,
        })
        .collect();

    ChartSummary {
        buckets,
        max_scheduled,
    }
}
