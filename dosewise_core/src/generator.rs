//! Period generation across a medication's validity window.
//!
//! Drives the schedule expander over every day of a requested range after
//! intersecting it with the medication's `[start_date, end_date]` window.

use crate::calendar;
use crate::expander;
use crate::{Medication, Result, ScheduleDefinition};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Expected reminder instants keyed by calendar day
pub type ExpectedDoses = BTreeMap<NaiveDate, Vec<NaiveDateTime>>;

/// Generate the expected instants for `[period_start, period_end]`
///
/// Every day of the clipped range gets an entry, including days with no
/// doses. A range entirely outside the validity window yields an empty map.
pub fn generate(
    medication: &Medication,
    schedule: &ScheduleDefinition,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Result<ExpectedDoses> {
    expander::validate(schedule)?;

    let mut expected = ExpectedDoses::new();

    if let Some(end_date) = medication.end_date {
        if end_date < medication.start_date {
            tracing::warn!(
                "Medication {} ends ({}) before it starts ({}); no valid days",
                medication.id,
                end_date,
                medication.start_date
            );
            return Ok(expected);
        }
    }

    let Some((start, end)) = calendar::clip(
        period_start,
        period_end,
        medication.start_date,
        medication.end_date,
    ) else {
        tracing::debug!(
            "Period {}..={} is outside the validity window of {}",
            period_start,
            period_end,
            medication.id
        );
        return Ok(expected);
    };

    let anchor = medication.anchor();
    for day in calendar::days_inclusive(start, end) {
        let instants = expander::expand(schedule, day, anchor)?;
        expected.insert(day, instants);
    }

    tracing::debug!(
        "Generated {} doses over {} days for {} ({})",
        expected.values().map(Vec::len).sum::<usize>(),
        expected.len(),
        medication.id,
        schedule.kind_name()
    );

    Ok(expected)
}

/// Generate the expected instants for a single day
pub fn generate_day(
    medication: &Medication,
    schedule: &ScheduleDefinition,
    day: NaiveDate,
) -> Result<Vec<NaiveDateTime>> {
    let mut expected = generate(medication, schedule, day, day)?;
    Ok(expected.remove(&day).unwrap_or_default())
}
