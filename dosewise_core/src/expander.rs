//! Schedule expansion for a single calendar day.
//!
//! This module turns one [`ScheduleDefinition`] into the reminder instants a
//! given day contributes:
//! - Fixed daily times: every listed time, optionally filtered by weekday
//! - Custom times: every listed time, every day
//! - Daily-bounded interval: restarts at the window start each day
//! - Continuous interval: counted from the medication anchor across midnight

use crate::calendar::{self, end_of_day, start_of_day};
use crate::{DailyWindow, Error, Result, ScheduleDefinition};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use std::collections::BTreeSet;

/// Reject schedules whose parameters would never terminate or contradict
/// themselves
pub fn validate(schedule: &ScheduleDefinition) -> Result<()> {
    if let ScheduleDefinition::Interval {
        every_hours,
        every_minutes,
        window,
    } = schedule
    {
        interval_step(*every_hours, *every_minutes)?;

        if let Some(DailyWindow {
            start,
            end: Some(end),
        }) = window
        {
            if start > end {
                return Err(Error::Schedule(format!(
                    "Daily window starts at {} but ends earlier at {}",
                    start, end
                )));
            }
        }
    }

    Ok(())
}

/// Instants that `schedule` contributes to `day`, ascending
///
/// Every returned instant lies within `[day 00:00, day+1 00:00)`. `anchor` is
/// only consulted for continuous intervals.
pub fn expand(
    schedule: &ScheduleDefinition,
    day: NaiveDate,
    anchor: NaiveDateTime,
) -> Result<Vec<NaiveDateTime>> {
    validate(schedule)?;

    let instants = match schedule {
        ScheduleDefinition::FixedDailyTimes { times, weekdays } => {
            match weekdays.as_deref() {
                Some(days) if !days.is_empty() && !calendar::is_on_weekday(day, days) => {
                    Vec::new()
                }
                _ => times_on(times, day),
            }
        }

        ScheduleDefinition::CustomTimes { times } => times_on(times, day),

        ScheduleDefinition::Interval {
            every_hours,
            every_minutes,
            window,
        } => {
            let step = interval_step(*every_hours, *every_minutes)?;
            match window {
                Some(window) => bounded_interval(window, step, day),
                None => continuous_interval(anchor, step, day),
            }
        }
    };

    Ok(instants)
}

/// Step between doses of an interval schedule
fn interval_step(every_hours: u32, every_minutes: u32) -> Result<Duration> {
    let minutes = i64::from(every_hours) * 60 + i64::from(every_minutes);
    if minutes == 0 {
        return Err(Error::Schedule(
            "Interval step must be longer than zero minutes".into(),
        ));
    }
    Ok(Duration::minutes(minutes))
}

/// Times of day placed on `day`; the set is already ordered and deduplicated
fn times_on(times: &BTreeSet<NaiveTime>, day: NaiveDate) -> Vec<NaiveDateTime> {
    times.iter().map(|t| calendar::at(day, *t)).collect()
}

/// Cadence restarting at the window start, stopping at the window end or
/// midnight
fn bounded_interval(window: &DailyWindow, step: Duration, day: NaiveDate) -> Vec<NaiveDateTime> {
    let limit = match window.end {
        Some(end) => calendar::at(day, end),
        None => end_of_day(day),
    };

    let mut instants = Vec::new();
    let mut current = calendar::at(day, window.start);

    while current < limit {
        instants.push(current);
        current = match current.checked_add_signed(step) {
            Some(next) => next,
            None => break,
        };
    }

    instants
}

/// Cadence counted from `anchor` without resetting at midnight
///
/// Jumps straight to the first step at or after the day's midnight, so the
/// cost does not grow with the distance from the anchor.
fn continuous_interval(anchor: NaiveDateTime, step: Duration, day: NaiveDate) -> Vec<NaiveDateTime> {
    let day_start = start_of_day(day);
    let day_end = end_of_day(day);

    if anchor >= day_end {
        return Vec::new();
    }

    let first = if anchor >= day_start {
        Some(anchor)
    } else {
        first_step_at_or_after(anchor, step, day_start)
    };

    let mut instants = Vec::new();
    let mut current = match first {
        Some(first) => first,
        None => return instants,
    };

    while current < day_end {
        instants.push(current);
        current = match current.checked_add_signed(step) {
            Some(next) => next,
            None => break,
        };
    }

    instants
}

/// Smallest `anchor + k * step` that is `>= target`, for `target > anchor`
fn first_step_at_or_after(
    anchor: NaiveDateTime,
    step: Duration,
    target: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let step_secs = step.num_seconds();
    let elapsed_secs = (target - anchor).num_seconds();
    // Sub-second anchors can leave the ceiling one step short of `target`.
    let mut steps = (elapsed_secs + step_secs - 1) / step_secs;

    let offset = |steps: i64| Duration::try_seconds(steps.checked_mul(step_secs)?);

    let mut candidate = anchor.checked_add_signed(offset(steps)?)?;
    if candidate < target {
        steps += 1;
        candidate = anchor.checked_add_signed(offset(steps)?)?;
    }

    Some(candidate)
}

/// Weekdays a fixed-times schedule fires on, for display
pub fn active_weekdays(schedule: &ScheduleDefinition) -> Option<&[Weekday]> {
    match schedule {
        ScheduleDefinition::FixedDailyTimes {
            weekdays: Some(days),
            ..
        } if !days.is_empty() => Some(days.as_slice()),
        _ => None,
    }
}
