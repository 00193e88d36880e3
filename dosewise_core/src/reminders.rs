//! Materializing expected doses into concrete reminders, and acknowledging
//! them.

use crate::calendar;
use crate::generator::generate;
use crate::{Medication, ReminderInstance, Result, ScheduleDefinition};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use uuid::Uuid;

/// Create pending reminders for every expected instant in `[from, to]` that
/// `existing` doesn't already cover
///
/// Reminders are matched on medication id and scheduled instant, so running
/// this repeatedly over overlapping ranges never duplicates a reminder.
pub fn materialize(
    medication: &Medication,
    schedule: &ScheduleDefinition,
    from: NaiveDate,
    to: NaiveDate,
    existing: &[ReminderInstance],
) -> Result<Vec<ReminderInstance>> {
    let known: HashSet<NaiveDateTime> = existing
        .iter()
        .filter(|r| r.medication_id == medication.id)
        .map(|r| r.scheduled_at)
        .collect();

    let created: Vec<_> = generate(medication, schedule, from, to)?
        .into_values()
        .flatten()
        .filter(|instant| !known.contains(instant))
        .map(|instant| ReminderInstance::pending(medication.id.clone(), instant))
        .collect();

    tracing::info!(
        "Materialized {} new reminders for {} between {} and {}",
        created.len(),
        medication.id,
        from,
        to
    );

    Ok(created)
}

/// Reminders of one medication scheduled on `day`, in schedule order
pub fn reminders_on<'a>(
    reminders: &'a [ReminderInstance],
    medication_id: &'a str,
    day: NaiveDate,
) -> impl Iterator<Item = &'a ReminderInstance> + 'a {
    reminders
        .iter()
        .filter(move |r| r.medication_id == medication_id)
        .filter(move |r| calendar::is_within_day(r.scheduled_at, day))
}

/// Acknowledge the next pending reminder of `medication_id` at `now`
///
/// Picks the earliest pending reminder on `now`'s date that is already due;
/// if none is due yet, the earliest pending one later that day. Returns the
/// id of the acknowledged reminder, or `None` when nothing is pending.
pub fn mark_taken(
    reminders: &mut [ReminderInstance],
    medication_id: &str,
    now: NaiveDateTime,
) -> Option<Uuid> {
    let day = now.date();

    let candidate = reminders
        .iter_mut()
        .filter(|r| r.medication_id == medication_id && !r.is_taken)
        .filter(|r| calendar::is_within_day(r.scheduled_at, day))
        .min_by_key(|r| (r.scheduled_at > now, r.scheduled_at))?;

    candidate.mark_taken(now);
    tracing::info!(
        "Marked reminder {} ({}) for {} as taken at {}",
        candidate.id,
        candidate.scheduled_at,
        medication_id,
        now
    );
    Some(candidate.id)
}

/// Rows to append to the reminder log to record a dose of `medication`
/// taken at `now`
///
/// Reminders for `now`'s date that `existing` lacks are materialized first.
/// The returned rows hold each new or changed reminder once; the second value
/// is the acknowledged reminder, `None` when nothing was pending that day.
pub fn take_dose(
    medication: &Medication,
    schedule: &ScheduleDefinition,
    existing: &[ReminderInstance],
    now: NaiveDateTime,
) -> Result<(Vec<ReminderInstance>, Option<ReminderInstance>)> {
    let day = now.date();
    let mut rows = materialize(medication, schedule, day, day, existing)?;

    let mut candidates: Vec<ReminderInstance> = reminders_on(existing, &medication.id, day)
        .cloned()
        .chain(rows.iter().cloned())
        .collect();
    let taken = mark_taken(&mut candidates, &medication.id, now)
        .and_then(|id| candidates.into_iter().find(|r| r.id == id));

    if let Some(taken) = &taken {
        match rows.iter_mut().find(|r| r.id == taken.id) {
            Some(slot) => *slot = taken.clone(),
            None => rows.push(taken.clone()),
        }
    }

    Ok((rows, taken))
}
