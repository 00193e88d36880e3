//! Core domain types for the Dosewise reminder engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Medications and their validity windows
//! - Schedule definitions (fixed times, custom alarms, intervals)
//! - Reminder instances read back from the reminder log
//! - Reconciliation outputs (progress and chart buckets)

use crate::calendar;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Medication
// ============================================================================

/// A medication and the window during which its schedule is active
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Time of day of the first dose; anchors continuous intervals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
}

impl Medication {
    /// Create an open-ended medication starting at midnight of `start_date`
    pub fn new(id: impl Into<String>, name: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            start_date,
            end_date: None,
            start_time: None,
        }
    }

    /// The instant continuous interval cadences are counted from
    pub fn anchor(&self) -> NaiveDateTime {
        self.start_date
            .and_time(self.start_time.unwrap_or(NaiveTime::MIN))
    }
}

// ============================================================================
// Schedule Definitions
// ============================================================================

/// Optional time-of-day bounds for a daily-bounded interval
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyWindow {
    #[serde(deserialize_with = "clock_time")]
    pub start: NaiveTime,
    /// Exclusive upper bound; `None` means local midnight.
    #[serde(
        default,
        deserialize_with = "optional_clock_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<NaiveTime>,
}

/// Declarative dosing rule attached to a medication
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleDefinition {
    /// The same clock times every day, optionally only on some weekdays
    FixedDailyTimes {
        #[serde(deserialize_with = "clock_times")]
        times: BTreeSet<NaiveTime>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weekdays: Option<Vec<Weekday>>,
    },
    /// A user-curated list of alarm times recurring every day
    CustomTimes {
        #[serde(deserialize_with = "clock_times")]
        times: BTreeSet<NaiveTime>,
    },
    /// A dose every `every_hours`h `every_minutes`m
    ///
    /// Without a window the cadence runs continuously from the medication's
    /// anchor; with a window it restarts each day at `window.start`.
    Interval {
        #[serde(default)]
        every_hours: u32,
        #[serde(default)]
        every_minutes: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window: Option<DailyWindow>,
    },
}

// Clock times are written by hand in the registry, so `08:00` is accepted
// alongside `08:00:00`.

fn clock_time<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<NaiveTime, D::Error> {
    let raw = String::deserialize(d)?;
    calendar::parse_time(&raw).map_err(serde::de::Error::custom)
}

fn optional_clock_time<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<NaiveTime>, D::Error> {
    Option::<String>::deserialize(d)?
        .map(|raw| calendar::parse_time(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

fn clock_times<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<BTreeSet<NaiveTime>, D::Error> {
    Vec::<String>::deserialize(d)?
        .iter()
        .map(|raw| calendar::parse_time(raw).map_err(serde::de::Error::custom))
        .collect()
}

impl ScheduleDefinition {
    /// Short human-readable name of the schedule kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            ScheduleDefinition::FixedDailyTimes { .. } => "fixed daily times",
            ScheduleDefinition::CustomTimes { .. } => "custom times",
            ScheduleDefinition::Interval { window: None, .. } => "continuous interval",
            ScheduleDefinition::Interval { window: Some(_), .. } => "daily interval",
        }
    }
}

// ============================================================================
// Reminder Instances
// ============================================================================

/// A concrete reminder created ahead of time by the materializer
#[derive(Clone, Debug, PartialEq)]
pub struct ReminderInstance {
    pub id: Uuid,
    pub medication_id: String,
    pub scheduled_at: NaiveDateTime,
    pub is_taken: bool,
    /// Acknowledgment time; only meaningful when `is_taken`.
    pub taken_at: Option<NaiveDateTime>,
}

impl ReminderInstance {
    /// Create a pending reminder
    pub fn pending(medication_id: impl Into<String>, scheduled_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_id: medication_id.into(),
            scheduled_at,
            is_taken: false,
            taken_at: None,
        }
    }

    /// Acknowledge this reminder at `at`
    pub fn mark_taken(&mut self, at: NaiveDateTime) {
        self.is_taken = true;
        self.taken_at = Some(at);
    }
}

// ============================================================================
// Reconciliation Outputs
// ============================================================================

/// Adherence for a single day
#[derive(Clone, Debug, PartialEq)]
pub struct DoseProgress {
    pub total_expected: usize,
    pub taken: usize,
    pub remaining: usize,
    pub fraction: f64,
    pub label: String,
}

impl DoseProgress {
    /// Build progress from raw counts
    ///
    /// Over-logging (`taken > total_expected`) clamps `remaining` at zero and
    /// `fraction` at one.
    pub fn new(total_expected: usize, taken: usize) -> Self {
        let fraction = if total_expected == 0 {
            0.0
        } else {
            (taken as f64 / total_expected as f64).clamp(0.0, 1.0)
        };

        Self {
            total_expected,
            taken,
            remaining: total_expected.saturating_sub(taken),
            fraction,
            label: format!("{} / {}", taken, total_expected),
        }
    }

    /// Whether every expected dose has been taken
    pub fn is_complete(&self) -> bool {
        self.total_expected > 0 && self.remaining == 0
    }
}

impl fmt::Display for DoseProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.0}%)", self.label, self.fraction * 100.0)
    }
}

/// Granularity of chart buckets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucketing {
    ByDay,
    ByMonth,
}

/// Identity of a chart bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
}

/// One bar of an adherence chart
#[derive(Clone, Debug, PartialEq)]
pub struct ChartBucket {
    pub key: BucketKey,
    pub label: String,
    /// Doses actually taken within the bucket
    pub taken: usize,
    pub highlighted: bool,
}

/// Chart buckets plus the axis scale for the period
#[derive(Clone, Debug, PartialEq)]
pub struct ChartSummary {
    pub buckets: Vec<ChartBucket>,
    pub max_scheduled: usize,
}
