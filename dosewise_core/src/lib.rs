#![forbid(unsafe_code)]

//! Core domain model and business logic for Dosewise.
//!
//! This crate provides:
//! - Domain types (medications, schedules, reminders, progress)
//! - Reminder schedule generation (per day and per period)
//! - Dose reconciliation (daily progress and chart buckets)
//! - Persistence (medication registry, reminder log, CSV export)

pub mod types;
pub mod error;
pub mod calendar;
pub mod config;
pub mod logging;
pub mod expander;
pub mod generator;
pub mod reconcile;
pub mod registry;
pub mod reminders;
pub mod store;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use expander::expand;
pub use generator::{generate, generate_day, ExpectedDoses};
pub use reconcile::{aggregate, aggregate_with_floor, daily_progress};
pub use registry::{MedicationEntry, Registry};
pub use reminders::{mark_taken, materialize, take_dose};
pub use store::{CompactStats, ReminderLog, ReminderSink};
pub use export::export_history_csv;
