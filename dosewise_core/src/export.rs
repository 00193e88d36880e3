//! CSV export of the reminder history.

use crate::calendar::format_datetime;
use crate::{ReminderInstance, Result};
use std::fs::File;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    medication_id: String,
    scheduled_at: String,
    is_taken: bool,
    taken_at: Option<String>,
    /// Minutes between schedule and acknowledgment; negative when early
    delay_minutes: Option<i64>,
}

impl From<&ReminderInstance> for CsvRow {
    fn from(reminder: &ReminderInstance) -> Self {
        let taken_at = reminder.taken_at.filter(|_| reminder.is_taken);
        CsvRow {
            id: reminder.id.to_string(),
            medication_id: reminder.medication_id.clone(),
            scheduled_at: format_datetime(reminder.scheduled_at),
            is_taken: reminder.is_taken,
            taken_at: taken_at.map(format_datetime),
            delay_minutes: taken_at.map(|at| (at - reminder.scheduled_at).num_minutes()),
        }
    }
}

/// Write reminders to a CSV file, ordered by scheduled time
///
/// The file is replaced and synced to disk. Returns the number of rows
/// written.
pub fn export_history_csv(reminders: &[ReminderInstance], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut ordered: Vec<&ReminderInstance> = reminders.iter().collect();
    ordered.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.medication_id.cmp(&b.medication_id))
    });

    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(file);

    for reminder in &ordered {
        writer.serialize(CsvRow::from(*reminder))?;
    }

    // Flush and sync to disk
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} reminders to {:?}", ordered.len(), path);
    Ok(ordered.len())
}
