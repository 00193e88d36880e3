//! Reminder log persistence.
//!
//! Reminders are stored one per line in a JSONL (JSON Lines) file with
//! textual ISO-8601 timestamps. The log is append-only: acknowledging a
//! reminder appends a new row with the same id, and readers keep the latest
//! row per id. Every writer serializes on a sidecar `.lock` file so that
//! compaction can rename a fresh file over the log without losing appends.

use crate::calendar::{format_datetime, parse_datetime};
use crate::{Error, ReminderInstance, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;
/// Row format of the reminder log
#[derive(Debug, Serialize, Deserialize)]
struct StoredReminder {
    id: Uuid,
    medication_id: String,
    scheduled_at: String,
    #[serde(default)]
    is_taken: bool,
    #[serde(default)]
    taken_at: Option<String>,
}

impl From<&ReminderInstance> for StoredReminder {
    fn from(reminder: &ReminderInstance) -> Self {
        StoredReminder {
            id: reminder.id,
            medication_id: reminder.medication_id.clone(),
            scheduled_at: format_datetime(reminder.scheduled_at),
            is_taken: reminder.is_taken,
            taken_at: reminder.taken_at.map(format_datetime),
        }
    }
}

impl TryFrom<StoredReminder> for ReminderInstance {
    type Error = Error;

    fn try_from(row: StoredReminder) -> Result<Self> {
        let scheduled_at = parse_datetime(&row.scheduled_at)?;

        // A bad acknowledgment time doesn't invalidate the reminder itself;
        // it stays "taken" without a timestamp and is excluded from counts.
        let taken_at = match row.taken_at.as_deref() {
            None => None,
            Some(raw) => match parse_datetime(raw) {
                Ok(at) => Some(at),
                Err(e) => {
                    tracing::warn!("Reminder {} has unreadable taken_at: {}", row.id, e);
                    None
                }
            },
        };

        Ok(ReminderInstance {
            id: row.id,
            medication_id: row.medication_id,
            scheduled_at,
            is_taken: row.is_taken,
            taken_at,
        })
    }
}

/// Reminder sink trait for persisting reminders
pub trait ReminderSink {
    fn append(&mut self, reminders: &[ReminderInstance]) -> Result<()>;
}

/// One non-empty line of the log, with its raw text
enum LogLine {
    Row { reminder: ReminderInstance, raw: String },
    Unreadable(String),
}

/// Outcome of [`ReminderLog::compact`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    pub kept: usize,
    pub dropped: usize,
}

/// Advisory lock on the log's sidecar file, released on drop
struct LogLock {
    file: File,
}

impl Drop for LogLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release reminder log lock: {}", e);
        }
    }
}

/// JSONL-based reminder log with file locking
pub struct ReminderLog {
    path: PathBuf,
}

impl ReminderLog {
    /// Create a reminder log handle for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn lock(&self, exclusive: bool) -> Result<LogLock> {
        self.ensure_parent_dir()?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(self.lock_path())?;

        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }
        Ok(LogLock { file })
    }

    /// Read the current state of every reminder in the log
    ///
    /// Unparseable lines are logged and skipped. When an id appears more than
    /// once the latest row wins, at the position of its first appearance.
    pub fn read_all(&self) -> Result<Vec<ReminderInstance>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let _lock = self.lock(false)?;
        let reminders = fold_latest(self.scan()?);
        tracing::debug!("Read {} reminders from {:?}", reminders.len(), self.path);
        Ok(reminders)
    }

    /// Read-modify-append under one exclusive lock
    ///
    /// `change` sees the current state and returns the rows to append plus a
    /// value handed back to the caller. Nothing else can append between the
    /// read and the write.
    pub fn update<T, F>(&mut self, change: F) -> Result<T>
    where
        F: FnOnce(&[ReminderInstance]) -> Result<(Vec<ReminderInstance>, T)>,
    {
        let _lock = self.lock(true)?;
        let current = if self.path.exists() {
            fold_latest(self.scan()?)
        } else {
            Vec::new()
        };

        let (rows, value) = change(&current)?;
        self.append_unlocked(&rows)?;
        Ok(value)
    }

    /// Drop superseded rows, keeping everything else byte-for-byte
    ///
    /// Unreadable lines are carried over untouched. The new file is written
    /// next to the log, synced, then renamed over it.
    pub fn compact(&self) -> Result<CompactStats> {
        let _lock = self.lock(true)?;
        if !self.path.exists() {
            return Ok(CompactStats { kept: 0, dropped: 0 });
        }

        let lines = self.scan()?;
        let mut last_index = HashMap::new();
        for (index, line) in lines.iter().enumerate() {
            if let LogLine::Row { reminder, .. } = line {
                last_index.insert(reminder.id, index);
            }
        }

        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "reminder log path missing parent")
        })?;
        let temp = NamedTempFile::new_in(parent)?;

        let mut stats = CompactStats { kept: 0, dropped: 0 };
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            for (index, line) in lines.iter().enumerate() {
                let raw = match line {
                    LogLine::Row { reminder, raw } => {
                        if last_index.get(&reminder.id) != Some(&index) {
                            stats.dropped += 1;
                            continue;
                        }
                        raw
                    }
                    LogLine::Unreadable(raw) => raw,
                };
                writer.write_all(raw.as_bytes())?;
                writer.write_all(b"\n")?;
                stats.kept += 1;
            }
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::info!(
            "Compacted {:?}: kept {} lines, dropped {} superseded rows",
            self.path,
            stats.kept,
            stats.dropped
        );
        Ok(stats)
    }

    fn scan(&self) -> Result<Vec<LogLine>> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut lines = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            let parsed = serde_json::from_str::<StoredReminder>(&line)
                .map_err(Error::from)
                .and_then(ReminderInstance::try_from);

            match parsed {
                Ok(reminder) => lines.push(LogLine::Row { reminder, raw: line }),
                Err(e) => {
                    tracing::warn!("Skipping reminder at line {}: {}", line_num + 1, e);
                    lines.push(LogLine::Unreadable(line));
                }
            }
        }

        Ok(lines)
    }

    fn append_unlocked(&self, reminders: &[ReminderInstance]) -> Result<()> {
        if reminders.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        // A line cut off mid-write must not swallow the next row
        let needs_newline = ends_mid_line(&mut file)?;

        let mut writer = std::io::BufWriter::new(&file);
        if needs_newline {
            writer.write_all(b"\n")?;
        }
        write_rows(&mut writer, reminders)?;
        writer.flush()?;
        drop(writer);
        file.sync_all()?;

        tracing::debug!("Appended {} reminders to {:?}", reminders.len(), self.path);
        Ok(())
    }
}

impl ReminderSink for ReminderLog {
    fn append(&mut self, reminders: &[ReminderInstance]) -> Result<()> {
        if reminders.is_empty() {
            return Ok(());
        }

        let _lock = self.lock(true)?;
        self.append_unlocked(reminders)
    }
}

/// Latest row per id, in order of first appearance
fn fold_latest(lines: Vec<LogLine>) -> Vec<ReminderInstance> {
    let mut reminders: Vec<ReminderInstance> = Vec::new();
    let mut positions: HashMap<Uuid, usize> = HashMap::new();

    for line in lines {
        if let LogLine::Row { reminder, .. } = line {
            match positions.get(&reminder.id) {
                Some(&index) => reminders[index] = reminder,
                None => {
                    positions.insert(reminder.id, reminders.len());
                    reminders.push(reminder);
                }
            }
        }
    }

    reminders
}

fn ends_mid_line(file: &mut File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn write_rows<W: Write>(writer: &mut W, reminders: &[ReminderInstance]) -> Result<()> {
    for reminder in reminders {
        let line = serde_json::to_string(&StoredReminder::from(reminder))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn instant(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_append_and_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut log = ReminderLog::new(temp_dir.path().join("reminders.jsonl"));

        let pending = ReminderInstance::pending("med", instant(10, 9));
        let mut taken = ReminderInstance::pending("med", instant(10, 21));
        taken.mark_taken(instant(10, 22));

        log.append(&[pending.clone(), taken.clone()]).unwrap();

        let read = log.read_all().unwrap();
        assert_eq!(read, vec![pending, taken]);
    }

    #[test]
    fn test_read_missing_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = ReminderLog::new(temp_dir.path().join("nonexistent.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_rows_use_iso_text() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut log = ReminderLog::new(temp_dir.path().join("reminders.jsonl"));
        log.append(&[ReminderInstance::pending("med", instant(10, 9))])
            .unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains(r#""scheduled_at":"2024-03-10T09:00:00""#));
    }

    #[test]
    fn test_corrupted_lines_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reminders.jsonl");
        let id = Uuid::new_v4();
        std::fs::write(
            &path,
            format!(
                "{{ invalid json }}\n\
                 {{\"id\":\"{}\",\"medication_id\":\"med\",\"scheduled_at\":\"not a date\"}}\n\
                 {{\"id\":\"{}\",\"medication_id\":\"med\",\"scheduled_at\":\"2024-03-10T09:00:00\"}}\n",
                Uuid::new_v4(),
                id
            ),
        )
        .unwrap();

        let read = ReminderLog::new(&path).read_all().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, id);
        assert!(!read[0].is_taken);
    }

    #[test]
    fn test_unreadable_taken_at_kept_without_timestamp() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reminders.jsonl");
        std::fs::write(
            &path,
            format!(
                "{{\"id\":\"{}\",\"medication_id\":\"med\",\"scheduled_at\":\"2024-03-10T09:00:00\",\"is_taken\":true,\"taken_at\":\"garbage\"}}\n",
                Uuid::new_v4()
            ),
        )
        .unwrap();

        let read = ReminderLog::new(&path).read_all().unwrap();
        assert_eq!(read.len(), 1);
        assert!(read[0].is_taken);
        assert_eq!(read[0].taken_at, None);
    }

    #[test]
    fn test_update_appends_latest_row() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut log = ReminderLog::new(temp_dir.path().join("reminders.jsonl"));

        let reminders = vec![
            ReminderInstance::pending("med", instant(10, 9)),
            ReminderInstance::pending("med", instant(10, 21)),
        ];
        log.append(&reminders).unwrap();

        let taken_id = log
            .update(|current| {
                let mut first = current[0].clone();
                first.mark_taken(instant(10, 9));
                let id = first.id;
                Ok((vec![first], id))
            })
            .unwrap();
        assert_eq!(taken_id, reminders[0].id);

        // Three rows on disk, two reminders after folding
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 3);

        let read = log.read_all().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].id, reminders[0].id);
        assert!(read[0].is_taken);
        assert_eq!(read[1], reminders[1]);
    }

    #[test]
    fn test_update_error_appends_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut log = ReminderLog::new(temp_dir.path().join("reminders.jsonl"));
        log.append(&[ReminderInstance::pending("med", instant(10, 9))])
            .unwrap();

        let result: Result<()> = log.update(|_| Err(Error::Other("nope".into())));
        assert!(result.is_err());

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn test_update_keeps_unreadable_lines_verbatim() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reminders.jsonl");
        let bad_taken_at = format!(
            "{{\"id\":\"{}\",\"medication_id\":\"med\",\"scheduled_at\":\"2024-03-09T21:00:00\",\"is_taken\":true,\"taken_at\":\"2024-03-09 9:05pm\"}}",
            Uuid::new_v4()
        );
        std::fs::write(&path, format!("{}\n{{\"id\":\"trunc", bad_taken_at)).unwrap();

        let mut log = ReminderLog::new(&path);
        let added = ReminderInstance::pending("med", instant(10, 9));
        log.update(|_| Ok((vec![added.clone()], ()))).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], bad_taken_at);
        assert_eq!(lines[1], r#"{"id":"trunc"#);

        // The row after the truncated line is still readable
        let read = log.read_all().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[1], added);
    }

    #[test]
    fn test_appends_from_separate_handles_both_kept() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reminders.jsonl");
        let mut first = ReminderLog::new(&path);
        let mut second = ReminderLog::new(&path);

        first
            .append(&[ReminderInstance::pending("a", instant(10, 9))])
            .unwrap();
        let snapshot = first.read_all().unwrap();
        second
            .append(&[ReminderInstance::pending("b", instant(10, 9))])
            .unwrap();

        let mut acknowledged = snapshot[0].clone();
        acknowledged.mark_taken(instant(10, 10));
        first.append(&[acknowledged]).unwrap();

        let read = first.read_all().unwrap();
        assert_eq!(read.len(), 2);
        assert!(read[0].is_taken);
        assert_eq!(read[1].medication_id, "b");
    }

    #[test]
    fn test_concurrent_updates_serialize() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reminders.jsonl");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut log = ReminderLog::new(path);
                    log.update(|current| {
                        let reminder = ReminderInstance::pending("med", instant(1 + i, 9));
                        Ok((vec![reminder], current.len()))
                    })
                    .unwrap()
                })
            })
            .collect();

        let mut seen: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seen.sort_unstable();

        // Each update saw every earlier one
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        assert_eq!(ReminderLog::new(&path).read_all().unwrap().len(), 8);
    }

    #[test]
    fn test_compact_drops_superseded_rows_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reminders.jsonl");
        let mut log = ReminderLog::new(&path);

        let mut reminder = ReminderInstance::pending("med", instant(10, 9));
        log.append(&[reminder.clone()]).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"garbage\n")
            .unwrap();
        reminder.mark_taken(instant(10, 9));
        log.append(&[reminder.clone()]).unwrap();

        let stats = log.compact().unwrap();
        assert_eq!(stats, CompactStats { kept: 2, dropped: 1 });

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("garbage"));
        assert_eq!(log.read_all().unwrap(), vec![reminder]);

        // Only the log and its lock file remain, no stray temp files
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_compact_missing_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = ReminderLog::new(temp_dir.path().join("reminders.jsonl"));
        assert_eq!(log.compact().unwrap(), CompactStats { kept: 0, dropped: 0 });
    }
}
