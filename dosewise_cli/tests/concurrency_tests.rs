//! Concurrency tests for dosewise.
//!
//! These tests verify that multiple processes can safely:
//! - Materialize and acknowledge reminders simultaneously (file locking)
//! - Acknowledge doses of the same medication at the same time
//! - Compact the reminder log while doses are being recorded

use assert_cmd::Command;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const REGISTRY: &str = r#"
[[medication]]
id = "vitamin_d"
name = "Vitamin D"
start_date = "2024-03-01"

[medication.schedule]
kind = "fixed_daily_times"
times = ["09:00", "21:00"]
"#;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("dosewise"))
}

fn setup_test_dir() -> TempDir {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("medications.toml"), REGISTRY)
        .expect("Failed to write registry");
    temp_dir
}

fn take(data_dir: &Path, at: &str) {
    cli()
        .arg("take")
        .arg("vitamin_d")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--at")
        .arg(at)
        .assert()
        .success();
}

/// Latest `is_taken` per reminder id, reading the log the way the store does
fn folded_log(data_dir: &Path) -> HashMap<String, bool> {
    let content =
        fs::read_to_string(data_dir.join("reminders.jsonl")).expect("Failed to read log");

    let mut state = HashMap::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let row: serde_json::Value = serde_json::from_str(line).expect("Corrupted log line");
        let id = row["id"].as_str().expect("Row without id").to_string();
        state.insert(id, row["is_taken"].as_bool().unwrap_or(false));
    }
    state
}

#[test]
fn test_materialize_and_take_together() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let materialize_dir = data_dir.clone();
    let materialize_handle = thread::spawn(move || {
        cli()
            .arg("materialize")
            .arg("--data-dir")
            .arg(&materialize_dir)
            .arg("--date")
            .arg("2024-03-01")
            .arg("--days")
            .arg("10")
            .assert()
            .success();
    });

    let take_handles: Vec<_> = (20..25)
        .map(|day| {
            let dir: PathBuf = data_dir.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis((day - 20) * 5));
                take(&dir, &format!("2024-03-{}T09:30:00", day));
            })
        })
        .collect();

    materialize_handle.join().expect("Materialize thread panicked");
    for handle in take_handles {
        handle.join().expect("Take thread panicked");
    }

    // 20 materialized reminders plus 2 per day taken on 03-20..03-24
    let state = folded_log(&data_dir);
    assert_eq!(state.len(), 30, "Rows were lost: {}", state.len());
    assert_eq!(state.values().filter(|taken| **taken).count(), 5);
}

#[test]
fn test_simultaneous_takes_acknowledge_different_doses() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let dir = data_dir.clone();
            thread::spawn(move || take(&dir, "2024-03-10T21:30:00"))
        })
        .collect();

    for handle in handles {
        handle.join().expect("Take thread panicked");
    }

    // Both doses of the day are taken, neither acknowledged twice
    let state = folded_log(&data_dir);
    assert_eq!(state.len(), 2);
    assert!(state.values().all(|taken| *taken));
}

#[test]
fn test_compact_while_taking() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .arg("materialize")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--date")
        .arg("2024-03-01")
        .arg("--days")
        .arg("5")
        .assert()
        .success();

    let compact_dir = data_dir.clone();
    let compact_handle = thread::spawn(move || {
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(5));
            cli()
                .arg("compact")
                .arg("--data-dir")
                .arg(&compact_dir)
                .assert()
                .success();
        }
    });

    let take_handles: Vec<_> = (1..6)
        .map(|day| {
            let dir = data_dir.clone();
            thread::spawn(move || take(&dir, &format!("2024-03-0{}T09:30:00", day)))
        })
        .collect();

    compact_handle.join().expect("Compact thread panicked");
    for handle in take_handles {
        handle.join().expect("Take thread panicked");
    }

    // No acknowledgment was lost to a compaction
    let state = folded_log(&data_dir);
    assert_eq!(state.len(), 10);
    assert_eq!(state.values().filter(|taken| **taken).count(), 5);
}
