//! Tests for the run summary.

use anyhow::Result;
use linesieve::summary::{RunSummary, StopReason};
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;

fn sample() -> RunSummary {
    RunSummary {
        partitions_listed: 4,
        partitions_completed: 2,
        partitions_skipped_transient: 1,
        partitions_skipped_permanent: 1,
        lines_scanned: 1000,
        matches_seen: 12,
        rows_written: 10,
        stop_reason: StopReason::PrefixComplete,
        elapsed: Duration::from_millis(1534),
        ..RunSummary::default()
    }
}

#[test]
fn test_json_shape() {
    let value = sample().to_json();
    assert_eq!(value["partitions_listed"], json!(4));
    assert_eq!(value["stop_reason"], json!("prefix_complete"));
    assert_eq!(value["elapsed_ms"], json!(1534));
    assert!(value.get("elapsed").is_none());
}

#[test]
fn test_skipped_total_and_display() {
    let summary = sample();
    assert_eq!(summary.partitions_skipped(), 2);
    let line = summary.to_string();
    assert!(line.contains("1000 lines scanned"));
    assert!(line.contains("prefix complete"));
}

#[test]
fn test_save_to_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("summary.json");
    sample().save_to_file(&path)?;

    let loaded: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(loaded, sample().to_json());
    Ok(())
}
