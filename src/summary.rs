//! Run summary: what was scanned, kept, and skipped.
//!
//! Every skip decision the drive loop makes is counted here, so data loss
//! that the run tolerates is still visible afterwards. The summary can be
//! printed for humans or saved as JSON.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Why the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every listed partition was processed or skipped.
    #[default]
    Exhausted,
    /// The prefix policy reached its bound.
    PrefixComplete,
    /// The stop signal was raised.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exhausted => "exhausted",
            Self::PrefixComplete => "prefix complete",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Final counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub partitions_listed: u64,
    pub partitions_completed: u64,
    pub partitions_skipped_transient: u64,
    pub partitions_skipped_permanent: u64,
    pub chunks_fetched: u64,
    pub bytes_fetched: u64,
    pub retries: u64,
    pub lines_scanned: u64,
    pub blank_lines: u64,
    pub decode_errors: u64,
    /// Carry fragments dropped because their partition was abandoned.
    pub fragments_discarded: u64,
    pub matches_seen: u64,
    pub rows_written: u64,
    pub stop_reason: StopReason,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

impl RunSummary {
    /// Partitions that were not read to the end.
    #[must_use]
    pub const fn partitions_skipped(&self) -> u64 {
        self.partitions_skipped_transient + self.partitions_skipped_permanent
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Print the summary to stdout in a human-readable format.
    pub fn print(&self) {
        println!("\n============ Run Summary =============");
        println!(
            "Elapsed: {:.3}s ({} ms), stopped: {}",
            self.elapsed.as_secs_f64(),
            self.elapsed.as_millis(),
            self.stop_reason
        );
        println!("--------------------------------------");
        println!(
            "partitions: {} listed, {} completed, {} skipped ({} transient, {} permanent)",
            self.partitions_listed,
            self.partitions_completed,
            self.partitions_skipped(),
            self.partitions_skipped_transient,
            self.partitions_skipped_permanent
        );
        println!(
            "fetch: {} chunks, {} bytes, {} retries",
            self.chunks_fetched, self.bytes_fetched, self.retries
        );
        println!(
            "lines: {} scanned, {} blank, {} undecodable, {} fragments discarded",
            self.lines_scanned, self.blank_lines, self.decode_errors, self.fragments_discarded
        );
        println!(
            "records: {} matched, {} written",
            self.matches_seen, self.rows_written
        );
        println!("======================================\n");
    }

    /// Save the summary as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let formatted = serde_json::to_string_pretty(self)?;
        file.write_all(formatted.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines scanned, {} matches, {} rows written, {} partitions skipped in {:.1}s ({})",
            self.lines_scanned,
            self.matches_seen,
            self.rows_written,
            self.partitions_skipped(),
            self.elapsed.as_secs_f64(),
            self.stop_reason
        )
    }
}
