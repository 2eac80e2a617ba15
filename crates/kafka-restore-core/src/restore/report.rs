use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use super::DayStats;

/// Summary of one restore run.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// Topic name used in the archive layout
    pub source_topic: String,

    /// Topic records were published to
    pub destination_topic: String,

    /// First day of the range
    pub start_date: NaiveDate,

    /// Last day of the range (inclusive)
    pub end_date: NaiveDate,

    /// Whether records went to an in-memory producer instead of Kafka
    pub dry_run: bool,

    /// Start time of restore (epoch milliseconds)
    pub start_time: i64,

    /// End time of restore (epoch milliseconds)
    pub end_time: i64,

    /// Duration in milliseconds
    pub duration_ms: u64,

    /// Per-day counters, in range order
    pub days: Vec<DayStats>,

    /// Archived objects replayed
    pub objects: u64,

    /// Records submitted to the producer
    pub records: u64,

    /// Bytes of archived content replayed
    pub bytes: u64,

    /// Records acknowledged by the broker
    pub delivered: u64,

    /// Records the producer gave up on
    pub failed: u64,

    /// Failed records written to the dead-letter object
    pub dead_lettered: u64,

    /// Key of the dead-letter object, if one was written
    pub dead_letter_key: Option<String>,

    /// Error returned when closing the producer
    pub close_error: Option<String>,

    /// Other problems that did not fail the run
    pub errors: Vec<String>,
}

impl RestoreReport {
    /// Sum of the per-day announced object counts
    pub fn announced_objects(&self) -> u64 {
        self.days.iter().map(|d| d.announced as u64).sum()
    }

    /// Average throughput (records/sec)
    pub fn throughput_records_per_sec(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        self.records as f64 / (self.duration_ms as f64 / 1000.0)
    }
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Restore of '{}' into '{}' for {} to {}{}",
            self.source_topic,
            self.destination_topic,
            self.start_date,
            self.end_date,
            if self.dry_run { " (dry run)" } else { "" }
        )?;
        for day in &self.days {
            writeln!(
                f,
                "  {}  objects={} records={} bytes={}",
                day.partition.date, day.objects, day.records, day.bytes
            )?;
        }
        writeln!(
            f,
            "Total: {} objects, {} records, {} bytes in {} ms ({:.0} rec/s)",
            self.objects,
            self.records,
            self.bytes,
            self.duration_ms,
            self.throughput_records_per_sec()
        )?;
        write!(
            f,
            "Delivery: {} delivered, {} failed",
            self.delivered, self.failed
        )?;
        if let Some(key) = &self.dead_letter_key {
            write!(f, ", {} dead-lettered to {}", self.dead_lettered, key)?;
        }
        if let Some(error) = &self.close_error {
            write!(f, "\nWarning: closing producer failed: {}", error)?;
        }
        for error in &self.errors {
            write!(f, "\nWarning: {}", error)?;
        }
        Ok(())
    }
}
