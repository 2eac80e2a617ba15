//! Restore pipeline.
//!
//! ```text
//! DateRangeDriver --DayCount, ObjectBuffer--> Replayer --send--> Producer
//!                                                                   |
//!                                  AcknowledgementMonitor <--reports-+
//! ```

mod barrier;
mod driver;
pub mod engine;
mod monitor;
mod replayer;
mod report;

pub use barrier::CompletionBarrier;
pub use driver::{DateRangeDriver, DayCount, RetrievalSummary};
pub use engine::RestoreEngine;
pub use monitor::{dead_letter_key, AcknowledgementMonitor, MonitorSummary};
pub use replayer::{DayStats, Records, Replayer};
pub use report::RestoreReport;

use chrono::NaiveDate;
use serde::Serialize;

/// Lifecycle of one run.
///
/// `Idle → Retrieving{0} → … → Retrieving{K} → Draining → Closed`, or
/// `Aborted` straight from any `Retrieving` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Retrieving { day: usize, date: NaiveDate },
    Draining,
    Closed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Closed | RunState::Aborted)
    }
}
