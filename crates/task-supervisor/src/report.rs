//! Result and statistics types returned by the supervisor.

use crate::error::TaskError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Execution metadata attached to every supervised outcome.
#[derive(Debug, Clone)]
pub struct TaskMetadata {
    /// Unique id of this supervised execution.
    pub task_id: Uuid,
    /// Component tag the policy was selected by.
    pub component: String,
    /// Total attempts made (initial attempt plus retries).
    pub attempts: u32,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// Total wall-clock time across all attempts.
    pub duration: Duration,
    /// Region set this execution was tagged with, if any.
    pub regions: Vec<String>,
}

/// Outcome of one supervised operation.
#[derive(Debug)]
pub struct TaskReport<T> {
    /// The operation's value, or the failure the supervisor recorded.
    pub outcome: Result<T, TaskError>,
    /// Execution metadata.
    pub metadata: TaskMetadata,
}

impl<T> TaskReport<T> {
    /// Whether the operation ultimately succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Aggregated counts for a batch execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Number of operations submitted.
    pub total: usize,
    /// Number of operations that succeeded.
    pub success: usize,
    /// Number of operations that failed.
    pub errors: usize,
    /// `success / total`, or 1.0 for an empty batch.
    pub success_rate: f64,
}

/// Outcome of a batch execution: per-item reports plus the summary.
#[derive(Debug)]
pub struct BatchReport<T> {
    /// Per-item reports, in submission order.
    pub reports: Vec<TaskReport<T>>,
    /// Aggregated counts.
    pub summary: BatchSummary,
}

/// Snapshot of the supervisor's running counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SupervisorStats {
    /// Operations submitted since construction.
    pub total: u64,
    /// Operations currently tracked as in flight.
    pub active: usize,
    /// Operations that completed successfully.
    pub resolved: u64,
    /// Operations that ultimately failed.
    pub rejected: u64,
    /// Operations whose final failure was a timeout.
    pub timed_out: u64,
    /// Batches processed to completion.
    pub batches_processed: u64,
    /// Bookkeeping entries removed by the stale sweep.
    pub swept: u64,
}
