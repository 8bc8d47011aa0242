//! Error type for supervised operations.

use std::time::Duration;
use thiserror::Error;

/// Failure of a supervised operation.
///
/// The supervisor converts every failure mode of the wrapped operation into
/// one of these variants; it never panics and never returns an unhandled
/// error to the caller.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The attempt did not settle within its policy timeout. Timeouts are
    /// terminal: the supervisor does not retry them. Cancellation of the
    /// underlying work is best-effort: the attempt task is aborted, but I/O
    /// already in flight may still complete and is discarded.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation returned an error.
    #[error("operation failed: {0}")]
    Failed(anyhow::Error),

    /// The operation panicked; the panic was caught at the task boundary.
    #[error("operation panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Whether this failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout(_))
    }
}
