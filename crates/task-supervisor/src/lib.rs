//! # Task Supervisor
//!
//! Wraps arbitrary asynchronous operations in a supervision layer that
//! enforces per-component timeouts, a fixed-delay retry policy, bounded batch
//! execution, and defensive cleanup of leaked bookkeeping entries.
//!
//! The supervisor never lets a wrapped operation's failure cross the call
//! boundary as a panic or an unhandled error: every outcome is returned as a
//! typed [`TaskReport`] carrying either the operation's value or a
//! [`TaskError`], plus execution metadata.
//!
//! ## Example
//!
//! ```rust
//! use task_supervisor::{SupervisorConfig, TaskContext, TaskSupervisor};
//!
//! # async fn example() {
//! let supervisor = TaskSupervisor::new(SupervisorConfig::default());
//! let ctx = TaskContext::new("registry-write");
//!
//! let report = supervisor
//!     .supervise(&ctx, || async { Ok::<_, anyhow::Error>(42) })
//!     .await;
//! assert!(report.is_success());
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod config;
mod error;
mod report;
mod supervisor;

pub use config::{SupervisorConfig, TaskContext, TaskPolicy};
pub use error::TaskError;
pub use report::{BatchReport, BatchSummary, SupervisorStats, TaskMetadata, TaskReport};
pub use supervisor::{TaskEvent, TaskSupervisor};
