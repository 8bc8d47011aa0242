//! # Health Monitor
//!
//! Polls registered services, feeds probe results through a per-service
//! hysteresis state machine, writes health observations back to the service
//! registry, and raises escalating alerts on sustained failure.
//!
//! Each monitored service gets its own repeating probe loop (strictly
//! sequential per service); a global semaphore bounds how many checks are in
//! flight at once, and every probe cycle executes through the task
//! supervisor's timeout/retry wrapper. A reconciliation loop keeps the set of
//! probe loops in sync with the registry's active records.

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod alert;
mod config;
mod error;
mod monitor;
mod probe;
mod state;

pub use alert::{Alert, AlertSeverity, AlertSink, ChannelSink, LogSink};
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use monitor::HealthMonitor;
pub use probe::{EndpointProber, HttpProber, Probe, ProbeError};
pub use state::{CheckState, CycleStatus, Effect, Thresholds};
