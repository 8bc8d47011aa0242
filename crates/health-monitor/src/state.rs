//! Per-service hysteresis state machine.
//!
//! The state machine is pure: [`CheckState::observe`] consumes one cycle's
//! status and returns the effects the monitor must apply (registry status
//! transitions and alerts). Keeping it free of I/O makes the edge-triggering
//! rules directly testable.

use crate::alert::AlertSeverity;
use chrono::{DateTime, Utc};
use service_registry::HealthSnapshot;

/// Weight of the newest cycle in the rolling uptime average.
const UPTIME_ALPHA: f64 = 0.1;

/// Outcome of one probe cycle over all of a service's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// No cycle observed yet.
    Unknown,
    /// At least 80% of endpoints returned the expected status.
    Healthy,
    /// At least 50% of endpoints returned the expected status.
    Degraded,
    /// Fewer than half of the endpoints returned the expected status.
    Unhealthy,
}

impl CycleStatus {
    /// Classify a cycle from the fraction of endpoints that succeeded.
    pub fn from_success_ratio(ratio: f64) -> Self {
        if ratio >= 0.8 {
            CycleStatus::Healthy
        } else if ratio >= 0.5 {
            CycleStatus::Degraded
        } else {
            CycleStatus::Unhealthy
        }
    }
}

/// Hysteresis thresholds, taken from the service's health-check config.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Consecutive non-healthy cycles before the unhealthy edge fires.
    pub alert_after: u32,
    /// Consecutive healthy cycles before the recovery edge fires.
    pub recover_after: u32,
}

/// Effect the monitor must apply after observing a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Set the registry status to `unhealthy`.
    MarkUnhealthy,
    /// Set the registry status back to `active`.
    MarkRecovered,
    /// Emit an alert at the given severity.
    Raise(AlertSeverity, String),
}

/// In-memory hysteresis state for one monitored service.
///
/// Owned exclusively by the monitor; rebuilt from the record's persisted
/// [`HealthSnapshot`] when monitoring (re)starts. In-flight counters that
/// were not yet persisted are lost on rebuild, which degrades hysteresis for
/// at most one threshold window.
#[derive(Debug, Clone)]
pub struct CheckState {
    /// Consecutive cycles that were not healthy.
    pub consecutive_failures: u32,
    /// Consecutive healthy cycles.
    pub consecutive_successes: u32,
    /// Status of the most recent cycle.
    pub last_status: CycleStatus,
    /// Rolling uptime percentage.
    pub uptime_percent: f64,
    /// When the last failing cycle was observed.
    pub last_failure: Option<DateTime<Utc>>,
    /// Escalation stage already alerted: 0 none, 1 warning, 2 critical,
    /// 3 emergency.
    escalation: u8,
}

impl CheckState {
    /// Fresh state for a newly monitored service.
    pub fn new() -> Self {
        Self {
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_status: CycleStatus::Unknown,
            uptime_percent: 100.0,
            last_failure: None,
            escalation: 0,
        }
    }

    /// Rebuild state from the snapshot persisted on the service record.
    pub fn from_snapshot(health: &HealthSnapshot, thresholds: &Thresholds) -> Self {
        let escalation = if thresholds.alert_after == 0 {
            0
        } else {
            (health.consecutive_failures / thresholds.alert_after).min(3) as u8
        };
        Self {
            consecutive_failures: health.consecutive_failures,
            consecutive_successes: 0,
            last_status: CycleStatus::Unknown,
            uptime_percent: health.uptime_percent,
            last_failure: health.last_failure,
            escalation,
        }
    }

    /// Observe one cycle and return the effects to apply.
    ///
    /// Edges fire exactly once: the unhealthy edge when the failure counter
    /// reaches the threshold (warning), again at twice (critical) and three
    /// times (emergency) the threshold; the recovery edge once the success
    /// counter reaches its threshold after an alerting condition.
    pub fn observe(&mut self, cycle: CycleStatus, thresholds: &Thresholds) -> Vec<Effect> {
        let mut effects = Vec::new();

        match cycle {
            CycleStatus::Unknown => return effects,
            CycleStatus::Healthy => {
                self.consecutive_successes += 1;
                self.consecutive_failures = 0;
                if self.escalation > 0 && self.consecutive_successes >= thresholds.recover_after {
                    effects.push(Effect::MarkRecovered);
                    effects.push(Effect::Raise(
                        AlertSeverity::Info,
                        format!(
                            "recovered after {} consecutive healthy cycles",
                            self.consecutive_successes
                        ),
                    ));
                    self.escalation = 0;
                    self.consecutive_successes = 0;
                }
            }
            CycleStatus::Degraded | CycleStatus::Unhealthy => {
                self.consecutive_failures += 1;
                self.consecutive_successes = 0;
                self.last_failure = Some(Utc::now());

                let failures = self.consecutive_failures;
                let threshold = thresholds.alert_after;
                if threshold > 0 {
                    if failures == threshold {
                        effects.push(Effect::MarkUnhealthy);
                        effects.push(Effect::Raise(
                            AlertSeverity::Warning,
                            format!("{failures} consecutive failing cycles"),
                        ));
                        self.escalation = 1;
                    } else if failures == threshold * 2 {
                        effects.push(Effect::Raise(
                            AlertSeverity::Critical,
                            format!("{failures} consecutive failing cycles"),
                        ));
                        self.escalation = 2;
                    } else if failures == threshold * 3 {
                        effects.push(Effect::Raise(
                            AlertSeverity::Emergency,
                            format!("{failures} consecutive failing cycles"),
                        ));
                        self.escalation = 3;
                    }
                }
            }
        }

        let sample = if cycle == CycleStatus::Healthy { 100.0 } else { 0.0 };
        self.uptime_percent = (1.0 - UPTIME_ALPHA) * self.uptime_percent + UPTIME_ALPHA * sample;
        self.last_status = cycle;
        effects
    }

    /// Persistable snapshot of this state after a cycle.
    pub fn snapshot(&self, response_time_ms: u64) -> HealthSnapshot {
        HealthSnapshot {
            last_check: Some(Utc::now()),
            last_response_time_ms: Some(response_time_ms),
            uptime_percent: self.uptime_percent,
            consecutive_failures: self.consecutive_failures,
            last_failure: self.last_failure,
        }
    }
}

impl Default for CheckState {
    fn default() -> Self {
        Self::new()
    }
}
