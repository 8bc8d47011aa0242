//! Monitor configuration.

use std::time::Duration;

/// Configuration for a [`HealthMonitor`](crate::HealthMonitor) instance.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Global cap on concurrently in-flight checks across all services.
    pub max_concurrent_checks: usize,
    /// How often the reconciliation loop re-reads the registry's active set.
    pub reconcile_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_checks: 50,
            reconcile_interval: Duration::from_secs(30),
        }
    }
}
