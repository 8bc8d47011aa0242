//! Supervision policies and per-call context.

use std::collections::HashMap;
use std::time::Duration;

/// Timeout and retry policy applied to a supervised operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPolicy {
    /// Wall-clock limit for a single attempt.
    pub timeout: Duration,
    /// Number of retries after the initial attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl TaskPolicy {
    /// Create a policy with the given timeout and the default retry settings.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Configuration for a [`TaskSupervisor`](crate::TaskSupervisor) instance.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Number of operations executed together in one batch group.
    pub batch_size: usize,
    /// Policy used for components without an explicit entry.
    pub default_policy: TaskPolicy,
    /// Per-component policy overrides. Components range from fast registry
    /// writes to slow coordination jobs, so timeouts vary widely.
    pub component_policies: HashMap<String, TaskPolicy>,
    /// How often the stale-entry sweeper runs.
    pub sweep_interval: Duration,
    /// Active-task count above which a `HighLoad` event is emitted.
    pub high_load_threshold: usize,
    /// Tracked-entry count above which a `MemoryWarning` event is emitted.
    pub tracked_warning_threshold: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            default_policy: TaskPolicy::default(),
            component_policies: HashMap::new(),
            sweep_interval: Duration::from_secs(60),
            high_load_threshold: 100,
            tracked_warning_threshold: 1000,
        }
    }
}

impl SupervisorConfig {
    /// Register a policy override for a component.
    pub fn with_policy(mut self, component: impl Into<String>, policy: TaskPolicy) -> Self {
        self.component_policies.insert(component.into(), policy);
        self
    }

    /// Resolve the policy for a component, falling back to the default.
    pub fn policy_for(&self, component: &str) -> TaskPolicy {
        self.component_policies
            .get(component)
            .cloned()
            .unwrap_or_else(|| self.default_policy.clone())
    }
}

/// Per-call context selecting the supervision policy and tagging metadata.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Component tag used to look up the timeout/retry policy.
    pub component: String,
    /// Regions this operation is associated with (bookkeeping only).
    pub regions: Vec<String>,
}

impl TaskContext {
    /// Create a context for the given component.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            regions: Vec::new(),
        }
    }

    /// Tag the context with a region set.
    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }
}
