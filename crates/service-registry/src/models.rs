//! Data model for registered service instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authorization tier, ordered from least to most privileged.
///
/// The lattice is strict: every mutating registry call names a minimum tier,
/// and the two highest tiers additionally see across all tenants.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Read-only access within the principal's own tenant.
    Onyx,
    /// Elevated read access within the principal's own tenant.
    Opal,
    /// May register, update, and deregister services in its tenant.
    Sapphire,
    /// Cross-tenant visibility and aggregate statistics.
    Emerald,
    /// Full administrative access.
    Diamond,
}

impl PermissionLevel {
    /// Whether this tier sees across all tenants.
    pub fn is_privileged(self) -> bool {
        matches!(self, PermissionLevel::Emerald | PermissionLevel::Diamond)
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionLevel::Onyx => "onyx",
            PermissionLevel::Opal => "opal",
            PermissionLevel::Sapphire => "sapphire",
            PermissionLevel::Emerald => "emerald",
            PermissionLevel::Diamond => "diamond",
        };
        f.write_str(name)
    }
}

/// Lifecycle status of a registered service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Registered but not yet activated.
    Provisioning,
    /// Serving traffic.
    Active,
    /// Intentionally out of rotation.
    Maintenance,
    /// Marked unhealthy by the health monitor.
    Unhealthy,
    /// Soft-deleted; retained for audit.
    Decommissioned,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceStatus::Provisioning => "provisioning",
            ServiceStatus::Active => "active",
            ServiceStatus::Maintenance => "maintenance",
            ServiceStatus::Unhealthy => "unhealthy",
            ServiceStatus::Decommissioned => "decommissioned",
        };
        f.write_str(name)
    }
}

/// Deployment metadata for a service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Deployed version.
    pub version: String,
    /// Capability tags used for discovery filtering.
    pub capabilities: Vec<String>,
    /// Deployment region (e.g. "us-west1").
    pub region: String,
    /// Deployment environment (e.g. "production", "staging").
    pub environment: String,
    /// Primary endpoint URL; probe sub-paths are resolved against it.
    pub base_url: String,
}

/// Most recent health observations for a service, persisted on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// When the last probe cycle (or heartbeat) completed.
    pub last_check: Option<DateTime<Utc>>,
    /// Response time of the last probe cycle, in milliseconds.
    pub last_response_time_ms: Option<u64>,
    /// Rolling uptime percentage (exponential moving average).
    pub uptime_percent: f64,
    /// Consecutive probe cycles that were not healthy.
    pub consecutive_failures: u32,
    /// When the last failing cycle was observed.
    pub last_failure: Option<DateTime<Utc>>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            last_check: None,
            last_response_time_ms: None,
            uptime_percent: 100.0,
            consecutive_failures: 0,
            last_failure: None,
        }
    }
}

/// Probe configuration for a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Seconds between probe cycles.
    pub interval_secs: u64,
    /// Per-endpoint probe timeout in seconds.
    pub timeout_secs: u64,
    /// Retries per probe attempt.
    pub retry_count: u32,
    /// Consecutive failing cycles before the service is marked unhealthy.
    pub failure_threshold: u32,
    /// Consecutive healthy cycles before the service is marked recovered.
    pub success_threshold: u32,
    /// Sub-paths probed in addition to the primary endpoint.
    pub probe_paths: Vec<String>,
    /// HTTP status code a healthy endpoint is expected to return.
    pub expected_status: u16,
    /// Alert routing hint passed through to the alert transport.
    pub alert_channel: Option<String>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            timeout_secs: 5,
            retry_count: 1,
            failure_threshold: 3,
            success_threshold: 2,
            probe_paths: vec!["/health".to_string()],
            expected_status: 200,
            alert_channel: None,
        }
    }
}

/// One catalog entry per deployed service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Globally unique id, derived at registration from the tenant name,
    /// instance id, and a creation-time hash. Immutable.
    pub service_id: String,
    /// Owning tenant. Immutable.
    pub tenant_name: String,
    /// Unique domain of the instance. Immutable.
    pub domain: String,
    /// Tenant-chosen instance identifier. Immutable.
    pub instance_id: String,
    /// Current lifecycle status.
    pub status: ServiceStatus,
    /// Deployment metadata.
    pub service_info: ServiceInfo,
    /// Latest health observations.
    pub health: HealthSnapshot,
    /// Probe configuration.
    pub health_check: HealthCheckConfig,
    /// Minimum tier allowed to mutate this record.
    pub permission_level: PermissionLevel,
    /// When the record was created. Never changes.
    pub registered_at: DateTime<Utc>,
    /// Refreshed on every mutation.
    pub last_updated: DateTime<Utc>,
}

impl ServiceRecord {
    /// All endpoint URLs probed during a health cycle: the primary endpoint
    /// followed by each configured sub-path resolved against it.
    pub fn probe_urls(&self) -> Vec<String> {
        let base = self.service_info.base_url.trim_end_matches('/');
        let mut urls = vec![self.service_info.base_url.clone()];
        for path in &self.health_check.probe_paths {
            let path = path.trim_start_matches('/');
            urls.push(format!("{base}/{path}"));
        }
        urls
    }
}

/// Input for registering a new service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    /// Owning tenant.
    pub tenant_name: String,
    /// Unique domain for the instance.
    pub domain: String,
    /// Tenant-chosen instance identifier.
    pub instance_id: String,
    /// Deployment metadata.
    pub service_info: ServiceInfo,
    /// Probe configuration; defaults apply when omitted.
    pub health_check: Option<HealthCheckConfig>,
    /// Minimum tier allowed to mutate the record; defaults to Sapphire.
    pub permission_level: Option<PermissionLevel>,
}

/// Typed patch for updating a record.
///
/// The immutable fields (`service_id`, `domain`, `registered_at`, tenant and
/// instance identity) are not representable here, so they cannot be altered
/// by an update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicePatch {
    /// New lifecycle status (e.g. explicit activation).
    pub status: Option<ServiceStatus>,
    /// New deployed version.
    pub version: Option<String>,
    /// Replacement capability tags.
    pub capabilities: Option<Vec<String>>,
    /// New deployment region.
    pub region: Option<String>,
    /// New deployment environment.
    pub environment: Option<String>,
    /// New primary endpoint URL.
    pub base_url: Option<String>,
    /// Replacement probe configuration.
    pub health_check: Option<HealthCheckConfig>,
    /// New minimum mutation tier.
    pub permission_level: Option<PermissionLevel>,
}
