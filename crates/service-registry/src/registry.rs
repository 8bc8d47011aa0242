//! Core registry implementation.

use crate::auth::{Principal, require_level, require_tenant};
use crate::backend::{RegistryBackend, memory::MemoryBackend, sled::SledBackend};
use crate::error::{Error, Result};
use crate::models::{
    HealthSnapshot, NewService, PermissionLevel, ServicePatch, ServiceRecord, ServiceStatus,
};
use crate::query::{DEFAULT_PAGE_LIMIT, DiscoverQuery, MAX_PAGE_LIMIT, Page, RegistryStats};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

/// Domains are lowercase dotted labels: letters, digits, and inner hyphens.
static DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)+$")
        .expect("domain pattern is valid")
});

/// Multi-tenant service catalog with pluggable storage.
///
/// All writes are last-writer-wins at the granularity of one call; there is
/// no optimistic-concurrency token.
pub struct ServiceRegistry {
    backend: Arc<Box<dyn RegistryBackend>>,
}

impl ServiceRegistry {
    /// Create a registry with in-memory storage.
    pub fn new() -> Self {
        Self {
            backend: Arc::new(Box::new(MemoryBackend::new())),
        }
    }

    /// Create a registry with a persistent sled backend at the given path.
    pub fn with_persistence(path: impl AsRef<Path>) -> Result<Self> {
        let backend = SledBackend::new(path)?;
        Ok(Self {
            backend: Arc::new(Box::new(backend)),
        })
    }

    /// Create a registry with a custom backend.
    pub fn with_backend(backend: Box<dyn RegistryBackend>) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Register a new service instance. Requires Sapphire.
    ///
    /// Validates the required identity fields and the domain pattern, rejects
    /// domain collisions, and inserts the record with `Provisioning` status.
    /// Returns the generated service id.
    pub async fn register(&self, new: NewService, principal: &Principal) -> Result<String> {
        require_level(principal, PermissionLevel::Sapphire)?;
        require_tenant(principal, &new.tenant_name)?;
        validate_registration(&new)?;

        if self.backend.find_domain(&new.domain).await?.is_some() {
            return Err(Error::Duplicate(new.domain));
        }

        let now = Utc::now();
        let service_id = derive_service_id(&new.tenant_name, &new.instance_id, now);

        let record = ServiceRecord {
            service_id: service_id.clone(),
            tenant_name: new.tenant_name,
            domain: new.domain,
            instance_id: new.instance_id,
            status: ServiceStatus::Provisioning,
            service_info: new.service_info,
            health: HealthSnapshot::default(),
            health_check: new.health_check.unwrap_or_default(),
            permission_level: new.permission_level.unwrap_or(PermissionLevel::Sapphire),
            registered_at: now,
            last_updated: now,
        };

        info!(
            service_id = %record.service_id,
            tenant = %record.tenant_name,
            domain = %record.domain,
            "registering service"
        );
        self.backend.put(&record).await?;
        Ok(service_id)
    }

    /// Apply a patch to a record. Requires Sapphire, tenant scope for
    /// non-privileged principals, and the record's own mutation floor.
    ///
    /// Identity fields and `registered_at` are not representable in the patch
    /// type; `last_updated` is always refreshed.
    pub async fn update(
        &self,
        service_id: &str,
        patch: ServicePatch,
        principal: &Principal,
    ) -> Result<ServiceRecord> {
        let mut record = self.fetch(service_id).await?;
        self.authorize_mutation(&record, principal)?;

        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(version) = patch.version {
            record.service_info.version = version;
        }
        if let Some(capabilities) = patch.capabilities {
            record.service_info.capabilities = capabilities;
        }
        if let Some(region) = patch.region {
            record.service_info.region = region;
        }
        if let Some(environment) = patch.environment {
            record.service_info.environment = environment;
        }
        if let Some(base_url) = patch.base_url {
            record.service_info.base_url = base_url;
        }
        if let Some(health_check) = patch.health_check {
            record.health_check = health_check;
        }
        if let Some(permission_level) = patch.permission_level {
            record.permission_level = permission_level;
        }
        record.last_updated = Utc::now();

        debug!(service_id, "updating service record");
        self.backend.put(&record).await?;
        Ok(record)
    }

    /// Fetch a record. Requires Onyx and tenant scope for non-privileged
    /// principals.
    pub async fn get(&self, service_id: &str, principal: &Principal) -> Result<ServiceRecord> {
        require_level(principal, PermissionLevel::Onyx)?;
        let record = self.fetch(service_id).await?;
        require_tenant(principal, &record.tenant_name)?;
        Ok(record)
    }

    /// Query the catalog. Requires Onyx.
    ///
    /// Non-privileged principals are clamped to their own tenant regardless
    /// of the query's tenant filter; the permission-level filter is honored
    /// only for privileged principals. Results are sorted newest-update first
    /// and paginated.
    pub async fn discover(&self, query: &DiscoverQuery, principal: &Principal) -> Result<Page> {
        require_level(principal, PermissionLevel::Onyx)?;

        let mut records = self.backend.list().await?;

        if principal.level.is_privileged() {
            if let Some(tenant) = &query.tenant {
                records.retain(|r| r.tenant_name.contains(tenant.as_str()));
            }
            if let Some(level) = query.permission_level {
                records.retain(|r| r.permission_level == level);
            }
        } else {
            let Some(scope) = principal.tenant_scope.clone() else {
                return Err(Error::Authorization(format!(
                    "principal '{}' has no tenant scope",
                    principal.principal_id
                )));
            };
            records.retain(|r| r.tenant_name == scope);
            if query.permission_level.is_some() {
                debug!(
                    principal = %principal.principal_id,
                    "ignoring permission-level filter for non-privileged principal"
                );
            }
        }

        if let Some(statuses) = &query.statuses {
            records.retain(|r| statuses.contains(&r.status));
        }
        if let Some(region) = &query.region {
            records.retain(|r| &r.service_info.region == region);
        }
        if let Some(capability) = &query.capability {
            records.retain(|r| r.service_info.capabilities.iter().any(|c| c == capability));
        }

        records.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));

        let total = records.len();
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .min(MAX_PAGE_LIMIT);
        let records = records
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .collect();

        Ok(Page {
            records,
            total,
            limit,
            offset: query.offset,
        })
    }

    /// Soft-delete a record: set its status to `Decommissioned`. Requires
    /// Sapphire, tenant scope, and the record's mutation floor. The record is
    /// retained for audit and its domain stays reserved.
    pub async fn deregister(&self, service_id: &str, principal: &Principal) -> Result<()> {
        let mut record = self.fetch(service_id).await?;
        self.authorize_mutation(&record, principal)?;

        info!(service_id, tenant = %record.tenant_name, "decommissioning service");
        record.status = ServiceStatus::Decommissioned;
        record.last_updated = Utc::now();
        self.backend.put(&record).await
    }

    /// Record a liveness heartbeat from the service itself. Requires Onyx and
    /// tenant scope: services report under their own tenant's credentials.
    pub async fn heartbeat(&self, service_id: &str, principal: &Principal) -> Result<()> {
        require_level(principal, PermissionLevel::Onyx)?;
        let mut record = self.fetch(service_id).await?;
        require_tenant(principal, &record.tenant_name)?;

        let now = Utc::now();
        record.health.last_check = Some(now);
        record.last_updated = now;
        debug!(service_id, "heartbeat");
        self.backend.put(&record).await
    }

    /// Aggregate counts by status and region. Requires Emerald.
    pub async fn statistics(&self, principal: &Principal) -> Result<RegistryStats> {
        require_level(principal, PermissionLevel::Emerald)?;

        let records = self.backend.list().await?;
        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut by_region: HashMap<String, usize> = HashMap::new();
        for record in &records {
            *by_status.entry(record.status.to_string()).or_default() += 1;
            *by_region
                .entry(record.service_info.region.clone())
                .or_default() += 1;
        }

        Ok(RegistryStats {
            total: records.len(),
            by_status,
            by_region,
        })
    }

    /// List every non-decommissioned record.
    ///
    /// Monitor-facing: the health monitor reconciles its probe loops against
    /// this set.
    pub async fn active_records(&self) -> Result<Vec<ServiceRecord>> {
        let mut records = self.backend.list().await?;
        records.retain(|r| r.status != ServiceStatus::Decommissioned);
        Ok(records)
    }

    /// Write back the observations of one probe cycle.
    ///
    /// Monitor-facing: the permission lattice governs external mutations;
    /// health write-backs come from the monitoring loop inside the trust
    /// boundary.
    pub async fn record_probe_cycle(
        &self,
        service_id: &str,
        health: HealthSnapshot,
    ) -> Result<()> {
        let mut record = self.fetch(service_id).await?;
        record.health = health;
        record.last_updated = Utc::now();
        self.backend.put(&record).await
    }

    /// Transition a record's lifecycle status from the health monitor.
    /// Returns the previous status.
    pub async fn transition_status(
        &self,
        service_id: &str,
        status: ServiceStatus,
    ) -> Result<ServiceStatus> {
        let mut record = self.fetch(service_id).await?;
        let previous = record.status;
        if previous != status {
            info!(service_id, from = %previous, to = %status, "status transition");
        }
        record.status = status;
        record.last_updated = Utc::now();
        self.backend.put(&record).await?;
        Ok(previous)
    }

    async fn fetch(&self, service_id: &str) -> Result<ServiceRecord> {
        self.backend
            .get(service_id)
            .await?
            .ok_or_else(|| Error::NotFound(service_id.to_string()))
    }

    /// Mutations require Sapphire, the record's own permission floor, and
    /// tenant scope for non-privileged principals.
    fn authorize_mutation(&self, record: &ServiceRecord, principal: &Principal) -> Result<()> {
        let floor = PermissionLevel::Sapphire.max(record.permission_level);
        require_level(principal, floor)?;
        require_tenant(principal, &record.tenant_name)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_registration(new: &NewService) -> Result<()> {
    if new.tenant_name.trim().is_empty() {
        return Err(Error::Validation("tenant_name is required".to_string()));
    }
    if new.instance_id.trim().is_empty() {
        return Err(Error::Validation("instance_id is required".to_string()));
    }
    if new.domain.trim().is_empty() {
        return Err(Error::Validation("domain is required".to_string()));
    }
    if !DOMAIN_PATTERN.is_match(&new.domain) {
        return Err(Error::Validation(format!(
            "domain '{}' does not match the required pattern",
            new.domain
        )));
    }
    if new.service_info.base_url.trim().is_empty() {
        return Err(Error::Validation("base_url is required".to_string()));
    }
    Ok(())
}

/// Derive a stable, globally unique service id from the tenant name, the
/// instance id, and a hash of the creation time.
fn derive_service_id(tenant: &str, instance_id: &str, at: DateTime<Utc>) -> String {
    let mut hasher = DefaultHasher::new();
    tenant.hash(&mut hasher);
    instance_id.hash(&mut hasher);
    at.timestamp_nanos_opt().unwrap_or_default().hash(&mut hasher);

    let slug: String = tenant
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{slug}-{instance_id}-{:016x}", hasher.finish())
}
