//! Discovery queries, pagination, and aggregate statistics.

use crate::models::{PermissionLevel, ServiceRecord, ServiceStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default page size for discovery results.
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Hard cap on the page size, regardless of what the caller asks for.
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Filters for a discovery query. All filters are conjunctive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoverQuery {
    /// Match any of these statuses.
    pub statuses: Option<Vec<ServiceStatus>>,
    /// Exact region match.
    pub region: Option<String>,
    /// Require this capability tag.
    pub capability: Option<String>,
    /// Substring match on the tenant name. Ignored for non-privileged
    /// principals, which are always clamped to their own tenant.
    pub tenant: Option<String>,
    /// Match this permission level. Honored only for privileged principals.
    pub permission_level: Option<PermissionLevel>,
    /// Page size; clamped to [`MAX_PAGE_LIMIT`], defaults to
    /// [`DEFAULT_PAGE_LIMIT`].
    pub limit: Option<usize>,
    /// Number of matching records to skip.
    pub offset: usize,
}

/// One page of discovery results, sorted by most-recently-updated first.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    /// Records in this page.
    pub records: Vec<ServiceRecord>,
    /// Total records matching the query, before pagination.
    pub total: usize,
    /// Effective page size.
    pub limit: usize,
    /// Offset this page started at.
    pub offset: usize,
}

/// Aggregate counts over the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    /// Total records, including decommissioned ones.
    pub total: usize,
    /// Record counts keyed by lifecycle status.
    pub by_status: HashMap<String, usize>,
    /// Record counts keyed by region.
    pub by_region: HashMap<String, usize>,
}
