//! Principals and the external token verifier seam.

use crate::error::{Error, Result};
use crate::models::PermissionLevel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An authenticated caller, as returned by the external verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier of the caller.
    pub principal_id: String,
    /// Authorization tier.
    pub level: PermissionLevel,
    /// Tenant this principal is confined to; privileged tiers ignore it.
    pub tenant_scope: Option<String>,
    /// Opaque scopes granted by the verifier; passed through, not interpreted.
    pub granted_scopes: Vec<String>,
}

impl Principal {
    /// Whether this principal may act on records owned by `tenant`.
    pub fn can_access_tenant(&self, tenant: &str) -> bool {
        self.level.is_privileged()
            || self
                .tenant_scope
                .as_deref()
                .is_some_and(|scope| scope == tenant)
    }
}

/// External authentication/authorization verifier.
///
/// The registry treats credential verification as a black box: given an
/// opaque credential it receives a [`Principal`] and consumes only the level
/// and tenant scope. Implementations live outside this crate; the registry
/// never constructs a fixed principal itself.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify an opaque credential and return the principal it represents.
    async fn verify(&self, credential: &str) -> Result<Principal>;
}

/// Fail unless the principal's tier is at least `min`.
pub(crate) fn require_level(principal: &Principal, min: PermissionLevel) -> Result<()> {
    if principal.level >= min {
        Ok(())
    } else {
        Err(Error::Authorization(format!(
            "principal '{}' has level {} but {} is required",
            principal.principal_id, principal.level, min
        )))
    }
}

/// Fail unless the principal may act on records owned by `tenant`.
pub(crate) fn require_tenant(principal: &Principal, tenant: &str) -> Result<()> {
    if principal.can_access_tenant(tenant) {
        Ok(())
    } else {
        Err(Error::Authorization(format!(
            "principal '{}' is not scoped to tenant '{tenant}'",
            principal.principal_id
        )))
    }
}
