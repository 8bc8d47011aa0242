//! Storage backends for the registry.

pub mod memory;
pub mod sled;

use crate::error::Result;
use crate::models::ServiceRecord;
use async_trait::async_trait;

/// Trait for registry storage backends.
///
/// Implementations must provide unique-key semantics on `service_id` and an
/// index supporting lookup by `domain`. Domain uniqueness is enforced inside
/// [`put`](RegistryBackend::put) itself, so the invariant holds even when two
/// registrations race on a multi-threaded runtime.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Insert or replace a record, keyed by its service id.
    ///
    /// Fails with [`Duplicate`](crate::error::Error::Duplicate) when the
    /// record's domain is already mapped to a different service id.
    async fn put(&self, record: &ServiceRecord) -> Result<()>;

    /// Fetch a record by service id.
    async fn get(&self, service_id: &str) -> Result<Option<ServiceRecord>>;

    /// Fetch a record by domain.
    async fn find_domain(&self, domain: &str) -> Result<Option<ServiceRecord>>;

    /// List all records.
    async fn list(&self) -> Result<Vec<ServiceRecord>>;
}
