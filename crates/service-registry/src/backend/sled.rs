//! Sled database backend for the registry.

use super::RegistryBackend;
use crate::error::{Error, Result};
use crate::models::ServiceRecord;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

/// Sled-based registry backend.
///
/// Records live in a `services` tree keyed by service id; a `domains` tree
/// maps each domain to its service id, giving the unique-index semantics the
/// registry relies on. The domain entry is claimed with a compare-and-swap,
/// so concurrent writes for the same domain cannot both succeed. Every write
/// is flushed before returning.
pub struct SledBackend {
    db: sled::Db,
    services: sled::Tree,
    domains: sled::Tree,
}

impl SledBackend {
    /// Open (or create) a persistent backend at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening sled database at {:?}", path);
        let db = sled::open(path)?;
        let services = db.open_tree("services")?;
        let domains = db.open_tree("domains")?;

        Ok(Self {
            db,
            services,
            domains,
        })
    }

    /// Create a temporary in-memory backend (for testing).
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let services = db.open_tree("services")?;
        let domains = db.open_tree("domains")?;

        Ok(Self {
            db,
            services,
            domains,
        })
    }
}

#[async_trait]
impl RegistryBackend for SledBackend {
    async fn put(&self, record: &ServiceRecord) -> Result<()> {
        debug!("Storing service record: {}", record.service_id);

        if let Err(claimed) = self.domains.compare_and_swap(
            record.domain.as_bytes(),
            None::<&[u8]>,
            Some(record.service_id.as_bytes()),
        )? {
            // The domain entry already exists; only the owning record may
            // keep writing under it.
            if claimed.current.as_deref() != Some(record.service_id.as_bytes()) {
                return Err(Error::Duplicate(record.domain.clone()));
            }
        }

        let value = serde_json::to_vec(record)?;
        self.services.insert(record.service_id.as_bytes(), value)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn get(&self, service_id: &str) -> Result<Option<ServiceRecord>> {
        match self.services.get(service_id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn find_domain(&self, domain: &str) -> Result<Option<ServiceRecord>> {
        let Some(id) = self.domains.get(domain.as_bytes())? else {
            return Ok(None);
        };
        let id = String::from_utf8_lossy(&id).to_string();
        self.get(&id).await
    }

    async fn list(&self) -> Result<Vec<ServiceRecord>> {
        let mut records = Vec::new();
        for entry in self.services.iter() {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}
