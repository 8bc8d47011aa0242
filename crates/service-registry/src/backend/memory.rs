//! In-memory registry backend.

use super::RegistryBackend;
use crate::error::{Error, Result};
use crate::models::ServiceRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// HashMap-backed storage, primarily for tests and embedded use.
///
/// The domain-uniqueness check runs under the same lock as the insert, so
/// racing writes for one domain cannot both succeed.
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, ServiceRecord>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryBackend for MemoryBackend {
    async fn put(&self, record: &ServiceRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        if records
            .values()
            .any(|r| r.domain == record.domain && r.service_id != record.service_id)
        {
            return Err(Error::Duplicate(record.domain.clone()));
        }
        records.insert(record.service_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, service_id: &str) -> Result<Option<ServiceRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(service_id).cloned())
    }

    async fn find_domain(&self, domain: &str) -> Result<Option<ServiceRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.values().find(|r| r.domain == domain).cloned())
    }

    async fn list(&self) -> Result<Vec<ServiceRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::record;
    use super::*;

    #[tokio::test]
    async fn put_rejects_domain_owned_by_another_service() {
        let backend = MemoryBackend::new();
        backend.put(&record("svc-1", "api.acme.io")).await.unwrap();

        let err = backend
            .put(&record("svc-2", "api.acme.io"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));

        // Replacing a record under its own id and domain is not a collision.
        backend.put(&record("svc-1", "api.acme.io")).await.unwrap();
        assert_eq!(backend.list().await.unwrap().len(), 1);
    }
}
