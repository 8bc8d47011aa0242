//! Integration tests for the persistent sled backend.

use service_registry::{
    DiscoverQuery, NewService, PermissionLevel, Principal, ServiceInfo, ServiceRegistry,
    ServiceStatus,
};
use tempfile::tempdir;

fn admin() -> Principal {
    Principal {
        principal_id: "it-admin".to_string(),
        level: PermissionLevel::Diamond,
        tenant_scope: None,
        granted_scopes: vec![],
    }
}

fn new_service(tenant: &str, domain: &str, instance: &str) -> NewService {
    NewService {
        tenant_name: tenant.to_string(),
        domain: domain.to_string(),
        instance_id: instance.to_string(),
        service_info: ServiceInfo {
            version: "2.3.1".to_string(),
            capabilities: vec!["http".to_string()],
            region: "us-west1".to_string(),
            environment: "staging".to_string(),
            base_url: format!("https://{domain}"),
        },
        health_check: None,
        permission_level: None,
    }
}

#[tokio::test]
async fn records_survive_reopening_the_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("registry.db");
    let principal = admin();

    let ids: Vec<String> = {
        let registry = ServiceRegistry::with_persistence(&db_path).unwrap();
        let mut ids = Vec::new();
        for i in 0..3 {
            let id = registry
                .register(
                    new_service("acme", &format!("svc-{i}.acme.io"), &format!("i-{i}")),
                    &principal,
                )
                .await
                .unwrap();
            ids.push(id);
        }
        registry.deregister(&ids[2], &principal).await.unwrap();
        ids
    };

    let registry = ServiceRegistry::with_persistence(&db_path).unwrap();

    let page = registry
        .discover(&DiscoverQuery::default(), &principal)
        .await
        .unwrap();
    assert_eq!(page.total, 3);

    let record = registry.get(&ids[0], &principal).await.unwrap();
    assert_eq!(record.status, ServiceStatus::Provisioning);

    let decommissioned = registry.get(&ids[2], &principal).await.unwrap();
    assert_eq!(decommissioned.status, ServiceStatus::Decommissioned);
}

#[tokio::test]
async fn domain_index_survives_reopening() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("registry.db");
    let principal = admin();

    {
        let registry = ServiceRegistry::with_persistence(&db_path).unwrap();
        registry
            .register(new_service("acme", "mcp.acme.example.cool", "a1"), &principal)
            .await
            .unwrap();
    }

    let registry = ServiceRegistry::with_persistence(&db_path).unwrap();
    let err = registry
        .register(new_service("acme", "mcp.acme.example.cool", "a2"), &principal)
        .await
        .unwrap_err();
    assert!(matches!(err, service_registry::Error::Duplicate(_)));
}
