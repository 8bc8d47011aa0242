//! End-to-end monitoring scenarios against an in-memory registry and a
//! scripted prober.

use async_trait::async_trait;
use health_monitor::{
    AlertSeverity, ChannelSink, EndpointProber, HealthMonitor, MonitorConfig, Probe, ProbeError,
};
use service_registry::{
    HealthCheckConfig, NewService, PermissionLevel, Principal, ServiceInfo, ServiceRegistry,
    ServiceStatus,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use task_supervisor::{SupervisorConfig, TaskSupervisor};

/// Prober whose per-URL outcomes are controlled by the test.
#[derive(Default)]
struct ScriptedProber {
    down: Mutex<HashSet<String>>,
    transport_errors: AtomicBool,
}

impl ScriptedProber {
    fn set_down(&self, urls: &[&str]) {
        let mut down = self.down.lock().unwrap();
        down.clear();
        down.extend(urls.iter().map(|u| u.to_string()));
    }

    fn all_up(&self) {
        self.down.lock().unwrap().clear();
    }

    fn fail_transport(&self, enabled: bool) {
        self.transport_errors.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl EndpointProber for ScriptedProber {
    async fn probe(
        &self,
        url: &str,
        expected_status: u16,
        _timeout: Duration,
    ) -> Result<Probe, ProbeError> {
        if self.transport_errors.load(Ordering::SeqCst) {
            return Err(ProbeError::Transport("connection refused".to_string()));
        }
        let down = self.down.lock().unwrap().contains(url);
        Ok(Probe {
            healthy: !down,
            status_code: if down { 500 } else { expected_status },
            latency: Duration::from_millis(1),
        })
    }
}

fn admin() -> Principal {
    Principal {
        principal_id: "monitor-tests".to_string(),
        level: PermissionLevel::Diamond,
        tenant_scope: None,
        granted_scopes: vec![],
    }
}

fn new_service(domain: &str, health_check: HealthCheckConfig) -> NewService {
    NewService {
        tenant_name: "acme".to_string(),
        domain: domain.to_string(),
        instance_id: "a1-b2-c3".to_string(),
        service_info: ServiceInfo {
            version: "1.0.0".to_string(),
            capabilities: vec!["mcp".to_string()],
            region: "us-west1".to_string(),
            environment: "production".to_string(),
            base_url: format!("https://{domain}"),
        },
        health_check: Some(health_check),
        permission_level: None,
    }
}

fn fast_check(failure_threshold: u32, success_threshold: u32) -> HealthCheckConfig {
    HealthCheckConfig {
        interval_secs: 1,
        timeout_secs: 1,
        failure_threshold,
        success_threshold,
        probe_paths: vec!["/health".to_string(), "/metrics".to_string()],
        ..HealthCheckConfig::default()
    }
}

struct Harness {
    registry: Arc<ServiceRegistry>,
    monitor: HealthMonitor,
    prober: Arc<ScriptedProber>,
    alerts: async_channel::Receiver<health_monitor::Alert>,
}

fn harness() -> Harness {
    let registry = Arc::new(ServiceRegistry::new());
    let supervisor = Arc::new(TaskSupervisor::new(SupervisorConfig::default()));
    let prober = Arc::new(ScriptedProber::default());
    let (sink, alerts) = ChannelSink::new(64);
    let monitor = HealthMonitor::new(
        Arc::clone(&registry),
        supervisor,
        prober.clone(),
        Arc::new(sink),
        MonitorConfig::default(),
    );
    Harness {
        registry,
        monitor,
        prober,
        alerts,
    }
}

async fn wait_for_status(
    harness: &Harness,
    service_id: &str,
    status: ServiceStatus,
) -> ServiceStatus {
    let principal = admin();
    for _ in 0..100 {
        let record = harness.registry.get(service_id, &principal).await.unwrap();
        if record.status == status {
            return record.status;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    harness
        .registry
        .get(service_id, &principal)
        .await
        .unwrap()
        .status
}

#[tokio::test]
async fn healthy_cycles_leave_provisioning_untouched() {
    let harness = harness();
    let principal = admin();

    let id = harness
        .registry
        .register(new_service("mcp.acme.example.cool", fast_check(3, 2)), &principal)
        .await
        .unwrap();

    harness.monitor.reconcile().await.unwrap();

    // Wait for at least one healthy cycle across all three endpoints.
    for _ in 0..100 {
        if harness
            .monitor
            .check_state(&id)
            .is_some_and(|s| s.consecutive_successes >= 1)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let state = harness.monitor.check_state(&id).unwrap();
    assert!(state.consecutive_successes >= 1);
    assert_eq!(state.consecutive_failures, 0);

    let record = harness.registry.get(&id, &principal).await.unwrap();
    // Health is written back, but a healthy probe never activates a service;
    // activation is an explicit update.
    assert_eq!(record.status, ServiceStatus::Provisioning);
    assert!(record.health.last_check.is_some());
    assert_eq!(record.health.consecutive_failures, 0);

    assert!(harness.alerts.try_recv().is_err());
    harness.monitor.shutdown();
}

#[tokio::test]
async fn degraded_cycles_trip_the_threshold_then_recover() {
    let harness = harness();
    let principal = admin();

    let id = harness
        .registry
        .register(new_service("mcp.acme.example.cool", fast_check(3, 2)), &principal)
        .await
        .unwrap();

    // One of three endpoints serves 500s: a 66% cycle, degraded but not
    // healthy, so the failure counter climbs.
    harness
        .prober
        .set_down(&["https://mcp.acme.example.cool/health"]);

    harness.monitor.reconcile().await.unwrap();

    let warning = tokio::time::timeout(Duration::from_secs(30), harness.alerts.recv())
        .await
        .expect("warning alert within threshold window")
        .unwrap();
    assert_eq!(warning.severity, AlertSeverity::Warning);
    assert_eq!(warning.service_id, id);
    assert_eq!(warning.kind, "health-threshold");

    assert_eq!(
        wait_for_status(&harness, &id, ServiceStatus::Unhealthy).await,
        ServiceStatus::Unhealthy
    );

    // Recover: all endpoints healthy again. After two consecutive healthy
    // cycles the registry flips back to active and exactly one info alert
    // arrives.
    harness.prober.all_up();

    let recovery = tokio::time::timeout(Duration::from_secs(30), harness.alerts.recv())
        .await
        .expect("recovery alert after success threshold")
        .unwrap();
    assert_eq!(recovery.severity, AlertSeverity::Info);
    assert_eq!(recovery.kind, "health-recovered");

    assert_eq!(
        wait_for_status(&harness, &id, ServiceStatus::Active).await,
        ServiceStatus::Active
    );

    // Steady healthy state stays quiet.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(harness.alerts.try_recv().is_err());
    harness.monitor.shutdown();
}

#[tokio::test]
async fn transport_errors_count_as_failed_endpoints() {
    let harness = harness();
    let principal = admin();

    let id = harness
        .registry
        .register(new_service("api.acme.io", fast_check(2, 2)), &principal)
        .await
        .unwrap();

    harness.prober.fail_transport(true);
    harness.monitor.reconcile().await.unwrap();

    let alert = tokio::time::timeout(Duration::from_secs(30), harness.alerts.recv())
        .await
        .expect("probe exceptions must trip the threshold like bad status codes")
        .unwrap();
    assert_eq!(alert.severity, AlertSeverity::Warning);
    assert_eq!(alert.service_id, id);
    harness.monitor.shutdown();
}

#[tokio::test]
async fn shutdown_stops_probing_and_alerting() {
    let harness = harness();
    let principal = admin();

    harness
        .registry
        .register(new_service("down.acme.io", fast_check(1, 1)), &principal)
        .await
        .unwrap();

    harness.monitor.reconcile().await.unwrap();
    harness.monitor.shutdown();
    assert!(harness.monitor.monitored().is_empty());

    // With a failure threshold of 1, any post-shutdown cycle against failing
    // endpoints would alert immediately. None may run.
    harness.prober.fail_transport(true);
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(harness.alerts.try_recv().is_err());
}

#[tokio::test]
async fn reconciliation_tracks_the_active_set() {
    let harness = harness();
    let principal = admin();

    let first = harness
        .registry
        .register(new_service("one.acme.io", fast_check(3, 2)), &principal)
        .await
        .unwrap();
    let second = harness
        .registry
        .register(new_service("two.acme.io", fast_check(3, 2)), &principal)
        .await
        .unwrap();

    harness.monitor.reconcile().await.unwrap();
    let mut monitored = harness.monitor.monitored();
    monitored.sort();
    let mut expected = vec![first.clone(), second.clone()];
    expected.sort();
    assert_eq!(monitored, expected);

    // Decommissioned services drop out of the active set and lose their loop.
    harness.registry.deregister(&second, &principal).await.unwrap();
    harness.monitor.reconcile().await.unwrap();
    assert_eq!(harness.monitor.monitored(), vec![first]);
    harness.monitor.shutdown();
}
