//! Probe scheduling and reconciliation against the registry.

use crate::alert::{Alert, AlertSeverity, AlertSink};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::probe::EndpointProber;
use crate::state::{CheckState, CycleStatus, Effect, Thresholds};
use futures::future::join_all;
use service_registry::{ServiceRecord, ServiceRegistry, ServiceStatus};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use task_supervisor::{TaskContext, TaskSupervisor};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Component tag probe cycles run under in the task supervisor.
const PROBE_COMPONENT: &str = "health-check";

/// Bookkeeping for one service's probe loop.
struct ProbeLoop {
    handle: JoinHandle<()>,
    interval_secs: u64,
    timeout_secs: u64,
    state: Arc<Mutex<CheckState>>,
}

/// Drives per-service probe loops and keeps them reconciled with the
/// registry's active records.
///
/// Probe loops are strictly sequential per service: a cycle must finish
/// before the next interval sleep begins, so cycles for one service never
/// overlap. Across services, cycles interleave freely, bounded only by the
/// global in-flight semaphore.
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    supervisor: Arc<TaskSupervisor>,
    prober: Arc<dyn EndpointProber>,
    alerts: Arc<dyn AlertSink>,
    config: MonitorConfig,
    loops: Mutex<HashMap<String, ProbeLoop>>,
    checks: Arc<Semaphore>,
}

impl HealthMonitor {
    /// Create a monitor. All collaborators are injected, so independent
    /// monitors (one per test, one per process) never share state.
    pub fn new(
        registry: Arc<ServiceRegistry>,
        supervisor: Arc<TaskSupervisor>,
        prober: Arc<dyn EndpointProber>,
        alerts: Arc<dyn AlertSink>,
        config: MonitorConfig,
    ) -> Self {
        let checks = Arc::new(Semaphore::new(config.max_concurrent_checks));
        Self {
            registry,
            supervisor,
            prober,
            alerts,
            config,
            loops: Mutex::new(HashMap::new()),
            checks,
        }
    }

    /// Start (or restart) the probe loop for a record.
    ///
    /// The first check fires immediately; subsequent checks follow the
    /// record's configured interval. Hysteresis state is rebuilt from the
    /// record's persisted health snapshot.
    pub fn start_monitoring(&self, record: &ServiceRecord) {
        let thresholds = Thresholds {
            alert_after: record.health_check.failure_threshold,
            recover_after: record.health_check.success_threshold,
        };
        let state = Arc::new(Mutex::new(CheckState::from_snapshot(
            &record.health,
            &thresholds,
        )));

        let cycle = CycleContext {
            registry: Arc::clone(&self.registry),
            supervisor: Arc::clone(&self.supervisor),
            prober: Arc::clone(&self.prober),
            alerts: Arc::clone(&self.alerts),
            checks: Arc::clone(&self.checks),
            state: Arc::clone(&state),
            service_id: record.service_id.clone(),
            tenant_name: record.tenant_name.clone(),
            urls: record.probe_urls(),
            expected_status: record.health_check.expected_status,
            probe_timeout: Duration::from_secs(record.health_check.timeout_secs),
            interval: Duration::from_secs(record.health_check.interval_secs),
            thresholds,
            channel: record.health_check.alert_channel.clone(),
        };

        info!(
            service_id = %record.service_id,
            interval_secs = record.health_check.interval_secs,
            endpoints = cycle.urls.len(),
            "starting health monitoring"
        );
        let handle = tokio::spawn(cycle.run());

        let mut loops = self.loops.lock().unwrap();
        if let Some(previous) = loops.insert(
            record.service_id.clone(),
            ProbeLoop {
                handle,
                interval_secs: record.health_check.interval_secs,
                timeout_secs: record.health_check.timeout_secs,
                state,
            },
        ) {
            previous.handle.abort();
        }
    }

    /// Stop the probe loop for a service, clearing its timer and state.
    pub fn stop_monitoring(&self, service_id: &str) {
        let mut loops = self.loops.lock().unwrap();
        if let Some(entry) = loops.remove(service_id) {
            entry.handle.abort();
            info!(service_id, "stopped health monitoring");
        }
    }

    /// Service ids currently being monitored.
    pub fn monitored(&self) -> Vec<String> {
        self.loops.lock().unwrap().keys().cloned().collect()
    }

    /// Snapshot the hysteresis state for a monitored service.
    pub fn check_state(&self, service_id: &str) -> Option<CheckState> {
        let loops = self.loops.lock().unwrap();
        loops
            .get(service_id)
            .map(|entry| entry.state.lock().unwrap().clone())
    }

    /// Bring the probe loops in line with the registry's active set.
    ///
    /// Newly discovered records get a loop, records whose probe interval or
    /// timeout changed get a restarted loop with fresh configuration, and
    /// records that disappeared from the active set (decommissioned or
    /// deleted) have their loops stopped.
    pub async fn reconcile(&self) -> Result<(), MonitorError> {
        let records = self.registry.active_records().await?;

        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            seen.insert(record.service_id.clone());

            let needs_start = {
                let loops = self.loops.lock().unwrap();
                match loops.get(&record.service_id) {
                    None => true,
                    Some(entry) => {
                        entry.interval_secs != record.health_check.interval_secs
                            || entry.timeout_secs != record.health_check.timeout_secs
                    }
                }
            };
            if needs_start {
                self.start_monitoring(record);
            }
        }

        let stale: Vec<String> = {
            let loops = self.loops.lock().unwrap();
            loops
                .keys()
                .filter(|id| !seen.contains(*id))
                .cloned()
                .collect()
        };
        for service_id in stale {
            self.stop_monitoring(&service_id);
        }

        debug!(monitored = seen.len(), "reconciliation complete");
        Ok(())
    }

    /// Spawn the reconciliation loop on its configured interval. The loop
    /// runs until the handle is aborted; reconciliation failures are logged
    /// and retried on the next tick.
    pub fn spawn_reconciler(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if let Err(err) = monitor.reconcile().await {
                    warn!(%err, "reconciliation failed");
                }
                tokio::time::sleep(monitor.config.reconcile_interval).await;
            }
        })
    }

    /// Stop every probe loop and close the check gate, so cycles already
    /// waiting on a permit return without probing.
    pub fn shutdown(&self) {
        self.checks.close();
        let mut loops = self.loops.lock().unwrap();
        for (service_id, entry) in loops.drain() {
            entry.handle.abort();
            debug!(service_id, "probe loop aborted");
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything one service's probe loop needs, captured at start time.
/// Configuration changes are picked up by the reconciler restarting the loop.
struct CycleContext {
    registry: Arc<ServiceRegistry>,
    supervisor: Arc<TaskSupervisor>,
    prober: Arc<dyn EndpointProber>,
    alerts: Arc<dyn AlertSink>,
    checks: Arc<Semaphore>,
    state: Arc<Mutex<CheckState>>,
    service_id: String,
    tenant_name: String,
    urls: Vec<String>,
    expected_status: u16,
    probe_timeout: Duration,
    interval: Duration,
    thresholds: Thresholds,
    channel: Option<String>,
}

impl CycleContext {
    async fn run(self) {
        debug!(service_id = %self.service_id, "probe loop started");
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One probe cycle: check every endpoint, classify the cycle, feed the
    /// state machine, write observations back, apply effects.
    async fn run_cycle(&self) {
        // The permit bounds in-flight checks globally; a closed semaphore
        // means the monitor is shutting down.
        let Ok(permit) = self.checks.acquire().await else {
            return;
        };

        let ctx = TaskContext::new(PROBE_COMPONENT);
        let prober = Arc::clone(&self.prober);
        let urls = self.urls.clone();
        let expected = self.expected_status;
        let timeout = self.probe_timeout;

        let report = self
            .supervisor
            .supervise(&ctx, move || {
                let prober = Arc::clone(&prober);
                let urls = urls.clone();
                async move {
                    let outcomes = join_all(urls.iter().map(|url| {
                        let prober = Arc::clone(&prober);
                        async move {
                            match prober.probe(url, expected, timeout).await {
                                Ok(probe) => probe.healthy,
                                Err(err) => {
                                    // Transport failures count the same as a
                                    // wrong status code for this cycle.
                                    debug!(%url, %err, "endpoint probe failed");
                                    false
                                }
                            }
                        }
                    }))
                    .await;
                    let healthy = outcomes.iter().filter(|ok| **ok).count();
                    Ok::<_, anyhow::Error>((healthy, outcomes.len()))
                }
            })
            .await;
        drop(permit);

        let response_time_ms = report.metadata.duration.as_millis() as u64;
        let cycle = match report.outcome {
            Ok((healthy, total)) if total > 0 => {
                CycleStatus::from_success_ratio(healthy as f64 / total as f64)
            }
            Ok(_) => CycleStatus::Unknown,
            Err(err) => {
                warn!(service_id = %self.service_id, %err, "probe cycle did not complete");
                CycleStatus::Unhealthy
            }
        };

        let (effects, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let effects = state.observe(cycle, &self.thresholds);
            (effects, state.snapshot(response_time_ms))
        };

        if let Err(err) = self
            .registry
            .record_probe_cycle(&self.service_id, snapshot)
            .await
        {
            warn!(service_id = %self.service_id, %err, "failed to write probe cycle back");
        }

        for effect in effects {
            self.apply(effect).await;
        }
    }

    async fn apply(&self, effect: Effect) {
        match effect {
            Effect::MarkUnhealthy => {
                if let Err(err) = self
                    .registry
                    .transition_status(&self.service_id, ServiceStatus::Unhealthy)
                    .await
                {
                    warn!(service_id = %self.service_id, %err, "failed to mark unhealthy");
                }
            }
            Effect::MarkRecovered => {
                if let Err(err) = self
                    .registry
                    .transition_status(&self.service_id, ServiceStatus::Active)
                    .await
                {
                    warn!(service_id = %self.service_id, %err, "failed to mark recovered");
                }
            }
            Effect::Raise(severity, message) => {
                let kind = if severity == AlertSeverity::Info {
                    "health-recovered"
                } else {
                    "health-threshold"
                };
                self.alerts
                    .send(Alert {
                        severity,
                        kind: kind.to_string(),
                        service_id: self.service_id.clone(),
                        message,
                        channel: self.channel.clone(),
                        context: serde_json::json!({
                            "tenant": self.tenant_name,
                            "endpoints": self.urls.len(),
                        }),
                    })
                    .await;
            }
        }
    }
}
