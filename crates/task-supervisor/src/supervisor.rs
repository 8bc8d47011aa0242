//! Core supervision engine.

use crate::config::{SupervisorConfig, TaskContext};
use crate::error::TaskError;
use crate::report::{BatchReport, BatchSummary, SupervisorStats, TaskMetadata, TaskReport};
use anyhow::anyhow;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle events emitted for external observers.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A supervised operation completed successfully.
    Resolved {
        /// Id of the execution.
        task_id: Uuid,
        /// Component tag.
        component: String,
    },
    /// A supervised operation exhausted its attempts and failed.
    Rejected {
        /// Id of the execution.
        task_id: Uuid,
        /// Component tag.
        component: String,
    },
    /// The active-task count crossed the configured threshold.
    HighLoad {
        /// Active tasks at the time of the event.
        active: usize,
    },
    /// The bookkeeping map grew past the configured threshold.
    MemoryWarning {
        /// Tracked entries at the time of the event.
        tracked: usize,
    },
}

/// Bookkeeping entry for an in-flight supervised operation.
#[derive(Debug)]
struct ActiveTask {
    component: String,
    started: Instant,
    timeout: Duration,
}

/// Supervises asynchronous operations: per-component timeouts, fixed-delay
/// retries, bounded batches, and a defensive sweep of leaked entries.
///
/// All bookkeeping is instance state, so independent supervisors can coexist
/// (one per test, one per subsystem) without sharing maps.
pub struct TaskSupervisor {
    config: SupervisorConfig,
    active: Mutex<HashMap<Uuid, ActiveTask>>,
    stats: Mutex<SupervisorStats>,
    events: broadcast::Sender<TaskEvent>,
}

impl TaskSupervisor {
    /// Create a supervisor with the given configuration.
    pub fn new(config: SupervisorConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            active: Mutex::new(HashMap::new()),
            stats: Mutex::new(SupervisorStats::default()),
            events,
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Snapshot the running counters.
    pub fn stats(&self) -> SupervisorStats {
        let mut snapshot = self.stats.lock().unwrap().clone();
        snapshot.active = self.active.lock().unwrap().len();
        snapshot
    }

    /// Execute one operation under supervision.
    ///
    /// The operation closure is invoked once per attempt. Each attempt runs on
    /// its own task and races the component policy's timeout; on expiry the
    /// attempt is aborted (best-effort — in-flight I/O may still complete and
    /// its result is discarded) and the timeout failure is returned
    /// immediately. Retries apply only to operation failures and panics: if
    /// attempts remain, the operation is resubmitted after the policy's fixed
    /// delay.
    ///
    /// This method never panics and never propagates an error: every failure
    /// mode, including a panic inside the operation, is returned as a
    /// [`TaskError`] inside the report.
    pub async fn supervise<T, F, Fut>(&self, ctx: &TaskContext, operation: F) -> TaskReport<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let policy = self.config.policy_for(&ctx.component);
        let task_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        self.track(task_id, &ctx.component, policy.timeout);
        debug!(%task_id, component = %ctx.component, "supervising operation");

        let mut attempts = 0u32;
        let outcome = loop {
            attempts += 1;
            match attempt(operation(), policy.timeout).await {
                Ok(value) => break Ok(value),
                // A hung operation already consumed its full time budget;
                // resubmitting it would multiply the caller's wait.
                Err(err @ TaskError::Timeout(_)) => break Err(err),
                Err(err) if attempts <= policy.max_retries => {
                    debug!(
                        %task_id,
                        component = %ctx.component,
                        attempt = attempts,
                        %err,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(policy.retry_delay).await;
                }
                Err(err) => break Err(err),
            }
        };

        self.untrack(task_id);
        self.record_outcome(task_id, &ctx.component, &outcome);

        TaskReport {
            outcome,
            metadata: TaskMetadata {
                task_id,
                component: ctx.component.clone(),
                attempts,
                started_at,
                duration: start.elapsed(),
                regions: ctx.regions.clone(),
            },
        }
    }

    /// Execute a set of operations in bounded groups.
    ///
    /// Operations are partitioned into groups of `batch_size`; each group is
    /// supervised and joined as a unit. Failures inside a group are recorded
    /// as per-item error reports and never abort the remaining groups.
    pub async fn supervise_batch<T, F, Fut>(
        &self,
        ctx: &TaskContext,
        operations: Vec<F>,
    ) -> BatchReport<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let total = operations.len();
        let mut reports = Vec::with_capacity(total);
        let mut ops = operations.into_iter().peekable();

        while ops.peek().is_some() {
            let group: Vec<F> = ops.by_ref().take(self.config.batch_size).collect();
            let group_reports =
                join_all(group.into_iter().map(|op| self.supervise(ctx, op))).await;
            reports.extend(group_reports);
        }

        let success = reports.iter().filter(|r| r.is_success()).count();
        let errors = total - success;
        let success_rate = if total == 0 {
            1.0
        } else {
            success as f64 / total as f64
        };

        self.stats.lock().unwrap().batches_processed += 1;
        info!(
            component = %ctx.component,
            total,
            success,
            errors,
            "batch complete"
        );

        BatchReport {
            reports,
            summary: BatchSummary {
                total,
                success,
                errors,
                success_rate,
            },
        }
    }

    /// Supervise an operation tagged with a region set.
    ///
    /// This is bookkeeping only: the result metadata carries the regions so
    /// callers and log sinks can attribute the work, but no leader election or
    /// quorum is involved.
    pub async fn coordinate_across_regions<T, F, Fut>(
        &self,
        ctx: &TaskContext,
        regions: &[String],
        operation: F,
    ) -> TaskReport<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        info!(component = %ctx.component, ?regions, "coordinating across regions");
        let tagged = ctx.clone().with_regions(regions.to_vec());
        self.supervise(&tagged, operation).await
    }

    /// Remove bookkeeping entries whose age exceeds twice their timeout.
    ///
    /// An entry normally disappears when its operation settles; one that
    /// lingers this long belongs to an attempt whose cancellation did not
    /// actually stop execution. Returns the number of entries removed.
    pub fn sweep_stale(&self) -> usize {
        let mut active = self.active.lock().unwrap();
        let stale: Vec<Uuid> = active
            .iter()
            .filter(|(_, task)| task.started.elapsed() > task.timeout * 2)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            if let Some(task) = active.remove(id) {
                warn!(task_id = %id, component = %task.component, "swept stale task entry");
            }
        }
        drop(active);

        let swept = stale.len();
        if swept > 0 {
            self.stats.lock().unwrap().swept += swept as u64;
        }
        swept
    }

    /// Spawn a background loop running [`sweep_stale`](Self::sweep_stale) on
    /// the configured interval. The loop runs until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(supervisor.config.sweep_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                supervisor.sweep_stale();
            }
        })
    }

    fn track(&self, task_id: Uuid, component: &str, timeout: Duration) {
        let tracked = {
            let mut active = self.active.lock().unwrap();
            active.insert(
                task_id,
                ActiveTask {
                    component: component.to_string(),
                    started: Instant::now(),
                    timeout,
                },
            );
            active.len()
        };
        self.stats.lock().unwrap().total += 1;

        if tracked > self.config.high_load_threshold {
            let _ = self.events.send(TaskEvent::HighLoad { active: tracked });
        }
        if tracked > self.config.tracked_warning_threshold {
            let _ = self.events.send(TaskEvent::MemoryWarning { tracked });
        }
    }

    fn untrack(&self, task_id: Uuid) {
        self.active.lock().unwrap().remove(&task_id);
    }

    fn record_outcome<T>(&self, task_id: Uuid, component: &str, outcome: &Result<T, TaskError>) {
        let mut stats = self.stats.lock().unwrap();
        match outcome {
            Ok(_) => {
                stats.resolved += 1;
                drop(stats);
                let _ = self.events.send(TaskEvent::Resolved {
                    task_id,
                    component: component.to_string(),
                });
            }
            Err(err) => {
                stats.rejected += 1;
                if err.is_timeout() {
                    stats.timed_out += 1;
                }
                drop(stats);
                let _ = self.events.send(TaskEvent::Rejected {
                    task_id,
                    component: component.to_string(),
                });
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn track_for_test(&self, component: &str, age: Duration, timeout: Duration) {
        let mut active = self.active.lock().unwrap();
        active.insert(
            Uuid::new_v4(),
            ActiveTask {
                component: component.to_string(),
                started: Instant::now() - age,
                timeout,
            },
        );
    }
}

/// Run one attempt on its own task, racing the timeout.
async fn attempt<T, Fut>(fut: Fut, timeout: Duration) -> Result<T, TaskError>
where
    T: Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    let abort = handle.abort_handle();

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(err))) => Err(TaskError::Failed(err)),
        Ok(Err(join_err)) => {
            if join_err.is_panic() {
                Err(TaskError::Panicked(join_err.to_string()))
            } else {
                Err(TaskError::Failed(anyhow!("attempt task was cancelled")))
            }
        }
        Err(_) => {
            abort.abort();
            Err(TaskError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskPolicy;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> TaskPolicy {
        TaskPolicy {
            timeout: Duration::from_millis(100),
            max_retries: 0,
            retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn supervise_returns_value_and_metadata() {
        let supervisor = TaskSupervisor::new(SupervisorConfig::default());
        let ctx = TaskContext::new("registry-write");

        let report = supervisor
            .supervise(&ctx, || async { Ok::<_, anyhow::Error>("done") })
            .await;

        assert!(report.is_success());
        assert_eq!(report.outcome.unwrap(), "done");
        assert_eq!(report.metadata.attempts, 1);
        assert_eq!(report.metadata.component, "registry-write");
    }

    #[tokio::test]
    async fn supervise_retries_until_success() {
        let config = SupervisorConfig::default().with_policy(
            "flaky",
            TaskPolicy {
                timeout: Duration::from_millis(100),
                max_retries: 3,
                retry_delay: Duration::from_millis(1),
            },
        );
        let supervisor = TaskSupervisor::new(config);
        let ctx = TaskContext::new("flaky");
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let report = supervisor
            .supervise(&ctx, move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        anyhow::bail!("transient");
                    }
                    Ok(7)
                }
            })
            .await;

        assert!(report.is_success());
        assert_eq!(report.metadata.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn supervise_times_out_and_restores_active_count() {
        // Retries are enabled: a hung operation must still come back after a
        // single timeout window, not after the full retry schedule.
        let config = SupervisorConfig::default().with_policy(
            "stuck",
            TaskPolicy {
                timeout: Duration::from_millis(100),
                max_retries: 3,
                retry_delay: Duration::from_millis(50),
            },
        );
        let supervisor = TaskSupervisor::new(config);
        let ctx = TaskContext::new("stuck");

        let before = supervisor.stats().active;
        let start = Instant::now();
        let report: TaskReport<()> = supervisor
            .supervise(&ctx, || async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;
        let elapsed = start.elapsed();

        assert!(matches!(report.outcome, Err(TaskError::Timeout(_))));
        assert_eq!(report.metadata.attempts, 1);
        assert!(elapsed < Duration::from_millis(250), "took {elapsed:?}");
        assert_eq!(supervisor.stats().active, before);
        assert_eq!(supervisor.stats().timed_out, 1);
    }

    #[tokio::test]
    async fn supervise_catches_panics() {
        let config = SupervisorConfig::default().with_policy("bad", quick_policy());
        let supervisor = TaskSupervisor::new(config);
        let ctx = TaskContext::new("bad");

        let report: TaskReport<()> = supervisor
            .supervise(&ctx, || async { panic!("boom") })
            .await;

        assert!(matches!(report.outcome, Err(TaskError::Panicked(_))));
        assert_eq!(supervisor.stats().rejected, 1);
    }

    #[tokio::test]
    async fn batch_counts_mixed_failures() {
        let config = SupervisorConfig {
            batch_size: 2,
            ..SupervisorConfig::default()
        }
        .with_policy("batch", quick_policy());
        let supervisor = TaskSupervisor::new(config);
        let ctx = TaskContext::new("batch");

        let operations: Vec<_> = (0..5)
            .map(|i| {
                move || async move {
                    if i % 2 == 0 {
                        Ok(i)
                    } else {
                        anyhow::bail!("item {i} failed")
                    }
                }
            })
            .collect();

        let batch = supervisor.supervise_batch(&ctx, operations).await;

        assert_eq!(batch.summary.total, 5);
        assert_eq!(batch.summary.success, 3);
        assert_eq!(batch.summary.errors, 2);
        assert!((batch.summary.success_rate - 0.6).abs() < f64::EPSILON);
        assert_eq!(supervisor.stats().batches_processed, 1);
    }

    #[tokio::test]
    async fn region_coordination_tags_metadata() {
        let supervisor = TaskSupervisor::new(SupervisorConfig::default());
        let ctx = TaskContext::new("region-scan");
        let regions = vec!["us-west1".to_string(), "eu-west1".to_string()];

        let report = supervisor
            .coordinate_across_regions(&ctx, &regions, || async {
                Ok::<_, anyhow::Error>(())
            })
            .await;

        assert!(report.is_success());
        assert_eq!(report.metadata.regions, regions);
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_entries() {
        let supervisor = TaskSupervisor::new(SupervisorConfig::default());
        let timeout = Duration::from_millis(50);

        supervisor.track_for_test("stale", Duration::from_millis(500), timeout);
        supervisor.track_for_test("fresh", Duration::from_millis(10), timeout);

        assert_eq!(supervisor.sweep_stale(), 1);
        assert_eq!(supervisor.stats().active, 1);
        assert_eq!(supervisor.stats().swept, 1);
    }

    #[tokio::test]
    async fn events_are_emitted_for_outcomes() {
        let supervisor = TaskSupervisor::new(SupervisorConfig::default());
        let mut events = supervisor.subscribe();
        let ctx = TaskContext::new("observed");

        let report = supervisor
            .supervise(&ctx, || async { Ok::<_, anyhow::Error>(1) })
            .await;
        assert!(report.is_success());

        match events.recv().await.unwrap() {
            TaskEvent::Resolved { component, .. } => assert_eq!(component, "observed"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
