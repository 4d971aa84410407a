//! Scheduled-work instrumentation.
//!
//! Background executions have no inbound request to borrow identity from, so
//! each one gets a fresh scoped context with a synthetic request id. That
//! makes scheduled-task logs correlatable exactly like request logs: grep
//! the id and the whole execution falls out. Duration and failures are
//! recorded per task name.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use obskit_core::ContextKey;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::ObskitConfig;
use crate::store;

/// Histogram of per-execution duration in milliseconds, tagged `task`.
pub const SCHEDULED_TASK_DURATION: &str = "scheduled.task.duration";
/// Counter of failed executions, tagged `task`.
pub const SCHEDULED_TASK_ERRORS: &str = "scheduled.task.errors";
/// Store key naming the task an execution belongs to.
pub const SCHEDULED_TASK_KEY: &str = "scheduledTask";

// ---------------------------------------------------------------------------
// ScheduledTask trait
// ---------------------------------------------------------------------------

/// A unit of periodic work.
#[async_trait]
pub trait ScheduledTask: Send + 'static {
    /// Task name used in logs, metric tags, and the context store.
    fn name(&self) -> &str;

    /// One execution.
    async fn run(&mut self) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ScheduledInstrumentation
// ---------------------------------------------------------------------------

/// Instruments task executions the way the request filter instruments
/// requests: fresh scope, identity entries, duration metric, error count.
#[derive(Debug, Clone)]
pub struct ScheduledInstrumentation {
    service_name: String,
    environment: String,
}

impl ScheduledInstrumentation {
    /// Builds the instrumentation from the top-level configuration.
    #[must_use]
    pub fn new(config: &ObskitConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            environment: config.environment.clone(),
        }
    }

    /// Runs the task once under a fresh scoped context carrying a synthetic
    /// `scheduled-<uuid>` request id. Duration is recorded on every exit
    /// path; a failure is counted, logged, and returned unchanged so the
    /// caller decides what a failing schedule means.
    ///
    /// # Errors
    ///
    /// Whatever the task itself returns.
    pub async fn run_once<T>(&self, task: &mut T) -> anyhow::Result<()>
    where
        T: ScheduledTask + ?Sized,
    {
        let task_name = task.name().to_owned();
        let service = self.service_name.clone();
        let environment = self.environment.clone();

        store::scope(async move {
            store::set(ContextKey::ServiceName, service);
            store::set(ContextKey::Environment, environment);
            store::set(
                ContextKey::RequestId,
                format!("scheduled-{}", Uuid::new_v4()),
            );
            store::set(SCHEDULED_TASK_KEY, task_name.clone());

            tracing::info!(task = %task_name, "Scheduled task started");
            let started = Instant::now();
            let result = task.run().await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            histogram!(SCHEDULED_TASK_DURATION, "task" => task_name.clone())
                .record(elapsed_ms);

            match result {
                Ok(()) => {
                    tracing::info!(task = %task_name, "Scheduled task completed");
                    Ok(())
                }
                Err(error) => {
                    counter!(SCHEDULED_TASK_ERRORS, "task" => task_name.clone()).increment(1);
                    tracing::error!(task = %task_name, error = %error, "Scheduled task failed");
                    Err(error)
                }
            }
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// ScheduledRunner
// ---------------------------------------------------------------------------

/// Drives one task at a fixed period on its own tokio task.
pub struct ScheduledRunner {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledRunner {
    /// Starts a runner executing `task` every `period`. The first execution
    /// happens one full period after start. Failing executions are counted
    /// and logged by the instrumentation, then the schedule continues.
    pub fn start<T>(
        mut task: T,
        period: Duration,
        instrumentation: ScheduledInstrumentation,
    ) -> Self
    where
        T: ScheduledTask,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            // Skip the immediate first tick so tasks don't fire at startup.
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let _ = instrumentation.run_once(&mut task).await;
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stops the runner gracefully, waiting for the loop to exit.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Task that records what the store looked like while it ran.
    struct ProbeTask {
        seen: Arc<Mutex<Vec<(Option<String>, Option<String>, Option<String>)>>>,
    }

    #[async_trait]
    impl ScheduledTask for ProbeTask {
        fn name(&self) -> &str {
            "ReportJob.generate"
        }

        async fn run(&mut self) -> anyhow::Result<()> {
            self.seen.lock().push((
                store::get(ContextKey::RequestId),
                store::get(SCHEDULED_TASK_KEY),
                store::get(ContextKey::ServiceName),
            ));
            Ok(())
        }
    }

    struct FailingTask {
        runs: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ScheduledTask for FailingTask {
        fn name(&self) -> &str {
            "Sync.push"
        }

        async fn run(&mut self) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("upstream rejected the batch")
        }
    }

    #[tokio::test]
    async fn execution_gets_a_synthetic_scoped_context() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut task = ProbeTask {
            seen: Arc::clone(&seen),
        };
        let instrumentation = ScheduledInstrumentation::new(&ObskitConfig::default());

        instrumentation.run_once(&mut task).await.expect("task ok");

        let runs = seen.lock();
        assert_eq!(runs.len(), 1);
        let (request_id, task_key, service) = &runs[0];
        assert!(request_id
            .as_deref()
            .expect("request id set")
            .starts_with("scheduled-"));
        assert_eq!(task_key.as_deref(), Some("ReportJob.generate"));
        assert_eq!(service.as_deref(), Some("obskit"));
    }

    #[tokio::test]
    async fn each_execution_gets_a_fresh_request_id() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut task = ProbeTask {
            seen: Arc::clone(&seen),
        };
        let instrumentation = ScheduledInstrumentation::new(&ObskitConfig::default());

        instrumentation.run_once(&mut task).await.expect("task ok");
        instrumentation.run_once(&mut task).await.expect("task ok");

        let runs = seen.lock();
        assert_eq!(runs.len(), 2);
        assert_ne!(runs[0].0, runs[1].0);
    }

    #[tokio::test]
    async fn failure_propagates_to_the_caller() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut task = FailingTask {
            runs: Arc::clone(&runs),
        };
        let instrumentation = ScheduledInstrumentation::new(&ObskitConfig::default());

        let result = instrumentation.run_once(&mut task).await;
        assert_eq!(
            result.expect_err("task fails").to_string(),
            "upstream rejected the batch"
        );
    }

    #[tokio::test]
    async fn enclosing_scope_is_untouched_by_an_execution() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let instrumentation = ScheduledInstrumentation::new(&ObskitConfig::default());

        store::scope(async {
            store::set(ContextKey::RequestId, "req-outer");
            let mut task = ProbeTask {
                seen: Arc::clone(&seen),
            };
            instrumentation.run_once(&mut task).await.expect("task ok");
            assert_eq!(
                store::get(ContextKey::RequestId).as_deref(),
                Some("req-outer")
            );
            assert_eq!(store::get(SCHEDULED_TASK_KEY), None);
        })
        .await;
    }

    #[tokio::test]
    async fn runner_fires_periodically_and_stops() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = ProbeTask {
            seen: Arc::clone(&seen),
        };
        let instrumentation = ScheduledInstrumentation::new(&ObskitConfig::default());

        let mut runner = ScheduledRunner::start(task, Duration::from_millis(20), instrumentation);
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.stop().await;

        let runs = seen.lock().len();
        assert!(runs >= 2, "expected at least 2 runs, saw {runs}");
    }

    #[tokio::test]
    async fn runner_keeps_going_after_failures() {
        let runs = Arc::new(AtomicU32::new(0));
        let task = FailingTask {
            runs: Arc::clone(&runs),
        };
        let instrumentation = ScheduledInstrumentation::new(&ObskitConfig::default());

        let mut runner = ScheduledRunner::start(task, Duration::from_millis(20), instrumentation);
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.stop().await;

        assert!(runs.load(Ordering::SeqCst) >= 2);
    }
}
