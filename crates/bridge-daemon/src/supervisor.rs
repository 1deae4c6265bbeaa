//! Restart-with-backoff task supervision.
//!
//! Grounded on `mcubridge.daemon.BridgeDaemon._setup_supervision` +
//! `mcubridge.services.task_supervisor.supervise_task`: each long-lived
//! task (serial link, MQTT bridge, status writer, watchdog) runs inside
//! a retry loop that restarts it after a failure, doubling backoff up to
//! a cap and resetting once a run survives past that cap. Only a
//! [`crate::errors::DaemonError::is_fatal`] error escapes the loop and
//! terminates the whole daemon; everything else is logged and retried.

use std::{future::Future, sync::Arc, time::Duration};

use bridge_core::{RuntimeState, SupervisorStats};
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::errors::DaemonError;

/// Restart-with-backoff policy for one supervised task.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Task name, used in logs and supervisor stats.
    pub name: &'static str,
    /// Backoff delay after the first failure.
    pub min_backoff: Duration,
    /// Upper bound the doubling backoff delay is capped at.
    pub max_backoff: Duration,
}

impl TaskSpec {
    /// Construct a [`TaskSpec`] from its fields.
    #[must_use]
    pub fn new(name: &'static str, min_backoff: Duration, max_backoff: Duration) -> Self {
        Self { name, min_backoff, max_backoff }
    }
}

async fn record_restart(state: &RuntimeState, name: &str, backoff: Duration) {
    let mut stats = state.supervisor_stats.write().await;
    let entry = stats.entry(name.to_string()).or_insert_with(SupervisorStats::default);
    entry.restarts += 1;
    entry.last_failure_unix = Some(unix_now());
    entry.backoff_seconds = backoff.as_secs();
}

async fn record_fatal(state: &RuntimeState, name: &str) {
    let mut stats = state.supervisor_stats.write().await;
    let entry = stats.entry(name.to_string()).or_insert_with(SupervisorStats::default);
    entry.fatal = true;
    entry.last_failure_unix = Some(unix_now());
}

fn unix_now() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Run `make()` in a loop, restarting with doubling backoff after each
/// non-fatal failure. Backoff resets to `spec.min_backoff` once a run
/// survives longer than `spec.max_backoff` before failing again — the
/// same "long enough uptime counts as recovered" heuristic the original
/// daemon's restart window uses.
///
/// Returns only when `make()` produces a fatal error, or completes with
/// `Ok(())` (treated as an intentional, permanent stop).
async fn supervise<F, Fut>(state: &RuntimeState, spec: TaskSpec, mut make: F) -> DaemonError
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), DaemonError>>,
{
    let mut backoff = spec.min_backoff;
    loop {
        let started = std::time::Instant::now();
        match make().await {
            Ok(()) => return DaemonError::Fatal(format!("task {} exited without error", spec.name)),
            Err(error) if error.is_fatal() => {
                error!(task = spec.name, %error, "supervised task failed fatally");
                record_fatal(state, spec.name).await;
                return error;
            },
            Err(error) => {
                warn!(task = spec.name, %error, backoff_secs = backoff.as_secs(), "supervised task failed, restarting");
                record_restart(state, spec.name, backoff).await;
                tokio::time::sleep(backoff).await;
                backoff = if started.elapsed() > spec.max_backoff { spec.min_backoff } else { (backoff * 2).min(spec.max_backoff) };
            },
        }
    }
}

/// Owns the group of supervised tasks and reports the first fatal
/// failure among them.
pub struct Supervisor {
    state: Arc<RuntimeState>,
    tasks: JoinSet<DaemonError>,
}

impl Supervisor {
    /// Create an empty [`Supervisor`] sharing `state` with its tasks.
    #[must_use]
    pub fn new(state: Arc<RuntimeState>) -> Self {
        Self { state, tasks: JoinSet::new() }
    }

    /// Register a task factory under `spec`. `make` is called again
    /// every time the previous run fails non-fatally.
    pub fn spawn<F, Fut>(&mut self, spec: TaskSpec, make: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), DaemonError>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let mut make = make;
        self.tasks.spawn(async move { supervise(&state, spec, &mut make).await });
    }

    /// Wait until one supervised task reports a fatal error (or panics),
    /// then return it. Does not abort the other tasks — the caller
    /// decides how to shut down.
    pub async fn run_until_fatal(mut self) -> DaemonError {
        match self.tasks.join_next().await {
            Some(Ok(error)) => error,
            Some(Err(join_error)) => DaemonError::Fatal(format!("supervised task panicked: {join_error}")),
            None => DaemonError::Fatal("supervisor has no tasks to run".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn retries_with_backoff_then_reports_the_fatal_error() {
        let state = RuntimeState::new(4, 4, 4);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let spec = TaskSpec::new("test-task", Duration::from_millis(1), Duration::from_millis(5));
        let error = supervise(&state, spec, move || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(DaemonError::Io(std::io::Error::new(std::io::ErrorKind::Other, "transient")))
                } else {
                    Err(DaemonError::Fatal("done retrying".to_string()))
                }
            }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(matches!(error, DaemonError::Fatal(_)));
        let stats = state.supervisor_stats.read().await;
        assert_eq!(stats.get("test-task").unwrap().restarts, 2);
        assert!(stats.get("test-task").unwrap().fatal);
    }

    #[tokio::test]
    async fn supervisor_reports_the_first_fatal_task() {
        let state = Arc::new(RuntimeState::new(4, 4, 4));
        let mut supervisor = Supervisor::new(Arc::clone(&state));
        supervisor.spawn(TaskSpec::new("always-fatal", Duration::from_millis(1), Duration::from_millis(5)), || async {
            Err(DaemonError::Fatal("boom".to_string()))
        });

        let error = supervisor.run_until_fatal().await;
        assert!(matches!(error, DaemonError::Fatal(msg) if msg == "boom"));
    }
}
