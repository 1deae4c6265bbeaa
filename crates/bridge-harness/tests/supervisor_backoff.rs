//! Each non-fatal restart doubles the supervisor's backoff before the
//! next attempt, and a fatal error from the supervised task is what
//! finally lets the daemon process exit.

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use bridge_core::RuntimeState;
use bridge_daemon::{
    supervisor::{Supervisor, TaskSpec},
    DaemonError,
};

async fn backoff_after_nth_restart(state: &RuntimeState, name: &str, restarts: u64) -> u64 {
    loop {
        {
            let stats = state.supervisor_stats.read().await;
            if let Some(entry) = stats.get(name) {
                if entry.restarts >= restarts {
                    return entry.backoff_seconds;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn backoff_strictly_increases_between_the_first_two_restarts_then_the_task_gives_up() {
    let state = Arc::new(RuntimeState::new(4, 4, 4));
    let mut supervisor = Supervisor::new(Arc::clone(&state));
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = Arc::clone(&attempts);

    supervisor.spawn(TaskSpec::new("flaky-link", Duration::from_secs(1), Duration::from_secs(8)), move || {
        let attempts = Arc::clone(&attempts_clone);
        async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(DaemonError::Io(std::io::Error::new(std::io::ErrorKind::Other, "transient")))
            } else {
                Err(DaemonError::Fatal("out of retries".to_string()))
            }
        }
    });

    let first_backoff = backoff_after_nth_restart(&state, "flaky-link", 1).await;
    let second_backoff = backoff_after_nth_restart(&state, "flaky-link", 2).await;
    assert!(second_backoff > first_backoff, "backoff did not grow: {first_backoff}s then {second_backoff}s");

    let error = supervisor.run_until_fatal().await;
    assert!(matches!(error, DaemonError::Fatal(_)));
    let stats = state.supervisor_stats.read().await;
    assert!(stats.get("flaky-link").expect("task recorded").fatal);
}
