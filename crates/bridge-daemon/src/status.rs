//! Periodic JSON status snapshot, written to `status_file` every
//! `status_interval` and reused verbatim for the `P/system/bridge/summary/get`
//! publish.
//!
//! Grounded on `yunbridge.state.status.status_writer`: a loop over a
//! fixed interval that serializes the current `RuntimeState` and
//! overwrites one file, rather than appending a log.

use std::{
    collections::HashMap,
    path::Path,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use bridge_core::RuntimeState;
use serde::Serialize;
use tokio::time::sleep;
use tracing::warn;

use crate::errors::DaemonError;

/// Broker connection state, shared between the MQTT task (writer) and
/// the status writer (reader). Lives outside `RuntimeState` because the
/// broker connection itself belongs to `bridge-mqtt`, not the sans-IO
/// core.
#[derive(Debug, Default)]
pub struct MqttStatus {
    connected: AtomicBool,
    queue_depth: AtomicUsize,
}

impl MqttStatus {
    /// Record the current MQTT broker connection state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Record the current outbound publish queue depth.
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    fn connected_snapshot(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn queue_depth_snapshot(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Serialize)]
struct HandshakeSnapshot {
    attempts: u64,
    successes: u64,
    failures: u64,
    fatal_count: u64,
}

#[derive(Debug, Serialize)]
struct MqttSnapshot {
    connected: bool,
    queue_depth: usize,
    dropped_messages: u64,
}

#[derive(Debug, Serialize)]
struct CountersSnapshot {
    crc_errors: u64,
    decode_errors: u64,
}

#[derive(Debug, Serialize)]
struct SupervisorTaskSnapshot {
    restarts: u64,
    last_failure_unix: Option<u64>,
    backoff_seconds: u64,
    fatal: bool,
}

/// One point-in-time rendering of the daemon's health, matching the
/// snapshot shape named by the protocol design: uptime, link state,
/// handshake counters, MQTT queue depth, decode counters, and
/// per-supervised-task restart bookkeeping.
#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    uptime_seconds: u64,
    link_synchronized: bool,
    handshake: HandshakeSnapshot,
    mqtt: MqttSnapshot,
    counters: CountersSnapshot,
    supervisor: HashMap<String, SupervisorTaskSnapshot>,
}

/// Build a snapshot from `state`. `mqtt_connected`/`mqtt_queue_depth`
/// come from the caller since the broker connection isn't owned by
/// `RuntimeState` itself.
pub async fn snapshot(state: &RuntimeState, started_at: std::time::Instant, mqtt_connected: bool, mqtt_queue_depth: usize) -> StatusSnapshot {
    let handshake_attempts = state.counters.handshake_attempts.load(Ordering::Relaxed);
    let handshake_successes = state.counters.handshake_successes.load(Ordering::Relaxed);
    let handshake_failures = state.counters.handshake_failures.load(Ordering::Relaxed);
    let handshake_fatal = state.counters.handshake_fatal.load(Ordering::Relaxed);
    let crc_errors = state.counters.crc_errors.load(Ordering::Relaxed);
    let decode_errors = state.counters.decode_errors.load(Ordering::Relaxed);
    let mqtt_dropped = state.counters.mqtt_dropped.load(Ordering::Relaxed);

    let supervisor = state
        .supervisor_stats
        .read()
        .await
        .iter()
        .map(|(name, stats)| {
            (
                name.clone(),
                SupervisorTaskSnapshot {
                    restarts: stats.restarts,
                    last_failure_unix: stats.last_failure_unix,
                    backoff_seconds: stats.backoff_seconds,
                    fatal: stats.fatal,
                },
            )
        })
        .collect();

    StatusSnapshot {
        uptime_seconds: started_at.elapsed().as_secs(),
        link_synchronized: state.is_link_synchronized(),
        handshake: HandshakeSnapshot {
            attempts: handshake_attempts,
            successes: handshake_successes,
            failures: handshake_failures,
            fatal_count: handshake_fatal,
        },
        mqtt: MqttSnapshot { connected: mqtt_connected, queue_depth: mqtt_queue_depth, dropped_messages: mqtt_dropped },
        counters: CountersSnapshot { crc_errors, decode_errors },
        supervisor,
    }
}

async fn write_status_file(path: &Path, snapshot: &StatusSnapshot) -> Result<(), DaemonError> {
    let body = serde_json::to_vec_pretty(snapshot).map_err(|source| DaemonError::Config(format!("serializing status snapshot: {source}")))?;
    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&tmp_path, &body).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Run forever, writing a fresh snapshot every `interval`. Never
/// terminates the daemon on a write failure — it logs and tries again
/// next tick, matching the non-fatal task classification in the
/// supervisor design.
pub async fn status_writer(
    state: &RuntimeState,
    mqtt_status: &MqttStatus,
    path: &Path,
    interval: Duration,
    started_at: std::time::Instant,
) -> Result<(), DaemonError> {
    loop {
        sleep(interval).await;
        let current = snapshot(state, started_at, mqtt_status.connected_snapshot(), mqtt_status.queue_depth_snapshot()).await;
        if let Err(error) = write_status_file(path, &current).await {
            warn!(%error, path = %path.display(), "failed to write status file");
        }
    }
}

/// Remove the status file on clean shutdown, mirroring
/// `cleanup_status_file`.
pub async fn cleanup_status_file(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        if error.kind() != std::io::ErrorKind::NotFound {
            warn!(%error, path = %path.display(), "failed to remove status file on shutdown");
        }
    }
}
