//! Heartbeat task, grounded on `mcubridge.watchdog.WatchdogKeepalive`:
//! touches the hardware watchdog device on an interval so the kernel
//! doesn't reboot the board, as long as this task (and therefore the
//! whole `tokio` runtime) is still scheduling work.
//!
//! Never fatal — a write failure is logged and retried next tick, same
//! as the status writer. If the underlying device is missing (common in
//! development), failures are only logged once per run via a cheap
//! "already warned" flag rather than spamming one line per tick.

use std::{path::PathBuf, time::Duration};

use tokio::time::sleep;
use tracing::warn;

use crate::errors::DaemonError;

const DEFAULT_WATCHDOG_DEVICE: &str = "/dev/watchdog";

/// Pets `device` every `interval` by writing a single keepalive byte.
pub async fn run(interval: Duration, device: Option<PathBuf>) -> Result<(), DaemonError> {
    let device = device.unwrap_or_else(|| PathBuf::from(DEFAULT_WATCHDOG_DEVICE));
    let mut warned = false;
    loop {
        sleep(interval).await;
        match tokio::fs::OpenOptions::new().write(true).open(&device).await {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                if let Err(error) = file.write_all(b"1").await {
                    warn!(%error, device = %device.display(), "watchdog keepalive write failed");
                }
            },
            Err(error) if !warned => {
                warn!(%error, device = %device.display(), "watchdog device unavailable, keepalive disabled for this run");
                warned = true;
            },
            Err(_) => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn missing_device_logs_once_and_keeps_running() {
        let handle = tokio::spawn(run(Duration::from_millis(10), Some(PathBuf::from("/nonexistent/watchdog"))));
        tokio::time::advance(Duration::from_millis(35)).await;
        assert!(!handle.is_finished(), "watchdog loop must not exit on a missing device");
        handle.abort();
    }
}
