//! Daemon configuration: one record loaded from TOML at startup and
//! shared read-only (inside an `Arc`) by every task.
//!
//! Mirrors `mcubridge.config.settings.RuntimeConfig`'s flat field list;
//! every option there that affects runtime behavior gets a field here,
//! with `serde(default)` providing the same defaults the original ships
//! via UCI.

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::errors::DaemonError;

/// Flat, behaviorally-significant configuration for one daemon instance.
///
/// `log_level` and the config file path itself are CLI-only arguments
/// and have no field here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial device path, e.g. `/dev/ttyMCU0`.
    pub serial_port: String,
    /// Baud rate to negotiate up to once connected.
    pub serial_baud: u32,
    /// Baud rate used for the initial connect and the reset/handshake.
    pub serial_safe_baud: u32,
    /// Shared secret used to key the handshake's keyed-MAC.
    pub serial_shared_secret: String,
    /// Per-attempt ACK timeout.
    pub serial_retry_timeout_ms: u64,
    /// Per-attempt response timeout (flow controller and handshake).
    pub serial_response_timeout_ms: u64,
    /// Maximum retry attempts before giving up on a single send.
    pub serial_retry_attempts: u8,
    /// Minimum spacing between handshake resync attempts.
    pub serial_handshake_min_interval_ms: u64,
    /// Consecutive handshake failures before declaring it fatal.
    pub serial_handshake_fatal_failures: u32,

    /// MQTT broker hostname.
    pub mqtt_host: String,
    /// MQTT broker port.
    pub mqtt_port: u16,
    /// MQTT username, if authentication is required.
    pub mqtt_user: Option<String>,
    /// MQTT password, if authentication is required.
    pub mqtt_pass: Option<String>,
    /// Whether to connect over TLS.
    pub mqtt_tls: bool,
    /// CA certificate file for TLS, if any.
    pub mqtt_cafile: Option<String>,
    /// Client certificate file for TLS, if any.
    pub mqtt_certfile: Option<String>,
    /// Client key file for TLS, if any.
    pub mqtt_keyfile: Option<String>,
    /// Topic prefix all bridge topics are rooted under.
    pub mqtt_topic: String,
    /// In-memory outbound publish queue capacity before spooling.
    pub mqtt_queue_limit: usize,
    /// Directory the durable publish spool is kept in.
    pub mqtt_spool_dir: String,

    /// Byte capacity of the console-to-MCU queue.
    pub console_queue_limit_bytes: usize,
    /// Message capacity of each mailbox queue.
    pub mailbox_queue_limit: usize,
    /// Byte capacity of each mailbox queue (currently unenforced).
    pub mailbox_queue_bytes_limit: usize,
    /// Per-channel FIFO depth for pending pin read requests.
    pub pending_pin_request_limit: usize,

    /// Timeout for a single MCU process invocation.
    pub process_timeout_ms: u64,
    /// Maximum concurrent MCU process invocations.
    pub process_max_concurrent: usize,
    /// Maximum buffered output bytes per MCU process invocation.
    pub process_max_output_bytes: usize,

    /// Root directory the file component is sandboxed under.
    pub file_system_root: String,
    /// Maximum bytes accepted in a single file write.
    pub file_write_max_bytes: usize,
    /// Total storage quota for the file component's sandbox.
    pub file_storage_quota_bytes: u64,
    /// Whether file paths outside `/tmp` are permitted.
    pub allow_non_tmp_paths: bool,
    /// Whether arbitrary shell commands are permitted.
    pub shell_enabled: bool,

    /// Delay before a failed supervised task's first restart attempt.
    pub reconnect_delay_ms: u64,
    /// Interval between status file writes.
    pub status_interval_ms: u64,
    /// Path the status file is written to.
    pub status_file: String,
    /// Interval between unsolicited bridge summary publishes.
    pub bridge_summary_interval_ms: u64,
    /// Interval between unsolicited bridge handshake-state publishes.
    pub bridge_handshake_interval_ms: u64,

    /// Whether the hardware watchdog heartbeat task runs.
    pub watchdog_enabled: bool,
    /// Interval between watchdog keepalive writes.
    pub watchdog_interval_ms: u64,

    /// Parsed and carried for forward compatibility; no exporter runs in
    /// this version (Prometheus export is a declared non-goal).
    pub metrics_enabled: bool,
    /// Metrics exporter bind host (unused; see `metrics_enabled`).
    pub metrics_host: String,
    /// Metrics exporter bind port (unused; see `metrics_enabled`).
    pub metrics_port: u16,

    /// Number of `tokio` worker threads the runtime is built with.
    pub worker_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyMCU0".to_string(),
            serial_baud: 115_200,
            serial_safe_baud: 9_600,
            serial_shared_secret: String::new(),
            serial_retry_timeout_ms: 200,
            serial_response_timeout_ms: 500,
            serial_retry_attempts: 3,
            serial_handshake_min_interval_ms: 50,
            serial_handshake_fatal_failures: 5,

            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_user: None,
            mqtt_pass: None,
            mqtt_tls: false,
            mqtt_cafile: None,
            mqtt_certfile: None,
            mqtt_keyfile: None,
            mqtt_topic: "bridge".to_string(),
            mqtt_queue_limit: 256,
            mqtt_spool_dir: "/tmp/mcubridge/spool".to_string(),

            console_queue_limit_bytes: 4096,
            mailbox_queue_limit: 32,
            mailbox_queue_bytes_limit: 65_536,
            pending_pin_request_limit: 8,

            process_timeout_ms: 10_000,
            process_max_concurrent: 2,
            process_max_output_bytes: 65_536,

            file_system_root: "/tmp/mcubridge/files".to_string(),
            file_write_max_bytes: 65_536,
            file_storage_quota_bytes: 10 * 1024 * 1024,
            allow_non_tmp_paths: false,
            shell_enabled: false,

            reconnect_delay_ms: 1_000,
            status_interval_ms: 5_000,
            status_file: "/tmp/mcubridge/status.json".to_string(),
            bridge_summary_interval_ms: 60_000,
            bridge_handshake_interval_ms: 0,

            watchdog_enabled: false,
            watchdog_interval_ms: 10_000,

            metrics_enabled: false,
            metrics_host: "127.0.0.1".to_string(),
            metrics_port: 9100,

            worker_threads: 1,
        }
    }
}

impl Config {
    /// Load and parse a TOML config file from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Config`] if the file can't be read or
    /// doesn't parse as valid TOML for this schema.
    pub async fn load(path: &Path) -> Result<Self, DaemonError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DaemonError::Config(format!("reading {}: {source}", path.display())))?;
        Self::parse(path, &text)
    }

    /// Load and parse a TOML config file from `path`, without requiring a
    /// `tokio` runtime. Used by `main` to learn `worker_threads` before
    /// the runtime that field configures has been built.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Config`] if the file can't be read or
    /// doesn't parse as valid TOML for this schema.
    pub fn load_blocking(path: &Path) -> Result<Self, DaemonError> {
        let text =
            std::fs::read_to_string(path).map_err(|source| DaemonError::Config(format!("reading {}: {source}", path.display())))?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, DaemonError> {
        toml::from_str(text).map_err(|source| DaemonError::Config(format!("parsing {}: {source}", path.display())))
    }

    /// Serial retry timeout as a [`Duration`].
    #[must_use]
    pub fn serial_retry_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_retry_timeout_ms)
    }

    /// Serial response timeout as a [`Duration`].
    #[must_use]
    pub fn serial_response_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_response_timeout_ms)
    }

    /// Minimum interval between serial handshakes as a [`Duration`].
    #[must_use]
    pub fn serial_handshake_min_interval(&self) -> Duration {
        Duration::from_millis(self.serial_handshake_min_interval_ms)
    }

    /// Reconnect delay as a [`Duration`].
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Status reporting interval as a [`Duration`].
    #[must_use]
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Watchdog check interval as a [`Duration`].
    #[must_use]
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_from_an_empty_document() {
        let config: Config = toml::from_str("").expect("empty document uses all defaults");
        assert_eq!(config.serial_port, "/dev/ttyMCU0");
        assert_eq!(config.mqtt_port, 1883);
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let config: Config = toml::from_str(
            r#"
            serial_port = "/dev/ttyUSB0"
            mqtt_host = "broker.lan"
            "#,
        )
        .expect("partial document parses");
        assert_eq!(config.serial_port, "/dev/ttyUSB0");
        assert_eq!(config.mqtt_host, "broker.lan");
        assert_eq!(config.serial_baud, 115_200, "unnamed fields keep their default");
    }

    #[tokio::test]
    async fn load_reads_and_parses_a_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcubridge.toml");
        tokio::fs::write(&path, "mqtt_port = 8883\n").await.unwrap();
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.mqtt_port, 8883);
    }

    #[tokio::test]
    async fn load_reports_a_config_error_for_a_missing_file() {
        let err = Config::load(Path::new("/nonexistent/mcubridge.toml")).await.unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
    }
}
