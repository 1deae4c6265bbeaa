//! Daemon error type.

use std::fmt;

/// Top-level daemon error.
#[derive(Debug)]
pub enum DaemonError {
    /// Configuration could not be loaded or failed validation. Fatal:
    /// fix configuration and restart.
    Config(String),

    /// A supervised task exhausted its recovery options and must
    /// terminate the daemon (a serial handshake fatal failure, or an
    /// MQTT authentication failure).
    Fatal(String),

    /// Error from the sans-IO bridge core (flow controller, handshake
    /// manager, link state machine, shared runtime state).
    Bridge(bridge_core::BridgeError),

    /// Error from owning the serial device.
    Transport(bridge_transport::TransportError),

    /// Error from owning the MQTT connection or its durable spool.
    Mqtt(bridge_mqtt::MqttBridgeError),

    /// Error from routing a frame or MQTT message.
    Dispatch(bridge_dispatch::DispatchError),

    /// Error from the handshake shared-secret wrapper.
    Crypto(bridge_crypto::CryptoError),

    /// Underlying I/O failure (status file, spool directory, ...).
    Io(std::io::Error),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
            Self::Bridge(err) => write!(f, "bridge error: {err}"),
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::Mqtt(err) => write!(f, "mqtt error: {err}"),
            Self::Dispatch(err) => write!(f, "dispatch error: {err}"),
            Self::Crypto(err) => write!(f, "crypto error: {err}"),
            Self::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bridge(err) => Some(err),
            Self::Transport(err) => Some(err),
            Self::Mqtt(err) => Some(err),
            Self::Dispatch(err) => Some(err),
            Self::Crypto(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Config(_) | Self::Fatal(_) => None,
        }
    }
}

impl From<bridge_core::BridgeError> for DaemonError {
    fn from(err: bridge_core::BridgeError) -> Self {
        Self::Bridge(err)
    }
}

impl From<bridge_transport::TransportError> for DaemonError {
    fn from(err: bridge_transport::TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<bridge_mqtt::MqttBridgeError> for DaemonError {
    fn from(err: bridge_mqtt::MqttBridgeError) -> Self {
        Self::Mqtt(err)
    }
}

impl From<bridge_dispatch::DispatchError> for DaemonError {
    fn from(err: bridge_dispatch::DispatchError) -> Self {
        Self::Dispatch(err)
    }
}

impl From<bridge_crypto::CryptoError> for DaemonError {
    fn from(err: bridge_crypto::CryptoError) -> Self {
        Self::Crypto(err)
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl DaemonError {
    /// Whether this error must terminate the whole daemon rather than
    /// restart the task that produced it.
    ///
    /// Only a handshake-fatal bridge error or an MQTT authentication
    /// failure qualify; everything else (transport hiccups, dispatch
    /// errors, a single spool write failure) is recovered by the
    /// supervisor restarting the owning task with backoff.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fatal(_) => true,
            Self::Bridge(err) => err.is_fatal(),
            Self::Mqtt(bridge_mqtt::MqttBridgeError::Connection(err)) => is_mqtt_auth_failure(err),
            _ => false,
        }
    }
}

/// Whether a `rumqttc` connection error reflects a broker-side
/// authentication/authorization rejection rather than a transient
/// network failure. `rumqttc` doesn't expose a dedicated variant for
/// this, so the check is string-based against the connect reason the
/// client formats into its `Display` output.
fn is_mqtt_auth_failure(err: &rumqttc::v5::ConnectionError) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("not authorized") || message.contains("bad username") || message.contains("bad user name")
}
