//! Error type for the MQTT bridge.

use thiserror::Error;

/// Failures from owning the MQTT connection or its durable spool.
#[derive(Error, Debug)]
pub enum MqttBridgeError {
    /// The underlying client reported a connection failure.
    #[error("mqtt connection error: {0}")]
    Connection(#[from] rumqttc::v5::ConnectionError),

    /// A publish or subscribe call failed against an established
    /// connection.
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::v5::ClientError),

    /// The durable spool directory could not be read or written.
    #[error("spool I/O error at {path}: {source}")]
    Spool {
        /// Spool file or directory path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
