//! Error type for the dispatch layer.

use thiserror::Error;

/// Failures raised while routing a frame or MQTT message.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The MQTT topic didn't match the configured grammar.
    #[error("malformed topic: {0}")]
    MalformedTopic(String),

    /// The topic/action pair is disabled by the authorization policy.
    #[error("forbidden: {area}/{action}")]
    Forbidden {
        /// Topic area (`file`, `shell`, …).
        area: String,
        /// Action segment within the area.
        action: String,
    },

    /// No component is registered for this area or command.
    #[error("no handler registered for {0}")]
    Unhandled(String),

    /// The underlying bridge runtime reported an error.
    #[error(transparent)]
    Bridge(#[from] bridge_core::BridgeError),
}
