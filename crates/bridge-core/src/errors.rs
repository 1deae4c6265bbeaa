//! Error taxonomy shared by the flow controller, handshake manager, and
//! dispatcher.

use thiserror::Error;

/// Errors recoverable or fatal conditions observed while running the link.
///
/// Mirrors the protocol design's error taxonomy. Variants carry the fields
/// needed both to log usefully and to build the matching status/MQTT
/// payload without looking anything up a second time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// COBS decode failure, oversize packet, or empty packet.
    #[error("framing error: {reason}")]
    Framing {
        /// Human-readable cause.
        reason: String,
    },

    /// Header version/length mismatch.
    #[error("decode error: {reason}")]
    Decode {
        /// Human-readable cause.
        reason: String,
    },

    /// Frame trailer CRC did not match the computed value.
    #[error("crc mismatch: expected {expected:#06x}, computed {computed:#06x}")]
    CrcMismatch {
        /// CRC carried in the frame trailer.
        expected: u16,
        /// CRC computed over the received header+payload.
        computed: u16,
    },

    /// No ACK or response arrived for a sent command within its deadline.
    #[error("timeout waiting for {awaiting} on command {command_id:#06x}")]
    FlowTimeout {
        /// Command the flow controller was waiting on.
        command_id: u16,
        /// What was being awaited (`"ack"` or `"response"`).
        awaiting: &'static str,
    },

    /// An ACK or response arrived referencing a different command than the
    /// one currently in flight.
    #[error("flow mismatch: expected command {expected:#06x}, got {actual:#06x}")]
    FlowMismatch {
        /// Command the flow controller expected a reply for.
        expected: u16,
        /// Command id actually referenced by the reply.
        actual: u16,
    },

    /// Handshake failure that warrants backoff and retry.
    #[error("transient handshake failure: {reason}")]
    HandshakeTransient {
        /// Human-readable cause.
        reason: String,
    },

    /// Handshake failure that must terminate the daemon.
    #[error("fatal handshake failure: {reason}")]
    HandshakeFatal {
        /// Machine-readable reason tag, e.g. `"sync_auth_mismatch"`.
        reason: &'static str,
    },

    /// Serial device I/O failure or unexpected connection close.
    #[error("transport error: {reason}")]
    Transport {
        /// Human-readable cause.
        reason: String,
    },

    /// An MQTT topic/action pair is disallowed by policy.
    #[error("policy violation: {topic} forbids {action}")]
    Policy {
        /// Topic the request arrived on.
        topic: String,
        /// Action that was attempted.
        action: &'static str,
    },

    /// A command or MQTT payload failed validation for its target handler.
    #[error("validation error: {reason}")]
    Validation {
        /// Human-readable cause.
        reason: String,
    },

    /// A bounded resource (queue, quota, slot) was exhausted.
    #[error("resource exhausted: {resource}")]
    Resource {
        /// Name of the exhausted resource.
        resource: &'static str,
    },
}

impl BridgeError {
    /// True if this error must terminate the daemon rather than be
    /// recovered locally.
    ///
    /// Only [`BridgeError::HandshakeFatal`] is fatal; every other variant
    /// is handled by its owning component (retry, status reply, counter
    /// bump, reconnect).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::HandshakeFatal { .. })
    }
}
