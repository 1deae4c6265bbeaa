//! Transport-local error type.

use thiserror::Error;

/// Failures from owning the serial device.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Opening or reconfiguring the serial port failed.
    #[error("failed to open serial port {port}: {source}")]
    Open {
        /// Device path.
        port: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A read or write on an open port failed.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Baud rate negotiation did not complete within the configured
    /// number of attempts.
    #[error("baud negotiation to {target_baud} failed after {attempts} attempts")]
    BaudNegotiationFailed {
        /// Target baud rate that could not be confirmed.
        target_baud: u32,
        /// Attempts made.
        attempts: u32,
    },

    /// The writer was asked to send a frame while no port is open.
    #[error("serial port not connected")]
    NotConnected,

    /// The underlying frame failed to build (oversize payload).
    #[error("frame encode error: {0}")]
    Frame(#[from] bridge_proto::FrameError),
}
