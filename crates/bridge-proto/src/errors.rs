//! Errors produced while building or parsing wire frames.

use thiserror::Error;

/// Result alias for `bridge-proto` operations.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Failures that can occur while encoding or decoding a frame.
///
/// These map onto the `Framing` / `Decode` / `CrcMismatch` error kinds of
/// the wider bridge error taxonomy (see `bridge-core::error`); this crate
/// stays ignorant of that taxonomy so it can be used standalone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer shorter than the minimum header+trailer size.
    #[error("frame too short: {actual} bytes, need at least {minimum}")]
    TooShort {
        /// Bytes actually present.
        actual: usize,
        /// Minimum bytes required (header + trailer).
        minimum: usize,
    },

    /// Protocol version byte did not match [`crate::PROTOCOL_VERSION`].
    #[error("unsupported protocol version {0}")]
    VersionMismatch(u8),

    /// Declared payload length did not match the bytes actually present.
    #[error("payload length mismatch: header says {declared}, got {actual}")]
    LengthMismatch {
        /// Length claimed by the header.
        declared: usize,
        /// Length actually available after the header.
        actual: usize,
    },

    /// Payload exceeds [`crate::MAX_PAYLOAD`].
    #[error("payload too large: {size} bytes, max {max}")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// Configured maximum payload size.
        max: usize,
    },

    /// Trailer CRC did not match the computed CRC over header+payload.
    #[error("CRC mismatch: expected {expected:#06x}, computed {computed:#06x}")]
    CrcMismatch {
        /// CRC carried in the frame trailer.
        expected: u16,
        /// CRC computed locally over header+payload.
        computed: u16,
    },

    /// A COBS-encoded block could not be decoded (embedded zero, truncated
    /// run length, or other structural violation).
    #[error("COBS decode error: {0}")]
    Cobs(&'static str),

    /// An RLE-encoded run was truncated or otherwise malformed.
    #[error("RLE decode error: {0}")]
    Rle(&'static str),
}
