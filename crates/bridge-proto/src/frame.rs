//! Frame codec: header + payload + CRC-16-CCITT trailer.
//!
//! Wire layout, all multi-byte integers big-endian:
//! `version(1) || payload_len(2) || command_id(2) || payload(..) || crc(2)`

use bytes::Bytes;

use crate::{
    crc::crc16_ccitt,
    errors::{FrameError, Result},
};

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 2;

/// Header size in bytes: version(1) + length(2) + command_id(2).
pub const HEADER_SIZE: usize = 5;

/// Trailer size in bytes: CRC-16.
pub const TRAILER_SIZE: usize = 2;

/// Default maximum payload size in bytes.
pub const MAX_PAYLOAD: usize = 128;

/// A decoded, validated protocol frame.
///
/// Invariant: `payload.len() == declared header length` and the trailer CRC
/// matches `crc16_ccitt(header || payload)`. Both are enforced by
/// [`Frame::parse`]; [`Frame::build`] establishes them by construction.
/// Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 16-bit command id, including the compression flag bit if set.
    pub command_id: u16,
    /// Frame payload, `0..=MAX_PAYLOAD` bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Build the raw (pre-COBS) bytes for a frame: header, payload, CRC.
    ///
    /// Rejects payloads over `max_payload`.
    pub fn build(command_id: u16, payload: impl Into<Bytes>, max_payload: usize) -> Result<Vec<u8>> {
        let payload = payload.into();
        if payload.len() > max_payload {
            return Err(FrameError::PayloadTooLarge { size: payload.len(), max: max_payload });
        }

        let mut raw = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
        raw.push(PROTOCOL_VERSION);
        #[allow(clippy::cast_possible_truncation)]
        raw.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        raw.extend_from_slice(&command_id.to_be_bytes());
        raw.extend_from_slice(&payload);

        let crc = crc16_ccitt(&raw);
        raw.extend_from_slice(&crc.to_be_bytes());
        Ok(raw)
    }

    /// Parse a raw (post-COBS) frame buffer.
    ///
    /// Returns [`FrameError::TooShort`] / [`FrameError::VersionMismatch`] /
    /// [`FrameError::LengthMismatch`] for structural ("MALFORMED") failures,
    /// and [`FrameError::CrcMismatch`] only once structure is otherwise
    /// valid, matching the order the protocol design mandates so a CRC
    /// failure is never reported for a frame that was already malformed.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let minimum = HEADER_SIZE + TRAILER_SIZE;
        if raw.len() < minimum {
            return Err(FrameError::TooShort { actual: raw.len(), minimum });
        }

        let version = raw[0];
        if version != PROTOCOL_VERSION {
            return Err(FrameError::VersionMismatch(version));
        }

        let declared_len = u16::from_be_bytes([raw[1], raw[2]]) as usize;
        let command_id = u16::from_be_bytes([raw[3], raw[4]]);

        let actual_len = raw.len() - HEADER_SIZE - TRAILER_SIZE;
        if declared_len != actual_len {
            return Err(FrameError::LengthMismatch { declared: declared_len, actual: actual_len });
        }

        let crc_offset = HEADER_SIZE + actual_len;
        let expected = u16::from_be_bytes([raw[crc_offset], raw[crc_offset + 1]]);
        let computed = crc16_ccitt(&raw[..crc_offset]);
        if expected != computed {
            return Err(FrameError::CrcMismatch { expected, computed });
        }

        let payload = Bytes::copy_from_slice(&raw[HEADER_SIZE..crc_offset]);
        Ok(Self { command_id, payload })
    }
}
