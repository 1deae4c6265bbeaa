//! Wire format for the MCU serial link.
//!
//! This crate is transport-agnostic: it only knows how to turn bytes into
//! frames and back. Framing ([`cobs`]), the frame codec ([`frame`]), and the
//! optional RLE payload compression ([`rle`]) are pure functions over byte
//! slices with no I/O and no async runtime dependency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cobs;
pub mod command;
pub mod crc;
pub mod errors;
pub mod frame;
pub mod rle;
pub mod status;

pub use cobs::Framer;
pub use command::{CommandSpec, Direction, COMPRESSED_FLAG};
pub use errors::{FrameError, Result};
pub use frame::{Frame, HEADER_SIZE, MAX_PAYLOAD, PROTOCOL_VERSION, TRAILER_SIZE};
pub use status::Status;

/// Total on-the-wire budget for a single frame with `payload_len` bytes of
/// payload, including COBS/delimiter overhead.
#[must_use]
pub fn max_wire_size(payload_len: usize) -> usize {
    HEADER_SIZE + payload_len + TRAILER_SIZE + cobs::FRAMING_OVERHEAD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_wire_size_matches_default_payload_budget() {
        assert_eq!(max_wire_size(MAX_PAYLOAD), HEADER_SIZE + MAX_PAYLOAD + TRAILER_SIZE + 4);
    }
}
