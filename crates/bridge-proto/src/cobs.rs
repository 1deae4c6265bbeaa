//! Consistent-overhead byte stuffing (COBS) with a single zero delimiter.
//!
//! `encode` turns an arbitrary byte string into a block containing no zero
//! bytes, followed by the 0x00 delimiter. [`Framer`] is the streaming
//! counterpart: feed it raw bytes off the wire and it yields decoded,
//! delimiter-stripped packets in arrival order.

use crate::errors::{FrameError, Result};

/// Delimiter byte between COBS-encoded packets on the wire.
pub const DELIMITER: u8 = 0x00;

/// Framing overhead budget used to size [`Framer::new`]'s `max_packet_size`:
/// one code byte, the delimiter, and the worst case ~1 byte per 254 for
/// COBS's run-length encoding.
pub const FRAMING_OVERHEAD: usize = 4;

/// COBS-encode `data` and append the delimiter.
///
/// The result never contains an internal 0x00 byte.
#[must_use]
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 254 + 2);
    let mut code_index = 0usize;
    let mut code = 1u8;
    out.push(0); // placeholder for the first code byte

    for &byte in data {
        if byte == 0 {
            out[code_index] = code;
            code_index = out.len();
            out.push(0);
            code = 1;
        } else {
            out.push(byte);
            code += 1;
            if code == 0xFF {
                out[code_index] = code;
                code_index = out.len();
                out.push(0);
                code = 1;
            }
        }
    }
    out[code_index] = code;
    out.push(DELIMITER);
    out
}

/// Decode one COBS block (without its trailing delimiter) back to raw bytes.
pub fn decode(block: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(block.len());
    let mut idx = 0usize;

    while idx < block.len() {
        let code = block[idx] as usize;
        if code == 0 {
            return Err(FrameError::Cobs("zero code byte inside block"));
        }
        idx += 1;
        let chunk_len = code - 1;
        let chunk_end = idx.checked_add(chunk_len).ok_or(FrameError::Cobs("run length overflow"))?;
        if chunk_end > block.len() {
            return Err(FrameError::Cobs("truncated run at end of block"));
        }
        out.extend_from_slice(&block[idx..chunk_end]);
        idx = chunk_end;
        if code < 0xFF && idx < block.len() {
            out.push(0);
        }
    }
    Ok(out)
}

/// Streaming COBS de-framer.
///
/// Buffers bytes across calls to [`Framer::feed`], splits on the 0x00
/// delimiter, and decodes each resulting block. Oversized packets enter a
/// "discard until next delimiter" mode so a single corrupt run doesn't wedge
/// the link.
pub struct Framer {
    buffer: Vec<u8>,
    discarding: bool,
    max_packet_size: usize,
    decode_errors: u64,
}

impl Framer {
    /// Create a framer that rejects any packet longer than `max_packet_size`
    /// bytes of COBS-encoded data (delimiter excluded).
    #[must_use]
    pub fn new(max_packet_size: usize) -> Self {
        Self { buffer: Vec::new(), discarding: false, max_packet_size, decode_errors: 0 }
    }

    /// Number of decode errors (oversize packets, malformed COBS blocks)
    /// observed since construction.
    #[must_use]
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Feed raw bytes from the wire; returns successfully decoded raw frame
    /// buffers (still containing header+payload+CRC, ready for
    /// [`crate::Frame::parse`]) in arrival order.
    ///
    /// Malformed COBS blocks are dropped and counted, not returned; this
    /// mirrors the protocol design's rule that framing/decode errors are
    /// never fatal to the link.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if byte == DELIMITER {
                if self.discarding {
                    self.discarding = false;
                    self.buffer.clear();
                    continue;
                }
                if !self.buffer.is_empty() {
                    match decode(&self.buffer) {
                        Ok(raw) => frames.push(raw),
                        Err(_) => self.decode_errors += 1,
                    }
                    self.buffer.clear();
                }
                continue;
            }

            if self.discarding {
                continue;
            }

            self.buffer.push(byte);
            if self.buffer.len() > self.max_packet_size {
                self.decode_errors += 1;
                self.buffer.clear();
                self.discarding = true;
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encode_never_contains_internal_zero() {
        let data = vec![0u8; 600];
        let encoded = encode(&data);
        assert_eq!(encoded.last(), Some(&DELIMITER));
        assert!(!encoded[..encoded.len() - 1].contains(&0));
    }

    #[test]
    fn round_trip_simple() {
        let data = b"hello\x00world";
        let encoded = encode(data);
        let block = &encoded[..encoded.len() - 1];
        let decoded = decode(block).expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn framer_yields_frames_in_order() {
        let mut framer = Framer::new(512);
        let mut wire = encode(b"one");
        wire.extend(encode(b"two"));
        let frames = framer.feed(&wire);
        assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn empty_packet_between_delimiters_is_ignored() {
        let mut framer = Framer::new(512);
        let frames = framer.feed(&[0x00, 0x00]);
        assert!(frames.is_empty());
    }

    #[test]
    fn partial_tail_persists_across_feed_calls() {
        let mut framer = Framer::new(512);
        let wire = encode(b"split");
        let (first, second) = wire.split_at(2);
        assert!(framer.feed(first).is_empty());
        let frames = framer.feed(second);
        assert_eq!(frames, vec![b"split".to_vec()]);
    }

    #[test]
    fn oversize_packet_enters_discard_mode() {
        let mut framer = Framer::new(8);
        let mut input = vec![1u8; 20];
        input.push(0x00);
        input.extend(encode(b"ok"));
        let frames = framer.feed(&input);
        assert_eq!(frames, vec![b"ok".to_vec()]);
        assert_eq!(framer.decode_errors(), 1);
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_round_trip(data in prop::collection::vec(any::<u8>(), 0..300)) {
            let encoded = encode(&data);
            let mut framer = Framer::new(4096);
            let frames = framer.feed(&encoded);
            prop_assert_eq!(frames, vec![data]);
        }
    }
}
