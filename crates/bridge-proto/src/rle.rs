//! Narrow run-length codec used as an optional payload compression for one
//! flagged command class (see [`crate::COMPRESSED_FLAG`]).
//!
//! Escape byte `0xFF`:
//! - a literal `0xFF` byte is encoded as `ESC, LITERAL_MARKER, 0xFF` (the
//!   marker byte `255` can never be a run's `count - 2`, so this sentinel is
//!   unambiguous);
//! - a run of `MIN_RUN..=MAX_RUN` identical bytes is encoded as
//!   `ESC, count - 2, byte`.
//!
//! Correctness never depends on whether compression was chosen —
//! [`should_compress`] is only ever consulted by the caller as a hint.

use crate::errors::{FrameError, Result};

/// Escape byte.
pub const ESC: u8 = 0xFF;

/// Marker byte reserved for the literal-escape sentinel (`ESC, LITERAL_MARKER,
/// byte`). Never a valid `count - 2` for a run, so it can't collide with one.
pub const LITERAL_MARKER: u8 = 0xFF;

/// Shortest run worth encoding as `ESC, count-2, byte`.
pub const MIN_RUN: usize = 4;

/// Longest run a single escape sequence can represent. `count - 2` must fit
/// in a byte and must avoid [`LITERAL_MARKER`], capping it at 254 and the run
/// itself at 256.
pub const MAX_RUN: usize = 256;

/// Encode `data` using the escape+run-length scheme described above.
#[must_use]
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0usize;

    while i < data.len() {
        let byte = data[i];
        let run_len = data[i..].iter().take_while(|&&b| b == byte).count();

        if run_len >= MIN_RUN {
            let mut remaining = run_len;
            while remaining >= MIN_RUN {
                let chunk = remaining.min(MAX_RUN);
                out.push(ESC);
                #[allow(clippy::cast_possible_truncation)]
                out.push((chunk - 2) as u8);
                out.push(byte);
                remaining -= chunk;
            }
            for _ in 0..remaining {
                push_literal(&mut out, byte);
            }
            i += run_len;
        } else {
            push_literal(&mut out, byte);
            i += 1;
        }
    }
    out
}

fn push_literal(out: &mut Vec<u8>, byte: u8) {
    if byte == ESC {
        out.push(ESC);
        out.push(LITERAL_MARKER);
        out.push(ESC);
    } else {
        out.push(byte);
    }
}

/// Decode data produced by [`encode`].
///
/// Rejects a trailing `ESC` with no following bytes, or a run-length escape
/// missing its value byte.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < data.len() {
        if data[i] != ESC {
            out.push(data[i]);
            i += 1;
            continue;
        }

        let marker = *data.get(i + 1).ok_or(FrameError::Rle("truncated escape sequence"))?;
        if marker == LITERAL_MARKER {
            let value = *data.get(i + 2).ok_or(FrameError::Rle("truncated literal escape sequence"))?;
            out.push(value);
            i += 3;
            continue;
        }

        let value = *data.get(i + 2).ok_or(FrameError::Rle("truncated run-length sequence"))?;
        let count = usize::from(marker) + 2;
        out.resize(out.len() + count, value);
        i += 3;
    }
    Ok(out)
}

/// Cheap heuristic the dispatcher may use to decide whether compression is
/// worthwhile for `data`. Purely advisory: [`decode`]/[`encode`] are correct
/// regardless of this result.
#[must_use]
pub fn should_compress(data: &[u8]) -> bool {
    const MIN_SIZE: usize = 8;
    if data.len() < MIN_SIZE {
        return false;
    }

    let mut has_worthwhile_run = false;
    let mut lone_escapes = 0usize;
    let mut i = 0usize;
    while i < data.len() {
        let byte = data[i];
        let run_len = data[i..].iter().take_while(|&&b| b == byte).count();
        if run_len >= MIN_RUN {
            has_worthwhile_run = true;
            i += run_len;
        } else {
            if byte == ESC {
                lone_escapes += 1;
            }
            i += 1;
        }
    }

    has_worthwhile_run && lone_escapes * 4 < data.len()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn round_trips_runs_and_literals() {
        let data = [1u8, 2, 2, 2, 2, 2, 3, 0xFF, 0xFF, 4];
        let encoded = encode(&data);
        assert_eq!(decode(&encoded).expect("decode"), data);
    }

    #[test]
    fn run_longer_than_max_splits_into_multiple_escapes() {
        let data = vec![7u8; 600];
        let encoded = encode(&data);
        assert_eq!(decode(&encoded).expect("decode"), data);
    }

    #[test]
    fn a_maximal_run_does_not_collide_with_the_literal_escape_sentinel() {
        let data = vec![7u8; MAX_RUN];
        let encoded = encode(&data);
        assert_eq!(encoded, vec![ESC, (MAX_RUN - 2) as u8, 7]);
        assert_eq!(decode(&encoded).expect("decode"), data);
    }

    #[test]
    fn rejects_truncated_escape() {
        let err = decode(&[ESC]).unwrap_err();
        assert!(matches!(err, FrameError::Rle(_)));
    }

    #[test]
    fn rejects_truncated_run_length() {
        let err = decode(&[ESC, 5]).unwrap_err();
        assert!(matches!(err, FrameError::Rle(_)));
    }

    #[test]
    fn short_input_is_never_recommended_for_compression() {
        assert!(!should_compress(&[1, 2, 3]));
    }

    #[test]
    fn long_run_is_recommended_for_compression() {
        let mut data = vec![9u8; 64];
        data.extend_from_slice(&[1, 2, 3, 4]);
        assert!(should_compress(&data));
    }

    proptest! {
        #[test]
        fn arbitrary_data_round_trips(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode(&data);
            prop_assert_eq!(decode(&encoded).expect("decode"), data);
        }
    }
}
