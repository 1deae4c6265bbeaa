//! Zeroizing wrapper for the serial link's shared secret.

use zeroize::Zeroize;

use crate::errors::CryptoError;

/// A shared secret configured on both the daemon and the MCU, used as the
/// HMAC key for handshake tag verification. Never logged, never compared
/// non-constant-time, zeroized on drop.
#[derive(Clone)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    /// Wrap `bytes` as a shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EmptySecret`] if `bytes` is empty — an empty
    /// secret would make the handshake's authentication check vacuous.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CryptoError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(CryptoError::EmptySecret);
        }
        Ok(Self(bytes))
    }

    /// Borrow the raw key bytes, for feeding into the MAC.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_secret() {
        assert!(matches!(SharedSecret::new(Vec::new()), Err(CryptoError::EmptySecret)));
    }

    #[test]
    fn accepts_nonempty_secret() {
        let secret = SharedSecret::new(*b"testshared").expect("valid secret");
        assert_eq!(secret.as_bytes(), b"testshared");
    }
}
