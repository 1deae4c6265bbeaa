//! Error type for this crate.

use thiserror::Error;

/// Errors produced while handling handshake secrets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The shared secret configured for this link is empty.
    #[error("shared secret must not be empty")]
    EmptySecret,
}
