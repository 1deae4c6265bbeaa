//! Environment abstraction for deterministic testing.
//!
//! Decouples the flow controller and handshake manager from real system
//! resources (time, randomness), so both can run against a simulated clock
//! and a seeded RNG in `bridge-harness` and against real ones in
//! `bridge-daemon`.

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// # Invariants
///
/// Implementations must guarantee:
/// - `now()` never goes backwards within a single process.
/// - `random_bytes()` uses cryptographically secure entropy in production.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment: `std::time::Instant` in
    /// production, a virtual instant under simulation.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleep for `duration`. The only async method here; protocol logic
    /// itself never calls this directly, only the driver loop around it.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generate a random 16-byte handshake nonce.
    fn random_nonce(&self) -> [u8; bridge_crypto::NONCE_SIZE] {
        let mut nonce = [0u8; bridge_crypto::NONCE_SIZE];
        self.random_bytes(&mut nonce);
        nonce
    }
}
