//! Baud rate negotiation: ask the MCU to switch to a higher target baud
//! after the link has opened at its safe default.
//!
//! Pure bookkeeping around attempt counting; the actual port reopen is
//! owned by [`crate::link`].

use bytes::Bytes;

/// `SET_BAUDRATE` payload: the target baud rate the MCU should switch to.
/// Not specified at the byte level by the external protocol description
/// in this corpus; `uint32_be(target_baud)` is the simplest encoding
/// consistent with the rest of the wire format's big-endian convention.
#[must_use]
pub fn request_payload(target_baud: u32) -> Bytes {
    Bytes::copy_from_slice(&target_baud.to_be_bytes())
}

/// Tracks negotiation attempts toward a single target baud rate.
#[derive(Debug)]
pub struct BaudNegotiator {
    target_baud: u32,
    max_attempts: u32,
    attempts: u32,
}

/// Outcome of recording one negotiation attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum NegotiationStep {
    /// Send another `SET_BAUDRATE` request; attempts remain.
    Retry,
    /// Attempts exhausted without a confirming response.
    GiveUp,
}

impl BaudNegotiator {
    /// A negotiator for `target_baud`, allowed up to `max_attempts` tries.
    #[must_use]
    pub fn new(target_baud: u32, max_attempts: u32) -> Self {
        Self { target_baud, max_attempts: max_attempts.max(1), attempts: 0 }
    }

    /// Target baud rate this negotiator is working toward.
    #[must_use]
    pub fn target_baud(&self) -> u32 {
        self.target_baud
    }

    /// Record that a `SET_BAUDRATE` request was just sent.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Call when a response timeout elapses without `SET_BAUDRATE_RESP`.
    #[must_use]
    pub fn on_timeout(&self) -> NegotiationStep {
        if self.attempts >= self.max_attempts {
            NegotiationStep::GiveUp
        } else {
            NegotiationStep::Retry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_until_attempt_budget_exhausted() {
        let mut neg = BaudNegotiator::new(115_200, 3);
        neg.record_attempt();
        assert_eq!(neg.on_timeout(), NegotiationStep::Retry);
        neg.record_attempt();
        assert_eq!(neg.on_timeout(), NegotiationStep::Retry);
        neg.record_attempt();
        assert_eq!(neg.on_timeout(), NegotiationStep::GiveUp);
    }

    #[test]
    fn request_payload_round_trips_as_big_endian_u32() {
        let payload = request_payload(115_200);
        let bytes: [u8; 4] = payload.as_ref().try_into().expect("4 bytes");
        assert_eq!(u32::from_be_bytes(bytes), 115_200);
    }
}
