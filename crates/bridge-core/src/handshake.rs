//! Handshake manager: reset + nonce/tag authentication, run once per
//! serial connect and again on every reconnect.
//!
//! Sans-IO, same shape as [`crate::flow`]: callers drive it with inbound
//! frames and clock ticks and execute the actions it returns.

use std::{ops::Sub, time::Duration};

use bridge_crypto::{verify_tag, SharedSecret, NONCE_SIZE, TAG_SIZE};
use bridge_proto::{command, Status};
use bytes::Bytes;

use crate::errors::BridgeError;

/// Lower clamp for `ack_timeout_ms` sent in the `LINK_RESET` payload.
pub const ACK_TIMEOUT_MIN: Duration = Duration::from_millis(20);
/// Upper clamp for `ack_timeout_ms`.
pub const ACK_TIMEOUT_MAX: Duration = Duration::from_millis(5000);
/// Lower clamp for `response_timeout_ms`.
pub const RESPONSE_TIMEOUT_MIN: Duration = Duration::from_millis(50);
/// Upper clamp for `response_timeout_ms`.
pub const RESPONSE_TIMEOUT_MAX: Duration = Duration::from_millis(10_000);
/// Lower clamp for `retry_limit`.
pub const RETRY_LIMIT_MIN: u8 = 0;
/// Upper clamp for `retry_limit`.
pub const RETRY_LIMIT_MAX: u8 = 10;

/// Ceiling on the exponential handshake backoff; not protocol-specified,
/// chosen so a wedged MCU doesn't leave the daemon retrying once an hour.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Serial timing agreed between host and MCU, sent inside `LINK_RESET`.
#[derive(Debug, Clone, Copy)]
pub struct SerialTimingWindow {
    /// Clamped ACK timeout in milliseconds.
    pub ack_timeout_ms: u16,
    /// Clamped response timeout in milliseconds.
    pub response_timeout_ms: u32,
    /// Clamped retry limit.
    pub retry_limit: u8,
}

impl SerialTimingWindow {
    /// Build a window from configured values, clamping each to its
    /// protocol-declared range.
    #[must_use]
    pub fn clamped(ack_timeout: Duration, response_timeout: Duration, retry_limit: u8) -> Self {
        let ack = ack_timeout.clamp(ACK_TIMEOUT_MIN, ACK_TIMEOUT_MAX).as_millis() as u16;
        let resp = response_timeout.clamp(RESPONSE_TIMEOUT_MIN, RESPONSE_TIMEOUT_MAX).as_millis() as u32;
        let retries = retry_limit.clamp(RETRY_LIMIT_MIN, RETRY_LIMIT_MAX);
        Self { ack_timeout_ms: ack, response_timeout_ms: resp, retry_limit: retries }
    }

    /// Encode as the 7-byte `LINK_RESET` payload:
    /// `uint16_be(ack_timeout_ms) || uint8(retry_limit) || uint32_be(response_timeout_ms)`.
    #[must_use]
    pub fn to_payload(self) -> [u8; 7] {
        let mut payload = [0u8; 7];
        payload[0..2].copy_from_slice(&self.ack_timeout_ms.to_be_bytes());
        payload[2] = self.retry_limit;
        payload[3..7].copy_from_slice(&self.response_timeout_ms.to_be_bytes());
        payload
    }
}

/// Action the driver must execute on behalf of the handshake manager.
#[derive(Debug)]
pub enum HandshakeAction {
    /// Write this frame to the serial device.
    WriteFrame {
        /// Command id to send.
        command_id: u16,
        /// Frame payload.
        payload: Bytes,
    },
}

/// Result of feeding a frame or a clock tick to the manager.
#[derive(Debug)]
pub enum HandshakeEvent {
    /// `LINK_RESET_RESP` arrived; caller should now call
    /// [`HandshakeManager::begin_sync`] with a fresh random nonce.
    ResetAcked,
    /// The MCU rejected the timing payload (old firmware); caller should
    /// call [`HandshakeManager::start_fallback`].
    NeedsTimingFallback,
    /// Handshake completed; link may be marked synchronized.
    Synchronized,
    /// A recoverable failure occurred; caller should back off and retry.
    /// Any frames the manager wants written first (e.g. a MALFORMED reply
    /// to a rate-limited sync response) come with it.
    Transient(BridgeError, Vec<HandshakeAction>),
    /// An unrecoverable failure occurred; caller must terminate.
    Fatal(BridgeError),
    /// Frame or tick was irrelevant to the current step.
    Ignored,
}

#[derive(Debug)]
enum Step<I> {
    Idle,
    AwaitingResetResp { fallback_sent: bool, deadline: I },
    AwaitingSyncResp { nonce: [u8; NONCE_SIZE], deadline: I },
}

/// Running counters for observability (fed into the status snapshot).
#[derive(Debug, Default, Clone, Copy)]
pub struct HandshakeStats {
    /// Handshake attempts started.
    pub attempts: u64,
    /// Handshakes that reached `Synchronized`.
    pub successes: u64,
    /// Transient failures observed.
    pub failures: u64,
    /// Fatal failures observed (daemon terminates on the first one).
    pub fatal_count: u64,
}

/// Per-connection handshake state machine.
pub struct HandshakeManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    secret: SharedSecret,
    previous_nonce: Option<u128>,
    failure_streak: u32,
    fatal_failure_threshold: u32,
    backoff_base: Duration,
    min_sync_interval: Duration,
    last_sync_resp_at: Option<I>,
    stats: HandshakeStats,
    step: Step<I>,
}

impl<I> HandshakeManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration> + std::ops::Add<Duration, Output = I>,
{
    /// Build a manager for a fresh connection.
    #[must_use]
    pub fn new(secret: SharedSecret, fatal_failure_threshold: u32, backoff_base: Duration, min_sync_interval: Duration) -> Self {
        Self {
            secret,
            previous_nonce: None,
            failure_streak: 0,
            fatal_failure_threshold: fatal_failure_threshold.max(1),
            backoff_base,
            min_sync_interval,
            last_sync_resp_at: None,
            stats: HandshakeStats::default(),
            step: Step::Idle,
        }
    }

    /// Current counters snapshot.
    #[must_use]
    pub fn stats(&self) -> HandshakeStats {
        self.stats
    }

    /// Begin a handshake: send `LINK_RESET` with the agreed timing window.
    pub fn start(&mut self, timing: SerialTimingWindow, now: I) -> Vec<HandshakeAction> {
        self.stats.attempts += 1;
        self.step = Step::AwaitingResetResp {
            fallback_sent: false,
            deadline: now + Duration::from_millis(u64::from(timing.response_timeout_ms)),
        };
        vec![HandshakeAction::WriteFrame {
            command_id: command::LINK_RESET,
            payload: Bytes::copy_from_slice(&timing.to_payload()),
        }]
    }

    /// Retry `LINK_RESET` with an empty payload after the MCU reported the
    /// timing payload as malformed (older firmware).
    pub fn start_fallback(&mut self, response_timeout: Duration, now: I) -> Vec<HandshakeAction> {
        self.step = Step::AwaitingResetResp { fallback_sent: true, deadline: now + response_timeout };
        vec![HandshakeAction::WriteFrame { command_id: command::LINK_RESET, payload: Bytes::new() }]
    }

    /// Proceed to the nonce exchange after `LINK_RESET_RESP` arrived.
    pub fn begin_sync(&mut self, nonce: [u8; NONCE_SIZE], response_timeout: Duration, now: I) -> Vec<HandshakeAction> {
        self.step = Step::AwaitingSyncResp { nonce, deadline: now + response_timeout };
        vec![HandshakeAction::WriteFrame { command_id: command::LINK_SYNC, payload: Bytes::copy_from_slice(&nonce) }]
    }

    /// Feed an inbound decoded frame to the manager.
    pub fn on_frame(&mut self, command_id: u16, payload: &[u8], now: I) -> HandshakeEvent {
        match &self.step {
            Step::AwaitingResetResp { fallback_sent, .. } => self.on_reset_step(command_id, payload, *fallback_sent),
            Step::AwaitingSyncResp { nonce, .. } => {
                let nonce = *nonce;
                self.on_sync_step(command_id, payload, nonce, now)
            },
            Step::Idle => HandshakeEvent::Ignored,
        }
    }

    fn on_reset_step(&mut self, command_id: u16, payload: &[u8], fallback_sent: bool) -> HandshakeEvent {
        if command_id == command::LINK_RESET_RESP {
            self.step = Step::Idle;
            return HandshakeEvent::ResetAcked;
        }
        if command_id == Status::Malformed.to_u16() && !fallback_sent {
            if Status::original_command_id(payload) == Some(command::LINK_RESET) {
                return HandshakeEvent::NeedsTimingFallback;
            }
        }
        HandshakeEvent::Ignored
    }

    fn on_sync_step(&mut self, command_id: u16, payload: &[u8], nonce: [u8; NONCE_SIZE], now: I) -> HandshakeEvent {
        if command_id != command::LINK_SYNC_RESP {
            return HandshakeEvent::Ignored;
        }

        if let Some(last) = self.last_sync_resp_at {
            if now.sub(last) < self.min_sync_interval {
                let reply = vec![HandshakeAction::WriteFrame {
                    command_id: Status::Malformed.to_u16(),
                    payload: Bytes::from(Status::payload(command::LINK_SYNC_RESP, &[])),
                }];
                return self.transient_with_reply(BridgeError::HandshakeTransient { reason: "sync response rate limit exceeded".to_string() }, reply);
            }
        }
        self.last_sync_resp_at = Some(now);

        let Some((returned_nonce, tag)) = split_sync_response(payload) else {
            return self.transient(BridgeError::HandshakeTransient { reason: "truncated sync response".to_string() });
        };

        if returned_nonce != nonce {
            return self.transient(BridgeError::HandshakeTransient { reason: "sync response echoed wrong nonce".to_string() });
        }

        if !verify_tag(&self.secret, &nonce, &tag) {
            self.stats.fatal_count += 1;
            self.step = Step::Idle;
            return HandshakeEvent::Fatal(BridgeError::HandshakeFatal { reason: "sync_auth_mismatch" });
        }

        let nonce_value = u128::from_be_bytes(nonce);
        if let Some(previous) = self.previous_nonce {
            if nonce_value <= previous {
                return self.transient(BridgeError::HandshakeTransient { reason: "nonce replay or regression".to_string() });
            }
        }

        self.previous_nonce = Some(nonce_value);
        self.failure_streak = 0;
        self.stats.successes += 1;
        self.step = Step::Idle;
        HandshakeEvent::Synchronized
    }

    fn transient(&mut self, error: BridgeError) -> HandshakeEvent {
        self.transient_with_reply(error, Vec::new())
    }

    fn transient_with_reply(&mut self, error: BridgeError, actions: Vec<HandshakeAction>) -> HandshakeEvent {
        self.failure_streak += 1;
        self.stats.failures += 1;
        if self.failure_streak >= self.fatal_failure_threshold {
            self.stats.fatal_count += 1;
            self.step = Step::Idle;
            return HandshakeEvent::Fatal(BridgeError::HandshakeFatal { reason: "failure_streak_exceeded" });
        }
        HandshakeEvent::Transient(error, actions)
    }

    /// Check whether the current step's deadline has passed.
    pub fn tick(&mut self, now: I) -> HandshakeEvent {
        let expired = match &self.step {
            Step::AwaitingResetResp { deadline, .. } | Step::AwaitingSyncResp { deadline, .. } => now >= *deadline,
            Step::Idle => false,
        };
        if !expired {
            return HandshakeEvent::Ignored;
        }
        self.step = Step::Idle;
        self.transient(BridgeError::HandshakeTransient { reason: "handshake step timed out".to_string() })
    }

    /// Backoff duration for the next attempt, doubling per consecutive
    /// failure up to [`MAX_BACKOFF`].
    #[must_use]
    pub fn next_backoff(&self) -> Duration {
        let factor = 1u32.checked_shl(self.failure_streak.min(16)).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

fn split_sync_response(payload: &[u8]) -> Option<([u8; NONCE_SIZE], [u8; TAG_SIZE])> {
    if payload.len() < NONCE_SIZE + TAG_SIZE {
        return None;
    }
    let mut nonce = [0u8; NONCE_SIZE];
    let mut tag = [0u8; TAG_SIZE];
    nonce.copy_from_slice(&payload[..NONCE_SIZE]);
    tag.copy_from_slice(&payload[NONCE_SIZE..NONCE_SIZE + TAG_SIZE]);
    Some((nonce, tag))
}
