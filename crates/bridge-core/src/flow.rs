//! Flow controller: per-command-class reliable send with ACK/response
//! tracking, retries, and timeouts.
//!
//! Sans-IO, following the same action-return pattern the session layer
//! uses: the controller never touches the serial device directly. A
//! driver calls [`FlowController::start_send`], executes the returned
//! [`FlowAction`]s, feeds back frames via [`FlowController::on_frame_received`],
//! and calls [`FlowController::tick`] periodically to drive timeouts.

use std::{
    collections::HashMap,
    ops::Sub,
    time::Duration,
};

use bridge_proto::{command, Status};
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::errors::BridgeError;

/// Action the driver must execute on behalf of the flow controller.
#[derive(Debug)]
pub enum FlowAction {
    /// Write this frame to the serial device.
    WriteFrame {
        /// Command id to send.
        command_id: u16,
        /// Frame payload.
        payload: Bytes,
    },
}

/// Result delivered to the caller of [`FlowController::start_send`] once its
/// operation completes, one way or another.
#[derive(Debug)]
pub enum FlowOutcome {
    /// The command was acknowledged (and, if it has one, its response
    /// arrived too).
    Success,
    /// The operation failed; no further retries will occur.
    Failure(BridgeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    Ack,
    Response,
}

struct PendingOperation<I> {
    payload: Bytes,
    attempt: u32,
    retries_left: u32,
    ack_deadline: I,
    response_deadline: Option<I>,
    awaiting: Awaiting,
    completion: oneshot::Sender<FlowOutcome>,
}

/// Counters the flow controller maintains across its lifetime.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlowCounters {
    /// Number of `start_send` calls.
    pub sends: u64,
    /// Number of ACKs observed (including ones for timed-out sends that
    /// arrived late, which are still counted but have no effect).
    pub acks: u64,
    /// Number of retransmissions performed after an ACK timeout.
    pub retries: u64,
    /// Number of operations that ultimately failed.
    pub failures: u64,
}

/// Per-command-class flow controller.
pub struct FlowController<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    pending: HashMap<u16, PendingOperation<I>>,
    last_sent: Option<u16>,
    ack_timeout: Duration,
    response_timeout: Duration,
    max_attempts: u32,
    counters: FlowCounters,
}

impl<I> FlowController<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration> + std::ops::Add<Duration, Output = I>,
{
    /// Create a controller with the given per-attempt ACK timeout, response
    /// timeout, and maximum send attempts (including the first).
    #[must_use]
    pub fn new(ack_timeout: Duration, response_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            pending: HashMap::new(),
            last_sent: None,
            ack_timeout,
            response_timeout,
            max_attempts: max_attempts.max(1),
            counters: FlowCounters::default(),
        }
    }

    /// Current counters snapshot.
    #[must_use]
    pub fn counters(&self) -> FlowCounters {
        self.counters
    }

    /// Number of command classes with an operation currently in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Begin sending `command_id` with `payload`.
    ///
    /// Returns the actions to execute (a single `WriteFrame`) and a
    /// receiver that resolves once the operation completes.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Resource`] if an operation for this command
    /// class is already in flight.
    pub fn start_send(
        &mut self,
        command_id: u16,
        payload: Bytes,
        now: I,
    ) -> Result<(Vec<FlowAction>, oneshot::Receiver<FlowOutcome>), BridgeError> {
        if self.pending.contains_key(&command_id) {
            return Err(BridgeError::Resource { resource: "flow_controller_slot" });
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            command_id,
            PendingOperation {
                payload: payload.clone(),
                attempt: 1,
                retries_left: self.max_attempts - 1,
                ack_deadline: now,
                response_deadline: None,
                awaiting: Awaiting::Ack,
                completion: tx,
            },
        );
        if let Some(op) = self.pending.get_mut(&command_id) {
            op.ack_deadline = add_duration(now, self.ack_timeout);
        }
        self.last_sent = Some(command_id);
        self.counters.sends += 1;

        Ok((vec![FlowAction::WriteFrame { command_id, payload }], rx))
    }

    /// Abandon every in-flight operation with failure. Used when the link
    /// is reset.
    pub fn reset(&mut self) {
        for (_, op) in self.pending.drain() {
            self.counters.failures += 1;
            let _ = op.completion.send(FlowOutcome::Failure(BridgeError::Transport {
                reason: "link reset".to_string(),
            }));
        }
        self.last_sent = None;
    }

    /// Drive timeouts. Call periodically (or scheduled exactly at the next
    /// deadline) with the current time.
    pub fn tick(&mut self, now: I) -> Vec<FlowAction> {
        let mut actions = Vec::new();
        let mut completed = Vec::new();

        for (&command_id, op) in &mut self.pending {
            match op.awaiting {
                Awaiting::Ack if now >= op.ack_deadline => {
                    if op.retries_left > 0 {
                        op.retries_left -= 1;
                        op.attempt += 1;
                        op.ack_deadline = add_duration(now, self.ack_timeout);
                        actions.push(FlowAction::WriteFrame {
                            command_id,
                            payload: op.payload.clone(),
                        });
                        self.counters.retries += 1;
                    } else {
                        completed.push(command_id);
                    }
                },
                Awaiting::Response => {
                    if let Some(deadline) = op.response_deadline {
                        if now >= deadline {
                            completed.push(command_id);
                        }
                    }
                },
                Awaiting::Ack => {},
            }
        }

        for command_id in completed {
            if let Some(op) = self.pending.remove(&command_id) {
                self.counters.failures += 1;
                let awaiting = match op.awaiting {
                    Awaiting::Ack => "ack",
                    Awaiting::Response => "response",
                };
                let _ = op
                    .completion
                    .send(FlowOutcome::Failure(BridgeError::FlowTimeout { command_id, awaiting }));
            }
        }

        actions
    }

    /// Feed a decoded inbound frame to the controller.
    ///
    /// Status frames are matched to their originating command via the
    /// echoed `original_command_id`; response frames are matched by
    /// checking whether any pending operation declares this `command_id`
    /// as its response pair.
    pub fn on_frame_received(&mut self, command_id: u16, payload: &[u8], now: I) {
        if let Some(status) = Status::from_u16(command_id) {
            let Some(original) = Status::original_command_id(payload) else { return };
            self.handle_status(status, original, now);
            return;
        }

        self.handle_response(command_id);
    }

    fn handle_status(&mut self, status: Status, original_command_id: u16, now: I) {
        self.counters.acks += u64::from(matches!(status, Status::Ack));

        if self.pending.contains_key(&original_command_id) {
            self.resolve_status(original_command_id, status, now);
            return;
        }

        // Mismatched ACK: the embedded command id doesn't match any
        // in-flight operation. If there's exactly one outstanding send
        // still awaiting its ACK, treat this as a desync and fail it.
        if matches!(status, Status::Ack) {
            if let Some(expected) = self.last_sent {
                if self.pending.get(&expected).is_some_and(|op| op.awaiting == Awaiting::Ack) {
                    if let Some(op) = self.pending.remove(&expected) {
                        self.counters.failures += 1;
                        let _ = op.completion.send(FlowOutcome::Failure(BridgeError::FlowMismatch {
                            expected,
                            actual: original_command_id,
                        }));
                    }
                }
            }
        }
    }

    fn resolve_status(&mut self, command_id: u16, status: Status, now: I) {
        match status {
            Status::Ack => {
                let has_response = command::spec_for(command_id).and_then(|s| s.response).is_some();
                if has_response {
                    if let Some(op) = self.pending.get_mut(&command_id) {
                        op.awaiting = Awaiting::Response;
                        op.response_deadline = Some(add_duration(now, self.response_timeout));
                    }
                } else if let Some(op) = self.pending.remove(&command_id) {
                    let _ = op.completion.send(FlowOutcome::Success);
                }
            },
            Status::Error | Status::Malformed | Status::CrcMismatch | Status::NotImplemented => {
                if let Some(op) = self.pending.remove(&command_id) {
                    self.counters.failures += 1;
                    let _ = op.completion.send(FlowOutcome::Failure(BridgeError::Validation {
                        reason: format!("mcu reported {status:?} for command {command_id:#06x}"),
                    }));
                }
            },
            Status::Ok | Status::Timeout => {},
        }
    }

    fn handle_response(&mut self, command_id: u16) {
        let Some(matching) = self.pending.iter().find_map(|(&pending_id, op)| {
            let is_response = command::spec_for(pending_id).and_then(|s| s.response) == Some(command_id);
            (op.awaiting == Awaiting::Response && is_response).then_some(pending_id)
        }) else {
            return; // orphan response, ignored
        };

        if let Some(op) = self.pending.remove(&matching) {
            let _ = op.completion.send(FlowOutcome::Success);
        }
    }
}

fn add_duration<I>(instant: I, duration: Duration) -> I
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration> + std::ops::Add<Duration, Output = I>,
{
    instant + duration
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use bridge_proto::command::{DIGITAL_READ, DIGITAL_READ_RESP, DIGITAL_WRITE};

    #[test]
    fn send_with_no_response_pair_succeeds_on_ack() {
        let mut fc = FlowController::<Instant>::new(Duration::from_millis(50), Duration::from_millis(50), 2);
        let now = Instant::now();
        let (actions, mut rx) = fc.start_send(DIGITAL_WRITE, Bytes::from_static(&[1]), now).expect("send");
        assert_eq!(actions.len(), 1);

        let ack_payload = Status::payload(DIGITAL_WRITE, &[]);
        fc.on_frame_received(Status::Ack.to_u16(), &ack_payload, now);

        assert!(matches!(rx.try_recv(), Ok(FlowOutcome::Success)));
        assert_eq!(fc.counters().acks, 1);
    }

    #[test]
    fn send_with_response_pair_waits_for_response_after_ack() {
        let mut fc = FlowController::<Instant>::new(Duration::from_millis(50), Duration::from_millis(50), 2);
        let now = Instant::now();
        let (_, mut rx) = fc.start_send(DIGITAL_READ, Bytes::from_static(&[13]), now).expect("send");

        let ack_payload = Status::payload(DIGITAL_READ, &[]);
        fc.on_frame_received(Status::Ack.to_u16(), &ack_payload, now);
        assert!(rx.try_recv().is_err(), "should still be awaiting response");

        fc.on_frame_received(DIGITAL_READ_RESP, &[1], now);
        assert!(matches!(rx.try_recv(), Ok(FlowOutcome::Success)));
    }

    #[test]
    fn ack_timeout_retries_then_succeeds() {
        let mut fc = FlowController::<Instant>::new(Duration::from_millis(50), Duration::from_millis(50), 2);
        let now = Instant::now();
        let (_, mut rx) = fc.start_send(DIGITAL_WRITE, Bytes::from_static(&[1]), now).expect("send");

        let later = now + Duration::from_millis(60);
        let actions = fc.tick(later);
        assert_eq!(actions.len(), 1, "expected one retransmission");
        assert_eq!(fc.counters().retries, 1);

        let ack_payload = Status::payload(DIGITAL_WRITE, &[]);
        fc.on_frame_received(Status::Ack.to_u16(), &ack_payload, later);
        assert!(matches!(rx.try_recv(), Ok(FlowOutcome::Success)));
    }

    #[test]
    fn ack_timeout_exhausts_retries_and_fails() {
        let mut fc = FlowController::<Instant>::new(Duration::from_millis(10), Duration::from_millis(10), 1);
        let now = Instant::now();
        let (_, mut rx) = fc.start_send(DIGITAL_WRITE, Bytes::from_static(&[1]), now).expect("send");

        let later = now + Duration::from_millis(20);
        let actions = fc.tick(later);
        assert!(actions.is_empty(), "no attempts left, no retransmission");
        match rx.try_recv() {
            Ok(FlowOutcome::Failure(BridgeError::FlowTimeout { command_id, awaiting })) => {
                assert_eq!(command_id, DIGITAL_WRITE);
                assert_eq!(awaiting, "ack");
            },
            other => panic!("expected FlowTimeout failure, got {other:?}"),
        }
        assert_eq!(fc.counters().failures, 1);
    }

    #[test]
    fn error_status_fails_immediately_without_retry() {
        let mut fc = FlowController::<Instant>::new(Duration::from_millis(50), Duration::from_millis(50), 3);
        let now = Instant::now();
        let (_, mut rx) = fc.start_send(DIGITAL_WRITE, Bytes::from_static(&[1]), now).expect("send");

        let err_payload = Status::payload(DIGITAL_WRITE, &[]);
        fc.on_frame_received(Status::Error.to_u16(), &err_payload, now);

        assert!(matches!(rx.try_recv(), Ok(FlowOutcome::Failure(_))));
        assert_eq!(fc.pending_count(), 0);
    }

    #[test]
    fn reset_fails_all_pending_operations() {
        let mut fc = FlowController::<Instant>::new(Duration::from_millis(50), Duration::from_millis(50), 2);
        let now = Instant::now();
        let (_, mut rx1) = fc.start_send(DIGITAL_WRITE, Bytes::from_static(&[1]), now).expect("send");
        let (_, mut rx2) = fc.start_send(DIGITAL_READ, Bytes::from_static(&[13]), now).expect("send");

        fc.reset();

        assert!(matches!(rx1.try_recv(), Ok(FlowOutcome::Failure(_))));
        assert!(matches!(rx2.try_recv(), Ok(FlowOutcome::Failure(_))));
        assert_eq!(fc.pending_count(), 0);
    }

    #[test]
    fn only_one_operation_per_command_class_in_flight() {
        let mut fc = FlowController::<Instant>::new(Duration::from_millis(50), Duration::from_millis(50), 2);
        let now = Instant::now();
        let _ = fc.start_send(DIGITAL_WRITE, Bytes::from_static(&[1]), now).expect("first send");
        let err = fc.start_send(DIGITAL_WRITE, Bytes::from_static(&[2]), now).unwrap_err();
        assert!(matches!(err, BridgeError::Resource { .. }));
    }
}
