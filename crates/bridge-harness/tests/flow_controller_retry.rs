//! A `DIGITAL_WRITE` send that gets no ACK before its timeout is
//! retransmitted unchanged; an ACK on the retried attempt resolves the
//! operation successfully and counts exactly one retry.

use std::time::{Duration, Instant};

use bridge_core::{FlowAction, FlowController, FlowOutcome};
use bridge_proto::{command, Status};

#[tokio::test]
async fn missed_ack_triggers_one_retransmission_then_succeeds() {
    let mut flow = FlowController::<Instant>::new(Duration::from_millis(50), Duration::from_millis(50), 2);
    let now = Instant::now();

    let (actions, outcome) = flow.start_send(command::DIGITAL_WRITE, bytes::Bytes::from_static(&[7, 1]), now).unwrap();
    assert_eq!(actions.len(), 1);
    let FlowAction::WriteFrame { payload: first_payload, .. } = &actions[0];

    let after_timeout = now + Duration::from_millis(60);
    let retry_actions = flow.tick(after_timeout);
    assert_eq!(retry_actions.len(), 1);
    let FlowAction::WriteFrame { command_id, payload } = &retry_actions[0];
    assert_eq!(*command_id, command::DIGITAL_WRITE);
    assert_eq!(payload, first_payload);
    assert_eq!(flow.counters().retries, 1);

    let ack_payload = Status::payload(command::DIGITAL_WRITE, &[]);
    flow.on_frame_received(Status::Ack.to_u16(), &ack_payload, after_timeout);

    let result = outcome.await.expect("operation completes");
    assert!(matches!(result, FlowOutcome::Success));
    assert_eq!(flow.counters().sends, 1);
    assert_eq!(flow.counters().retries, 1);
    assert_eq!(flow.counters().failures, 0);
}

#[tokio::test]
async fn exhausting_every_attempt_without_an_ack_fails_the_operation() {
    let mut flow = FlowController::<Instant>::new(Duration::from_millis(10), Duration::from_millis(10), 1);
    let now = Instant::now();

    let (_, outcome) = flow.start_send(command::DIGITAL_WRITE, bytes::Bytes::from_static(&[7, 1]), now).unwrap();
    let after_timeout = now + Duration::from_millis(20);
    let actions = flow.tick(after_timeout);
    assert!(actions.is_empty(), "max_attempts=1 leaves no retries to spend");

    let result = outcome.await.expect("operation completes");
    assert!(matches!(result, FlowOutcome::Failure(_)));
    assert_eq!(flow.counters().failures, 1);
}
