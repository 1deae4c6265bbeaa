//! A second read request on the same channel, arriving while the first
//! is still outstanding, is rejected in place rather than bumping the
//! first request out of its pending slot — the pending slot always has
//! a real read command already in flight on the wire.

use bridge_core::ReplyContext;
use bridge_dispatch::DispatchAction;
use bridge_harness::fixture::Fixture;
use bridge_proto::command;

#[tokio::test]
async fn overflowing_read_request_is_rejected_without_disturbing_the_first() {
    let fixture = Fixture::with_pending_pin_limit(1);
    let topic = format!("{}/d/5/read", fixture.config.mqtt_topic);

    let first = fixture
        .dispatcher
        .dispatch_mqtt_message(&topic, &[], ReplyContext::default())
        .await
        .expect("first request dispatches");
    assert!(matches!(first[0], DispatchAction::WriteFrame { command_id, .. } if command_id == command::DIGITAL_READ));

    let second_reply = ReplyContext { response_topic: Some("scratch/overflow".to_string()), correlation_data: None };
    let second = fixture
        .dispatcher
        .dispatch_mqtt_message(&topic, &[], second_reply)
        .await
        .expect("second request dispatches");
    assert_eq!(second.len(), 1);
    match &second[0] {
        DispatchAction::Publish(publish) => {
            assert_eq!(publish.topic, "scratch/overflow");
            assert!(publish.payload.is_empty());
            assert_eq!(publish.properties.user_properties.get("bridge-error").map(String::as_str), Some("pending-pin-overflow"));
        },
        DispatchAction::WriteFrame { .. } => panic!("an overflowed request must not reach the MCU"),
    }
    assert_eq!(fixture.state.counters.pending_pin_overflow.load(std::sync::atomic::Ordering::Relaxed), 1);

    let resolved = fixture
        .dispatcher
        .dispatch_mcu_frame(command::DIGITAL_READ_RESP, &[5, 0])
        .await
        .expect("the first request's response still resolves");
    assert_eq!(resolved.len(), 1);
    match &resolved[0] {
        DispatchAction::Publish(publish) => assert_eq!(publish.topic, format!("{}/d/5/value", fixture.config.mqtt_topic)),
        DispatchAction::WriteFrame { .. } => panic!("the resolved response must publish"),
    }
}
