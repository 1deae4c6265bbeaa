//! A digital-read request issued over MQTT should reach the MCU as a
//! `DIGITAL_READ` frame, and the matching `DIGITAL_READ_RESP` should
//! resolve back to the same value topic as a decimal-text payload.

use bridge_core::ReplyContext;
use bridge_dispatch::DispatchAction;
use bridge_harness::fixture::Fixture;
use bridge_proto::command;

#[tokio::test]
async fn digital_read_request_and_response_round_trip() {
    let fixture = Fixture::synchronized();

    let requested = fixture
        .dispatcher
        .dispatch_mqtt_message(&format!("{}/d/13/read", fixture.config.mqtt_topic), &[], ReplyContext::default())
        .await
        .expect("read request dispatches");
    assert_eq!(requested.len(), 1);
    match &requested[0] {
        DispatchAction::WriteFrame { command_id, payload } => {
            assert_eq!(*command_id, command::DIGITAL_READ);
            assert_eq!(&payload[..], &[13]);
        },
        DispatchAction::Publish(_) => panic!("a fresh read request must not publish anything yet"),
    }

    let resolved = fixture
        .dispatcher
        .dispatch_mcu_frame(command::DIGITAL_READ_RESP, &[13, 1])
        .await
        .expect("read response dispatches");
    assert_eq!(resolved.len(), 1);
    match &resolved[0] {
        DispatchAction::Publish(publish) => {
            assert_eq!(publish.topic, format!("{}/d/13/value", fixture.config.mqtt_topic));
            assert_eq!(&publish.payload[..], b"1");
        },
        DispatchAction::WriteFrame { .. } => panic!("a read response must publish, not write a frame"),
    }
}

#[tokio::test]
async fn analog_read_request_and_response_round_trip() {
    let fixture = Fixture::synchronized();

    fixture
        .dispatcher
        .dispatch_mqtt_message(&format!("{}/a/2/read", fixture.config.mqtt_topic), &[], ReplyContext::default())
        .await
        .expect("read request dispatches");

    let resolved = fixture
        .dispatcher
        .dispatch_mcu_frame(command::ANALOG_READ_RESP, &[2, 0x03, 0xE8])
        .await
        .expect("read response dispatches");
    match &resolved[0] {
        DispatchAction::Publish(publish) => {
            assert_eq!(publish.topic, format!("{}/a/2/value", fixture.config.mqtt_topic));
            assert_eq!(&publish.payload[..], b"1000");
        },
        DispatchAction::WriteFrame { .. } => panic!("a read response must publish, not write a frame"),
    }
}
