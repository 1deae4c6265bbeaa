//! The dispatcher's pre-sync gate and the handshake manager are tested
//! independently elsewhere; this ties them together the way the real
//! serial task does: an MCU frame the dispatcher would otherwise drop
//! starts flowing only once `HandshakeManager::on_frame` reports
//! `Synchronized` and the runtime state is flipped to match.

use std::time::{Duration, Instant};

use bridge_core::handshake::{HandshakeEvent, HandshakeManager, SerialTimingWindow};
use bridge_core::ReplyContext;
use bridge_crypto::{compute_tag, SharedSecret, NONCE_SIZE, TAG_SIZE};
use bridge_dispatch::DispatchAction;
use bridge_harness::fixture::Fixture;
use bridge_proto::command;

fn secret() -> SharedSecret {
    SharedSecret::new(*b"testshared").expect("valid secret")
}

fn fixed_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    for (i, byte) in nonce.iter_mut().enumerate() {
        *byte = i as u8;
    }
    nonce
}

#[tokio::test]
async fn pending_read_response_is_dropped_before_sync_and_delivered_after() {
    let fixture = Fixture::new(bridge_daemon::Config::default());
    assert!(!fixture.state.is_link_synchronized());

    fixture
        .dispatcher
        .dispatch_mqtt_message(&format!("{}/d/9/read", fixture.config.mqtt_topic), &[], ReplyContext::default())
        .await
        .expect("read requests are not gated by link sync");

    let dropped = fixture
        .dispatcher
        .dispatch_mcu_frame(command::DIGITAL_READ_RESP, &[9, 1])
        .await
        .expect("pre-sync frames are dropped, not errored");
    assert!(dropped.is_empty(), "DIGITAL_READ_RESP is not on the pre-sync allow-list");

    let now = Instant::now();
    let mut hm = HandshakeManager::<Instant>::new(secret(), 3, Duration::from_millis(100), Duration::from_millis(10));
    let timing = SerialTimingWindow::clamped(Duration::from_millis(50), Duration::from_millis(200), 2);
    let _ = hm.start(timing, now);
    assert!(matches!(hm.on_frame(command::LINK_RESET_RESP, &[], now), HandshakeEvent::ResetAcked));
    let _ = hm.begin_sync(fixed_nonce(), Duration::from_millis(200), now);

    let tag = compute_tag(&secret(), &fixed_nonce());
    let mut payload = Vec::with_capacity(NONCE_SIZE + TAG_SIZE);
    payload.extend_from_slice(&fixed_nonce());
    payload.extend_from_slice(&tag);
    assert!(matches!(hm.on_frame(command::LINK_SYNC_RESP, &payload, now), HandshakeEvent::Synchronized));
    fixture.state.set_link_synchronized(true);

    // The pending request enqueued before sync is still sitting in its
    // FIFO slot; the same response that was dropped above now resolves.
    let delivered = fixture
        .dispatcher
        .dispatch_mcu_frame(command::DIGITAL_READ_RESP, &[9, 1])
        .await
        .expect("post-sync frames dispatch normally");
    assert_eq!(delivered.len(), 1);
    match &delivered[0] {
        DispatchAction::Publish(publish) => assert_eq!(publish.topic, format!("{}/d/9/value", fixture.config.mqtt_topic)),
        DispatchAction::WriteFrame { .. } => panic!("a read response must publish, not write a frame"),
    }
}
