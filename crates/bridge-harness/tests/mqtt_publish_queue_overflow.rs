//! The outbound MQTT publish queue keeps the newest message and counts
//! the one it evicted, the same "keep newest" policy every other
//! `BoundedRing` in the runtime state uses — mirroring the enqueue step
//! `bridge-daemon`'s serial and MQTT tasks perform on every
//! `DispatchAction::Publish`.

use std::sync::atomic::Ordering;

use bridge_core::{OutboundPublish, RuntimeState};
use bytes::Bytes;

async fn enqueue(state: &RuntimeState, publish: OutboundPublish) {
    let mut queue = state.mqtt_publish_queue.lock().await;
    if queue.push_overwrite(publish).is_some() {
        state.counters.mqtt_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::test]
async fn second_message_evicts_the_first_on_a_single_slot_queue() {
    let state = RuntimeState::new(4, 4, 1);

    enqueue(&state, OutboundPublish::simple("bridge/d/1/value", Bytes::from_static(b"0"))).await;
    enqueue(&state, OutboundPublish::simple("bridge/d/2/value", Bytes::from_static(b"1"))).await;

    assert_eq!(state.counters.mqtt_dropped.load(Ordering::Relaxed), 1);

    let mut queue = state.mqtt_publish_queue.lock().await;
    assert_eq!(queue.len(), 1);
    let remaining = queue.pop().expect("one message remains");
    assert_eq!(remaining.topic, "bridge/d/2/value");
}
