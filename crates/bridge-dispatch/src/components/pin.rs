//! Digital and analog I/O: `SET_PIN_MODE`, `DIGITAL_WRITE`/`ANALOG_WRITE`,
//! and the read/response pair matched through a bounded per-channel FIFO.
//!
//! One [`Pin`] instance is registered per kind (digital, analog) so the
//! dispatcher's per-command-id and per-area routing tables each point at
//! the right instance; both share `RuntimeState::pending_pin_requests`,
//! keyed by a channel id that folds the kind into the high bit so a
//! digital and an analog read on the same physical pin number don't
//! collide in the same FIFO.

use async_trait::async_trait;
use bridge_core::{mqtt_types::OutboundPublish, PendingPinRequest, ReplyContext, RuntimeState};
use bridge_proto::command;
use bytes::Bytes;

/// User-property key attached to the error reply sent back to a caller
/// whose read request was rejected for arriving while a channel's
/// pending-request FIFO was already full.
const OVERFLOW_PROPERTY_KEY: &str = "bridge-error";

/// User-property value paired with [`OVERFLOW_PROPERTY_KEY`].
const OVERFLOW_PROPERTY_VALUE: &str = "pending-pin-overflow";

use crate::{component::DispatchAction, errors::DispatchError, Component};

/// Per-channel pending-request FIFO capacity; one overflow beyond this
/// many in-flight reads on a single channel is rejected rather than
/// queued.
const PENDING_PIN_FIFO_CAPACITY: usize = 8;

/// High bit of the FIFO key reserved for the analog channel space.
const ANALOG_CHANNEL_BIT: u8 = 0x80;

/// Handles either `P/d/<pin>*` or `P/a/<pin>*`, depending on which
/// constructor built it.
pub struct Pin {
    topic_prefix: String,
    analog: bool,
    fifo_capacity: usize,
}

impl Pin {
    /// A handler for `P/d/<pin>*` topics and `DIGITAL_*` commands.
    #[must_use]
    pub fn digital(topic_prefix: impl Into<String>) -> Self {
        Self { topic_prefix: topic_prefix.into(), analog: false, fifo_capacity: PENDING_PIN_FIFO_CAPACITY }
    }

    /// A handler for `P/a/<pin>*` topics and `ANALOG_*` commands.
    #[must_use]
    pub fn analog(topic_prefix: impl Into<String>) -> Self {
        Self { topic_prefix: topic_prefix.into(), analog: true, fifo_capacity: PENDING_PIN_FIFO_CAPACITY }
    }

    /// Override the per-channel pending-request FIFO capacity (default
    /// [`PENDING_PIN_FIFO_CAPACITY`]), e.g. from `pending_pin_request_limit`.
    #[must_use]
    pub fn with_fifo_capacity(mut self, capacity: usize) -> Self {
        self.fifo_capacity = capacity;
        self
    }

    fn kind(&self) -> &'static str {
        if self.analog { "a" } else { "d" }
    }

    fn channel(&self, pin: u8) -> u8 {
        if self.analog { pin | ANALOG_CHANNEL_BIT } else { pin }
    }

    fn value_topic(&self, pin: u8) -> String {
        format!("{}/{}/{pin}/value", self.topic_prefix, self.kind())
    }
}

/// Append `reply` to the channel's pending-request FIFO unless it's
/// already at capacity. The oldest entry always has a real read command
/// already in flight on the wire, so overflow must reject the new
/// arrival rather than evict it — the inverse of `BoundedRing`'s usual
/// "keep the newest" overflow policy.
async fn try_enqueue_pending(state: &RuntimeState, channel: u8, pin: u8, reply: ReplyContext, fifo_capacity: usize) -> bool {
    let mut requests = state.pending_pin_requests.lock().await;
    let fifo = requests.entry(channel).or_insert_with(|| bridge_core::BoundedRing::new(fifo_capacity));
    if fifo.len() >= fifo_capacity {
        return false;
    }
    let evicted = fifo.push_overwrite(PendingPinRequest { pin, reply_context: reply });
    debug_assert!(evicted.is_none(), "push_overwrite evicted despite a capacity check just above");
    true
}

/// Build the immediate error reply sent to a caller whose read request
/// was rejected by [`try_enqueue_pending`], in place of the `WriteFrame`
/// it would otherwise have caused.
fn overflow_reply(value_topic: String, reply: &ReplyContext) -> DispatchAction {
    let topic = reply.response_topic.clone().unwrap_or(value_topic);
    let mut publish = OutboundPublish::simple(topic, Bytes::new());
    publish.properties.correlation_data = reply.correlation_data.clone();
    publish.properties.user_properties.insert(OVERFLOW_PROPERTY_KEY.to_string(), OVERFLOW_PROPERTY_VALUE.to_string());
    DispatchAction::Publish(publish)
}

async fn pop_pending(state: &RuntimeState, channel: u8) -> Option<PendingPinRequest> {
    let mut requests = state.pending_pin_requests.lock().await;
    requests.get_mut(&channel).and_then(bridge_core::BoundedRing::pop)
}

#[async_trait]
impl Component for Pin {
    async fn handle_mcu(&self, state: &RuntimeState, command_id: u16, payload: &[u8]) -> Result<Vec<DispatchAction>, DispatchError> {
        let value_len = match (self.analog, command_id) {
            (false, command::DIGITAL_READ_RESP) => 1usize,
            (true, command::ANALOG_READ_RESP) => 2usize,
            _ => return Ok(Vec::new()),
        };
        if payload.len() < 1 + value_len {
            return Err(DispatchError::Bridge(bridge_core::BridgeError::Validation {
                reason: "pin read response too short".into(),
            }));
        }
        let pin = payload[0];
        let value: u32 = if self.analog {
            u32::from(u16::from_be_bytes([payload[1], payload[2]]))
        } else {
            u32::from(payload[1])
        };
        let Some(pending) = pop_pending(state, self.channel(pin)).await else {
            return Ok(Vec::new());
        };
        let reply = pending.reply_context;
        let topic = reply.response_topic.clone().unwrap_or_else(|| self.value_topic(pin));
        let mut publish = OutboundPublish::simple(topic, Bytes::from(value.to_string().into_bytes()));
        publish.properties.correlation_data = reply.correlation_data;
        Ok(vec![DispatchAction::Publish(publish)])
    }

    async fn handle_mqtt(
        &self,
        state: &RuntimeState,
        rest: &[&str],
        payload: &[u8],
        reply: ReplyContext,
    ) -> Result<Vec<DispatchAction>, DispatchError> {
        match rest {
            [pin_str] => {
                let pin = parse_pin(pin_str)?;
                let command_id = if self.analog { command::ANALOG_WRITE } else { command::DIGITAL_WRITE };
                Ok(vec![DispatchAction::WriteFrame { command_id, payload: build_value_payload(pin, payload) }])
            },
            [pin_str, "mode"] => {
                let pin = parse_pin(pin_str)?;
                Ok(vec![DispatchAction::WriteFrame { command_id: command::SET_PIN_MODE, payload: build_value_payload(pin, payload) }])
            },
            [pin_str, "read"] => {
                let pin = parse_pin(pin_str)?;
                let channel = self.channel(pin);
                if !try_enqueue_pending(state, channel, pin, reply.clone(), self.fifo_capacity).await {
                    state.counters.pending_pin_overflow.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    return Ok(vec![overflow_reply(self.value_topic(pin), &reply)]);
                }
                let command_id = if self.analog { command::ANALOG_READ } else { command::DIGITAL_READ };
                Ok(vec![DispatchAction::WriteFrame { command_id, payload: Bytes::copy_from_slice(&[pin]) }])
            },
            [_, "value"] => Ok(Vec::new()),
            _ => Err(DispatchError::MalformedTopic(format!("{}/{}", self.kind(), rest.join("/")))),
        }
    }
}

fn parse_pin(segment: &str) -> Result<u8, DispatchError> {
    segment.parse().map_err(|_| DispatchError::MalformedTopic(segment.to_string()))
}

fn build_value_payload(pin: u8, value: &[u8]) -> Bytes {
    let mut buf = Vec::with_capacity(1 + value.len());
    buf.push(pin);
    buf.extend_from_slice(value);
    buf.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn digital_read_request_enqueues_and_sends_frame() {
        let state = RuntimeState::new(8, 8, 8);
        let pin = Pin::digital("bridge");
        let actions = pin.handle_mqtt(&state, &["7", "read"], &[], ReplyContext::default()).await.unwrap();
        assert!(matches!(&actions[0], DispatchAction::WriteFrame { command_id, .. } if *command_id == command::DIGITAL_READ));
    }

    #[tokio::test]
    async fn digital_read_response_publishes_to_pending_requester() {
        let state = RuntimeState::new(8, 8, 8);
        let pin = Pin::digital("bridge");
        let reply = ReplyContext { response_topic: Some("reply/here".into()), correlation_data: None };
        pin.handle_mqtt(&state, &["7", "read"], &[], reply).await.unwrap();

        let actions = pin.handle_mcu(&state, command::DIGITAL_READ_RESP, &[7, 1]).await.unwrap();
        match &actions[0] {
            DispatchAction::Publish(publish) => {
                assert_eq!(publish.topic, "reply/here");
                assert_eq!(&publish.payload[..], b"1");
            },
            _ => panic!("expected publish"),
        }
    }

    #[tokio::test]
    async fn digital_and_analog_reads_on_the_same_pin_number_do_not_collide() {
        let state = RuntimeState::new(8, 8, 8);
        let digital = Pin::digital("bridge");
        let analog = Pin::analog("bridge");
        digital.handle_mqtt(&state, &["3", "read"], &[], ReplyContext::default()).await.unwrap();
        analog.handle_mqtt(&state, &["3", "read"], &[], ReplyContext::default()).await.unwrap();

        let digital_actions = digital.handle_mcu(&state, command::DIGITAL_READ_RESP, &[3, 1]).await.unwrap();
        assert_eq!(digital_actions.len(), 1);
        let analog_actions = analog.handle_mcu(&state, command::ANALOG_READ_RESP, &[3, 0, 200]).await.unwrap();
        assert_eq!(analog_actions.len(), 1);
    }

    #[tokio::test]
    async fn analog_read_response_decodes_big_endian_as_decimal_text() {
        let state = RuntimeState::new(8, 8, 8);
        let analog = Pin::analog("bridge");
        let reply = ReplyContext { response_topic: Some("reply/here".into()), correlation_data: None };
        analog.handle_mqtt(&state, &["3", "read"], &[], reply).await.unwrap();

        let actions = analog.handle_mcu(&state, command::ANALOG_READ_RESP, &[3, 1, 0]).await.unwrap();
        match &actions[0] {
            DispatchAction::Publish(publish) => assert_eq!(&publish.payload[..], b"256"),
            _ => panic!("expected publish"),
        }
    }

    #[tokio::test]
    async fn read_request_beyond_fifo_capacity_is_rejected_without_disturbing_the_pending_one() {
        let state = RuntimeState::new(8, 8, 8);
        let pin = Pin::digital("bridge").with_fifo_capacity(1);
        pin.handle_mqtt(&state, &["1", "read"], &[], ReplyContext::default()).await.unwrap();

        let reply = ReplyContext { response_topic: Some("reply/nine".into()), correlation_data: None };
        let actions = pin.handle_mqtt(&state, &["9", "read"], &[], reply).await.unwrap();

        assert_eq!(actions.len(), 1);
        match &actions[0] {
            DispatchAction::Publish(publish) => {
                assert_eq!(publish.topic, "reply/nine");
                assert!(publish.payload.is_empty());
                assert_eq!(
                    publish.properties.user_properties.get(OVERFLOW_PROPERTY_KEY).map(String::as_str),
                    Some(OVERFLOW_PROPERTY_VALUE)
                );
            },
            DispatchAction::WriteFrame { .. } => panic!("overflowed request must not produce a WriteFrame"),
        }
        assert_eq!(state.counters.pending_pin_overflow.load(std::sync::atomic::Ordering::Relaxed), 1);

        // The original pending request (pin 1) is still resolved correctly.
        let resolved = pin.handle_mcu(&state, command::DIGITAL_READ_RESP, &[1, 1]).await.unwrap();
        assert_eq!(resolved.len(), 1);
    }

    #[tokio::test]
    async fn orphan_read_response_is_ignored() {
        let state = RuntimeState::new(8, 8, 8);
        let pin = Pin::digital("bridge");
        let actions = pin.handle_mcu(&state, command::DIGITAL_READ_RESP, &[9, 1]).await.unwrap();
        assert!(actions.is_empty());
    }
}
