//! Console bridge: `P/console/in` writes bytes to the MCU (optionally
//! RLE-compressed), `CONSOLE_DATA` frames are republished on
//! `P/console/out`.

use async_trait::async_trait;
use bridge_core::{mqtt_types::OutboundPublish, ReplyContext, RuntimeState};
use bridge_proto::{command, rle, COMPRESSED_FLAG};
use bytes::Bytes;

use crate::{component::DispatchAction, errors::DispatchError, Component};

/// Handles `P/console/*` topics and `CONSOLE_WRITE`/`CONSOLE_DATA`
/// commands.
pub struct Console {
    out_topic: String,
}

impl Console {
    /// Build a Console handler publishing MCU output on
    /// `{topic_prefix}/console/out`.
    #[must_use]
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self { out_topic: format!("{}/console/out", topic_prefix.into()) }
    }
}

#[async_trait]
impl Component for Console {
    async fn handle_mcu(&self, _state: &RuntimeState, command_id: u16, payload: &[u8]) -> Result<Vec<DispatchAction>, DispatchError> {
        let base_id = command_id & !COMPRESSED_FLAG;
        if base_id != command::CONSOLE_DATA {
            return Ok(Vec::new());
        }
        let bytes = if command_id & COMPRESSED_FLAG != 0 {
            rle::decode(payload).map_err(|error| DispatchError::Bridge(bridge_core::BridgeError::Decode { reason: error.to_string() }))?
        } else {
            payload.to_vec()
        };
        Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.out_topic.clone(), bytes))])
    }

    async fn handle_mqtt(
        &self,
        _state: &RuntimeState,
        rest: &[&str],
        payload: &[u8],
        _reply: ReplyContext,
    ) -> Result<Vec<DispatchAction>, DispatchError> {
        match rest {
            ["in"] => {
                let (command_id, bytes) = if rle::should_compress(payload) {
                    (command::CONSOLE_WRITE | COMPRESSED_FLAG, rle::encode(payload))
                } else {
                    (command::CONSOLE_WRITE, payload.to_vec())
                };
                Ok(vec![DispatchAction::WriteFrame { command_id, payload: Bytes::from(bytes) }])
            },
            ["out"] => Ok(Vec::new()),
            _ => Err(DispatchError::MalformedTopic(format!("console/{}", rest.join("/")))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn console_in_sends_uncompressed_for_short_payload() {
        let state = RuntimeState::new(8, 8, 8);
        let console = Console::new("bridge");
        let actions = console.handle_mqtt(&state, &["in"], b"hi", ReplyContext::default()).await.unwrap();
        assert!(matches!(&actions[0], DispatchAction::WriteFrame { command_id, .. } if *command_id == command::CONSOLE_WRITE));
    }

    #[tokio::test]
    async fn console_in_compresses_long_repetitive_payload() {
        let state = RuntimeState::new(8, 8, 8);
        let console = Console::new("bridge");
        let mut payload = vec![b'='; 64];
        payload.extend_from_slice(b"done");
        let actions = console.handle_mqtt(&state, &["in"], &payload, ReplyContext::default()).await.unwrap();
        match &actions[0] {
            DispatchAction::WriteFrame { command_id, payload: encoded } => {
                assert_eq!(*command_id, command::CONSOLE_WRITE | COMPRESSED_FLAG);
                assert_eq!(rle::decode(encoded).unwrap(), payload);
            },
            _ => panic!("expected write frame"),
        }
    }

    #[tokio::test]
    async fn console_data_republishes_on_out_topic() {
        let state = RuntimeState::new(8, 8, 8);
        let console = Console::new("bridge");
        let actions = console.handle_mcu(&state, command::CONSOLE_DATA, b"hello").await.unwrap();
        match &actions[0] {
            DispatchAction::Publish(publish) => {
                assert_eq!(publish.topic, "bridge/console/out");
                assert_eq!(&publish.payload[..], b"hello");
            },
            _ => panic!("expected publish"),
        }
    }
}
