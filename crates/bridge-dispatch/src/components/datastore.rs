//! Key/value cache shared between the MCU and MQTT: `DATASTORE_PUT`/
//! `DATASTORE_GET` on the wire, `P/datastore/{put,get}/<key>*` over MQTT.

use async_trait::async_trait;
use bridge_core::{mqtt_types::OutboundPublish, ReplyContext, RuntimeState};
use bridge_proto::command;
use bytes::Bytes;

use crate::{component::DispatchAction, errors::DispatchError, Component};

/// Handles `P/datastore/*` topics and `DATASTORE_PUT`/`DATASTORE_GET*`
/// commands.
pub struct Datastore {
    topic_prefix: String,
}

impl Datastore {
    /// Build a Datastore handler publishing values under `topic_prefix`.
    #[must_use]
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self { topic_prefix: topic_prefix.into() }
    }

    fn value_topic(&self, key: &str) -> String {
        format!("{}/datastore/get/{key}/value", self.topic_prefix)
    }
}

fn split_key_value(payload: &[u8]) -> Option<(&str, &[u8])> {
    let separator = payload.iter().position(|&byte| byte == 0)?;
    let key = std::str::from_utf8(&payload[..separator]).ok()?;
    Some((key, &payload[separator + 1..]))
}

#[async_trait]
impl Component for Datastore {
    async fn handle_mcu(&self, state: &RuntimeState, command_id: u16, payload: &[u8]) -> Result<Vec<DispatchAction>, DispatchError> {
        match command_id {
            command::DATASTORE_PUT => {
                let Some((key, value)) = split_key_value(payload) else {
                    return Err(DispatchError::Bridge(bridge_core::BridgeError::Validation {
                        reason: "datastore put payload missing key/value separator".into(),
                    }));
                };
                state.datastore.write().await.insert(key.to_string(), value.to_vec());
                Ok(Vec::new())
            },
            command::DATASTORE_GET_RESP => {
                let Some((key, value)) = split_key_value(payload) else {
                    return Err(DispatchError::Bridge(bridge_core::BridgeError::Validation {
                        reason: "datastore get response payload missing key/value separator".into(),
                    }));
                };
                state.datastore.write().await.insert(key.to_string(), value.to_vec());
                Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.value_topic(key), value.to_vec()))])
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn handle_mqtt(
        &self,
        state: &RuntimeState,
        rest: &[&str],
        payload: &[u8],
        _reply: ReplyContext,
    ) -> Result<Vec<DispatchAction>, DispatchError> {
        match rest {
            ["put", key] => {
                Ok(vec![DispatchAction::WriteFrame { command_id: command::DATASTORE_PUT, payload: build_key_value(key, payload) }])
            },
            ["get", key] => {
                if let Some(value) = state.datastore.read().await.get(*key) {
                    return Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.value_topic(key), value.clone()))]);
                }
                Ok(vec![DispatchAction::WriteFrame {
                    command_id: command::DATASTORE_GET,
                    payload: Bytes::copy_from_slice(key.as_bytes()),
                }])
            },
            ["get", key, "request"] => Ok(vec![DispatchAction::WriteFrame {
                command_id: command::DATASTORE_GET,
                payload: Bytes::copy_from_slice(key.as_bytes()),
            }]),
            ["get", _, "value"] => Ok(Vec::new()),
            _ => Err(DispatchError::MalformedTopic(format!("datastore/{}", rest.join("/")))),
        }
    }
}

fn build_key_value(key: &str, value: &[u8]) -> Bytes {
    let mut buf = Vec::with_capacity(key.len() + 1 + value.len());
    buf.extend_from_slice(key.as_bytes());
    buf.push(0);
    buf.extend_from_slice(value);
    buf.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_over_mqtt_sends_key_value_frame() {
        let state = RuntimeState::new(8, 8, 8);
        let datastore = Datastore::new("bridge");
        let actions = datastore.handle_mqtt(&state, &["put", "led"], b"on", ReplyContext::default()).await.unwrap();
        match &actions[0] {
            DispatchAction::WriteFrame { command_id, payload } => {
                assert_eq!(*command_id, command::DATASTORE_PUT);
                assert_eq!(&payload[..], b"led\0on");
            },
            _ => panic!("expected write frame"),
        }
    }

    #[tokio::test]
    async fn get_response_caches_and_publishes_value() {
        let state = RuntimeState::new(8, 8, 8);
        let datastore = Datastore::new("bridge");
        let actions = datastore.handle_mcu(&state, command::DATASTORE_GET_RESP, b"led\0on").await.unwrap();
        match &actions[0] {
            DispatchAction::Publish(publish) => {
                assert_eq!(publish.topic, "bridge/datastore/get/led/value");
                assert_eq!(&publish.payload[..], b"on");
            },
            _ => panic!("expected publish"),
        }
        assert_eq!(state.datastore.read().await.get("led"), Some(&b"on".to_vec()));
    }

    #[tokio::test]
    async fn get_serves_from_cache_without_a_round_trip_when_present() {
        let state = RuntimeState::new(8, 8, 8);
        state.datastore.write().await.insert("led".to_string(), b"off".to_vec());
        let datastore = Datastore::new("bridge");
        let actions = datastore.handle_mqtt(&state, &["get", "led"], &[], ReplyContext::default()).await.unwrap();
        match &actions[0] {
            DispatchAction::Publish(publish) => assert_eq!(&publish.payload[..], b"off"),
            _ => panic!("expected cached publish"),
        }
    }
}
