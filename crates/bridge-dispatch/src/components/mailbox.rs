//! Store-and-forward mailbox between MQTT and the MCU.
//!
//! `write`/`read`/`available` are pull-style requests the dispatcher
//! turns into the matching MCU command; `MAILBOX_INCOMING` is the MCU
//! pushing a message unsolicited, buffered in
//! `RuntimeState::mailbox_incoming` and republished immediately.

use async_trait::async_trait;
use bridge_core::{mqtt_types::OutboundPublish, ReplyContext, RuntimeState};
use bridge_proto::command;
use bytes::Bytes;

use crate::{component::DispatchAction, errors::DispatchError, Component};

/// Handles `P/mailbox/*` topics and `MAILBOX_*` commands.
pub struct Mailbox {
    topic_prefix: String,
}

impl Mailbox {
    /// Build a Mailbox handler publishing under `topic_prefix`.
    #[must_use]
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self { topic_prefix: topic_prefix.into() }
    }

    fn topic(&self, leaf: &str) -> String {
        format!("{}/mailbox/{leaf}", self.topic_prefix)
    }
}

#[async_trait]
impl Component for Mailbox {
    async fn handle_mcu(&self, state: &RuntimeState, command_id: u16, payload: &[u8]) -> Result<Vec<DispatchAction>, DispatchError> {
        match command_id {
            command::MAILBOX_INCOMING => {
                let mut incoming = state.mailbox_incoming.lock().await;
                if incoming.push_overwrite(payload.to_vec()).is_some() {
                    state.counters.mailbox_overflow.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.topic("incoming"), payload.to_vec()))])
            },
            command::MAILBOX_READ_RESP => {
                Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.topic("processed"), payload.to_vec()))])
            },
            command::MAILBOX_AVAILABLE_RESP => {
                Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.topic("available"), payload.to_vec()))])
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
            ["write"] => {
                let mut outgoing = state.mailbox_outgoing.lock().await;
                outgoing.push_overwrite(payload.to_vec());
                Ok(vec![DispatchAction::WriteFrame { command_id: command::MAILBOX_WRITE, payload: Bytes::copy_from_slice(payload) }])
            },
            ["read"] => Ok(vec![DispatchAction::WriteFrame { command_id: command::MAILBOX_READ, payload: Bytes::new() }]),
            ["available"] => Ok(vec![DispatchAction::WriteFrame { command_id: command::MAILBOX_AVAILABLE, payload: Bytes::new() }]),
            ["incoming" | "outgoing" | "processed"] => Ok(Vec::new()),
            _ => Err(DispatchError::MalformedTopic(format!("mailbox/{}", rest.join("/")))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incoming_push_is_buffered_and_republished() {
        let state = RuntimeState::new(8, 8, 8);
        let mailbox = Mailbox::new("bridge");
        let actions = mailbox.handle_mcu(&state, command::MAILBOX_INCOMING, b"ping").await.unwrap();
        match &actions[0] {
            DispatchAction::Publish(publish) => {
                assert_eq!(publish.topic, "bridge/mailbox/incoming");
                assert_eq!(&publish.payload[..], b"ping");
            },
            _ => panic!("expected publish"),
        }
        assert_eq!(state.mailbox_incoming.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn write_over_mqtt_forwards_to_mcu() {
        let state = RuntimeState::new(8, 8, 8);
        let mailbox = Mailbox::new("bridge");
        let actions = mailbox.handle_mqtt(&state, &["write"], b"hello", ReplyContext::default()).await.unwrap();
        assert!(matches!(&actions[0], DispatchAction::WriteFrame { command_id, .. } if *command_id == command::MAILBOX_WRITE));
    }

    #[tokio::test]
    async fn overflow_increments_counter() {
        let state = RuntimeState::new(8, 1, 8);
        let mailbox = Mailbox::new("bridge");
        mailbox.handle_mcu(&state, command::MAILBOX_INCOMING, b"one").await.unwrap();
        mailbox.handle_mcu(&state, command::MAILBOX_INCOMING, b"two").await.unwrap();
        assert_eq!(state.counters.mailbox_overflow.load(std::sync::atomic::Ordering::Relaxed), 1);
    }
}
