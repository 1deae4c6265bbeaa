//! Routes decoded MCU frames and MQTT messages to registered
//! [`Component`]s, applying the pre-sync allow-list and MQTT
//! authorization policy named in the protocol design.

use std::{collections::HashMap, sync::Arc};

use bridge_core::{mqtt_types::OutboundPublish, ReplyContext, RuntimeState};
use bridge_proto::{command, Status};
use bytes::Bytes;

use crate::{component::DispatchAction, errors::DispatchError, policy::AuthPolicy, topic, Component};

fn is_response_command(id: u16) -> bool {
    command::ALL.iter().any(|spec| spec.response == Some(id))
}

/// System snapshot topics produce a publish directly rather than going
/// through a registered component.
const HANDSHAKE_SNAPSHOT_TOPIC: &str = "system/bridge/handshake/get";
const SUMMARY_SNAPSHOT_TOPIC: &str = "system/bridge/summary/get";

/// Central router wiring `RuntimeState`, the authorization policy, and
/// the registered component handlers together.
pub struct Dispatcher {
    state: Arc<RuntimeState>,
    prefix: String,
    policy: AuthPolicy,
    mcu_handlers: HashMap<u16, Arc<dyn Component>>,
    mqtt_handlers: HashMap<&'static str, Arc<dyn Component>>,
}

impl Dispatcher {
    /// Build an empty dispatcher; call [`Self::register_mcu`] and
    /// [`Self::register_mqtt_area`] to wire up components.
    #[must_use]
    pub fn new(state: Arc<RuntimeState>, prefix: impl Into<String>, policy: AuthPolicy) -> Self {
        Self { state, prefix: prefix.into(), policy, mcu_handlers: HashMap::new(), mqtt_handlers: HashMap::new() }
    }

    /// Route MCU frames with this `command_id` to `component`.
    pub fn register_mcu(&mut self, command_id: u16, component: Arc<dyn Component>) {
        self.mcu_handlers.insert(command_id, component);
    }

    /// Route MQTT messages under this topic `area` to `component`.
    pub fn register_mqtt_area(&mut self, area: &'static str, component: Arc<dyn Component>) {
        self.mqtt_handlers.insert(area, component);
    }

    /// Handle one decoded, non-handshake frame from the MCU.
    ///
    /// Status frames (ACK/OK/TIMEOUT/...) are responses, not requests, and
    /// are consumed upstream by the handshake manager and flow controller
    /// before reaching here — never routed to a component or answered with
    /// `NOT_IMPLEMENTED`.
    pub async fn dispatch_mcu_frame(&self, command_id: u16, payload: &[u8]) -> Result<Vec<DispatchAction>, DispatchError> {
        if Status::from_u16(command_id).is_some() {
            return Ok(Vec::new());
        }

        if !self.state.is_link_synchronized() && !command::allowed_before_sync(command_id) {
            return Ok(Vec::new());
        }

        let Some(component) = self.mcu_handlers.get(&command_id) else {
            if is_response_command(command_id) {
                return Ok(Vec::new());
            }
            return Ok(vec![DispatchAction::WriteFrame {
                command_id: Status::NotImplemented.to_u16(),
                payload: Bytes::from(Status::payload(command_id, &[])),
            }]);
        };

        let mut actions = component.handle_mcu(&self.state, command_id, payload).await?;

        if let Some(spec) = command::spec_for(command_id) {
            if spec.requires_ack {
                actions.push(DispatchAction::WriteFrame {
                    command_id: Status::Ack.to_u16(),
                    payload: Bytes::from(Status::payload(command_id, &[])),
                });
            }
        }
        Ok(actions)
    }

    /// Handle one inbound MQTT message.
    pub async fn dispatch_mqtt_message(&self, topic: &str, payload: &[u8], reply: ReplyContext) -> Result<Vec<DispatchAction>, DispatchError> {
        let Some(parsed) = topic::parse(&self.prefix, topic) else {
            return Err(DispatchError::MalformedTopic(topic.to_string()));
        };

        let stripped = topic.strip_prefix(&self.prefix).and_then(|rest| rest.strip_prefix('/')).unwrap_or(topic);
        if stripped == HANDSHAKE_SNAPSHOT_TOPIC || stripped == SUMMARY_SNAPSHOT_TOPIC {
            return Ok(vec![DispatchAction::Publish(self.snapshot_publish(stripped))]);
        }

        let action = parsed.rest.first().copied();
        if !self.policy.is_allowed(parsed.area, action) {
            return Err(DispatchError::Forbidden { area: parsed.area.to_string(), action: action.unwrap_or("").to_string() });
        }

        let Some(component) = self.mqtt_handlers.get(parsed.area) else {
            return Err(DispatchError::Unhandled(format!("area {}", parsed.area)));
        };

        component.handle_mqtt(&self.state, &parsed.rest, payload, reply).await
    }

    fn snapshot_publish(&self, leaf: &str) -> OutboundPublish {
        let body = format!("link_synchronized={}", self.state.is_link_synchronized());
        OutboundPublish::simple(format!("{}/{leaf}/value", self.prefix), body.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct Echo;

    #[async_trait]
    impl Component for Echo {
        async fn handle_mcu(&self, _state: &RuntimeState, _command_id: u16, _payload: &[u8]) -> Result<Vec<DispatchAction>, DispatchError> {
            Ok(Vec::new())
        }

        async fn handle_mqtt(
            &self,
            _state: &RuntimeState,
            _rest: &[&str],
            _payload: &[u8],
            _reply: ReplyContext,
        ) -> Result<Vec<DispatchAction>, DispatchError> {
            Ok(Vec::new())
        }
    }

    fn dispatcher() -> Dispatcher {
        let state = Arc::new(RuntimeState::new(8, 8, 8));
        Dispatcher::new(state, "bridge", AuthPolicy::default())
    }

    #[tokio::test]
    async fn commands_are_dropped_silently_before_sync() {
        let mut dispatcher = dispatcher();
        dispatcher.register_mcu(command::DIGITAL_WRITE, Arc::new(Echo));
        let actions = dispatcher.dispatch_mcu_frame(command::DIGITAL_WRITE, &[]).await.unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn unregistered_request_gets_not_implemented() {
        let dispatcher = dispatcher();
        dispatcher.state.set_link_synchronized(true);
        let actions = dispatcher.dispatch_mcu_frame(command::DIGITAL_WRITE, &[]).await.unwrap();
        match &actions[0] {
            DispatchAction::WriteFrame { command_id, payload } => {
                assert_eq!(*command_id, Status::NotImplemented.to_u16());
                assert_eq!(Status::original_command_id(payload), Some(command::DIGITAL_WRITE));
            },
            _ => panic!("expected status frame"),
        }
    }

    #[tokio::test]
    async fn status_frame_is_never_answered_with_not_implemented() {
        let dispatcher = dispatcher();
        dispatcher.state.set_link_synchronized(true);
        let actions = dispatcher.dispatch_mcu_frame(Status::Ack.to_u16(), &Status::payload(command::DIGITAL_WRITE, &[])).await.unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn orphan_response_with_no_handler_is_ignored() {
        let dispatcher = dispatcher();
        dispatcher.state.set_link_synchronized(true);
        let actions = dispatcher.dispatch_mcu_frame(command::DIGITAL_READ_RESP, &[7, 1]).await.unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn ack_required_command_gets_an_ack_appended() {
        let mut dispatcher = dispatcher();
        dispatcher.state.set_link_synchronized(true);
        dispatcher.register_mcu(command::DIGITAL_WRITE, Arc::new(Echo));
        let actions = dispatcher.dispatch_mcu_frame(command::DIGITAL_WRITE, &[7, 1]).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], DispatchAction::WriteFrame { command_id, .. } if *command_id == Status::Ack.to_u16()));
    }

    #[tokio::test]
    async fn forbidden_area_action_is_rejected() {
        let mut dispatcher = dispatcher();
        dispatcher.register_mqtt_area("file", Arc::new(Echo));
        let result = dispatcher.dispatch_mqtt_message("bridge/file/write/etc/passwd", b"x", ReplyContext::default()).await;
        assert!(matches!(result, Err(DispatchError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn snapshot_topic_bypasses_component_registry() {
        let dispatcher = dispatcher();
        let actions = dispatcher
            .dispatch_mqtt_message("bridge/system/bridge/summary/get", b"", ReplyContext::default())
            .await
            .unwrap();
        match &actions[0] {
            DispatchAction::Publish(publish) => assert_eq!(publish.topic, "bridge/system/bridge/summary/get/value"),
            _ => panic!("expected publish"),
        }
    }
}
