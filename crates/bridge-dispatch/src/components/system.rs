//! MCU version/capability cache and host free-memory reporting under
//! `P/system/{version,free_memory}`. The bridge-level snapshot topics
//! (`.../bridge/handshake/get`, `.../bridge/summary/get`) bypass the
//! component registry entirely and are handled by the dispatcher itself.

use async_trait::async_trait;
use bridge_core::{mqtt_types::OutboundPublish, ReplyContext, RuntimeState};
use bridge_proto::command;
use bytes::Bytes;
use sysinfo::System as HostSystem;

use crate::{component::DispatchAction, errors::DispatchError, Component};

/// Handles `P/system/{version,free_memory}/*` topics and the
/// `VERSION_RESP`/`CAPABILITIES_RESP` frames that populate the cache.
pub struct System {
    topic_prefix: String,
}

impl System {
    /// Build a System handler publishing under `{topic_prefix}/system/*`.
    #[must_use]
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self { topic_prefix: topic_prefix.into() }
    }

    fn topic(&self, leaf: &str) -> String {
        format!("{}/system/{leaf}/value", self.topic_prefix)
    }
}

fn free_memory_bytes() -> u64 {
    let mut system = HostSystem::new();
    system.refresh_memory();
    system.available_memory()
}

#[async_trait]
impl Component for System {
    async fn handle_mcu(&self, state: &RuntimeState, command_id: u16, payload: &[u8]) -> Result<Vec<DispatchAction>, DispatchError> {
        match command_id {
            command::VERSION_RESP => {
                let version = String::from_utf8_lossy(payload).into_owned();
                state.mcu_info.write().await.version = Some(version.clone());
                Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.topic("version"), version.into_bytes()))])
            },
            command::CAPABILITIES_RESP => {
                let capabilities = String::from_utf8_lossy(payload).split(',').map(str::to_string).collect();
                state.mcu_info.write().await.capabilities = capabilities;
                Ok(Vec::new())
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn handle_mqtt(
        &self,
        state: &RuntimeState,
        rest: &[&str],
        _payload: &[u8],
        _reply: ReplyContext,
    ) -> Result<Vec<DispatchAction>, DispatchError> {
        match rest {
            ["version", "get"] => {
                if let Some(version) = state.mcu_info.read().await.version.clone() {
                    return Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.topic("version"), version.into_bytes()))]);
                }
                Ok(vec![DispatchAction::WriteFrame { command_id: command::VERSION, payload: Bytes::new() }])
            },
            ["free_memory", "get"] => {
                let bytes = free_memory_bytes();
                Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.topic("free_memory"), bytes.to_string().into_bytes()))])
            },
            ["version", "value"] | ["free_memory", "value"] => Ok(Vec::new()),
            _ => Err(DispatchError::Unhandled(format!("system/{}", rest.join("/")))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn version_get_queries_the_mcu_when_cache_is_empty() {
        let state = RuntimeState::new(8, 8, 8);
        let system = System::new("bridge");
        let actions = system.handle_mqtt(&state, &["version", "get"], &[], ReplyContext::default()).await.unwrap();
        assert!(matches!(&actions[0], DispatchAction::WriteFrame { command_id, .. } if *command_id == command::VERSION));
    }

    #[tokio::test]
    async fn version_resp_populates_cache_and_publishes() {
        let state = RuntimeState::new(8, 8, 8);
        let system = System::new("bridge");
        let actions = system.handle_mcu(&state, command::VERSION_RESP, b"1.4.0").await.unwrap();
        assert_eq!(state.mcu_info.read().await.version.as_deref(), Some("1.4.0"));
        match &actions[0] {
            DispatchAction::Publish(publish) => assert_eq!(publish.payload.as_ref(), b"1.4.0"),
            _ => panic!("expected publish"),
        }
    }

    #[tokio::test]
    async fn version_get_uses_cache_once_populated() {
        let state = RuntimeState::new(8, 8, 8);
        let system = System::new("bridge");
        let _ = system.handle_mcu(&state, command::VERSION_RESP, b"2.0.0").await.unwrap();
        let actions = system.handle_mqtt(&state, &["version", "get"], &[], ReplyContext::default()).await.unwrap();
        match &actions[0] {
            DispatchAction::Publish(publish) => assert_eq!(publish.payload.as_ref(), b"2.0.0"),
            _ => panic!("expected cached publish"),
        }
    }

    #[tokio::test]
    async fn free_memory_get_publishes_a_byte_count() {
        let state = RuntimeState::new(8, 8, 8);
        let system = System::new("bridge");
        let actions = system.handle_mqtt(&state, &["free_memory", "get"], &[], ReplyContext::default()).await.unwrap();
        match &actions[0] {
            DispatchAction::Publish(publish) => {
                let text = String::from_utf8_lossy(&publish.payload);
                assert!(text.parse::<u64>().is_ok());
            },
            _ => panic!("expected publish"),
        }
    }
}
