//! File access on the MCU's attached storage. A thin, spec-honest
//! passthrough: path containment and the `allow_non_tmp_paths` toggle
//! are enforced by the dispatcher's authorization policy before a
//! message ever reaches this handler, so the handler itself only
//! builds/parses frames.

use async_trait::async_trait;
use bridge_core::{mqtt_types::OutboundPublish, ReplyContext, RuntimeState};
use bridge_proto::command;
use bytes::Bytes;

use crate::{component::DispatchAction, errors::DispatchError, Component};

/// Handles `P/file/*` topics and `FILE_*` commands.
pub struct File {
    read_topic: String,
}

impl File {
    /// Build a File handler publishing read results on
    /// `{topic_prefix}/file/read`.
    #[must_use]
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self { read_topic: format!("{}/file/read", topic_prefix.into()) }
    }
}

fn build_path_payload(path: &[&str], body: &[u8]) -> Bytes {
    let joined = path.join("/");
    let mut buf = Vec::with_capacity(joined.len() + 1 + body.len());
    buf.extend_from_slice(joined.as_bytes());
    buf.push(0);
    buf.extend_from_slice(body);
    buf.into()
}

#[async_trait]
impl Component for File {
    async fn handle_mcu(&self, _state: &RuntimeState, command_id: u16, payload: &[u8]) -> Result<Vec<DispatchAction>, DispatchError> {
        if command_id != command::FILE_READ_RESP {
            return Ok(Vec::new());
        }
        Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.read_topic.clone(), payload.to_vec()))])
    }

    async fn handle_mqtt(
        &self,
        _state: &RuntimeState,
        rest: &[&str],
        payload: &[u8],
        _reply: ReplyContext,
    ) -> Result<Vec<DispatchAction>, DispatchError> {
        let [action, path @ ..] = rest else {
            return Err(DispatchError::MalformedTopic("file".into()));
        };
        if path.is_empty() {
            return Err(DispatchError::MalformedTopic(format!("file/{action}")));
        }
        let command_id = match *action {
            "write" => command::FILE_WRITE,
            "read" => command::FILE_READ,
            "remove" => command::FILE_REMOVE,
            _ => return Err(DispatchError::Unhandled(format!("file action {action}"))),
        };
        Ok(vec![DispatchAction::WriteFrame { command_id, payload: build_path_payload(path, payload) }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_encodes_path_and_body() {
        let state = RuntimeState::new(8, 8, 8);
        let file = File::new("bridge");
        let actions = file.handle_mqtt(&state, &["write", "tmp", "out.txt"], b"data", ReplyContext::default()).await.unwrap();
        match &actions[0] {
            DispatchAction::WriteFrame { command_id, payload } => {
                assert_eq!(*command_id, command::FILE_WRITE);
                assert_eq!(&payload[..], b"tmp/out.txt\0data");
            },
            _ => panic!("expected write frame"),
        }
    }

    #[tokio::test]
    async fn missing_path_is_rejected() {
        let state = RuntimeState::new(8, 8, 8);
        let file = File::new("bridge");
        assert!(file.handle_mqtt(&state, &["write"], b"data", ReplyContext::default()).await.is_err());
    }
}
