//! Process spawn/poll/kill on the MCU side, exposed over MQTT as
//! `P/shell/*`. A thin, spec-honest passthrough — no process supervision
//! framework, just the frame encoding the wire protocol names.

use async_trait::async_trait;
use bridge_core::{mqtt_types::OutboundPublish, ReplyContext, RuntimeState};
use bridge_proto::command;
use bytes::Bytes;

use crate::{component::DispatchAction, errors::DispatchError, Component};

/// Handles `P/shell/*` topics and `PROCESS_*` commands.
pub struct Process {
    topic_prefix: String,
}

impl Process {
    /// Build a Process handler publishing results under `topic_prefix`.
    #[must_use]
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self { topic_prefix: topic_prefix.into() }
    }

    fn topic(&self, leaf: &str) -> String {
        format!("{}/shell/{leaf}", self.topic_prefix)
    }
}

fn build_pid_payload(pid: u32) -> Bytes {
    Bytes::copy_from_slice(&pid.to_be_bytes())
}

#[async_trait]
impl Component for Process {
    async fn handle_mcu(&self, _state: &RuntimeState, command_id: u16, payload: &[u8]) -> Result<Vec<DispatchAction>, DispatchError> {
        let leaf = match command_id {
            command::PROCESS_RUN_RESP => "run",
            command::PROCESS_RUN_ASYNC_RESP => "run_async",
            command::PROCESS_POLL_RESP => "poll",
            _ => return Ok(Vec::new()),
        };
        Ok(vec![DispatchAction::Publish(OutboundPublish::simple(self.topic(leaf), payload.to_vec()))])
    }

    async fn handle_mqtt(
        &self,
        _state: &RuntimeState,
        rest: &[&str],
        payload: &[u8],
        _reply: ReplyContext,
    ) -> Result<Vec<DispatchAction>, DispatchError> {
        match rest {
            ["run"] => Ok(vec![DispatchAction::WriteFrame { command_id: command::PROCESS_RUN, payload: Bytes::copy_from_slice(payload) }]),
            ["run_async"] => {
                Ok(vec![DispatchAction::WriteFrame { command_id: command::PROCESS_RUN_ASYNC, payload: Bytes::copy_from_slice(payload) }])
            },
            ["poll", pid_str] => {
                let pid: u32 = pid_str.parse().map_err(|_| DispatchError::MalformedTopic((*pid_str).to_string()))?;
                Ok(vec![DispatchAction::WriteFrame { command_id: command::PROCESS_POLL, payload: build_pid_payload(pid) }])
            },
            ["kill", pid_str] => {
                let pid: u32 = pid_str.parse().map_err(|_| DispatchError::MalformedTopic((*pid_str).to_string()))?;
                Ok(vec![DispatchAction::WriteFrame { command_id: command::PROCESS_KILL, payload: build_pid_payload(pid) }])
            },
            _ => Err(DispatchError::Unhandled(format!("shell/{}", rest.join("/")))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_forwards_command_line_as_payload() {
        let state = RuntimeState::new(8, 8, 8);
        let process = Process::new("bridge");
        let actions = process.handle_mqtt(&state, &["run"], b"ls -la", ReplyContext::default()).await.unwrap();
        assert!(matches!(&actions[0], DispatchAction::WriteFrame { command_id, .. } if *command_id == command::PROCESS_RUN));
    }

    #[tokio::test]
    async fn poll_encodes_pid_big_endian() {
        let state = RuntimeState::new(8, 8, 8);
        let process = Process::new("bridge");
        let actions = process.handle_mqtt(&state, &["poll", "42"], &[], ReplyContext::default()).await.unwrap();
        match &actions[0] {
            DispatchAction::WriteFrame { command_id, payload } => {
                assert_eq!(*command_id, command::PROCESS_POLL);
                assert_eq!(&payload[..], &42u32.to_be_bytes());
            },
            _ => panic!("expected write frame"),
        }
    }
}
