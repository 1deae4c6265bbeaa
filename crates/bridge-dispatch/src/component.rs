//! The [`Component`] trait every handler (Pin, Console, Datastore,
//! Mailbox, File, Process) implements, and the sans-IO actions handlers
//! hand back to the dispatcher instead of touching transport or MQTT
//! directly.

use async_trait::async_trait;
use bridge_core::{mqtt_types::OutboundPublish, ReplyContext, RuntimeState};
use bytes::Bytes;

use crate::errors::DispatchError;

/// Something a handler wants done, for the caller (`bridge-daemon`) to
/// execute against the real serial link or MQTT client. Keeping
/// handlers free of transport/MQTT types is what lets them run under a
/// plain `#[tokio::test]` with a bare `RuntimeState`.
#[derive(Debug, Clone)]
pub enum DispatchAction {
    /// Write a frame to the MCU.
    WriteFrame {
        /// Command id to send.
        command_id: u16,
        /// Frame payload.
        payload: Bytes,
    },
    /// Publish a message to the broker.
    Publish(OutboundPublish),
}

/// A handler for one functional area (pins, console, datastore, …),
/// reachable from both the MCU-frame and MQTT-message dispatch paths.
#[async_trait]
pub trait Component: Send + Sync {
    /// Handle a decoded frame from the MCU. Returns the actions the
    /// caller should perform as a result (an MQTT publish, a reply
    /// frame, or both).
    async fn handle_mcu(&self, state: &RuntimeState, command_id: u16, payload: &[u8]) -> Result<Vec<DispatchAction>, DispatchError>;

    /// Handle an inbound MQTT message already routed to this
    /// component's area. `rest` is every topic segment after the area.
    async fn handle_mqtt(
        &self,
        state: &RuntimeState,
        rest: &[&str],
        payload: &[u8],
        reply: ReplyContext,
    ) -> Result<Vec<DispatchAction>, DispatchError>;
}
