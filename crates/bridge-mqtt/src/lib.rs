//! MQTT v5 bridge: durable publish spool, bounded publish queue,
//! subscriber/publisher loop, and reconnection with backoff and jitter.
//!
//! Protocol- and transport-agnostic; the dispatcher (`bridge-dispatch`)
//! decides what gets published and what inbound messages mean. This
//! crate only owns the broker connection and the durability guarantees
//! around it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod errors;
mod queue;
mod spool;

pub use bridge::{build_client, run, BridgeConfig, InboundMessage};
pub use errors::MqttBridgeError;
pub use queue::PublishQueue;
pub use spool::{Spool, SpoolSnapshot};
