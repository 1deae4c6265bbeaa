//! Link state machine, flow controller, handshake manager, and shared
//! runtime state for the MCU serial bridge.
//!
//! Everything here is sans-IO: modules compute actions and events from
//! inputs, and the driver in `bridge-transport`/`bridge-daemon` performs
//! the actual reads, writes, and sleeps.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod errors;
pub mod flow;
pub mod handshake;
pub mod link;
pub mod mqtt_types;
pub mod state;

pub use env::Environment;
pub use errors::BridgeError;
pub use flow::{FlowAction, FlowController, FlowCounters, FlowOutcome};
pub use handshake::{HandshakeAction, HandshakeEvent, HandshakeManager, HandshakeStats, SerialTimingWindow};
pub use link::{LinkState, LinkStateMachine};
pub use mqtt_types::{MessageProperties, OutboundPublish, QoS, ReplyContext};
pub use state::{BoundedRing, Counters, McuInfo, PendingPinRequest, RuntimeState, SupervisorStats};
