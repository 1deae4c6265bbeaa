//! Async ownership of the MCU serial device.
//!
//! This crate is the only place that touches the actual port: DTR-toggle
//! hardware reset, optional baud negotiation, a background reader feeding
//! `bridge-proto`'s framer, and a writer gated by the MCU's XOFF/XON
//! status frames. Protocol logic lives in `bridge-core` and never sees a
//! file descriptor.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod baud;
mod errors;
mod gate;
mod link;

pub use baud::{request_payload as baud_request_payload, BaudNegotiator, NegotiationStep};
pub use errors::TransportError;
pub use gate::WriteGate;
pub use link::{DecodeFailure, InboundFrame, SerialLink};
