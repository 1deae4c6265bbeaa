//! MCU serial/MQTT bridge daemon: configuration, supervised task
//! wiring, and the per-link (serial, MQTT) and status-reporting tasks.
//!
//! The binary entrypoint lives in `main.rs`; everything else is exposed
//! here so `bridge-harness` can drive the supervisor and task wiring
//! deterministically without a real serial port or broker.

pub mod config;
pub mod daemon;
pub mod errors;
pub mod mqtt;
pub mod serial;
pub mod status;
pub mod supervisor;
pub mod watchdog;

pub use config::Config;
pub use errors::DaemonError;
