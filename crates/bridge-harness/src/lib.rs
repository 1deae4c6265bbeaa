//! Deterministic harness for end-to-end bridge scenarios.
//!
//! Nothing here touches a real serial device or MQTT broker: [`fixture`]
//! wires up the same `Dispatcher`/`RuntimeState` construction
//! `bridge-daemon::daemon::run` uses, and timing-sensitive scenarios run
//! against `tokio::time::Instant` under a paused clock instead of a real
//! one, so tests in `tests/` are exact and reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixture;
