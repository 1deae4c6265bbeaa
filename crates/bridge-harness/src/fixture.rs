//! Builds the same `Dispatcher`/`RuntimeState` pair the real daemon
//! wires up, without a serial port or MQTT broker underneath.

use std::sync::Arc;

use bridge_core::RuntimeState;
use bridge_daemon::Config;
use bridge_dispatch::Dispatcher;

/// A dispatcher and the runtime state it was built against, sharing the
/// exact wiring `bridge_daemon::daemon::run` uses in production.
pub struct Fixture {
    /// Config the dispatcher and queue capacities were built from.
    pub config: Config,
    /// Shared runtime state: counters, queues, the link-synchronized flag.
    pub state: Arc<RuntimeState>,
    /// Dispatcher with every domain component registered.
    pub dispatcher: Dispatcher,
}

impl Fixture {
    /// Build a fixture from `config`, starting the link unsynchronized.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let state = Arc::new(RuntimeState::new(config.console_queue_limit_bytes, config.mailbox_queue_limit, config.mqtt_queue_limit));
        let dispatcher = bridge_daemon::daemon::build_dispatcher(Arc::clone(&state), &config);
        Self { config, state, dispatcher }
    }

    /// Build a fixture from the default config, already marked
    /// synchronized — the state most scenario tests start from, since
    /// the pre-sync gate itself is covered separately.
    #[must_use]
    pub fn synchronized() -> Self {
        let fixture = Self::new(Config::default());
        fixture.state.set_link_synchronized(true);
        fixture
    }

    /// Build a fixture from the default config, overriding only the
    /// per-channel pending-pin-request FIFO depth.
    #[must_use]
    pub fn with_pending_pin_limit(limit: usize) -> Self {
        let config = Config { pending_pin_request_limit: limit, ..Config::default() };
        let fixture = Self::new(config);
        fixture.state.set_link_synchronized(true);
        fixture
    }
}
