//! Top-level wiring: builds `RuntimeState` and the `Dispatcher`,
//! registers every component, and spawns every supervised task.
//!
//! Grounded on `mcubridge.daemon.BridgeDaemon.run`/`_setup_supervision`:
//! one `TaskSpec` per long-lived loop, all raced together, with the
//! first fatal failure ending the process.

use std::{sync::Arc, time::Duration};

use bridge_core::RuntimeState;
use bridge_dispatch::{
    components::{Console, Datastore, File, Mailbox, Pin, Process, System},
    AuthPolicy, Dispatcher,
};
use bridge_proto::command;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    config::Config,
    errors::DaemonError,
    mqtt, serial, status,
    status::MqttStatus,
    supervisor::{Supervisor, TaskSpec},
    watchdog,
};

const FRAME_REQUEST_CHANNEL_CAPACITY: usize = 32;

/// Build a [`Dispatcher`] with every domain component registered against
/// its MCU command id(s) and MQTT area, per `config`. Exposed beyond this
/// crate so `bridge-harness` can wire up the same wiring `run` uses
/// without a serial port or broker in the loop.
#[must_use]
pub fn build_dispatcher(state: Arc<RuntimeState>, config: &Config) -> Dispatcher {
    let policy = AuthPolicy { allow_non_tmp_paths: config.allow_non_tmp_paths, shell_enabled: config.shell_enabled };
    let mut dispatcher = Dispatcher::new(state, config.mqtt_topic.clone(), policy);

    let pin_digital = Arc::new(Pin::digital(config.mqtt_topic.clone()).with_fifo_capacity(config.pending_pin_request_limit));
    let pin_analog = Arc::new(Pin::analog(config.mqtt_topic.clone()).with_fifo_capacity(config.pending_pin_request_limit));
    let console = Arc::new(Console::new(config.mqtt_topic.clone()));
    let datastore = Arc::new(Datastore::new(config.mqtt_topic.clone()));
    let mailbox = Arc::new(Mailbox::new(config.mqtt_topic.clone()));
    let file = Arc::new(File::new(config.mqtt_topic.clone()));
    let process = Arc::new(Process::new(config.mqtt_topic.clone()));
    let system = Arc::new(System::new(config.mqtt_topic.clone()));

    dispatcher.register_mcu(command::DIGITAL_READ_RESP, Arc::clone(&pin_digital) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::ANALOG_READ_RESP, Arc::clone(&pin_analog) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::CONSOLE_DATA, Arc::clone(&console) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::DATASTORE_GET_RESP, Arc::clone(&datastore) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::MAILBOX_INCOMING, Arc::clone(&mailbox) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::MAILBOX_READ_RESP, Arc::clone(&mailbox) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::MAILBOX_AVAILABLE_RESP, Arc::clone(&mailbox) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::FILE_READ_RESP, Arc::clone(&file) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::PROCESS_RUN_RESP, Arc::clone(&process) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::PROCESS_RUN_ASYNC_RESP, Arc::clone(&process) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::PROCESS_POLL_RESP, Arc::clone(&process) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::VERSION_RESP, Arc::clone(&system) as Arc<dyn bridge_dispatch::Component>);
    dispatcher.register_mcu(command::CAPABILITIES_RESP, Arc::clone(&system) as Arc<dyn bridge_dispatch::Component>);

    dispatcher.register_mqtt_area("d", pin_digital);
    dispatcher.register_mqtt_area("a", pin_analog);
    dispatcher.register_mqtt_area("console", console);
    dispatcher.register_mqtt_area("datastore", datastore);
    dispatcher.register_mqtt_area("mailbox", mailbox);
    dispatcher.register_mqtt_area("file", file);
    dispatcher.register_mqtt_area("shell", process);
    dispatcher.register_mqtt_area("system", system);

    dispatcher
}

/// Build every shared object and spawn every supervised task, then block
/// until one reports a fatal error. Removes the status file on the way
/// out, matching `cleanup_status_file` in the original daemon's
/// `finally` block.
pub async fn run(config: Config) -> DaemonError {
    let config = Arc::new(config);
    let state = Arc::new(RuntimeState::new(config.console_queue_limit_bytes, config.mailbox_queue_limit, config.mqtt_queue_limit));
    let dispatcher = Arc::new(build_dispatcher(Arc::clone(&state), &config));
    let mqtt_status = Arc::new(MqttStatus::default());
    let started_at = std::time::Instant::now();

    let (frame_tx, frame_rx) = mpsc::channel(FRAME_REQUEST_CHANNEL_CAPACITY);

    let mut supervisor = Supervisor::new(Arc::clone(&state));

    {
        let config = Arc::clone(&config);
        let state = Arc::clone(&state);
        let dispatcher = Arc::clone(&dispatcher);
        // Shared rather than moved: each restart needs the same receiver
        // back, since it can't be recreated without losing the sender
        // half held by the mqtt task.
        let frame_rx = Arc::new(tokio::sync::Mutex::new(frame_rx));
        supervisor.spawn(TaskSpec::new("serial-link", config.reconnect_delay(), Duration::from_secs(30)), move || {
            let config = Arc::clone(&config);
            let state = Arc::clone(&state);
            let dispatcher = Arc::clone(&dispatcher);
            let frame_rx = Arc::clone(&frame_rx);
            async move {
                let mut frame_rx = frame_rx.lock().await;
                serial::run(config, state, dispatcher, &mut frame_rx).await
            }
        });
    }

    {
        let config = Arc::clone(&config);
        let state = Arc::clone(&state);
        let dispatcher = Arc::clone(&dispatcher);
        let mqtt_status = Arc::clone(&mqtt_status);
        let frame_tx = frame_tx.clone();
        supervisor.spawn(TaskSpec::new("mqtt-link", config.reconnect_delay(), Duration::from_secs(30)), move || {
            let config = Arc::clone(&config);
            let state = Arc::clone(&state);
            let dispatcher = Arc::clone(&dispatcher);
            let mqtt_status = Arc::clone(&mqtt_status);
            let frame_tx = frame_tx.clone();
            async move { mqtt::run(config, state, dispatcher, mqtt_status, frame_tx).await }
        });
    }

    {
        let state = Arc::clone(&state);
        let mqtt_status = Arc::clone(&mqtt_status);
        let config = Arc::clone(&config);
        supervisor.spawn(TaskSpec::new("status-writer", Duration::from_millis(500), Duration::from_secs(10)), move || {
            let state = Arc::clone(&state);
            let mqtt_status = Arc::clone(&mqtt_status);
            let path = std::path::PathBuf::from(&config.status_file);
            let interval = config.status_interval();
            async move { status::status_writer(&state, &mqtt_status, &path, interval, started_at).await }
        });
    }

    if config.watchdog_enabled {
        let interval = config.watchdog_interval();
        supervisor.spawn(TaskSpec::new("watchdog", Duration::from_secs(1), Duration::from_secs(10)), move || watchdog::run(interval, None));
    }

    info!(
        serial_port = %config.serial_port,
        mqtt_host = %config.mqtt_host,
        mqtt_port = config.mqtt_port,
        "bridge daemon starting"
    );

    let fatal = supervisor.run_until_fatal().await;
    warn!(%fatal, "daemon terminating after a fatal task failure");
    status::cleanup_status_file(std::path::Path::new(&config.status_file)).await;
    fatal
}
