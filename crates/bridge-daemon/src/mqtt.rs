//! Owns the broker connection and the hand-off between it and the
//! dispatcher: inbound publishes become `dispatch_mqtt_message` calls,
//! and `RuntimeState::mqtt_publish_queue` entries (queued by either the
//! serial task or this module's own dispatch loop) get forwarded into
//! `bridge_mqtt::run`'s publish queue.
//!
//! Grounded on `mcubridge.daemon.BridgeDaemon._run_mqtt_link`: one task
//! per broker connection, restarted by the supervisor on any error.

use std::{sync::Arc, time::Duration};

use bridge_core::{OutboundPublish, ReplyContext, RuntimeState};
use bridge_dispatch::{DispatchAction, Dispatcher};
use bridge_mqtt::{build_client, run as run_bridge, BridgeConfig, InboundMessage, Spool};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{config::Config, errors::DaemonError, serial::OutboundFrameRequest, status::MqttStatus};

const INBOUND_CHANNEL_CAPACITY: usize = 64;
const FORWARD_POLL_INTERVAL: Duration = Duration::from_millis(20);

fn reply_context(message: &InboundMessage) -> ReplyContext {
    ReplyContext { response_topic: message.response_topic.clone(), correlation_data: message.correlation_data.clone().map(Bytes::from) }
}

async fn run_dispatch_loop(dispatcher: Arc<Dispatcher>, state: Arc<RuntimeState>, frame_tx: mpsc::Sender<OutboundFrameRequest>, mut inbound_rx: mpsc::Receiver<InboundMessage>) {
    while let Some(message) = inbound_rx.recv().await {
        let reply = reply_context(&message);
        match dispatcher.dispatch_mqtt_message(&message.topic, &message.payload, reply).await {
            Ok(actions) => execute_actions(&state, &frame_tx, actions).await,
            Err(error) => warn!(%error, topic = %message.topic, "dispatch of mqtt message failed"),
        }
    }
}

async fn execute_actions(state: &RuntimeState, frame_tx: &mpsc::Sender<OutboundFrameRequest>, actions: Vec<DispatchAction>) {
    for action in actions {
        match action {
            DispatchAction::WriteFrame { command_id, payload } => {
                if frame_tx.send(OutboundFrameRequest { command_id, payload }).await.is_err() {
                    warn!(command_id, "serial task is gone, dropping mqtt-originated frame request");
                }
            },
            DispatchAction::Publish(publish) => {
                let mut queue = state.mqtt_publish_queue.lock().await;
                if queue.push_overwrite(publish).is_some() {
                    state.counters.mqtt_dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
            },
        }
    }
}

/// Drain `state.mqtt_publish_queue` into `enqueue_tx`, the channel
/// `bridge_mqtt::run` reads to learn about new outbound publishes.
/// Polls on a short fixed interval rather than a condition variable,
/// same tradeoff `PublishQueue::dequeue` makes for its own empty case.
async fn run_forwarder(state: Arc<RuntimeState>, mqtt_status: Arc<MqttStatus>, enqueue_tx: mpsc::Sender<OutboundPublish>) {
    loop {
        let popped = {
            let mut queue = state.mqtt_publish_queue.lock().await;
            let popped = queue.pop();
            mqtt_status.set_queue_depth(queue.len());
            popped
        };
        match popped {
            Some(publish) => {
                if enqueue_tx.send(publish).await.is_err() {
                    return;
                }
            },
            None => tokio::time::sleep(FORWARD_POLL_INTERVAL).await,
        }
    }
}

/// Run one broker connection's lifetime: connects, forwards inbound
/// messages to the dispatcher, and drains outbound publishes back out.
/// Returns when `bridge_mqtt::run` does, for the supervisor to restart.
pub async fn run(
    config: Arc<Config>,
    state: Arc<RuntimeState>,
    dispatcher: Arc<Dispatcher>,
    mqtt_status: Arc<MqttStatus>,
    frame_tx: mpsc::Sender<OutboundFrameRequest>,
) -> Result<(), DaemonError> {
    let spool = Spool::open(config.mqtt_spool_dir.clone(), config.mqtt_queue_limit).await?;
    let queue = bridge_mqtt::PublishQueue::new(config.mqtt_queue_limit, spool);

    let credentials = match (&config.mqtt_user, &config.mqtt_pass) {
        (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
        _ => None,
    };
    let bridge_config = BridgeConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        credentials,
        command_filter: format!("{}/#", config.mqtt_topic),
        reconnect_delay: config.reconnect_delay(),
    };
    let (client, eventloop) = build_client("mcubridge", &bridge_config);

    let (enqueue_tx, enqueue_rx) = mpsc::channel(config.mqtt_queue_limit.max(1));
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

    let forwarder = tokio::spawn(run_forwarder(Arc::clone(&state), Arc::clone(&mqtt_status), enqueue_tx));
    let dispatch = tokio::spawn(run_dispatch_loop(dispatcher, state, frame_tx, inbound_rx));

    mqtt_status.set_connected(true);
    let result = run_bridge(client, eventloop, bridge_config, queue, enqueue_rx, move |message| {
        if inbound_tx.try_send(message).is_err() {
            warn!("mqtt inbound dispatch backlog full, dropping message");
        }
    })
    .await;
    mqtt_status.set_connected(false);

    forwarder.abort();
    dispatch.abort();
    result.map_err(DaemonError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_context_copies_response_topic_and_correlation_data() {
        let message = InboundMessage {
            topic: "bridge/d/7/set".to_string(),
            payload: vec![1],
            response_topic: Some("bridge/d/7/value".to_string()),
            correlation_data: Some(vec![9, 9]),
        };
        let reply = reply_context(&message);
        assert_eq!(reply.response_topic.as_deref(), Some("bridge/d/7/value"));
        assert_eq!(reply.correlation_data.as_deref(), Some(&[9, 9][..]));
    }
}
