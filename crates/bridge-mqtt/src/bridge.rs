//! Owns the broker connection: publisher loop draining the
//! [`PublishQueue`], subscriber loop forwarding inbound messages to a
//! caller-supplied handler, and reconnection with exponential backoff
//! plus jitter.
//!
//! Shaped after `_mqtt_publisher_loop`/`_mqtt_subscriber_loop` running as
//! concurrent tasks under a retry wrapper in the original daemon; here
//! the two loops are two arms of one `tokio::select!` driving a single
//! `rumqttc::v5::EventLoop`, since the publish queue and the event loop
//! both need the same `AsyncClient` handle.

use std::time::Duration;

use bridge_core::mqtt_types::{OutboundPublish, QoS};
use rand::Rng;
use rumqttc::v5::{
    mqttbytes::v5::{Publish, PublishProperties},
    mqttbytes::QoS as WireQoS,
    AsyncClient, Event, Incoming, MqttOptions,
};
use tokio::{sync::mpsc, time::sleep};
use tracing::{info, warn};

use crate::{errors::MqttBridgeError, queue::PublishQueue};

/// One inbound command message, handed to the caller's dispatch
/// function.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// v5 response-topic property, if the publisher set one.
    pub response_topic: Option<String>,
    /// v5 correlation-data property, if the publisher set one.
    pub correlation_data: Option<Vec<u8>>,
}

/// Connection parameters for the broker.
pub struct BridgeConfig {
    /// Broker hostname.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Client credentials, if the broker requires auth.
    pub credentials: Option<(String, String)>,
    /// Topic filter to subscribe to for inbound commands (e.g. `P/#`).
    pub command_filter: String,
    /// Base delay for reconnect backoff; doubles on each consecutive
    /// failure up to sixty seconds, with up to two seconds of jitter
    /// added on top.
    pub reconnect_delay: Duration,
}

const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(60);

fn wire_qos(qos: QoS) -> WireQoS {
    match qos {
        QoS::AtMostOnce => WireQoS::AtMostOnce,
        QoS::AtLeastOnce => WireQoS::AtLeastOnce,
        QoS::ExactlyOnce => WireQoS::ExactlyOnce,
    }
}

fn publish_properties(publish: &OutboundPublish) -> PublishProperties {
    let mut properties = PublishProperties::default();
    properties.response_topic = publish.properties.response_topic.clone();
    properties.correlation_data = publish.properties.correlation_data.as_ref().map(|data| data.to_vec().into());
    properties.content_type = publish.properties.content_type.clone();
    properties.message_expiry_interval = publish.properties.message_expiry_interval;
    for (key, value) in &publish.properties.user_properties {
        properties.user_properties.push((key.clone(), value.clone()));
    }
    properties
}

/// Jittered, doubling backoff: `base * 2^attempt`, capped at sixty
/// seconds, plus up to two seconds of uniform jitter.
fn backoff_for_attempt(base: Duration, attempt: u32) -> Duration {
    let doubled = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX)).min(RECONNECT_MAX_BACKOFF);
    let jitter_ms = rand::thread_rng().gen_range(0..2000);
    doubled + Duration::from_millis(jitter_ms)
}

/// Build a not-yet-connected client and its event loop for `config`.
#[must_use]
pub fn build_client(client_id: &str, config: &BridgeConfig) -> (AsyncClient, rumqttc::v5::EventLoop) {
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    if let Some((user, pass)) = &config.credentials {
        options.set_credentials(user.clone(), pass.clone());
    }
    AsyncClient::new(options, 64)
}

/// Run the publish/subscribe bridge until `queue` and the broker
/// connection are torn down by the caller dropping this future.
///
/// `on_message` is invoked for every inbound command publish; it should
/// not block for long, since it runs inline in the event loop's poll
/// cycle. `enqueue_rx` lets a producer outside this future (the
/// dispatcher, via `RuntimeState::mqtt_publish_queue`) feed messages into
/// `queue` without needing to share ownership of it.
pub async fn run(
    client: AsyncClient,
    mut eventloop: rumqttc::v5::EventLoop,
    config: BridgeConfig,
    mut queue: PublishQueue,
    mut enqueue_rx: mpsc::Receiver<OutboundPublish>,
    mut on_message: impl FnMut(InboundMessage) + Send,
) -> Result<(), MqttBridgeError> {
    client.subscribe(&config.command_filter, WireQoS::AtLeastOnce).await?;

    let mut reconnect_attempt: u32 = 0;

    loop {
        tokio::select! {
            incoming = enqueue_rx.recv() => {
                match incoming {
                    Some(publish) => queue.enqueue(publish).await?,
                    None => return Ok(()),
                }
            },
            next = queue.dequeue() => {
                match next {
                    Ok(Some(publish)) => {
                        let properties = publish_properties(&publish);
                        let result = client
                            .publish_with_properties(
                                publish.topic.clone(),
                                wire_qos(publish.qos),
                                publish.retain,
                                publish.payload.to_vec(),
                                properties,
                            )
                            .await;
                        if result.is_err() {
                            warn!(topic = %publish.topic, "publish failed, requeuing to spool");
                            queue.requeue(publish).await?;
                        }
                    },
                    Ok(None) => sleep(Duration::from_millis(50)).await,
                    Err(error) => warn!(%error, "spool read failed while draining publish queue"),
                }
            },
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("mqtt connected");
                        reconnect_attempt = 0;
                    },
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        on_message(inbound_message(&publish));
                    },
                    Ok(_) => {},
                    Err(error) => {
                        let delay = backoff_for_attempt(config.reconnect_delay, reconnect_attempt);
                        warn!(%error, attempt = reconnect_attempt, delay_ms = delay.as_millis() as u64, "mqtt connection error, backing off");
                        reconnect_attempt = reconnect_attempt.saturating_add(1);
                        sleep(delay).await;
                    },
                }
            },
        }
    }
}

fn inbound_message(publish: &Publish) -> InboundMessage {
    let properties = publish.properties.as_ref();
    InboundMessage {
        topic: String::from_utf8_lossy(&publish.topic).into_owned(),
        payload: publish.payload.to_vec(),
        response_topic: properties.and_then(|properties| properties.response_topic.clone()),
        correlation_data: properties.and_then(|properties| properties.correlation_data.clone()).map(|data| data.to_vec()),
    }
}
