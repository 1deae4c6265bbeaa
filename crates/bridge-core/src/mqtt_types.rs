//! Shared MQTT value types used by both `bridge-core`'s queues and
//! `bridge-dispatch`/`bridge-mqtt`, kept here to avoid a dependency cycle
//! between those two crates.

use std::collections::HashMap;

use bytes::Bytes;

/// MQTT v5 quality-of-service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce,
    /// Acknowledged delivery, possible duplicates.
    AtLeastOnce,
    /// Exactly-once delivery.
    ExactlyOnce,
}

/// A subset of MQTT v5 message properties this bridge makes use of.
#[derive(Debug, Clone, Default)]
pub struct MessageProperties {
    /// Topic the responder should publish its reply to.
    pub response_topic: Option<String>,
    /// Opaque token echoed back with a reply so the requester can match
    /// it to its own pending request.
    pub correlation_data: Option<Bytes>,
    /// Free-form key/value metadata.
    pub user_properties: HashMap<String, String>,
    /// MIME-ish content type hint.
    pub content_type: Option<String>,
    /// Seconds after which a broker may discard this message unseen.
    pub message_expiry_interval: Option<u32>,
}

/// A message queued for publication to the broker.
#[derive(Debug, Clone)]
pub struct OutboundPublish {
    /// Destination topic.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Bytes,
    /// Requested QoS.
    pub qos: QoS,
    /// Whether the broker should retain this message.
    pub retain: bool,
    /// v5 properties to attach.
    pub properties: MessageProperties,
}

impl OutboundPublish {
    /// Build a fire-and-forget, non-retained publish with no extra
    /// properties — the common case for sensor-value and status updates.
    #[must_use]
    pub fn simple(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            properties: MessageProperties::default(),
        }
    }
}

/// Context captured from an inbound MQTT request so a component can send
/// its reply to the right place, matched by the right token.
#[derive(Debug, Clone, Default)]
pub struct ReplyContext {
    /// Topic to publish the reply to, if the requester supplied one.
    pub response_topic: Option<String>,
    /// Correlation data to echo back unchanged.
    pub correlation_data: Option<Bytes>,
}

impl ReplyContext {
    /// Build the reply context from a request's properties.
    #[must_use]
    pub fn from_properties(properties: &MessageProperties) -> Self {
        Self { response_topic: properties.response_topic.clone(), correlation_data: properties.correlation_data.clone() }
    }
}
