//! Bounded in-memory publish queue backed by the durable [`Spool`].
//!
//! Mirrors `bridge_core::state::RuntimeState`'s "drop the oldest, spool
//! if possible" overflow policy, specialized for `OutboundPublish`: the
//! in-memory ring is drained first so a connected broker sees fresh
//! messages with no spool round-trip, and only overflow or an explicit
//! republish touches disk.

use bridge_core::{mqtt_types::OutboundPublish, BoundedRing};

use crate::{errors::MqttBridgeError, spool::Spool};

/// Combines a bounded in-memory ring with an on-disk spool for messages
/// that don't fit.
pub struct PublishQueue {
    ring: BoundedRing<OutboundPublish>,
    spool: Spool,
}

impl PublishQueue {
    /// Build a queue with the given in-memory capacity, backed by
    /// `spool`.
    #[must_use]
    pub fn new(capacity: usize, spool: Spool) -> Self {
        Self { ring: BoundedRing::new(capacity), spool }
    }

    /// Enqueue a message. If the in-memory ring is full, the oldest
    /// in-memory message is spooled to disk to make room rather than
    /// dropped outright.
    pub async fn enqueue(&mut self, publish: OutboundPublish) -> Result<(), MqttBridgeError> {
        if let Some(evicted) = self.ring.push_overwrite(publish) {
            self.spool.append(&evicted).await?;
        }
        Ok(())
    }

    /// Pop the next message to publish: the durable spool is drained
    /// first (oldest data, written before this process's in-memory
    /// ring existed), then the in-memory ring.
    pub async fn dequeue(&mut self) -> Result<Option<OutboundPublish>, MqttBridgeError> {
        if let Some(publish) = self.spool.pop_next().await? {
            return Ok(Some(publish));
        }
        Ok(self.ring.pop())
    }

    /// Put a message back at the front of the queue after a failed
    /// publish attempt, preferring the durable spool so a crash before
    /// the next successful publish doesn't lose it.
    pub async fn requeue(&mut self, publish: OutboundPublish) -> Result<(), MqttBridgeError> {
        self.spool.append(&publish).await
    }

    /// Count of messages waiting in memory (not including the spool).
    #[must_use]
    pub fn in_memory_len(&self) -> usize {
        self.ring.len()
    }

    /// Messages dropped from the in-memory ring because the configured
    /// capacity was zero — nothing to spool, nowhere to put them.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.ring.dropped()
    }

    /// Current spool counters.
    pub async fn spool_snapshot(&self) -> Result<crate::spool::SpoolSnapshot, MqttBridgeError> {
        self.spool.snapshot().await
    }
}
