//! Process-wide runtime state: counters, bounded queues, and caches
//! shared by the dispatcher, transport, and MQTT bridge.
//!
//! A single [`RuntimeState`] is constructed once at startup and handed to
//! every task behind an `Arc`; nothing here is a global singleton.

use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::RwLock;

/// A fixed-capacity FIFO that overwrites its oldest element on overflow
/// instead of rejecting the new one.
///
/// Used for the MQTT publish queue, console bytes, mailbox messages, and
/// pending digital/analog read slots — every bounded queue in the spec
/// that names "drop the oldest" as its overflow policy.
#[derive(Debug)]
pub struct BoundedRing<T> {
    items: VecDeque<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> BoundedRing<T> {
    /// A ring holding at most `capacity` items. `capacity == 0` accepts
    /// nothing and drops every push.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { items: VecDeque::with_capacity(capacity), capacity, dropped: 0 }
    }

    /// Push `item`, evicting the oldest element first if already full.
    /// Returns the evicted element, if any.
    pub fn push_overwrite(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            self.dropped += 1;
            return Some(item);
        }
        let evicted = if self.items.len() >= self.capacity { self.items.pop_front() } else { None };
        if evicted.is_some() {
            self.dropped += 1;
        }
        self.items.push_back(item);
        evicted
    }

    /// Pop the oldest element.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Current element count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total elements dropped over the ring's lifetime.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Monotonic counters, one per observable event class named in the
/// status snapshot.
#[derive(Debug, Default)]
pub struct Counters {
    /// COBS/framing decode failures.
    pub decode_errors: AtomicU64,
    /// Frame CRC mismatches.
    pub crc_errors: AtomicU64,
    /// Handshake attempts started.
    pub handshake_attempts: AtomicU64,
    /// Handshakes that reached `Synchronized`.
    pub handshake_successes: AtomicU64,
    /// Transient handshake failures.
    pub handshake_failures: AtomicU64,
    /// Fatal handshake failures.
    pub handshake_fatal: AtomicU64,
    /// MQTT messages dropped from the publish queue on overflow.
    pub mqtt_dropped: AtomicU64,
    /// Console bytes truncated for exceeding the queue byte limit.
    pub console_truncated: AtomicU64,
    /// Mailbox messages dropped for exceeding queue bounds.
    pub mailbox_overflow: AtomicU64,
    /// Pending digital/analog read requests rejected for exceeding their
    /// per-channel FIFO bound.
    pub pending_pin_overflow: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Increment `decode_errors` and return the new value.
    pub fn record_decode_error(&self) -> u64 {
        Self::bump(&self.decode_errors)
    }

    /// Increment `crc_errors` and return the new value.
    pub fn record_crc_error(&self) -> u64 {
        Self::bump(&self.crc_errors)
    }
}

/// Cached MCU identity, refreshed opportunistically after a successful
/// handshake.
#[derive(Debug, Default, Clone)]
pub struct McuInfo {
    /// Firmware version string, if the MCU has reported one.
    pub version: Option<String>,
    /// Capability flags/names reported by the MCU.
    pub capabilities: Vec<String>,
}

/// Per-task restart bookkeeping, mirrored into the status snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct SupervisorStats {
    /// Number of times this task has been restarted.
    pub restarts: u64,
    /// Unix timestamp of the task's last non-fatal exit, if any.
    pub last_failure_unix: Option<u64>,
    /// Current backoff in effect for the next restart.
    pub backoff_seconds: u64,
    /// True once this task has exited with a fatal error.
    pub fatal: bool,
}

/// Single shared aggregate of mutable daemon state.
///
/// Queues and caches use `tokio::sync` primitives so the same struct
/// works whether the daemon runs on a current-thread or multi-threaded
/// runtime; counters are lock-free atomics on the hot decode path.
pub struct RuntimeState {
    /// Event counters (see [`Counters`]).
    pub counters: Counters,
    /// Datastore key-value cache, written by `DATASTORE_PUT`/MQTT puts,
    /// read by `DATASTORE_GET`.
    pub datastore: RwLock<HashMap<String, Vec<u8>>>,
    /// Cached MCU version/capabilities.
    pub mcu_info: RwLock<McuInfo>,
    /// Bounded console-to-MCU byte queue.
    pub console_queue: tokio::sync::Mutex<BoundedRing<u8>>,
    /// Bounded outgoing mailbox message queue.
    pub mailbox_outgoing: tokio::sync::Mutex<BoundedRing<Vec<u8>>>,
    /// Bounded incoming mailbox message queue.
    pub mailbox_incoming: tokio::sync::Mutex<BoundedRing<Vec<u8>>>,
    /// Bounded MQTT publish queue.
    pub mqtt_publish_queue: tokio::sync::Mutex<BoundedRing<crate::mqtt_types::OutboundPublish>>,
    /// Per-pin pending digital/analog read request FIFOs.
    pub pending_pin_requests: tokio::sync::Mutex<HashMap<u8, BoundedRing<PendingPinRequest>>>,
    /// Per-task supervisor statistics, keyed by task name.
    pub supervisor_stats: RwLock<HashMap<String, SupervisorStats>>,
    /// True once the handshake has succeeded and the link is live.
    pub link_synchronized: std::sync::atomic::AtomicBool,
}

/// A caller awaiting a digital or analog read response.
#[derive(Debug)]
pub struct PendingPinRequest {
    /// Pin number the read targets.
    pub pin: u8,
    /// MQTT reply context (response topic / correlation data), opaque
    /// here and interpreted by `bridge-dispatch`.
    pub reply_context: crate::mqtt_types::ReplyContext,
}

impl RuntimeState {
    /// Build a new, empty runtime state with the given queue capacities.
    #[must_use]
    pub fn new(
        console_queue_capacity: usize,
        mailbox_queue_capacity: usize,
        mqtt_publish_queue_capacity: usize,
    ) -> Self {
        Self {
            counters: Counters::default(),
            datastore: RwLock::new(HashMap::new()),
            mcu_info: RwLock::new(McuInfo::default()),
            console_queue: tokio::sync::Mutex::new(BoundedRing::new(console_queue_capacity)),
            mailbox_outgoing: tokio::sync::Mutex::new(BoundedRing::new(mailbox_queue_capacity)),
            mailbox_incoming: tokio::sync::Mutex::new(BoundedRing::new(mailbox_queue_capacity)),
            mqtt_publish_queue: tokio::sync::Mutex::new(BoundedRing::new(mqtt_publish_queue_capacity)),
            pending_pin_requests: tokio::sync::Mutex::new(HashMap::new()),
            supervisor_stats: RwLock::new(HashMap::new()),
            link_synchronized: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// True if the link has completed its handshake.
    pub fn is_link_synchronized(&self) -> bool {
        self.link_synchronized.load(Ordering::Acquire)
    }

    /// Flip the synchronized flag; called by the handshake driver on
    /// `Synchronized`/on link reset.
    pub fn set_link_synchronized(&self, value: bool) {
        self.link_synchronized.store(value, Ordering::Release);
    }
}
