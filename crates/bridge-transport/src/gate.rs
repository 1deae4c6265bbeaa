//! Write gate toggled by the MCU's flow-control status frames.
//!
//! Pure state, separated from the writer task so it is trivially testable:
//! the writer checks [`WriteGate::is_open`] before each send and awaits
//! [`WriteGate::notified`] when closed.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::Notify;

/// Shared XOFF/XON gate. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct WriteGate {
    open: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for WriteGate {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteGate {
    /// A gate that starts open.
    #[must_use]
    pub fn new() -> Self {
        Self { open: Arc::new(AtomicBool::new(true)), notify: Arc::new(Notify::new()) }
    }

    /// Current state.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close the gate (MCU sent XOFF). Writers already waiting remain
    /// waiting until the next [`WriteGate::open`] call.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Open the gate (MCU sent XON) and wake any writer waiting on it.
    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Resolve once the gate transitions to open. Returns immediately if
    /// already open.
    pub async fn wait_until_open(&self) {
        loop {
            if self.is_open() {
                return;
            }
            self.notify.notified().await;
        }
    }
}
