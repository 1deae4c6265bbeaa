//! Link state machine gating when the dispatcher may invoke component
//! handlers.
//!
//! The transport task and the handshake manager drive this state machine
//! forward; the dispatcher only ever reads [`LinkStateMachine::is_running`].

use crate::errors::BridgeError;

/// A phase of the serial link's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// No open device handle.
    Disconnected,
    /// DTR-toggle hardware reset in progress.
    Resetting,
    /// Device opened at the safe baud rate.
    Connecting,
    /// Baud rate negotiation with the MCU in progress (optional step).
    Negotiating,
    /// Device open at its final baud rate, handshake not yet started.
    Connected,
    /// Handshake manager is running its reset/nonce/tag exchange.
    Handshaking,
    /// Handshake succeeded; component dispatch is permitted.
    Running,
}

/// Sequences [`LinkState`] transitions and rejects out-of-order ones.
///
/// Every state may fall back to [`LinkState::Disconnected`] (device error,
/// explicit reset request); forward progress must follow the declared
/// sequence.
#[derive(Debug)]
pub struct LinkStateMachine {
    state: LinkState,
}

impl Default for LinkStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStateMachine {
    /// A machine starting in [`LinkState::Disconnected`].
    #[must_use]
    pub fn new() -> Self {
        Self { state: LinkState::Disconnected }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// True only in [`LinkState::Running`] — the dispatcher consults this
    /// before invoking any component handler other than the pre-sync
    /// allow-list.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == LinkState::Running
    }

    /// Attempt to move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if `next` does not follow from
    /// the current state.
    pub fn transition(&mut self, next: LinkState) -> Result<(), BridgeError> {
        if next == LinkState::Disconnected || self.allowed(next) {
            self.state = next;
            return Ok(());
        }
        Err(BridgeError::Transport { reason: format!("illegal link transition {:?} -> {:?}", self.state, next) })
    }

    fn allowed(&self, next: LinkState) -> bool {
        use LinkState::{Connected, Connecting, Disconnected, Handshaking, Negotiating, Resetting, Running};
        matches!(
            (self.state, next),
            (Disconnected, Resetting)
                | (Resetting, Connecting)
                | (Connecting, Negotiating)
                | (Connecting, Connected)
                | (Negotiating, Connected)
                | (Connected, Handshaking)
                | (Handshaking, Running)
        )
    }
}
