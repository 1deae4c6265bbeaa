//! Owns the serial link's lifecycle: connect, optional baud
//! negotiation, handshake, then steady-state frame routing between the
//! MCU and the dispatcher.
//!
//! Shaped after `mcubridge.transport.serial.SerialTransport.run`: one
//! task per connection attempt, reconnecting (by returning an error for
//! the supervisor to restart) on any transport failure, and raising
//! `SerialHandshakeFatal`-equivalent errors (here, `BridgeError::is_fatal`)
//! straight through to the caller so the supervisor terminates the
//! daemon instead of retrying.

use std::{sync::Arc, time::Duration, time::Instant};

use bridge_core::{
    flow::FlowController,
    handshake::{HandshakeAction, HandshakeEvent, HandshakeManager, SerialTimingWindow},
    link::{LinkState, LinkStateMachine},
    RuntimeState,
};
use bridge_crypto::SharedSecret;
use bridge_dispatch::{DispatchAction, Dispatcher};
use bridge_proto::frame::MAX_PAYLOAD;
use bridge_proto::Status;
use bridge_transport::{baud_request_payload, BaudNegotiator, DecodeFailure, NegotiationStep, SerialLink};
use bytes::Bytes;
use rand::RngCore;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{config::Config, errors::DaemonError};

/// A `WriteFrame` request originating from the MQTT side, handed to the
/// serial task through a channel instead of a shared link handle so the
/// dispatcher's async-trait components stay transport-free.
#[derive(Debug)]
pub struct OutboundFrameRequest {
    /// Command id to send to the MCU.
    pub command_id: u16,
    /// Frame payload, already encoded for the wire.
    pub payload: Bytes,
}

const TICK_INTERVAL: Duration = Duration::from_millis(50);

async fn execute_dispatch_actions(link: &SerialLink, state: &RuntimeState, actions: Vec<DispatchAction>) {
    for action in actions {
        match action {
            DispatchAction::WriteFrame { command_id, payload } => {
                if !link.write_frame(command_id, payload).await {
                    warn!(command_id, "failed to write dispatcher-originated frame");
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

/// The `CRC_MISMATCH` status frame to write back for a decode failure,
/// if it was a CRC mismatch specifically — the best-effort original
/// command id, or [`Status::UNKNOWN_COMMAND`] when the packet was too
/// short to carry one. Kept pure (no link access) so the mapping is
/// unit-testable without a real serial device.
fn crc_mismatch_reply(failure: &DecodeFailure) -> Option<(u16, Bytes)> {
    if !failure.crc_mismatch {
        return None;
    }
    let original = failure.original_command_id.unwrap_or(Status::UNKNOWN_COMMAND);
    Some((Status::CrcMismatch.to_u16(), Bytes::from(Status::payload(original, &[]))))
}

/// Count a dropped packet and, for a CRC mismatch, write the reply
/// [`crc_mismatch_reply`] produces.
async fn handle_decode_failure(link: &SerialLink, state: &RuntimeState, failure: DecodeFailure) {
    if failure.crc_mismatch {
        state.counters.record_crc_error();
    } else {
        state.counters.record_decode_error();
    }
    if let Some((command_id, payload)) = crc_mismatch_reply(&failure) {
        if !link.write_frame(command_id, payload).await {
            warn!("failed to write CRC_MISMATCH status frame");
        }
    }
}

async fn negotiate_baud(link: &mut SerialLink, port: &str, config: &Config) -> Result<SerialLink, DaemonError> {
    if config.serial_baud == config.serial_safe_baud {
        return Err(DaemonError::Config("negotiate_baud called with no baud change configured".to_string()));
    }

    let mut negotiator = BaudNegotiator::new(config.serial_baud, u32::from(config.serial_retry_attempts.max(1)));
    loop {
        negotiator.record_attempt();
        let _ = link.write_frame(bridge_proto::command::SET_BAUDRATE, baud_request_payload(negotiator.target_baud())).await;

        let wait = tokio::time::timeout(config.serial_response_timeout(), link.inbound.recv()).await;
        match wait {
            Ok(Some(Ok(frame))) if frame.command_id == bridge_proto::command::SET_BAUDRATE_RESP => {
                info!(target_baud = negotiator.target_baud(), "mcu confirmed baud switch, reopening port");
                return SerialLink::connect(port, negotiator.target_baud(), MAX_PAYLOAD).await.map_err(DaemonError::from);
            },
            Ok(Some(_)) | Ok(None) => {},
            Err(_timeout) => match negotiator.on_timeout() {
                NegotiationStep::Retry => continue,
                NegotiationStep::GiveUp => {
                    warn!(target_baud = negotiator.target_baud(), "baud negotiation failed, staying at safe baud");
                    return Err(DaemonError::Bridge(bridge_core::BridgeError::Transport {
                        reason: "baud negotiation exhausted its attempts".to_string(),
                    }));
                },
            },
        }
    }
}

struct HandshakeOutcome {
    synchronized: bool,
}

async fn run_handshake(
    link: &mut SerialLink,
    state: &RuntimeState,
    hm: &mut HandshakeManager<Instant>,
    timing: SerialTimingWindow,
    response_timeout: Duration,
) -> Result<HandshakeOutcome, DaemonError> {
    let now = Instant::now();
    state.counters.handshake_attempts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    for action in hm.start(timing, now) {
        execute_handshake_action(link, action).await;
    }

    loop {
        tokio::select! {
            frame = link.inbound.recv() => {
                let Some(frame) = frame else {
                    return Err(DaemonError::Bridge(bridge_core::BridgeError::Transport { reason: "serial link closed during handshake".to_string() }));
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(failure) => {
                        handle_decode_failure(link, state, failure).await;
                        continue;
                    },
                };
                let event = hm.on_frame(frame.command_id, &frame.payload, Instant::now());
                if let Some(outcome) = handle_handshake_event(link, state, hm, timing, response_timeout, event).await? {
                    return Ok(outcome);
                }
            },
            () = tokio::time::sleep(TICK_INTERVAL) => {
                let event = hm.tick(Instant::now());
                if let Some(outcome) = handle_handshake_event(link, state, hm, timing, response_timeout, event).await? {
                    return Ok(outcome);
                }
            },
        }
    }
}

async fn execute_handshake_action(link: &SerialLink, action: HandshakeAction) {
    let HandshakeAction::WriteFrame { command_id, payload } = action;
    let _ = link.write_frame(command_id, payload).await;
}

async fn handle_handshake_event(
    link: &mut SerialLink,
    state: &RuntimeState,
    hm: &mut HandshakeManager<Instant>,
    timing: SerialTimingWindow,
    response_timeout: Duration,
    event: HandshakeEvent,
) -> Result<Option<HandshakeOutcome>, DaemonError> {
    use std::sync::atomic::Ordering;

    match event {
        HandshakeEvent::ResetAcked => {
            let mut nonce = [0u8; bridge_crypto::NONCE_SIZE];
            rand::thread_rng().fill_bytes(&mut nonce);
            for action in hm.begin_sync(nonce, response_timeout, Instant::now()) {
                execute_handshake_action(link, action).await;
            }
            Ok(None)
        },
        HandshakeEvent::NeedsTimingFallback => {
            for action in hm.start_fallback(response_timeout, Instant::now()) {
                execute_handshake_action(link, action).await;
            }
            Ok(None)
        },
        HandshakeEvent::Synchronized => {
            state.counters.handshake_successes.fetch_add(1, Ordering::Relaxed);
            Ok(Some(HandshakeOutcome { synchronized: true }))
        },
        HandshakeEvent::Transient(error, actions) => {
            state.counters.handshake_failures.fetch_add(1, Ordering::Relaxed);
            warn!(%error, "handshake step failed, backing off before retry");
            for action in actions {
                execute_handshake_action(link, action).await;
            }
            tokio::time::sleep(hm.next_backoff()).await;
            for action in hm.start(timing, Instant::now()) {
                execute_handshake_action(link, action).await;
            }
            Ok(None)
        },
        HandshakeEvent::Fatal(error) => {
            state.counters.handshake_fatal.fetch_add(1, Ordering::Relaxed);
            let _ = state;
            let _ = link;
            Err(DaemonError::from(error))
        },
        HandshakeEvent::Ignored => Ok(None),
    }
}

/// Run one connection lifecycle: connect, negotiate, handshake, then
/// route frames until the link drops. Returns an error for the
/// supervisor to classify (fatal handshake failures terminate the
/// daemon; everything else triggers a reconnect after backoff).
pub async fn run(
    config: Arc<Config>,
    state: Arc<RuntimeState>,
    dispatcher: Arc<Dispatcher>,
    frame_rx: &mut mpsc::Receiver<OutboundFrameRequest>,
) -> Result<(), DaemonError> {
    let mut link_state = LinkStateMachine::new();
    link_state.transition(LinkState::Resetting)?;
    let mut link = SerialLink::connect(&config.serial_port, config.serial_safe_baud, MAX_PAYLOAD).await?;
    link_state.transition(LinkState::Connecting)?;

    if config.serial_baud != config.serial_safe_baud {
        link_state.transition(LinkState::Negotiating)?;
        match negotiate_baud(&mut link, &config.serial_port, &config).await {
            Ok(renegotiated) => link = renegotiated,
            Err(error) => warn!(%error, "continuing at safe baud after failed negotiation"),
        }
    }
    link_state.transition(LinkState::Connected)?;

    let secret = SharedSecret::new(config.serial_shared_secret.clone().into_bytes())?;
    let mut hm = HandshakeManager::new(secret, config.serial_handshake_fatal_failures, config.serial_retry_timeout(), config.serial_handshake_min_interval());
    let timing = SerialTimingWindow::clamped(config.serial_retry_timeout(), config.serial_response_timeout(), config.serial_retry_attempts);

    link_state.transition(LinkState::Handshaking)?;
    let outcome = run_handshake(&mut link, &state, &mut hm, timing, config.serial_response_timeout()).await?;
    if !outcome.synchronized {
        return Err(DaemonError::Bridge(bridge_core::BridgeError::Transport { reason: "handshake ended without synchronizing".to_string() }));
    }
    link_state.transition(LinkState::Running)?;
    state.set_link_synchronized(true);
    info!("serial link synchronized, dispatch now active");

    let mut flow = FlowController::<Instant>::new(config.serial_retry_timeout(), config.serial_response_timeout(), u32::from(config.serial_retry_attempts.max(1)));
    let mut tick = tokio::time::interval(TICK_INTERVAL);

    let result = loop {
        tokio::select! {
            frame = link.inbound.recv() => {
                let Some(frame) = frame else {
                    break Err(DaemonError::Bridge(bridge_core::BridgeError::Transport { reason: "serial link closed".to_string() }));
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(failure) => {
                        handle_decode_failure(&link, &state, failure).await;
                        continue;
                    },
                };
                flow.on_frame_received(frame.command_id, &frame.payload, Instant::now());
                match dispatcher.dispatch_mcu_frame(frame.command_id, &frame.payload).await {
                    Ok(actions) => execute_dispatch_actions(&link, &state, actions).await,
                    Err(error) => warn!(%error, command_id = frame.command_id, "dispatch of mcu frame failed"),
                }
            },
            Some(request) = frame_rx.recv() => {
                match flow.start_send(request.command_id, request.payload, Instant::now()) {
                    Ok((actions, outcome_rx)) => {
                        for action in actions {
                            let bridge_core::flow::FlowAction::WriteFrame { command_id, payload } = action;
                            if !link.write_frame(command_id, payload).await {
                                warn!(command_id, "failed to write mqtt-originated frame");
                            }
                        }
                        tokio::spawn(async move {
                            if let Ok(bridge_core::flow::FlowOutcome::Failure(error)) = outcome_rx.await {
                                warn!(%error, "mqtt-originated command did not complete");
                            }
                        });
                    },
                    Err(error) => warn!(%error, command_id = request.command_id, "could not start send, a command for this class is already in flight"),
                }
            },
            _ = tick.tick() => {
                for action in flow.tick(Instant::now()) {
                    let bridge_core::flow::FlowAction::WriteFrame { command_id, payload } = action;
                    let _ = link.write_frame(command_id, payload).await;
                }
            },
        }
    };

    state.set_link_synchronized(false);
    flow.reset();
    link.close();
    result
}
