//! Owns the serial device: open, DTR-toggle reset, background reader
//! feeding the framer, and a gated frame writer.
//!
//! Shaped like the teacher's `ConnectedClient`: channels bridge the
//! caller to a background task that owns the actual I/O handle, so
//! protocol logic (in `bridge-core`) never touches the device directly.

use std::time::Duration;

use bridge_proto::{Frame, Framer};
use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::{mpsc, oneshot},
};
use tokio_serial::{SerialPort, SerialPortBuilderExt};
use tracing::{debug, info, warn};

use crate::{errors::TransportError, gate::WriteGate};

const DTR_DEASSERT_DURATION: Duration = Duration::from_millis(100);
const DTR_ASSERT_DURATION: Duration = Duration::from_millis(100);
const DTR_SETTLE_DURATION: Duration = Duration::from_secs(2);

/// One inbound frame handed to the caller.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Command or status id.
    pub command_id: u16,
    /// Decoded payload.
    pub payload: Bytes,
}

/// A packet the framer delivered that failed to parse as a [`Frame`].
///
/// Surfaced instead of silently dropped so the caller can count it and,
/// for a CRC mismatch specifically, write a `CRC_MISMATCH` status frame
/// back with the best-effort original command id.
#[derive(Debug, Clone)]
pub struct DecodeFailure {
    /// Command id read from the header, if the packet was long enough to
    /// carry one — the header precedes the CRC trailer, so this is still
    /// readable even when the CRC itself doesn't check out.
    pub original_command_id: Option<u16>,
    /// True if parsing failed specifically on [`bridge_proto::FrameError::CrcMismatch`],
    /// as opposed to a structural malformation.
    pub crc_mismatch: bool,
}

struct OutboundRequest {
    command_id: u16,
    payload: Bytes,
    result: oneshot::Sender<bool>,
}

/// Handle to a live serial connection. Dropping it stops the background
/// I/O task.
pub struct SerialLink {
    outbound: mpsc::Sender<OutboundRequest>,
    /// Decoded frames received from the MCU, in arrival order. A packet
    /// that failed to parse is surfaced as `Err` rather than dropped.
    pub inbound: mpsc::Receiver<Result<InboundFrame, DecodeFailure>>,
    gate: WriteGate,
    task: tokio::task::JoinHandle<()>,
}

impl SerialLink {
    /// Open `port` at `baud`, perform the DTR-toggle hardware reset, then
    /// start the background reader/writer task.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] if the device cannot be opened.
    pub async fn connect(port: &str, baud: u32, max_payload: usize) -> Result<Self, TransportError> {
        let mut stream = tokio_serial::new(port, baud)
            .open_native_async()
            .map_err(|source| TransportError::Open { port: port.to_string(), source: source.into() })?;

        reset_via_dtr(&mut stream).await?;

        let (outbound_tx, outbound_rx) = mpsc::channel(32);
        let (inbound_tx, inbound_rx) = mpsc::channel(32);
        let gate = WriteGate::new();

        let task = tokio::spawn(run_link(stream, outbound_rx, inbound_tx, gate.clone(), max_payload));

        Ok(Self { outbound: outbound_tx, inbound: inbound_rx, gate, task })
    }

    /// Build, COBS-encode, and write one frame, honoring the XOFF/XON
    /// gate. Returns `false` if the link is gone or the write failed.
    pub async fn write_frame(&self, command_id: u16, payload: Bytes) -> bool {
        let (result_tx, result_rx) = oneshot::channel();
        if self.outbound.send(OutboundRequest { command_id, payload, result: result_tx }).await.is_err() {
            return false;
        }
        result_rx.await.unwrap_or(false)
    }

    /// Whether the write gate is currently open (no pending XOFF).
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.gate.is_open()
    }

    /// Stop the background task and release the device.
    pub fn close(self) {
        self.task.abort();
    }
}

async fn reset_via_dtr(stream: &mut tokio_serial::SerialStream) -> Result<(), TransportError> {
    stream.write_data_terminal_ready(false).map_err(|source| TransportError::Io(source.into()))?;
    tokio::time::sleep(DTR_DEASSERT_DURATION).await;
    stream.write_data_terminal_ready(true).map_err(|source| TransportError::Io(source.into()))?;
    tokio::time::sleep(DTR_ASSERT_DURATION).await;
    tokio::time::sleep(DTR_SETTLE_DURATION).await;
    Ok(())
}

async fn run_link(
    mut stream: tokio_serial::SerialStream,
    mut outbound: mpsc::Receiver<OutboundRequest>,
    inbound: mpsc::Sender<Result<InboundFrame, DecodeFailure>>,
    gate: WriteGate,
    max_payload: usize,
) {
    let mut framer = Framer::new(max_payload);
    let mut read_buf = [0u8; 512];

    loop {
        tokio::select! {
            read_result = stream.read(&mut read_buf) => {
                match read_result {
                    Ok(0) => {
                        info!("serial device closed (EOF)");
                        break;
                    },
                    Ok(n) => {
                        for packet in framer.feed(&read_buf[..n]) {
                            let event = match Frame::parse(&packet) {
                                Ok(frame) => Ok(InboundFrame { command_id: frame.command_id, payload: frame.payload }),
                                Err(error) => {
                                    debug!(%error, "dropping malformed frame");
                                    let original_command_id = (packet.len() >= bridge_proto::HEADER_SIZE)
                                        .then(|| u16::from_be_bytes([packet[3], packet[4]]));
                                    let crc_mismatch = matches!(error, bridge_proto::FrameError::CrcMismatch { .. });
                                    Err(DecodeFailure { original_command_id, crc_mismatch })
                                },
                            };
                            if inbound.send(event).await.is_err() {
                                return;
                            }
                        }
                    },
                    Err(error) => {
                        warn!(%error, "serial read failed");
                        break;
                    },
                }
            },
            Some(request) = outbound.recv() => {
                gate.wait_until_open().await;
                let sent = write_one_frame(&mut stream, request.command_id, &request.payload, max_payload).await;
                let _ = request.result.send(sent);
            },
            else => break,
        }
    }
}

async fn write_one_frame(stream: &mut tokio_serial::SerialStream, command_id: u16, payload: &[u8], max_payload: usize) -> bool {
    let Ok(raw) = Frame::build(command_id, Bytes::copy_from_slice(payload), max_payload) else {
        warn!(command_id, "refusing to write oversize frame");
        return false;
    };
    let encoded = bridge_proto::cobs::encode(&raw);
    match stream.write_all(&encoded).await {
        Ok(()) => true,
        Err(error) => {
            warn!(%error, "serial write failed");
            false
        },
    }
}
