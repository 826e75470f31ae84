//! Sending [`Transmit`]s one system call per datagram or one per batch
use std::{fmt::Debug, io, net::SocketAddr};

use tracing::debug;

use crate::{
    cmsg::{self, ControlBuffer, SEGMENT_SPACE},
    Classification, ErrorCode, InvalidSegmentSize, OffloadState, SegmentSize, TransmitError,
    UdpSockRef,
};

#[cfg(unix)]
#[path = "unix.rs"]
mod imp;

// No control message support
#[cfg(not(unix))]
#[path = "fallback.rs"]
mod imp;

/// Number of UDP packets to send at a time when using sendmmsg
pub const BATCH_SIZE: usize = imp::BATCH_SIZE;

/// An outgoing datagram, or a buffer to be segmented into several
#[derive(Debug, Clone, Copy)]
pub struct Transmit<'a> {
    destination: SocketAddr,
    contents: &'a [u8],
    segment_size: Option<SegmentSize>,
}

impl<'a> Transmit<'a> {
    /// A single datagram carrying `contents`
    pub fn new(destination: SocketAddr, contents: &'a [u8]) -> Self {
        Self {
            destination,
            contents,
            segment_size: None,
        }
    }

    /// Asks for `contents` to be cut into datagrams of `size` bytes each
    ///
    /// The last datagram may be shorter. `size` must lie within `1..=65535`, be no larger than
    /// the payload, and not produce more than [`MAX_SEGMENTS`](crate::MAX_SEGMENTS) datagrams.
    /// Whether the kernel actually segments depends on the [`OffloadState`] at send time.
    pub fn with_segment_size(self, size: usize) -> Result<Self, InvalidSegmentSize> {
        let size = SegmentSize::new(size)?;
        size.check_payload(self.contents.len())?;
        Ok(Self {
            segment_size: Some(size),
            ..self
        })
    }

    /// The destination address
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// The payload
    pub fn contents(&self) -> &'a [u8] {
        self.contents
    }

    /// The requested segment size, if any
    pub fn segment_size(&self) -> Option<SegmentSize> {
        self.segment_size
    }
}

/// Result of sending one [`Transmit`]
#[derive(Debug)]
pub struct TransmitResult {
    /// Payload bytes accepted by the kernel
    pub bytes_sent: usize,
    /// Control message bytes attached to the send
    pub ancillary_bytes_sent: usize,
    /// Why the transmit failed, if it did
    pub error: Option<TransmitError>,
}

impl TransmitResult {
    fn sent(bytes_sent: usize, control: &ControlBuffer) -> Self {
        Self {
            bytes_sent,
            ancillary_bytes_sent: control.len(),
            error: None,
        }
    }

    fn failed(error: TransmitError) -> Self {
        Self {
            bytes_sent: 0,
            ancillary_bytes_sent: 0,
            error: Some(error),
        }
    }

    /// Whether the datagram was handed to the kernel
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the send should be retried once the socket is writable again
    pub(crate) fn is_retryable(&self) -> bool {
        match &self.error {
            Some(TransmitError::NotAccepted) => true,
            Some(err) => err.would_block(),
            None => false,
        }
    }
}

/// The kernel accepted fewer messages of a batch than were submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountMismatch {
    /// Messages handed to the send call
    pub submitted: usize,
    /// Messages the kernel reported as sent
    pub accepted: usize,
}

/// Per-request results of a send call, in request order
#[derive(Debug)]
pub struct SendOutcome {
    /// One result per submitted [`Transmit`]
    pub results: Vec<TransmitResult>,
    /// Set if a batch send call accepted only part of its messages
    pub count_mismatch: Option<CountMismatch>,
}

impl SendOutcome {
    /// Total payload bytes accepted by the kernel
    pub fn bytes_sent(&self) -> usize {
        self.results.iter().map(|r| r.bytes_sent).sum()
    }
}

/// A strategy for handing [`Transmit`]s to the kernel
///
/// Implementations must be interchangeable: given the same requests and [`OffloadState`], each
/// attaches the same segmentation descriptors and reports results in request order.
pub trait Transmitter: Send + Sync + Debug {
    /// Sends `transmits` on `socket`, consulting and updating `state`
    fn send(
        &self,
        socket: UdpSockRef<'_>,
        state: &OffloadState,
        transmits: &[Transmit<'_>],
    ) -> SendOutcome;
}

/// Transmitter issuing one `sendmsg` per request
#[derive(Debug, Clone, Copy)]
pub struct SingleTransmitter {
    control_capacity: usize,
}

impl SingleTransmitter {
    /// A transmitter with room for one segmentation record per request
    pub fn new() -> Self {
        Self {
            control_capacity: SEGMENT_SPACE,
        }
    }

    /// Sets the control buffer capacity allocated per request
    ///
    /// Capacities below [`SEGMENT_SPACE`] leave no room for the segmentation record, so sends go
    /// out unsegmented.
    pub fn with_control_capacity(self, bytes: usize) -> Self {
        Self {
            control_capacity: bytes,
        }
    }
}

impl Default for SingleTransmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Transmitter for SingleTransmitter {
    fn send(
        &self,
        socket: UdpSockRef<'_>,
        state: &OffloadState,
        transmits: &[Transmit<'_>],
    ) -> SendOutcome {
        let results = transmits
            .iter()
            .map(|transmit| {
                // Consulted per request, so a failure disables segmentation for the rest
                let mut control = ControlBuffer::with_capacity(self.control_capacity);
                let segmented = attach_segmentation(state, transmit, &mut control);
                match imp::send(&socket.0, transmit, &control) {
                    Ok(n) => TransmitResult::sent(n, &control),
                    Err(e) => TransmitResult::failed(handle_error(state, transmit, segmented, e)),
                }
            })
            .collect();
        SendOutcome {
            results,
            count_mismatch: None,
        }
    }
}

/// Transmitter handing up to [`BATCH_SIZE`] requests to one `sendmmsg`
///
/// Longer sequences are split into consecutive batches. If the kernel accepts only part of a
/// batch, the remaining requests are reported as [`TransmitError::NotAccepted`] and
/// [`SendOutcome::count_mismatch`] is set. On platforms without `sendmmsg` [`BATCH_SIZE`] is 1,
/// so every request gets its own `sendmsg` call.
#[derive(Debug, Clone, Copy)]
pub struct BatchTransmitter {
    control_capacity: usize,
    batch_size: usize,
}

impl BatchTransmitter {
    /// A transmitter sending [`BATCH_SIZE`] messages per call
    pub fn new() -> Self {
        Self {
            control_capacity: SEGMENT_SPACE,
            batch_size: BATCH_SIZE,
        }
    }

    /// Whether batches go out in a single system call on this platform
    pub const fn is_vectorized() -> bool {
        cfg!(mmsg)
    }

    /// Sets the control buffer capacity allocated per request
    pub fn with_control_capacity(self, bytes: usize) -> Self {
        Self {
            control_capacity: bytes,
            ..self
        }
    }

    /// Limits the number of messages per system call, clamped to `1..=BATCH_SIZE`
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.clamp(1, BATCH_SIZE),
            ..self
        }
    }
}

impl Default for BatchTransmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Transmitter for BatchTransmitter {
    fn send(
        &self,
        socket: UdpSockRef<'_>,
        state: &OffloadState,
        transmits: &[Transmit<'_>],
    ) -> SendOutcome {
        let mut results = Vec::with_capacity(transmits.len());
        let mut count_mismatch = None;
        let mut sent = [0usize; BATCH_SIZE];

        for batch in transmits.chunks(self.batch_size) {
            let controls = batch
                .iter()
                .map(|transmit| {
                    let mut control = ControlBuffer::with_capacity(self.control_capacity);
                    attach_segmentation(state, transmit, &mut control);
                    control
                })
                .collect::<Vec<_>>();

            let accepted = match imp::send_batch(&socket.0, batch, &controls, &mut sent) {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Control buffers only ever carry the segmentation record
                    let segmented = !controls[0].is_empty();
                    let err = handle_error(state, &batch[0], segmented, e);
                    results.push(TransmitResult::failed(err));
                    0
                }
            };
            for (control, &n) in controls.iter().zip(&sent).take(accepted) {
                results.push(TransmitResult::sent(n, control));
            }

            if accepted < batch.len() {
                debug!(
                    submitted = batch.len(),
                    accepted, "unexpected number of messages sent"
                );
                count_mismatch = Some(CountMismatch {
                    submitted: batch.len(),
                    accepted,
                });
                break;
            }
        }

        // The kernel stopped before reaching these
        results.resize_with(transmits.len(), || {
            TransmitResult::failed(TransmitError::NotAccepted)
        });
        SendOutcome {
            results,
            count_mismatch,
        }
    }
}

/// The batch transmitter where `sendmmsg` exists, the single one elsewhere
pub fn default_transmitter() -> Box<dyn Transmitter> {
    if BatchTransmitter::is_vectorized() {
        Box::new(BatchTransmitter::new())
    } else {
        Box::new(SingleTransmitter::new())
    }
}

/// Appends the segmentation descriptor for `transmit` to `control` if `state` allows it
///
/// The descriptor is attached only while segmentation is enabled, when the request asks for a
/// segment size, and when `control` has room for it. Returns whether it was attached.
pub fn attach_segmentation(
    state: &OffloadState,
    transmit: &Transmit<'_>,
    control: &mut ControlBuffer,
) -> bool {
    match transmit.segment_size {
        Some(size) if state.segmentation_enabled() => cmsg::set_segment_size(control, size),
        _ => false,
    }
}

/// Turns a send failure into a [`TransmitError`], disabling segmentation if it proves the device
/// can't segment
///
/// Only a send that carried a segmentation record can prove that, so errors on `!segmented`
/// sends are always treated as transient.
fn handle_error(
    state: &OffloadState,
    transmit: &Transmit<'_>,
    segmented: bool,
    e: io::Error,
) -> TransmitError {
    let err = TransmitError::from(e);
    // Some network adapters and drivers do not support GSO. Unfortunately, Linux offers no easy
    // way for us to detect this short of an EIO when we try to actually send datagrams using it.
    // Transmits already prepared with a descriptor may fail the same way; disabling is idempotent.
    let class = match segmented {
        true => state.record_failure(&err),
        false => Classification::Transient,
    };
    if class == Classification::Transient {
        match err.code() {
            // - WouldBlock and Interrupted are flow control, not failures.
            // - EMSGSIZE is expected for MTU probes.
            Some(ErrorCode::WouldBlock | ErrorCode::Interrupted | ErrorCode::MessageTooLarge) => {}
            _ => state.log_send_error(&err, transmit),
        }
    }
    err
}
