//! UDP segmentation offload for datagram transmitters
//!
//! Linux can accept one large buffer on a UDP socket and carve it into several wire-sized
//! datagrams itself ("generic segmentation offload", GSO), saving a system call per datagram.
//! This crate covers the send side of that feature for an already-bound socket owned by the
//! caller:
//!
//! - [`probe`] asks the kernel whether a socket supports send segmentation and receive
//!   aggregation, yielding a [`CapabilitySnapshot`].
//! - [`OffloadState`] remembers whether segmentation descriptors should be attached to future
//!   sends, and switches segmentation off for good when the device turns out not to honor it.
//! - [`SingleTransmitter`] and [`BatchTransmitter`] send [`Transmit`] requests through
//!   `sendmsg` and `sendmmsg` respectively, attaching the `UDP_SEGMENT` control message when
//!   the state allows it.
//!
//! ```no_run
//! use std::net::UdpSocket;
//! use udp_offload::{default_transmitter, probe, OffloadState, Transmit};
//!
//! let socket = UdpSocket::bind("127.0.0.1:0")?;
//! let state = OffloadState::probed(probe((&socket).into()));
//! let payload = [0u8; 4000];
//! let transmit = Transmit::new("127.0.0.1:4433".parse().unwrap(), &payload)
//!     .with_segment_size(1200)?;
//! let outcome = default_transmitter().send((&socket).into(), &state, &[transmit]);
//! println!("{} bytes sent", outcome.bytes_sent());
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(clippy::use_self)]

use std::time::Duration;

pub mod cmsg;
mod error;
mod platform;
mod probe;
#[cfg(feature = "runtime-tokio")]
pub mod runtime;
mod segment;
mod state;
mod transmit;

pub use crate::error::{classify, Classification, ErrorCode, TransmitError};
pub use crate::probe::{probe, CapabilitySnapshot};
pub use crate::segment::{InvalidSegmentSize, SegmentSize, MAX_SEGMENTS};
pub use crate::state::{OffloadMode, OffloadState};
pub use crate::transmit::{
    attach_segmentation, default_transmitter, BatchTransmitter, CountMismatch, SendOutcome,
    SingleTransmitter, Transmit, TransmitResult, Transmitter, BATCH_SIZE,
};

/// A borrowed UDP socket
///
/// On Unix, constructible via `From<T: AsFd>`. On Windows, constructible via `From<T: AsSocket>`.
// Wrapper around socket2 to avoid making it a public dependency and incurring stability risk
pub struct UdpSockRef<'a>(socket2::SockRef<'a>);

#[cfg(unix)]
impl<'s, S> From<&'s S> for UdpSockRef<'s>
where
    S: std::os::fd::AsFd,
{
    fn from(socket: &'s S) -> Self {
        Self(socket.into())
    }
}

#[cfg(windows)]
impl<'s, S> From<&'s S> for UdpSockRef<'s>
where
    S: std::os::windows::io::AsSocket,
{
    fn from(socket: &'s S) -> Self {
        Self(socket.into())
    }
}

/// Log at most 1 IO error per minute
const IO_ERROR_LOG_INTERVAL: Duration = std::time::Duration::from_secs(60);
