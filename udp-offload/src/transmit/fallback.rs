use std::io;

use socket2::{SockAddr, Socket};

use super::Transmit;
use crate::cmsg::ControlBuffer;

pub(super) const BATCH_SIZE: usize = 1;

// Control messages are never encoded here: the platform table has no segmentation option, so
// `control` is always empty.
pub(super) fn send(
    io: &Socket,
    transmit: &Transmit<'_>,
    _control: &ControlBuffer,
) -> io::Result<usize> {
    io.send_to(transmit.contents(), &SockAddr::from(transmit.destination()))
}

/// Sends the only message of a batch, as chunks never exceed [`BATCH_SIZE`]
pub(super) fn send_batch(
    io: &Socket,
    transmits: &[Transmit<'_>],
    controls: &[ControlBuffer],
    sent: &mut [usize],
) -> io::Result<usize> {
    sent[0] = send(io, &transmits[0], &controls[0])?;
    Ok(1)
}
