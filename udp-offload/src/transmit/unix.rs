use std::{io, mem, os::unix::io::AsRawFd, ptr};

use socket2::{SockAddr, Socket};

use super::Transmit;
use crate::cmsg::ControlBuffer;

#[cfg(mmsg)]
// Chosen somewhat arbitrarily; might benefit from additional tuning.
pub(super) const BATCH_SIZE: usize = 32;

#[cfg(not(mmsg))]
pub(super) const BATCH_SIZE: usize = 1;

pub(super) fn send(
    io: &Socket,
    transmit: &Transmit<'_>,
    control: &ControlBuffer,
) -> io::Result<usize> {
    let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
    let mut iov: libc::iovec = unsafe { mem::zeroed() };
    let dst_addr = SockAddr::from(transmit.destination());
    prepare_msg(transmit, &dst_addr, &mut hdr, &mut iov, control);

    loop {
        let n = unsafe { libc::sendmsg(io.as_raw_fd(), &hdr, 0) };
        if n == -1 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                // Retry the transmission
                continue;
            }
            return Err(e);
        }
        return Ok(n as usize);
    }
}

/// Sends `transmits` with a single `sendmmsg`, storing each accepted message's length in `sent`
///
/// Returns the number of messages the kernel accepted. As with `sendmmsg` itself, an error is
/// only returned if not even the first message could be sent.
#[cfg(mmsg)]
pub(super) fn send_batch(
    io: &Socket,
    transmits: &[Transmit<'_>],
    controls: &[ControlBuffer],
    sent: &mut [usize],
) -> io::Result<usize> {
    let count = transmits.len().min(BATCH_SIZE);
    let mut msgs: [libc::mmsghdr; BATCH_SIZE] = unsafe { mem::zeroed() };
    let mut iovecs: [libc::iovec; BATCH_SIZE] = unsafe { mem::zeroed() };
    let addrs = transmits[..count]
        .iter()
        .map(|transmit| SockAddr::from(transmit.destination()))
        .collect::<Vec<_>>();
    for i in 0..count {
        prepare_msg(
            &transmits[i],
            &addrs[i],
            &mut msgs[i].msg_hdr,
            &mut iovecs[i],
            &controls[i],
        );
    }

    loop {
        let n = unsafe { libc::sendmmsg(io.as_raw_fd(), msgs.as_mut_ptr(), count as _, 0) };
        if n == -1 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }
        let n = n as usize;
        for (len, msg) in sent.iter_mut().zip(&msgs).take(n) {
            *len = msg.msg_len as usize;
        }
        return Ok(n);
    }
}

/// Sends the only message of a batch with `sendmsg`, as chunks never exceed [`BATCH_SIZE`]
#[cfg(not(mmsg))]
pub(super) fn send_batch(
    io: &Socket,
    transmits: &[Transmit<'_>],
    controls: &[ControlBuffer],
    sent: &mut [usize],
) -> io::Result<usize> {
    sent[0] = send(io, &transmits[0], &controls[0])?;
    Ok(1)
}

fn prepare_msg(
    transmit: &Transmit<'_>,
    dst_addr: &SockAddr,
    hdr: &mut libc::msghdr,
    iov: &mut libc::iovec,
    control: &ControlBuffer,
) {
    iov.iov_base = transmit.contents().as_ptr() as *const _ as *mut _;
    iov.iov_len = transmit.contents().len();

    // SAFETY: Casting the pointer to a mutable one is legal,
    // as sendmsg is guaranteed to not alter the mutable pointer
    // as per POSIX. See the section on the sys/socket.h
    // header for details. The type is only mutable in the first
    // place because it is reused by recvmsg as well.
    let name = dst_addr.as_ptr() as *mut libc::c_void;
    let namelen = dst_addr.len();
    hdr.msg_name = name as *mut _;
    hdr.msg_namelen = namelen;
    hdr.msg_iov = iov;
    hdr.msg_iovlen = 1;

    if control.is_empty() {
        // netbsd is particular about this being a NULL pointer if there are no control
        // messages.
        hdr.msg_control = ptr::null_mut();
        hdr.msg_controllen = 0;
    } else {
        hdr.msg_control = control.as_ptr() as *mut _;
        hdr.msg_controllen = control.len() as _;
    }
}
