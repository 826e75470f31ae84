use std::{ffi::c_int, io};

use tracing::debug;

use crate::{
    platform::{self, SockOpt},
    UdpSockRef,
};

/// Offload features a socket's kernel supports
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySnapshot {
    /// The kernel accepts `UDP_SEGMENT` and can segment outgoing buffers (GSO)
    pub can_segment_on_send: bool,
    /// The kernel knows `UDP_GRO` and can coalesce incoming datagrams (GRO)
    ///
    /// This reports support for the option, not whether coalescing is switched on for the
    /// socket. The probe never enables it.
    pub can_aggregate_on_receive: bool,
}

/// Queries `socket` for send segmentation and receive aggregation support
///
/// Each feature is probed independently with `getsockopt`, leaving the socket untouched. A
/// failing query reports the feature as absent instead of returning an error, and on platforms
/// without these options nothing is queried and both features are `false`.
pub fn probe(socket: UdpSockRef<'_>) -> CapabilitySnapshot {
    let supported = |opt: Option<SockOpt>| opt.is_some_and(|opt| query(&socket, opt).is_ok());
    let caps = CapabilitySnapshot {
        can_segment_on_send: supported(platform::SEGMENT),
        can_aggregate_on_receive: supported(platform::GRO),
    };
    debug!(
        gso = caps.can_segment_on_send,
        gro = caps.can_aggregate_on_receive,
        "probed UDP offload support"
    );
    caps
}

#[cfg(unix)]
fn query(socket: &UdpSockRef<'_>, opt: SockOpt) -> io::Result<c_int> {
    use std::{mem, os::unix::io::AsRawFd};

    let mut value: c_int = 0;
    let mut len = mem::size_of_val(&value) as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            socket.0.as_raw_fd(),
            opt.level,
            opt.name,
            &mut value as *mut _ as _,
            &mut len,
        )
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(value)
}

#[cfg(not(unix))]
fn query(_socket: &UdpSockRef<'_>, _opt: SockOpt) -> io::Result<c_int> {
    Err(io::ErrorKind::Unsupported.into())
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;

    use super::*;

    #[test]
    fn probe_is_idempotent() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let first = probe((&socket).into());
        let second = probe((&socket).into());
        assert_eq!(first, second);
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn no_offload_off_linux() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        assert_eq!(probe((&socket).into()), CapabilitySnapshot::default());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn probe_does_not_enable_gro() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let caps = probe((&socket).into());
        if caps.can_aggregate_on_receive {
            let gro = platform::GRO.unwrap();
            let sock = UdpSockRef::from(&socket);
            assert_eq!(query(&sock, gro).unwrap(), 0);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_query_reports_absence() {
        // UDP_SEGMENT is not a valid option on TCP sockets
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        assert_eq!(probe((&listener).into()), CapabilitySnapshot::default());
    }
}
