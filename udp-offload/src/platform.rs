//! Platform-defined constants for segmentation offload
//!
//! Everything the rest of the crate needs to know about the host kernel lives in this table:
//! the socket option pairs that name the offload features, the errno signalling that a device
//! cannot segment, and the layout parameters of a control message header. Porting to another
//! target means providing another `offload` module.

use std::ffi::c_int;

use crate::error::ErrorCode;

/// A `(level, name)` pair as used by `getsockopt` and by control message headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SockOpt {
    pub(crate) level: c_int,
    pub(crate) name: c_int,
}

#[cfg(target_os = "linux")]
mod offload {
    use super::*;

    /// Per-datagram segment size, as a socket option and as a control message
    pub(crate) const SEGMENT: Option<SockOpt> = Some(SockOpt {
        level: libc::SOL_UDP,
        name: libc::UDP_SEGMENT,
    });

    /// Receive-side coalescing
    pub(crate) const GRO: Option<SockOpt> = Some(SockOpt {
        level: libc::SOL_UDP,
        name: libc::UDP_GRO,
    });

    // EIO is returned by udp_send_skb() if the device driver does not have tx checksumming
    // enabled, which is a hard requirement of UDP_SEGMENT. See udp(7) and net/ipv4/udp.c.
    pub(crate) const OFFLOAD_UNSUPPORTED: Option<ErrorCode> = Some(ErrorCode::Io);
}

#[cfg(not(target_os = "linux"))]
mod offload {
    use super::*;

    pub(crate) const SEGMENT: Option<SockOpt> = None;
    pub(crate) const GRO: Option<SockOpt> = None;
    pub(crate) const OFFLOAD_UNSUPPORTED: Option<ErrorCode> = None;
}

pub(crate) use offload::*;

/// Width in bytes of the `cmsg_len` field that starts every control message header
#[cfg(any(apple, not(any(unix, windows))))]
pub(crate) const CMSG_LEN_WIDTH: usize = std::mem::size_of::<u32>();
/// Width in bytes of the `cmsg_len` field that starts every control message header
#[cfg(all(unix, not(apple), not(any(target_os = "linux", target_os = "android"))))]
pub(crate) const CMSG_LEN_WIDTH: usize = std::mem::size_of::<u32>();
/// Width in bytes of the `cmsg_len` field that starts every control message header
#[cfg(any(target_os = "linux", target_os = "android", windows))]
pub(crate) const CMSG_LEN_WIDTH: usize = std::mem::size_of::<usize>();

/// Alignment of control message headers and payloads
#[cfg(apple)]
pub(crate) const CMSG_ALIGN: usize = std::mem::size_of::<u32>();
/// Alignment of control message headers and payloads
#[cfg(not(apple))]
pub(crate) const CMSG_ALIGN: usize = std::mem::size_of::<usize>();

/// Maps a raw OS error number onto the closed [`ErrorCode`] set
#[cfg(unix)]
pub(crate) fn error_code(raw: i32) -> ErrorCode {
    match raw {
        libc::EIO => ErrorCode::Io,
        libc::ENOBUFS => ErrorCode::NoBufferSpace,
        libc::EINTR => ErrorCode::Interrupted,
        libc::EMSGSIZE => ErrorCode::MessageTooLarge,
        libc::EINVAL => ErrorCode::InvalidInput,
        libc::EPERM | libc::EACCES => ErrorCode::PermissionDenied,
        libc::ENETUNREACH | libc::EHOSTUNREACH => ErrorCode::Unreachable,
        libc::ECONNREFUSED => ErrorCode::ConnectionRefused,
        // EWOULDBLOCK is an alias of EAGAIN on most but not all targets
        code if code == libc::EAGAIN || code == libc::EWOULDBLOCK => ErrorCode::WouldBlock,
        code => ErrorCode::Os(code),
    }
}

/// Maps a raw OS error number onto the closed [`ErrorCode`] set
#[cfg(not(unix))]
pub(crate) fn error_code(raw: i32) -> ErrorCode {
    use std::io::ErrorKind;

    match std::io::Error::from_raw_os_error(raw).kind() {
        ErrorKind::WouldBlock => ErrorCode::WouldBlock,
        ErrorKind::Interrupted => ErrorCode::Interrupted,
        ErrorKind::InvalidInput => ErrorCode::InvalidInput,
        ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
        ErrorKind::ConnectionRefused => ErrorCode::ConnectionRefused,
        _ => ErrorCode::Os(raw),
    }
}
