use std::io;

use thiserror::Error;

use crate::platform;

/// Closed set of transmit error codes the crate distinguishes
///
/// Raw OS error numbers are folded into these variants once, when the error is produced, so
/// classification never has to inspect an [`io::Error`] at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `EIO`: generic I/O failure reported by the network stack
    Io,
    /// `ENOBUFS`: the send queue or device queue is full
    NoBufferSpace,
    /// `EAGAIN`/`EWOULDBLOCK`: the socket is non-blocking and not writable
    WouldBlock,
    /// `EINTR`
    Interrupted,
    /// `EMSGSIZE`: the datagram exceeds the path or device MTU
    MessageTooLarge,
    /// `EINVAL`
    InvalidInput,
    /// `EPERM`/`EACCES`, e.g. due to firewall rules
    PermissionDenied,
    /// `ENETUNREACH`/`EHOSTUNREACH`
    Unreachable,
    /// `ECONNREFUSED`, reported for an earlier datagram on connected sockets
    ConnectionRefused,
    /// Any other OS error, by raw value
    Os(i32),
    /// The error did not originate from the OS
    Unknown,
}

impl ErrorCode {
    /// Classifies `err` by its raw OS error, falling back to its kind
    pub fn from_io(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(raw) => platform::error_code(raw),
            None => match err.kind() {
                io::ErrorKind::WouldBlock => Self::WouldBlock,
                io::ErrorKind::Interrupted => Self::Interrupted,
                _ => Self::Unknown,
            },
        }
    }
}

/// Outcome of inspecting a transmit error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// A local or temporary failure; segmentation stays as it is
    Transient,
    /// The device cannot segment datagrams; segmentation must be disabled for the transport
    FatalOffloadUnsupported,
}

/// Determines whether `code` proves that the device cannot honor segmentation offload
///
/// Only the platform's dedicated error code is fatal. Everything else, including `ENOBUFS` and
/// `EAGAIN`, is transient.
pub fn classify(code: ErrorCode) -> Classification {
    match platform::OFFLOAD_UNSUPPORTED {
        Some(fatal) if fatal == code => Classification::FatalOffloadUnsupported,
        _ => Classification::Transient,
    }
}

/// Errors reported for an individual [`Transmit`](crate::Transmit)
#[derive(Debug, Error)]
pub enum TransmitError {
    /// The send system call failed
    #[error("transmit failed ({code:?}): {source}")]
    Io {
        /// Classified error code
        code: ErrorCode,
        /// Error returned by the OS
        #[source]
        source: io::Error,
    },
    /// The datagram was part of a batch but the kernel stopped accepting before reaching it
    #[error("datagram was not accepted by the kernel")]
    NotAccepted,
}

impl TransmitError {
    /// The classified error code, if the error came from a system call
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Io { code, .. } => Some(*code),
            Self::NotAccepted => None,
        }
    }

    /// Classifies this error; see [`classify`]
    pub fn classify(&self) -> Classification {
        self.code().map_or(Classification::Transient, classify)
    }

    pub(crate) fn would_block(&self) -> bool {
        self.code() == Some(ErrorCode::WouldBlock)
    }
}

impl From<io::Error> for TransmitError {
    fn from(source: io::Error) -> Self {
        Self::Io {
            code: ErrorCode::from_io(&source),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_from_kind() {
        let err = io::Error::new(io::ErrorKind::WouldBlock, "busy");
        assert_eq!(ErrorCode::from_io(&err), ErrorCode::WouldBlock);
        let err = io::Error::new(io::ErrorKind::Other, "synthetic");
        assert_eq!(ErrorCode::from_io(&err), ErrorCode::Unknown);
    }

    #[cfg(unix)]
    #[test]
    fn codes_from_errno() {
        let cases = [
            (libc::EIO, ErrorCode::Io),
            (libc::ENOBUFS, ErrorCode::NoBufferSpace),
            (libc::EAGAIN, ErrorCode::WouldBlock),
            (libc::EWOULDBLOCK, ErrorCode::WouldBlock),
            (libc::EINTR, ErrorCode::Interrupted),
            (libc::EMSGSIZE, ErrorCode::MessageTooLarge),
            (libc::EINVAL, ErrorCode::InvalidInput),
            (libc::EACCES, ErrorCode::PermissionDenied),
            (libc::EHOSTUNREACH, ErrorCode::Unreachable),
            (libc::ENOENT, ErrorCode::Os(libc::ENOENT)),
        ];
        for (raw, code) in cases {
            assert_eq!(
                ErrorCode::from_io(&io::Error::from_raw_os_error(raw)),
                code,
                "errno {raw}"
            );
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn only_eio_is_fatal() {
        let codes = [
            ErrorCode::NoBufferSpace,
            ErrorCode::WouldBlock,
            ErrorCode::Interrupted,
            ErrorCode::MessageTooLarge,
            ErrorCode::InvalidInput,
            ErrorCode::PermissionDenied,
            ErrorCode::Unreachable,
            ErrorCode::ConnectionRefused,
            ErrorCode::Os(libc::ENOENT),
            ErrorCode::Unknown,
        ];
        for code in codes {
            assert_eq!(classify(code), Classification::Transient, "{code:?}");
        }
        assert_eq!(
            classify(ErrorCode::Io),
            Classification::FatalOffloadUnsupported
        );
        // Classification is a pure function of the code
        for _ in 0..3 {
            assert_eq!(
                classify(ErrorCode::Io),
                Classification::FatalOffloadUnsupported
            );
        }

        let err = TransmitError::from(io::Error::from_raw_os_error(libc::EIO));
        assert_eq!(err.classify(), Classification::FatalOffloadUnsupported);
        assert_eq!(TransmitError::NotAccepted.classify(), Classification::Transient);
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn nothing_is_fatal_without_offload() {
        assert_eq!(classify(ErrorCode::Io), Classification::Transient);
    }
}
