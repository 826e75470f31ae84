use std::{fmt, num::NonZeroU16};

use thiserror::Error;

/// Maximum number of segments the kernel will carve a single buffer into
// As defined in linux/udp.h
// #define UDP_MAX_SEGMENTS        (1 << 6UL)
pub const MAX_SEGMENTS: usize = 64;

/// Length of each datagram the kernel should cut an outgoing buffer into
///
/// Always within `1..=65535`, which is what the 16-bit `UDP_SEGMENT` control message can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentSize(NonZeroU16);

impl SegmentSize {
    /// Largest representable segment size
    pub const MAX: usize = u16::MAX as usize;

    /// Validates `size`, rejecting zero and anything wider than 16 bits
    pub fn new(size: usize) -> Result<Self, InvalidSegmentSize> {
        u16::try_from(size)
            .ok()
            .and_then(NonZeroU16::new)
            .map(Self)
            .ok_or(InvalidSegmentSize::OutOfRange(size))
    }

    /// The segment size in bytes
    pub fn get(self) -> u16 {
        self.0.get()
    }

    /// Number of datagrams a payload of `len` bytes is carved into
    pub fn segments(self, len: usize) -> usize {
        len.div_ceil(usize::from(self.get()))
    }

    /// Checks that `self` can segment a payload of `payload_len` bytes
    pub(crate) fn check_payload(self, payload_len: usize) -> Result<(), InvalidSegmentSize> {
        let segment_size = usize::from(self.get());
        if segment_size > payload_len {
            return Err(InvalidSegmentSize::ExceedsPayload {
                segment_size,
                payload_len,
            });
        }
        let segments = self.segments(payload_len);
        if segments > MAX_SEGMENTS {
            return Err(InvalidSegmentSize::TooManySegments {
                segments,
                payload_len,
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for SegmentSize {
    type Error = InvalidSegmentSize;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<SegmentSize> for u16 {
    fn from(size: SegmentSize) -> Self {
        size.get()
    }
}

impl fmt::Display for SegmentSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reasons a segment size cannot be used for a transmit
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvalidSegmentSize {
    /// Zero, or too wide for the 16-bit control message
    #[error("segment size {0} is outside 1..=65535")]
    OutOfRange(usize),
    /// Segments must not be longer than the payload they split
    #[error("segment size {segment_size} exceeds payload length {payload_len}")]
    ExceedsPayload {
        /// Requested segment size
        segment_size: usize,
        /// Length of the payload
        payload_len: usize,
    },
    /// The kernel refuses to emit more than [`MAX_SEGMENTS`] datagrams per buffer
    #[error("payload of {payload_len} bytes would need {segments} segments")]
    TooManySegments {
        /// Number of datagrams the payload would be carved into
        segments: usize,
        /// Length of the payload
        payload_len: usize,
    },
}
