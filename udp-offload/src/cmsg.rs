//! Control messages ("ancillary data") as explicit byte layouts
//!
//! Every record in a control buffer is the platform's `cmsghdr` followed by its payload. All
//! fields are native-endian:
//!
//! | offset | width | field |
//! |---|---|---|
//! | 0 | `size_t` on Linux, `socklen_t` elsewhere | `cmsg_len`: header plus payload, without trailing padding |
//! | width of `cmsg_len` | 4 | `cmsg_level` |
//! | width of `cmsg_len` + 4 | 4 | `cmsg_type` |
//! | [`DATA_OFFSET`] | payload length | payload |
//!
//! The header is padded up to the platform alignment before the payload starts, and the payload
//! is padded after its end so that the next record starts aligned as well. A record with `n`
//! payload bytes therefore occupies [`cmsg_space`]`(n)` bytes of the buffer, of which
//! [`cmsg_len`]`(n)` are announced in its header. These match the `CMSG_SPACE` and `CMSG_LEN`
//! macros of the C library.

use std::{ffi::c_int, fmt, mem};

use crate::{
    platform::{self, CMSG_ALIGN, CMSG_LEN_WIDTH},
    SegmentSize,
};

const INT_WIDTH: usize = mem::size_of::<c_int>();
const HEADER_LEN: usize = CMSG_LEN_WIDTH + 2 * INT_WIDTH;

/// Offset of a record's payload from the start of the record
pub const DATA_OFFSET: usize = align(HEADER_LEN);

/// Bytes occupied by one `UDP_SEGMENT` record, whose payload is a 16-bit segment size
pub const SEGMENT_SPACE: usize = cmsg_space(mem::size_of::<u16>());

/// Largest control buffer the transmit paths hand to the kernel
pub const MAX_CONTROL_LEN: usize = 64;

/// Rounds `len` up to the control message alignment
pub const fn align(len: usize) -> usize {
    (len + CMSG_ALIGN - 1) & !(CMSG_ALIGN - 1)
}

/// Value of the `cmsg_len` header field for a payload of `payload_len` bytes
pub const fn cmsg_len(payload_len: usize) -> usize {
    DATA_OFFSET + payload_len
}

/// Bytes a record with `payload_len` payload bytes occupies, trailing padding included
pub const fn cmsg_space(payload_len: usize) -> usize {
    DATA_OFFSET + align(payload_len)
}

#[derive(Copy, Clone)]
#[repr(align(8))] // Conservative bound for align_of<libc::cmsghdr>
pub(crate) struct Aligned<T>(pub(crate) T);

/// Fixed fields of a control message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ControlHeader {
    /// Header plus payload length, without trailing padding
    len: usize,
    level: c_int,
    ty: c_int,
}

impl ControlHeader {
    /// Writes the header into the first [`DATA_OFFSET`] bytes of `out`, zeroing the padding
    fn write(&self, out: &mut [u8]) {
        let out = &mut out[..DATA_OFFSET];
        out.fill(0);
        match CMSG_LEN_WIDTH {
            4 => out[..4].copy_from_slice(&(self.len as u32).to_ne_bytes()),
            _ => out[..8].copy_from_slice(&(self.len as u64).to_ne_bytes()),
        }
        let (level, ty) = out[CMSG_LEN_WIDTH..HEADER_LEN].split_at_mut(INT_WIDTH);
        level.copy_from_slice(&self.level.to_ne_bytes());
        ty.copy_from_slice(&self.ty.to_ne_bytes());
    }

    /// Reads a header from the start of `buf`
    fn read(buf: &[u8]) -> Option<Self> {
        let header = buf.get(..HEADER_LEN)?;
        let len = match CMSG_LEN_WIDTH {
            4 => u32::from_ne_bytes(header[..4].try_into().ok()?) as usize,
            _ => u64::from_ne_bytes(header[..8].try_into().ok()?) as usize,
        };
        let int = |offset: usize| {
            header[offset..offset + INT_WIDTH]
                .try_into()
                .ok()
                .map(c_int::from_ne_bytes)
        };
        Some(Self {
            len,
            level: int(CMSG_LEN_WIDTH)?,
            ty: int(CMSG_LEN_WIDTH + INT_WIDTH)?,
        })
    }
}

/// An aligned control buffer whose capacity is fixed at construction
///
/// Records are appended with [`push`](Self::push). A record that does not fit in the remaining
/// capacity is dropped without touching the buffer, so the capacity decides which records make
/// it to the kernel.
#[derive(Clone)]
pub struct ControlBuffer {
    storage: Aligned<[u8; MAX_CONTROL_LEN]>,
    len: usize,
    capacity: usize,
}

impl ControlBuffer {
    /// Creates an empty buffer able to hold `capacity` bytes, at most [`MAX_CONTROL_LEN`]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Aligned([0; MAX_CONTROL_LEN]),
            len: 0,
            capacity: capacity.min(MAX_CONTROL_LEN),
        }
    }

    /// Number of encoded bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no record has been encoded
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of bytes the buffer can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes still available for records
    pub fn remaining(&self) -> usize {
        self.capacity - self.len
    }

    /// The encoded records
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage.0[..self.len]
    }

    /// Removes all records, keeping the capacity
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends a record with the given level, type and payload
    ///
    /// Returns `false`, leaving the buffer unchanged, if the record's [`cmsg_space`] exceeds the
    /// remaining capacity.
    pub fn push(&mut self, level: c_int, ty: c_int, payload: &[u8]) -> bool {
        let space = cmsg_space(payload.len());
        if self.remaining() < space {
            return false;
        }
        let record = &mut self.storage.0[self.len..self.len + space];
        ControlHeader {
            len: cmsg_len(payload.len()),
            level,
            ty,
        }
        .write(record);
        let (data, padding) = record[DATA_OFFSET..].split_at_mut(payload.len());
        data.copy_from_slice(payload);
        padding.fill(0);
        self.len += space;
        true
    }

    /// Iterates over the encoded records
    pub fn iter(&self) -> Iter<'_> {
        decode(self.as_bytes())
    }

    #[cfg(unix)]
    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.storage.0.as_ptr()
    }
}

impl Default for ControlBuffer {
    /// A buffer with room for exactly one segmentation record
    fn default() -> Self {
        Self::with_capacity(SEGMENT_SPACE)
    }
}

impl fmt::Debug for ControlBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Appends a `UDP_SEGMENT` record asking the kernel to cut the datagram into `size`-byte pieces
///
/// Returns `false` and leaves `control` untouched if the record does not fit, or if the platform
/// has no segmentation offload at all.
pub fn set_segment_size(control: &mut ControlBuffer, size: SegmentSize) -> bool {
    match platform::SEGMENT {
        Some(opt) => control.push(opt.level, opt.name, &size.get().to_ne_bytes()),
        None => false,
    }
}

/// Iterates over the records in an encoded control buffer
pub fn decode(buf: &[u8]) -> Iter<'_> {
    Iter { buf }
}

/// A decoded control message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage<'a> {
    /// Protocol level
    pub level: c_int,
    /// Message type within the level
    pub ty: c_int,
    /// Payload without padding
    pub data: &'a [u8],
}

impl ControlMessage<'_> {
    /// The segment size carried by a `UDP_SEGMENT` record
    pub fn segment_size(&self) -> Option<SegmentSize> {
        let opt = platform::SEGMENT?;
        if (self.level, self.ty) != (opt.level, opt.name) {
            return None;
        }
        let bytes = <[u8; 2]>::try_from(self.data).ok()?;
        SegmentSize::new(u16::from_ne_bytes(bytes).into()).ok()
    }
}

/// Iterator over the records of a control buffer, see [`decode`]
///
/// Stops at the first truncated or malformed record.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    buf: &'a [u8],
}

impl<'a> Iterator for Iter<'a> {
    type Item = ControlMessage<'a>;

    fn next(&mut self) -> Option<ControlMessage<'a>> {
        let header = ControlHeader::read(self.buf)?;
        if header.len < DATA_OFFSET || header.len > self.buf.len() {
            self.buf = &[];
            return None;
        }
        let data = &self.buf[DATA_OFFSET..header.len];
        self.buf = &self.buf[align(header.len).min(self.buf.len())..];
        Some(ControlMessage {
            level: header.level,
            ty: header.ty,
            data,
        })
    }
}
