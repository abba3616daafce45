//! Wire format encoding and decoding.
//!
//! Implements the 8-byte stream frame header used by multiplexed attach and
//! log streams:
//! ```text
//! ┌────────────┬──────────┬──────────┐
//! │ Stream type│ Reserved │ Length   │
//! │ 1 byte     │ 3 bytes  │ 4 bytes  │
//! │            │ zero     │ uint32 BE│
//! └────────────┴──────────┴──────────┘
//! ```
//!
//! The length is Big Endian and counts the payload bytes that follow.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{DockwireError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size accepted by [`FrameBuffer`](super::FrameBuffer) (1 GB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_073_741_824;

/// Stream a frame belongs to.
///
/// Unknown tags are preserved rather than rejected so newer daemons can add
/// stream types without breaking older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// Tag 0.
    Stdin,
    /// Tag 1.
    Stdout,
    /// Tag 2.
    Stderr,
    /// Any other tag.
    Unknown(u8),
}

impl StreamType {
    /// Map a raw tag byte to a stream type.
    #[inline]
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            0 => StreamType::Stdin,
            1 => StreamType::Stdout,
            2 => StreamType::Stderr,
            other => StreamType::Unknown(other),
        }
    }

    /// Raw tag byte.
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            StreamType::Stdin => 0,
            StreamType::Stdout => 1,
            StreamType::Stderr => 2,
            StreamType::Unknown(other) => other,
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Which stream the payload belongs to.
    pub stream_type: StreamType,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(stream_type: StreamType, payload_length: u32) -> Self {
        Self {
            stream_type,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian length, reserved bytes zeroed).
    ///
    /// # Example
    ///
    /// ```
    /// use dockwire::protocol::{Header, StreamType};
    ///
    /// let bytes = Header::new(StreamType::Stderr, 5).encode();
    /// assert_eq!(bytes, [2, 0, 0, 0, 0, 0, 0, 5]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.stream_type.as_u8();
        buf[1..4].fill(0);
        buf[4..8].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode header from a buffer holding at least 8 bytes.
    ///
    /// Returns `None` if buffer is too short. Reserved bytes are not checked.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            stream_type: StreamType::from_u8(buf[0]),
            payload_length: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}

/// Checked conversion of a payload length to the 32-bit header field.
///
/// # Errors
///
/// [`DockwireError::Protocol`] for payloads of 4 GiB or more.
pub fn payload_length(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        DockwireError::Protocol(format!(
            "payload of {} bytes does not fit in a frame (max {})",
            len,
            u32::MAX
        ))
    })
}

/// Encode a header for the given stream and payload length.
#[inline]
pub fn encode_header(stream_type: StreamType, payload_length: u32) -> [u8; HEADER_SIZE] {
    Header::new(stream_type, payload_length).encode()
}

/// Decode the bytes obtained at a header boundary.
///
/// - 0 bytes: clean end of stream, `Ok(None)`.
/// - 1..=7 bytes: truncated header, `Err(Protocol)`.
/// - 8 or more bytes: the decoded header (extra bytes are ignored).
pub fn decode_header(buf: &[u8]) -> Result<Option<Header>> {
    if buf.is_empty() {
        return Ok(None);
    }
    match Header::decode(buf) {
        Some(header) => Ok(Some(header)),
        None => Err(DockwireError::Protocol(format!(
            "short frame header: got {} of {} bytes",
            buf.len(),
            HEADER_SIZE
        ))),
    }
}

/// Read exactly one header from `reader`.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first header
/// byte; an end of stream in the middle of a header is a protocol error.
pub async fn read_header<R>(reader: &mut R) -> Result<Option<Header>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; HEADER_SIZE];
    let mut filled = 0;

    while filled < HEADER_SIZE {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    decode_header(&buf[..filled])
}
