//! Frame struct with typed accessors.
//!
//! Represents a complete multiplexed frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use dockwire::protocol::{Frame, Header, StreamType};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(Header::new(StreamType::Stdout, 5), Bytes::from_static(b"hello"));
//!
//! assert!(frame.is_stdout());
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{payload_length, Header, StreamType, HEADER_SIZE};
use crate::error::Result;

/// A complete multiplexed frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the stream type.
    #[inline]
    pub fn stream_type(&self) -> StreamType {
        self.header.stream_type
    }

    #[inline]
    pub fn is_stdout(&self) -> bool {
        self.header.stream_type == StreamType::Stdout
    }

    #[inline]
    pub fn is_stderr(&self) -> bool {
        self.header.stream_type == StreamType::Stderr
    }
}

/// Build a complete frame as a single byte vector.
///
/// Fails for payloads too large for the 32-bit length field.
///
/// # Example
///
/// ```
/// use dockwire::protocol::{build_frame, StreamType};
///
/// let bytes = build_frame(StreamType::Stdout, b"hello").unwrap();
/// assert_eq!(bytes.len(), 8 + 5);
/// ```
pub fn build_frame(stream_type: StreamType, payload: &[u8]) -> Result<Vec<u8>> {
    let length = payload_length(payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&Header::new(stream_type, length).encode());
    buf.extend_from_slice(payload);
    Ok(buf)
}
