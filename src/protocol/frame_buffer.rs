//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 8 bytes
//! - `WaitingForPayload`: Header parsed, need N more payload bytes
//!
//! HTTP response bodies arrive in chunks that have no relation to frame
//! boundaries, so log streams are demultiplexed by pushing every chunk here.
//!
//! # Example
//!
//! ```
//! use dockwire::protocol::{build_frame, FrameBuffer, StreamType};
//!
//! let bytes = build_frame(StreamType::Stdout, b"hello").unwrap();
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(&bytes[..3]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[3..]).unwrap();
//! assert_eq!(frames[0].payload(), b"hello");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::{DockwireError, Result};

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 8 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: Header, remaining: u32 },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from body chunks.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 1GB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns error if a header announces a payload above `max_payload_size`.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Declare the end of input.
    ///
    /// Succeeds only at a frame boundary; leftover bytes mean the stream was
    /// cut inside a header or a payload.
    pub fn finish(&self) -> Result<()> {
        match &self.state {
            State::WaitingForHeader if self.buffer.is_empty() => Ok(()),
            State::WaitingForHeader => Err(DockwireError::Protocol(format!(
                "short frame header: got {} of {} bytes",
                self.buffer.len(),
                HEADER_SIZE
            ))),
            State::WaitingForPayload { remaining, .. } => Err(DockwireError::Protocol(format!(
                "truncated frame payload: got {} of {} bytes",
                self.buffer.len(),
                remaining
            ))),
        }
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match &self.state {
            State::WaitingForHeader => {
                let header = match Header::decode(&self.buffer) {
                    Some(header) => header,
                    None => return Ok(None),
                };

                if header.payload_length > self.max_payload_size {
                    return Err(DockwireError::Protocol(format!(
                        "Payload size {} exceeds maximum {}",
                        header.payload_length, self.max_payload_size
                    )));
                }

                let _ = self.buffer.split_to(HEADER_SIZE);

                if header.payload_length == 0 {
                    return Ok(Some(Frame::new(header, Bytes::new())));
                }

                self.state = State::WaitingForPayload {
                    header,
                    remaining: header.payload_length,
                };

                self.try_extract_one()
            }

            State::WaitingForPayload { header, remaining } => {
                let remaining = *remaining as usize;

                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                let header = *header;

                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(header, payload)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
