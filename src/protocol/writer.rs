//! Multiplexed frame writer.
//!
//! Produces the framed stdout/stderr wire format on top of any `AsyncWrite`.
//! Clients only read this format, so the writer serves daemon-side
//! components and test harnesses that need to emit it.
//!
//! Frames are written with scatter/gather I/O (`write_vectored`): a batch of
//! frames contributes one slice per header and one per non-empty payload,
//! and partial writes resume from the first unwritten byte.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::wire_format::{payload_length, Header, StreamType, HEADER_SIZE};
use crate::error::{DockwireError, Result};

/// A frame ready to be written.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Pre-encoded header (8 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame for `stream_type`.
    ///
    /// Fails for payloads too large for the 32-bit length field.
    #[inline]
    pub fn new(stream_type: StreamType, payload: Bytes) -> Result<Self> {
        Ok(Self {
            header: Header::new(stream_type, payload_length(payload.len())?).encode(),
            payload,
        })
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Writes multiplexed frames into an inner writer.
pub struct MultiplexedWriter<W> {
    inner: W,
}

impl<W> MultiplexedWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one frame carrying `payload` on `stream_type`.
    pub async fn write_frame(&mut self, stream_type: StreamType, payload: &[u8]) -> Result<()> {
        let frame = OutboundFrame::new(stream_type, Bytes::copy_from_slice(payload))?;
        write_batch(&mut self.inner, std::slice::from_ref(&frame)).await
    }

    /// Write a batch of frames, in order.
    pub async fn write_frames(&mut self, frames: &[OutboundFrame]) -> Result<()> {
        write_batch(&mut self.inner, frames).await
    }

    /// Shut down the inner writer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Write a batch of frames using scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(DockwireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }

        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data after the first `skip_bytes` bytes.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut skipped = 0;

    for frame in batch {
        let header_start = skipped;
        let header_end = skipped + HEADER_SIZE;

        if skip_bytes < header_end {
            let start_in_header = skip_bytes.saturating_sub(header_start);
            slices.push(IoSlice::new(&frame.header[start_in_header..]));
        }
        skipped = header_end;

        if !frame.payload.is_empty() {
            let payload_start = skipped;
            let payload_end = skipped + frame.payload.len();

            if skip_bytes < payload_end {
                let start_in_payload = skip_bytes.saturating_sub(payload_start);
                slices.push(IoSlice::new(&frame.payload[start_in_payload..]));
            }
            skipped = payload_end;
        }
    }

    slices
}
