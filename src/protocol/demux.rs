//! Demultiplexing of framed stdout/stderr streams.
//!
//! Two entry points share the same routing rules (tag 1 to stdout, tag 2 to
//! stderr, every other frame consumed and discarded):
//!
//! - [`demux`] pulls from an `AsyncRead` with exact header/payload reads and
//!   writes into caller sinks as frames arrive (attach sessions).
//! - [`demux_chunks_into`] pushes HTTP body chunks through a [`FrameBuffer`]
//!   and writes payloads into caller sinks (followed container logs);
//!   [`demux_chunks`] collects both streams in memory instead.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::wire_format::{read_header, StreamType};
use super::FrameBuffer;
use crate::error::{DockwireError, Result};
use crate::transport::ChunkStream;

/// Byte counts routed by [`demux`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxSummary {
    /// Frames read, including drained ones.
    pub frames: u64,
    /// Payload bytes written to the stdout sink.
    pub stdout_bytes: u64,
    /// Payload bytes written to the stderr sink.
    pub stderr_bytes: u64,
    /// Payload bytes consumed without a sink.
    pub discarded_bytes: u64,
}

/// Both output streams of a finished multiplexed body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Demultiplex frames from `reader` until a clean end of stream.
///
/// Frames for a stream without a sink are drained so the reader stays
/// aligned on header boundaries. A truncated header or payload, and any read
/// or write error, ends the loop with an error.
pub async fn demux<R, O, E>(
    reader: &mut R,
    mut stdout: Option<&mut O>,
    mut stderr: Option<&mut E>,
) -> Result<DemuxSummary>
where
    R: AsyncRead + Unpin + ?Sized,
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    let mut summary = DemuxSummary::default();

    while let Some(header) = read_header(reader).await? {
        summary.frames += 1;
        let len = u64::from(header.payload_length);

        match header.stream_type {
            StreamType::Stdout if stdout.is_some() => {
                if let Some(sink) = stdout.as_deref_mut() {
                    copy_payload(reader, sink, len).await?;
                }
                summary.stdout_bytes += len;
            }
            StreamType::Stderr if stderr.is_some() => {
                if let Some(sink) = stderr.as_deref_mut() {
                    copy_payload(reader, sink, len).await?;
                }
                summary.stderr_bytes += len;
            }
            other => {
                tracing::trace!("Draining {} bytes of {:?} frame", len, other);
                copy_payload(reader, &mut tokio::io::sink(), len).await?;
                summary.discarded_bytes += len;
            }
        }
    }

    Ok(summary)
}

/// Copy exactly `len` payload bytes from `reader` into `sink` and flush.
async fn copy_payload<R, W>(reader: &mut R, sink: &mut W, len: u64) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut limited = (&mut *reader).take(len);
    let copied = tokio::io::copy(&mut limited, sink).await?;
    if copied != len {
        return Err(DockwireError::Protocol(format!(
            "truncated frame payload: got {} of {} bytes",
            copied, len
        )));
    }
    sink.flush().await?;
    Ok(())
}

/// Demultiplex a chunked body into caller sinks as frames complete.
///
/// Returns when the body ends; a body cut inside a frame is an error.
pub async fn demux_chunks_into<S, O, E>(
    stream: &mut S,
    mut stdout: Option<&mut O>,
    mut stderr: Option<&mut E>,
) -> Result<DemuxSummary>
where
    S: ChunkStream + ?Sized,
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = FrameBuffer::new();
    let mut summary = DemuxSummary::default();

    while let Some(chunk) = stream.next_chunk().await? {
        for frame in buffer.push(&chunk)? {
            summary.frames += 1;
            let len = frame.payload().len() as u64;

            match frame.stream_type() {
                StreamType::Stdout if stdout.is_some() => {
                    if let Some(sink) = stdout.as_deref_mut() {
                        write_payload(sink, frame.payload()).await?;
                    }
                    summary.stdout_bytes += len;
                }
                StreamType::Stderr if stderr.is_some() => {
                    if let Some(sink) = stderr.as_deref_mut() {
                        write_payload(sink, frame.payload()).await?;
                    }
                    summary.stderr_bytes += len;
                }
                _ => summary.discarded_bytes += len,
            }
        }
    }

    buffer.finish()?;
    Ok(summary)
}

async fn write_payload<W>(sink: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    sink.write_all(payload).await?;
    sink.flush().await?;
    Ok(())
}

/// Demultiplex a chunked body into memory.
pub async fn demux_chunks<S>(stream: &mut S) -> Result<DemuxedOutput>
where
    S: ChunkStream + ?Sized,
{
    let mut output = DemuxedOutput::default();
    demux_chunks_into(stream, Some(&mut output.stdout), Some(&mut output.stderr)).await?;
    Ok(output)
}
