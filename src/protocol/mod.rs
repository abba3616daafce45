//! Protocol module - stream framing for attach and log bodies.
//!
//! This module implements the multiplexed stdout/stderr format:
//! - 8-byte header encoding/decoding
//! - Frame buffer for accumulating partial body chunks
//! - Demultiplexer routing frames to caller sinks
//! - Vectored frame writer

mod demux;
mod frame;
mod frame_buffer;
mod wire_format;
mod writer;

pub use demux::{demux, demux_chunks, demux_chunks_into, DemuxSummary, DemuxedOutput};
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    decode_header, encode_header, payload_length, read_header, Header, StreamType,
    DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
pub use writer::{MultiplexedWriter, OutboundFrame};
