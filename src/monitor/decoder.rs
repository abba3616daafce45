//! Incremental JSON value decoder.
//!
//! Feeds arrive as body chunks with no relation to record boundaries. The
//! decoder buffers bytes and yields one complete JSON value at a time,
//! keeping an incomplete trailing value for the next push.

use bytes::{Buf, BytesMut};
use serde::de::DeserializeOwned;

use crate::error::{DockwireError, Result};

/// Buffer for decoding a stream of concatenated JSON values.
#[derive(Debug, Default)]
pub struct JsonStreamDecoder {
    buffer: BytesMut,
}

impl JsonStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a body chunk.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Decode the next complete value.
    ///
    /// Returns `Ok(None)` when the buffer holds no complete value yet.
    ///
    /// # Errors
    ///
    /// Malformed JSON. The buffer is left as is; callers drop the decoder.
    pub fn next<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.buffer.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(start) => self.buffer.advance(start),
            None => {
                self.buffer.clear();
                return Ok(None);
            }
        }

        let (result, consumed) = {
            let mut values = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<T>();
            let result = values.next();
            (result, values.byte_offset())
        };

        match result {
            Some(Ok(value)) => {
                self.buffer.advance(consumed);
                Ok(Some(value))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Declare the end of the body.
    ///
    /// Leftover non-whitespace bytes mean the body closed inside a value.
    pub fn finish(&self) -> Result<()> {
        let pending = self
            .buffer
            .iter()
            .filter(|b| !b.is_ascii_whitespace())
            .count();
        if pending == 0 {
            Ok(())
        } else {
            Err(DockwireError::Protocol(format!(
                "feed closed inside a record ({} bytes undecoded)",
                self.buffer.len()
            )))
        }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
