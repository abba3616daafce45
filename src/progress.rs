//! Progress feeds of image pulls and builds.
//!
//! The daemon streams one JSON object per update. Each may carry `status`,
//! `progress`, `stream` or `error`; the first record with an `error` ends
//! consumption with [`DockwireError::Progress`].

use serde::Deserialize;

use crate::error::{DockwireError, Result};
use crate::monitor::JsonStreamDecoder;
use crate::transport::ChunkStream;

/// One progress record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProgressMessage {
    pub id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<String>,
    #[serde(rename = "progressDetail")]
    pub progress_detail: Option<ProgressDetail>,
    pub stream: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "errorDetail")]
    pub error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProgressDetail {
    pub current: Option<u64>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorDetail {
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl ProgressMessage {
    /// Failure message carried by this record, if any.
    ///
    /// Empty `error` strings do not count as failures.
    pub fn failure(&self) -> Option<&str> {
        self.error
            .as_deref()
            .filter(|message| !message.is_empty())
            .or_else(|| {
                self.error_detail
                    .as_ref()
                    .and_then(|detail| detail.message.as_deref())
                    .filter(|message| !message.is_empty())
            })
    }
}

/// Consume a progress body, handing every record to `on_progress`.
///
/// Returns the number of records seen. A record carrying an error is not
/// passed to the callback.
pub async fn consume_progress<S, F>(body: &mut S, mut on_progress: F) -> Result<usize>
where
    S: ChunkStream + ?Sized,
    F: FnMut(&ProgressMessage),
{
    let mut decoder = JsonStreamDecoder::new();
    let mut seen = 0;

    while let Some(chunk) = body.next_chunk().await? {
        decoder.push(&chunk);
        while let Some(message) = decoder.next::<ProgressMessage>()? {
            if let Some(failure) = message.failure() {
                return Err(DockwireError::Progress(failure.to_string()));
            }
            seen += 1;
            on_progress(&message);
        }
    }

    decoder.finish()?;
    Ok(seen)
}
