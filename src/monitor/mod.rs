//! Streaming monitor for server-push JSON feeds.
//!
//! A [`Monitor`] keeps one feed (daemon events, container stats) open for
//! as long as the caller wants it:
//!
//! ```text
//! Stopped -> Connecting -> Streaming -> Connecting (transient failure)
//!                                    -> Stopped    (stop / drop)
//! ```
//!
//! Connection failures, failure statuses, malformed records and unexpected
//! body ends are logged and retried after a fixed backoff. Records reach the
//! consumer in receipt order through a bounded channel; nothing is replayed
//! across a reconnect.
//!
//! Each monitor owns its own `CancellationToken`. The background task races
//! every await against it, so a stop is honoured within one backoff interval
//! and no record is delivered afterwards.
//!
//! # Example
//!
//! ```ignore
//! let mut events = client.monitor_events(&EventsOptions::default());
//! events.start()?;
//! while let Some(event) = events.recv().await {
//!     println!("{} {}", event.action, event.actor.id);
//! }
//! ```

mod decoder;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use decoder::JsonStreamDecoder;

use crate::error::{DockwireError, Result};
use crate::transport::{ChunkStream, HttpTransport};

/// Default wait between reconnect attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle state of a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MonitorState {
    Stopped = 0,
    Connecting = 1,
    Streaming = 2,
}

impl MonitorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MonitorState::Connecting,
            2 => MonitorState::Streaming,
            _ => MonitorState::Stopped,
        }
    }
}

/// Monitor tuning.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Fixed wait before every reconnect (no growth, no jitter).
    pub backoff: Duration,
    /// Records buffered between the feed task and the consumer.
    pub channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
            channel_capacity: 1,
        }
    }
}

impl MonitorConfig {
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the channel capacity (at least 1).
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Opens one connection attempt to a feed.
#[async_trait]
pub trait FeedSource: Send + Sync + 'static {
    /// Open the feed and return its body.
    ///
    /// Any error is treated as transient by the monitor.
    async fn open(&self) -> Result<Box<dyn ChunkStream>>;
}

/// GET feed on the daemon.
pub struct HttpFeed {
    transport: HttpTransport,
    path: String,
}

impl HttpFeed {
    pub fn new(transport: HttpTransport, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn open(&self) -> Result<Box<dyn ChunkStream>> {
        let response = self.transport.open(Method::GET, &self.path, None, &[]).await?;

        let status = response.status();
        if status.as_u16() >= 300 {
            let body = crate::transport::collect_body(response.into_body())
                .await
                .unwrap_or_default();
            return Err(crate::transport::error_from_body(status, &body));
        }

        Ok(Box::new(response.into_body()))
    }
}

/// A reconnecting feed of `T` records.
pub struct Monitor<T> {
    source: Option<Arc<dyn FeedSource>>,
    label: String,
    config: MonitorConfig,
    cancel: CancellationToken,
    state: Arc<AtomicU8>,
    tx: Option<mpsc::Sender<T>>,
    rx: mpsc::Receiver<T>,
    task: Option<JoinHandle<()>>,
}

impl<T> Monitor<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Create an unstarted monitor over `source`.
    ///
    /// `label` names the feed in log output.
    pub fn new(source: Arc<dyn FeedSource>, label: impl Into<String>, config: MonitorConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        Self {
            source: Some(source),
            label: label.into(),
            config,
            cancel: CancellationToken::new(),
            state: Arc::new(AtomicU8::new(MonitorState::Stopped as u8)),
            tx: Some(tx),
            rx,
            task: None,
        }
    }

    /// Spawn the background feed task.
    ///
    /// # Errors
    ///
    /// [`DockwireError::MonitorState`] if the monitor was already started
    /// or stopped. A stopped monitor cannot be restarted.
    pub fn start(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(DockwireError::MonitorState(format!(
                "monitor for {} was stopped",
                self.label
            )));
        }

        let (source, tx) = match (self.source.take(), self.tx.take()) {
            (Some(source), Some(tx)) => (source, tx),
            _ => {
                return Err(DockwireError::MonitorState(format!(
                    "monitor for {} already started",
                    self.label
                )))
            }
        };

        self.state
            .store(MonitorState::Connecting as u8, Ordering::SeqCst);

        let feed = FeedTask {
            source,
            label: self.label.clone(),
            backoff: self.config.backoff,
            cancel: self.cancel.clone(),
            state: self.state.clone(),
        };
        self.task = Some(tokio::spawn(feed.run(tx)));

        Ok(())
    }

    /// Next record, or `None` once the monitor is stopped.
    ///
    /// Also returns `None` immediately if the monitor was never started.
    pub async fn recv(&mut self) -> Option<T> {
        if self.cancel.is_cancelled() || self.task.is_none() {
            return None;
        }

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => None,
            record = self.rx.recv() => record,
        }
    }

    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("Stopping monitor for {}", self.label);
        }
        self.cancel.cancel();
    }

    /// Wait for the background task to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Monitor task for {} failed: {}", self.label, e);
            }
        }
    }

    /// Stop and wait for the background task.
    pub async fn shutdown(mut self) {
        self.stop();
        self.join().await;
    }

    pub fn state(&self) -> MonitorState {
        if self.cancel.is_cancelled() {
            return MonitorState::Stopped;
        }
        MonitorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Token that stops this monitor when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> Drop for Monitor<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How a streaming attempt ended.
enum Flow {
    Cancelled,
    ConsumerGone,
    Ended(String),
}

struct FeedTask {
    source: Arc<dyn FeedSource>,
    label: String,
    backoff: Duration,
    cancel: CancellationToken,
    state: Arc<AtomicU8>,
}

impl FeedTask {
    async fn run<T>(self, tx: mpsc::Sender<T>)
    where
        T: DeserializeOwned + Send + 'static,
    {
        tracing::debug!("Monitor started for {}", self.label);

        loop {
            self.set_state(MonitorState::Connecting);

            let opened = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,
                opened = self.source.open() => opened,
            };

            match opened {
                Ok(mut body) => {
                    self.set_state(MonitorState::Streaming);
                    tracing::debug!("Feed {} connected", self.label);

                    match self.stream_records(body.as_mut(), &tx).await {
                        Flow::Cancelled => break,
                        Flow::ConsumerGone => {
                            tracing::debug!("Consumer of {} went away", self.label);
                            break;
                        }
                        Flow::Ended(reason) => tracing::warn!(
                            "Feed {} interrupted ({}), reconnecting in {:?}",
                            self.label,
                            reason,
                            self.backoff
                        ),
                    }
                }
                Err(e) => tracing::warn!(
                    "Feed {} unavailable ({}), retrying in {:?}",
                    self.label,
                    e,
                    self.backoff
                ),
            }

            self.set_state(MonitorState::Connecting);

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }

        self.set_state(MonitorState::Stopped);
        tracing::debug!("Monitor stopped for {}", self.label);
    }

    /// Forward records from one open body until it ends or the monitor stops.
    async fn stream_records<T>(&self, body: &mut dyn ChunkStream, tx: &mpsc::Sender<T>) -> Flow
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut decoder = JsonStreamDecoder::new();

        loop {
            loop {
                let record = match decoder.next::<T>() {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(e) => return Flow::Ended(format!("decode error: {}", e)),
                };

                tokio::select! {
                    biased;

                    _ = self.cancel.cancelled() => return Flow::Cancelled,
                    sent = tx.send(record) => {
                        if sent.is_err() {
                            return Flow::ConsumerGone;
                        }
                    }
                }
            }

            let chunk = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Flow::Cancelled,
                chunk = body.next_chunk() => chunk,
            };

            match chunk {
                Ok(Some(bytes)) => decoder.push(&bytes),
                Ok(None) => {
                    return Flow::Ended(match decoder.finish() {
                        Ok(()) => "body closed".to_string(),
                        Err(e) => e.to_string(),
                    })
                }
                Err(e) => return Flow::Ended(format!("read error: {}", e)),
            }
        }
    }

    fn set_state(&self, state: MonitorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}
