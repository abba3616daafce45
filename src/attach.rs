//! Attach sessions.
//!
//! An attach session binds caller-supplied input/output endpoints to a
//! container's hijacked I/O stream. The framing depends on the container's
//! TTY flag:
//!
//! - **TTY**: raw bytes in both directions, no framing.
//! - **Multiplexed**: every output chunk is prefixed with an 8-byte header
//!   naming stdout or stderr; see [`crate::protocol`].
//!
//! The session owns the connection for its whole lifetime and shuts it down
//! exactly once when [`AttachSession::run`] returns, on every exit path.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::protocol::demux;

/// Caller input source.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Caller output sink.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Which standard streams to request from the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachOptions {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    /// Replay output produced before the attach.
    pub logs: bool,
}

impl AttachOptions {
    /// Query string for `POST /containers/<id>/attach`.
    ///
    /// ```
    /// use dockwire::AttachOptions;
    ///
    /// let opts = AttachOptions { stdout: true, ..Default::default() };
    /// assert_eq!(opts.to_query(), "stream=1&stdin=0&stdout=1&stderr=0&logs=0");
    /// ```
    pub fn to_query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("stream", "1")
            .append_pair("stdin", flag(self.stdin))
            .append_pair("stdout", flag(self.stdout))
            .append_pair("stderr", flag(self.stderr))
            .append_pair("logs", flag(self.logs))
            .finish()
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Caller endpoints for an attach session.
///
/// Every combination is legal, including none at all.
#[derive(Default)]
pub struct AttachIo {
    pub stdin: Option<BoxedReader>,
    pub stdout: Option<BoxedWriter>,
    pub stderr: Option<BoxedWriter>,
    pub logs: bool,
}

impl AttachIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdin(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(reader));
        self
    }

    pub fn stdout(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(writer));
        self
    }

    pub fn stderr(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(writer));
        self
    }

    /// Also replay earlier output.
    pub fn logs(mut self, logs: bool) -> Self {
        self.logs = logs;
        self
    }

    /// Streams to request, derived from the endpoints present.
    pub fn options(&self) -> AttachOptions {
        AttachOptions {
            stdin: self.stdin.is_some(),
            stdout: self.stdout.is_some(),
            stderr: self.stderr.is_some(),
            logs: self.logs,
        }
    }
}

impl std::fmt::Debug for AttachIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachIo")
            .field("options", &self.options())
            .finish()
    }
}

/// Framing used on the attach stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    Tty,
    Multiplexed,
}

/// One attach interaction over an exclusively owned connection.
pub struct AttachSession<S> {
    conn: S,
    mode: AttachMode,
}

impl<S> AttachSession<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Bind a session to `conn`; `tty` is the container's TTY flag.
    pub fn new(conn: S, tty: bool) -> Self {
        let mode = if tty {
            AttachMode::Tty
        } else {
            AttachMode::Multiplexed
        };
        Self { conn, mode }
    }

    pub fn mode(&self) -> AttachMode {
        self.mode
    }

    /// Run the session to completion.
    ///
    /// TTY sessions end when the input reaches EOF or the remote closes,
    /// whichever comes first. Multiplexed sessions end when the frame loop
    /// ends; stdin EOF does not half-close the connection.
    pub async fn run(self, io: AttachIo) -> Result<()> {
        let AttachIo {
            stdin,
            stdout,
            stderr,
            ..
        } = io;
        let mode = self.mode;
        let (mut reader, mut writer) = tokio::io::split(self.conn);

        tracing::debug!("Attach session started in {:?} mode", mode);

        let result = match mode {
            AttachMode::Tty => run_tty(&mut reader, &mut writer, stdin, stdout.or(stderr)).await,
            AttachMode::Multiplexed => {
                run_multiplexed(&mut reader, &mut writer, stdin, stdout, stderr).await
            }
        };

        if let Err(e) = writer.shutdown().await {
            tracing::debug!("Attach connection shutdown failed: {}", e);
        }

        match &result {
            Ok(()) => tracing::debug!("Attach session ended"),
            Err(e) => tracing::debug!("Attach session failed: {}", e),
        }
        result
    }
}

async fn run_tty<R, W>(
    reader: &mut R,
    writer: &mut W,
    input: Option<BoxedReader>,
    output: Option<BoxedWriter>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match (input, output) {
        (Some(mut input), Some(mut output)) => {
            tokio::select! {
                pumped = pump(&mut input, writer) => {
                    pumped?;
                }
                pumped = pump(reader, &mut output) => {
                    pumped?;
                }
            }
        }
        (Some(mut input), None) => {
            pump(&mut input, writer).await?;
        }
        (None, Some(mut output)) => {
            pump(reader, &mut output).await?;
        }
        (None, None) => {
            tokio::io::copy(reader, &mut tokio::io::sink()).await?;
        }
    }
    Ok(())
}

async fn run_multiplexed<R, W>(
    reader: &mut R,
    writer: &mut W,
    input: Option<BoxedReader>,
    mut stdout: Option<BoxedWriter>,
    mut stderr: Option<BoxedWriter>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let frames = demux(reader, stdout.as_deref_mut(), stderr.as_deref_mut());
    tokio::pin!(frames);

    let mut input = match input {
        Some(input) => input,
        None => {
            let summary = frames.await?;
            tracing::debug!("Attach stream ended after {} frames", summary.frames);
            return Ok(());
        }
    };

    let stdin_pump = pump(&mut input, writer);
    tokio::pin!(stdin_pump);
    let mut input_open = true;

    loop {
        tokio::select! {
            summary = &mut frames => {
                let summary = summary?;
                tracing::debug!("Attach stream ended after {} frames", summary.frames);
                return Ok(());
            }
            pumped = &mut stdin_pump, if input_open => {
                input_open = false;
                let sent = pumped?;
                tracing::trace!("Attach input reached EOF after {} bytes", sent);
            }
        }
    }
}

/// Copy `from` into `to` until EOF, then flush.
async fn pump<R, W>(from: &mut R, to: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = tokio::io::copy(from, to).await?;
    to.flush().await?;
    Ok(copied)
}
