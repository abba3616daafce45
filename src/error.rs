//! Error types for dockwire.

use thiserror::Error;

/// Main error type for all dockwire operations.
#[derive(Debug, Error)]
pub enum DockwireError {
    /// I/O error on a socket, an attach stream or a caller-supplied sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP protocol error reported by the client connection.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// A request could not be built (bad header value, bad URI).
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    /// Dialing the daemon or the HTTP handshake failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A call was made with options it cannot honour.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The daemon address could not be parsed or uses an unsupported scheme.
    #[error("Invalid daemon address: {0}")]
    InvalidAddress(String),

    /// Protocol error (short frame header, truncated payload, failed upgrade).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The daemon answered 404.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The daemon answered with another failure status.
    #[error("Daemon error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// A progress record carried an `error` field.
    #[error("Progress error: {0}")]
    Progress(String),

    /// The request exceeded the configured total timeout.
    #[error("Request timed out")]
    Timeout,

    /// Attach aborted because the target container could not be inspected.
    #[error("failed to inspect container: {0}")]
    Inspect(Box<DockwireError>),

    /// A monitor was started twice or after it stopped.
    #[error("Monitor state error: {0}")]
    MonitorState(String),
}

impl DockwireError {
    /// Returns true for the distinguished "not found" failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            DockwireError::NotFound(_) => true,
            DockwireError::Inspect(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    /// HTTP status code carried by remote application errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DockwireError::NotFound(_) => Some(404),
            DockwireError::Api { status, .. } => Some(*status),
            DockwireError::Inspect(inner) => inner.status_code(),
            _ => None,
        }
    }
}

/// Result type alias using DockwireError.
pub type Result<T> = std::result::Result<T, DockwireError>;
