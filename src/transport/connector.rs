//! Dialing the daemon.
//!
//! [`Connector`] turns a [`DaemonAddress`] into a connected [`Connection`]:
//! - Unix: `UnixStream` to the socket path
//! - TCP: `TcpStream`, optionally with `TCP_USER_TIMEOUT`
//! - TLS: rustls client session over TCP (`tls` feature)

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use super::DaemonAddress;
use crate::error::{DockwireError, Result};

/// A connected byte stream to the daemon.
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Connection::Tcp(_) => "Tcp",
            #[cfg(unix)]
            Connection::Unix(_) => "Unix",
            #[cfg(feature = "tls")]
            Connection::Tls(_) => "Tls",
        };
        f.debug_tuple("Connection").field(&kind).finish()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "tls")]
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Dials new connections to one daemon address.
#[derive(Clone)]
pub struct Connector {
    address: DaemonAddress,
    tcp_user_timeout: Option<Duration>,
    #[cfg(feature = "tls")]
    tls: Option<tokio_rustls::TlsConnector>,
}

impl Connector {
    pub fn new(address: DaemonAddress) -> Self {
        Self {
            address,
            tcp_user_timeout: None,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }

    /// Apply `TCP_USER_TIMEOUT` to every TCP connection dialed.
    pub fn with_tcp_user_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tcp_user_timeout = timeout;
        self
    }

    /// TLS client configuration for `https://` addresses.
    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, tls: Option<tokio_rustls::TlsConnector>) -> Self {
        self.tls = tls;
        self
    }

    pub fn address(&self) -> &DaemonAddress {
        &self.address
    }

    /// Check that the address can be dialed with this configuration.
    pub fn validate(&self) -> Result<()> {
        match &self.address {
            #[cfg(not(unix))]
            DaemonAddress::Unix(_) => Err(DockwireError::InvalidAddress(
                "unix sockets are not supported on this platform".into(),
            )),
            #[cfg(feature = "tls")]
            DaemonAddress::Tls { .. } if self.tls.is_none() => Err(DockwireError::InvalidAddress(
                format!("{}: TLS requested but no TLS connector configured", self.address),
            )),
            #[cfg(not(feature = "tls"))]
            DaemonAddress::Tls { .. } => Err(DockwireError::InvalidAddress(format!(
                "{}: TLS support requires the `tls` feature",
                self.address
            ))),
            _ => Ok(()),
        }
    }

    /// Open a new connection.
    pub async fn connect(&self) -> Result<Connection> {
        self.validate()?;

        match &self.address {
            #[cfg(unix)]
            DaemonAddress::Unix(path) => {
                let stream = UnixStream::connect(path).await.map_err(|e| {
                    DockwireError::Connection(format!(
                        "failed to connect to daemon at {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(Connection::Unix(stream))
            }
            #[cfg(not(unix))]
            DaemonAddress::Unix(_) => Err(DockwireError::InvalidAddress(
                "unix sockets are not supported on this platform".into(),
            )),
            DaemonAddress::Tcp { host, port } => {
                let stream = self.dial_tcp(host, *port).await?;
                Ok(Connection::Tcp(stream))
            }
            DaemonAddress::Tls { host, port } => self.connect_tls(host, *port).await,
        }
    }

    async fn dial_tcp(&self, host: &str, port: u16) -> Result<TcpStream> {
        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            DockwireError::Connection(format!(
                "failed to connect to daemon at {}:{}: {}",
                host, port, e
            ))
        })?;

        if let Some(timeout) = self.tcp_user_timeout {
            if let Err(e) = set_tcp_user_timeout(&stream, timeout) {
                tracing::warn!("TCP user timeout not applied: {}", e);
            }
        }

        Ok(stream)
    }

    #[cfg(feature = "tls")]
    async fn connect_tls(&self, host: &str, port: u16) -> Result<Connection> {
        use tokio_rustls::rustls::pki_types::ServerName;

        let tls = self.tls.as_ref().ok_or_else(|| {
            DockwireError::InvalidAddress("TLS requested but no TLS connector configured".into())
        })?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| DockwireError::InvalidAddress(format!("{}: {}", host, e)))?;

        let tcp = self.dial_tcp(host, port).await?;
        let stream = tls
            .connect(server_name, tcp)
            .await
            .map_err(|e| DockwireError::Connection(format!("TLS handshake failed: {}", e)))?;

        Ok(Connection::Tls(Box::new(stream)))
    }

    #[cfg(not(feature = "tls"))]
    async fn connect_tls(&self, host: &str, port: u16) -> Result<Connection> {
        Err(DockwireError::InvalidAddress(format!(
            "https://{}:{}: TLS support requires the `tls` feature",
            host, port
        )))
    }
}

/// Set `TCP_USER_TIMEOUT` on a connected stream.
///
/// Returns `ErrorKind::Unsupported` on platforms without the option.
pub fn set_tcp_user_timeout(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "fuchsia"))]
    {
        socket2::SockRef::from(stream).set_tcp_user_timeout(Some(timeout))
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "fuchsia")))]
    {
        let _ = (stream, timeout);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "TCP_USER_TIMEOUT is not available on this platform",
        ))
    }
}
