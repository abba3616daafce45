//! Daemon address parsing.
//!
//! The scheme selects the transport:
//! - `unix:///path/to.sock`: domain socket at the URL path
//! - `tcp://host:port`, `http://host:port`: plain TCP (default port 2375)
//! - `https://host:port`: TLS over TCP (default port 2376)
//!
//! For Unix sockets the HTTP layer still needs a host, so requests carry the
//! placeholder authority [`UNIX_SOCKET_AUTHORITY`] while the dial always
//! targets the socket path.

use std::fmt;
use std::path::PathBuf;

use url::{Host, Url};

use crate::error::{DockwireError, Result};

/// Address used when `DOCKER_HOST` is not set.
pub const DEFAULT_DAEMON_ADDRESS: &str = "unix:///var/run/docker.sock";

/// Host placed in requests sent over a Unix socket.
pub const UNIX_SOCKET_AUTHORITY: &str = "unix.sock";

const DEFAULT_TCP_PORT: u16 = 2375;
const DEFAULT_TLS_PORT: u16 = 2376;

/// Parsed daemon address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonAddress {
    /// Local domain socket.
    Unix(PathBuf),
    /// Plain TCP endpoint.
    Tcp { host: String, port: u16 },
    /// TLS endpoint.
    Tls { host: String, port: u16 },
}

impl DaemonAddress {
    /// Parse an address URL.
    ///
    /// # Example
    ///
    /// ```
    /// use dockwire::transport::DaemonAddress;
    ///
    /// let addr = DaemonAddress::parse("tcp://10.0.0.5").unwrap();
    /// assert_eq!(addr.authority(), "10.0.0.5:2375");
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| DockwireError::InvalidAddress(format!("{}: {}", input, e)))?;

        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(DockwireError::InvalidAddress(format!(
                        "{}: missing socket path",
                        input
                    )));
                }
                Ok(DaemonAddress::Unix(PathBuf::from(path)))
            }
            "tcp" | "http" => Ok(DaemonAddress::Tcp {
                host: host_of(&url, input)?,
                port: url.port().unwrap_or(DEFAULT_TCP_PORT),
            }),
            "https" => Ok(DaemonAddress::Tls {
                host: host_of(&url, input)?,
                port: url.port().unwrap_or(DEFAULT_TLS_PORT),
            }),
            other => Err(DockwireError::InvalidAddress(format!(
                "{}: unsupported scheme '{}'",
                input, other
            ))),
        }
    }

    /// Value of the `Host` header for requests to this daemon.
    pub fn authority(&self) -> String {
        match self {
            DaemonAddress::Unix(_) => UNIX_SOCKET_AUTHORITY.to_string(),
            DaemonAddress::Tcp { host, port } | DaemonAddress::Tls { host, port } => {
                host_port(host, *port)
            }
        }
    }

    /// Public-facing base URL (rewritten to `http://unix.sock` for sockets).
    pub fn base_url(&self) -> String {
        match self {
            DaemonAddress::Tls { .. } => format!("https://{}", self.authority()),
            _ => format!("http://{}", self.authority()),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, DaemonAddress::Tls { .. })
    }
}

impl fmt::Display for DaemonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonAddress::Unix(path) => write!(f, "unix://{}", path.display()),
            DaemonAddress::Tcp { host, port } => write!(f, "tcp://{}", host_port(host, *port)),
            DaemonAddress::Tls { host, port } => write!(f, "https://{}", host_port(host, *port)),
        }
    }
}

/// Host as passed to the resolver: IPv6 literals lose their brackets.
fn host_of(url: &Url, input: &str) -> Result<String> {
    let host = match url.host() {
        Some(Host::Ipv6(ip)) => ip.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Domain(domain)) => domain.to_string(),
        None => String::new(),
    };
    if host.is_empty() {
        return Err(DockwireError::InvalidAddress(format!("{}: missing host", input)));
    }
    Ok(host)
}

fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
