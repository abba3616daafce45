//! Transport module - daemon addressing, dialing and HTTP.
//!
//! Provides abstraction over:
//! - Unix Domain Sockets (`unix://`)
//! - TCP (`tcp://`, `http://`)
//! - TLS over TCP (`https://`, `tls` feature)

mod address;
mod connector;
mod http;

pub use address::{DaemonAddress, DEFAULT_DAEMON_ADDRESS, UNIX_SOCKET_AUTHORITY};
pub use connector::{set_tcp_user_timeout, Connection, Connector};
pub use http::{ChunkStream, HttpTransport, UpgradedStream};
pub(crate) use http::{collect_body, error_from_body};
