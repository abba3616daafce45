//! # dockwire
//!
//! Async client for a container-engine daemon API over a Unix socket, TCP
//! or TLS.
//!
//! Besides plain request/response calls, the crate handles the two kinds of
//! long-lived streams the daemon produces:
//!
//! - **Attach streams**: a hijacked bidirectional connection carrying either
//!   raw TTY bytes or stdout/stderr frames with an 8-byte header
//!   ([`protocol`], [`attach`]).
//! - **Push feeds**: unbounded sequences of JSON records (events, stats,
//!   pull progress) consumed by a reconnecting [`Monitor`].
//!
//! ## Example
//!
//! ```ignore
//! use dockwire::{AttachIo, Client};
//!
//! #[tokio::main]
//! async fn main() -> dockwire::Result<()> {
//!     let client = Client::from_env()?;
//!
//!     client
//!         .attach_container(
//!             "web",
//!             AttachIo::new()
//!                 .stdout(tokio::io::stdout())
//!                 .stderr(tokio::io::stderr()),
//!         )
//!         .await
//! }
//! ```

pub mod attach;
pub mod auth;
pub mod error;
pub mod monitor;
pub mod progress;
pub mod protocol;
pub mod transport;
pub mod types;

mod client;

pub use attach::{AttachIo, AttachMode, AttachOptions, AttachSession, BoxedReader, BoxedWriter};
pub use auth::AuthConfig;
pub use client::{Client, ClientBuilder, ContainerLogs, DEFAULT_API_VERSION, DOCKER_HOST_ENV};
pub use error::{DockwireError, Result};
pub use monitor::{FeedSource, HttpFeed, Monitor, MonitorConfig, MonitorState};
pub use progress::ProgressMessage;
pub use transport::{set_tcp_user_timeout, DaemonAddress};
pub use types::*;
