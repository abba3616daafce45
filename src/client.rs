//! Client builder and daemon calls.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the daemon
//! address and connection options. The [`Client`] exposes:
//! 1. One-shot calls (inspect, create, start, stop, ...)
//! 2. Container logs and image pulls over streamed bodies
//! 3. Attach sessions over upgraded connections
//! 4. Reconnecting monitors for events and stats
//!
//! # Example
//!
//! ```ignore
//! use dockwire::{Client, EventsOptions};
//!
//! #[tokio::main]
//! async fn main() -> dockwire::Result<()> {
//!     let client = Client::builder("unix:///var/run/docker.sock")
//!         .api_version("v1.43")
//!         .timeout(std::time::Duration::from_secs(30))
//!         .build()?;
//!
//!     client.ping().await?;
//!
//!     let mut events = client.monitor_events(&EventsOptions::default());
//!     events.start()?;
//!     while let Some(event) = events.recv().await {
//!         println!("{} {}", event.kind, event.action);
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::attach::{AttachIo, AttachSession};
use crate::auth::{AuthConfig, REGISTRY_AUTH_HEADER};
use crate::error::{DockwireError, Result};
use crate::monitor::{HttpFeed, Monitor, MonitorConfig};
use crate::progress::{consume_progress, ProgressMessage};
use crate::protocol::{demux_chunks, demux_chunks_into, DemuxSummary, DemuxedOutput};
use crate::transport::{
    collect_body, ChunkStream, Connector, DaemonAddress, HttpTransport, DEFAULT_DAEMON_ADDRESS,
};
use crate::types::{
    with_query, Container, ContainerConfig, ContainerInfo, CreateResponse, Event, EventsOptions,
    Filters, Image, Info, ListContainersOptions, LogOptions, Stats, Version, WaitResponse,
};

/// API version prefixed to every path.
pub const DEFAULT_API_VERSION: &str = "v1.43";

/// Environment variable naming the daemon address.
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Demultiplexed container logs.
pub type ContainerLogs = DemuxedOutput;

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    address: String,
    api_version: String,
    timeout: Option<Duration>,
    tcp_user_timeout: Option<Duration>,
    monitor_config: MonitorConfig,
    #[cfg(feature = "tls")]
    tls: Option<tokio_rustls::TlsConnector>,
}

impl ClientBuilder {
    /// Create a builder for the daemon at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: None,
            tcp_user_timeout: None,
            monitor_config: MonitorConfig::default(),
            #[cfg(feature = "tls")]
            tls: None,
        }
    }

    /// Create a builder from `DOCKER_HOST`, falling back to the local socket.
    pub fn from_env() -> Self {
        let address = std::env::var(DOCKER_HOST_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DAEMON_ADDRESS.to_string());
        Self::new(address)
    }

    /// Set the API version path prefix (e.g. `v1.43`). Empty disables it.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set the total timeout of one-shot calls.
    ///
    /// Never applied to attach sessions, logs, pulls or monitors.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set `TCP_USER_TIMEOUT` on TCP connections where supported.
    pub fn tcp_user_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_user_timeout = Some(timeout);
        self
    }

    /// Set the configuration used by monitors created from this client.
    pub fn monitor_config(mut self, config: MonitorConfig) -> Self {
        self.monitor_config = config;
        self
    }

    /// Use `connector` for `https://` addresses.
    #[cfg(feature = "tls")]
    pub fn tls(mut self, connector: tokio_rustls::TlsConnector) -> Self {
        self.tls = Some(connector);
        self
    }

    /// Parse the address and build the client.
    ///
    /// # Errors
    ///
    /// [`DockwireError::InvalidAddress`] for unparseable addresses, unknown
    /// schemes, or TLS addresses without a TLS connector.
    pub fn build(self) -> Result<Client> {
        let address = DaemonAddress::parse(&self.address)?;

        let connector = Connector::new(address).with_tcp_user_timeout(self.tcp_user_timeout);
        #[cfg(feature = "tls")]
        let connector = connector.with_tls(self.tls);
        connector.validate()?;

        tracing::debug!("Client configured for {}", connector.address());

        Ok(Client {
            transport: HttpTransport::new(connector).with_timeout(self.timeout),
            api_version: self.api_version.trim_matches('/').to_string(),
            monitor_config: self.monitor_config,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DAEMON_ADDRESS)
    }
}

/// Client for one daemon.
///
/// Cheap to clone; every call opens its own connection.
#[derive(Clone)]
pub struct Client {
    transport: HttpTransport,
    api_version: String,
    monitor_config: MonitorConfig,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(address: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(address)
    }

    /// Client with default settings for `address`.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        ClientBuilder::new(address).build()
    }

    /// Client for `DOCKER_HOST` with default settings.
    pub fn from_env() -> Result<Self> {
        ClientBuilder::from_env().build()
    }

    pub fn address(&self) -> &DaemonAddress {
        self.transport.address()
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    // ========================================================================
    // System
    // ========================================================================

    /// Check that the daemon answers.
    pub async fn ping(&self) -> Result<()> {
        self.call(Method::GET, "/_ping", None, &[]).await?;
        Ok(())
    }

    pub async fn info(&self) -> Result<Info> {
        self.get_json("/info").await
    }

    pub async fn version(&self) -> Result<Version> {
        self.get_json("/version").await
    }

    // ========================================================================
    // Containers
    // ========================================================================

    pub async fn list_containers(
        &self,
        all: bool,
        size: bool,
        filters: &Filters,
    ) -> Result<Vec<Container>> {
        let query = ListContainersOptions {
            all,
            size,
            filters: filters.clone(),
        }
        .to_query();
        self.get_json(&with_query("/containers/json", &query)).await
    }

    pub async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        self.get_json(&format!("/containers/{}/json", id)).await
    }

    /// Create a container and return its id.
    pub async fn create_container(
        &self,
        config: &ContainerConfig,
        name: Option<&str>,
    ) -> Result<String> {
        let path = match name {
            Some(name) => {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("name", name)
                    .finish();
                with_query("/containers/create", &query)
            }
            None => "/containers/create".to_string(),
        };

        let created: CreateResponse = self.post_json(&path, Some(config)).await?;
        for warning in created.warnings.iter().flatten() {
            tracing::warn!("Create {}: {}", created.id, warning);
        }
        Ok(created.id)
    }

    pub async fn start_container(&self, id: &str) -> Result<()> {
        self.post_empty(&format!("/containers/{}/start", id)).await
    }

    /// Stop a container, killing it after `timeout`.
    pub async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()> {
        self.post_empty(&format!("/containers/{}/stop?t={}", id, timeout.as_secs()))
            .await
    }

    pub async fn restart_container(&self, id: &str, timeout: Duration) -> Result<()> {
        self.post_empty(&format!("/containers/{}/restart?t={}", id, timeout.as_secs()))
            .await
    }

    /// Send `signal` (daemon default `SIGKILL` when `None`).
    pub async fn kill_container(&self, id: &str, signal: Option<&str>) -> Result<()> {
        let path = format!("/containers/{}/kill", id);
        let path = match signal {
            Some(signal) => with_query(
                &path,
                &url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("signal", signal)
                    .finish(),
            ),
            None => path,
        };
        self.post_empty(&path).await
    }

    pub async fn pause_container(&self, id: &str) -> Result<()> {
        self.post_empty(&format!("/containers/{}/pause", id)).await
    }

    pub async fn unpause_container(&self, id: &str) -> Result<()> {
        self.post_empty(&format!("/containers/{}/unpause", id))
            .await
    }

    pub async fn remove_container(&self, id: &str, force: bool, volumes: bool) -> Result<()> {
        let path = format!(
            "/containers/{}?force={}&v={}",
            id,
            u8::from(force),
            u8::from(volumes)
        );
        self.call(Method::DELETE, &path, None, &[]).await?;
        Ok(())
    }

    /// Block until the container exits and return its exit code.
    pub async fn wait_container(&self, id: &str) -> Result<i64> {
        let waited: WaitResponse = self
            .post_json(&format!("/containers/{}/wait", id), None::<&()>)
            .await?;
        Ok(waited.status_code)
    }

    /// Fetch logs of a non-TTY container, split into stdout and stderr.
    ///
    /// Buffers the whole body, so `follow` is rejected; use
    /// [`stream_logs`](Self::stream_logs) for followed logs.
    pub async fn container_logs(&self, id: &str, options: &LogOptions) -> Result<ContainerLogs> {
        reject_follow(options)?;
        let path = self.logs_path(id, options);
        let mut body = self
            .transport
            .stream(Method::GET, &path, None, &[])
            .await?
            .into_body();
        demux_chunks(&mut body).await
    }

    /// Fetch logs without demultiplexing (TTY containers).
    pub async fn container_logs_raw(&self, id: &str, options: &LogOptions) -> Result<Bytes> {
        reject_follow(options)?;
        let path = self.logs_path(id, options);
        let response = self.transport.stream(Method::GET, &path, None, &[]).await?;
        collect_body(response.into_body()).await
    }

    /// Write logs of a non-TTY container into the given sinks as they arrive.
    ///
    /// With `follow` set this runs until the container's log stream ends or
    /// the returned future is dropped.
    pub async fn stream_logs<O, E>(
        &self,
        id: &str,
        options: &LogOptions,
        stdout: Option<&mut O>,
        stderr: Option<&mut E>,
    ) -> Result<DemuxSummary>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        let path = self.logs_path(id, options);
        let mut body = self
            .transport
            .stream(Method::GET, &path, None, &[])
            .await?
            .into_body();
        demux_chunks_into(&mut body, stdout, stderr).await
    }

    /// Copy raw logs (TTY containers) into `sink` as they arrive.
    ///
    /// Returns the number of bytes copied.
    pub async fn stream_logs_raw<W>(
        &self,
        id: &str,
        options: &LogOptions,
        sink: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let path = self.logs_path(id, options);
        let mut body = self
            .transport
            .stream(Method::GET, &path, None, &[])
            .await?
            .into_body();

        let mut copied = 0;
        while let Some(chunk) = body.next_chunk().await? {
            sink.write_all(&chunk).await?;
            sink.flush().await?;
            copied += chunk.len() as u64;
        }
        Ok(copied)
    }

    fn logs_path(&self, id: &str, options: &LogOptions) -> String {
        self.path(&with_query(
            &format!("/containers/{}/logs", id),
            &options.to_query(),
        ))
    }

    /// Attach to a running container.
    ///
    /// The container is inspected first to learn its TTY flag; failure to
    /// inspect aborts with [`DockwireError::Inspect`].
    pub async fn attach_container(&self, id: &str, io: AttachIo) -> Result<()> {
        let info = self
            .inspect_container(id)
            .await
            .map_err(|e| DockwireError::Inspect(Box::new(e)))?;

        let path = self.path(&with_query(
            &format!("/containers/{}/attach", id),
            &io.options().to_query(),
        ));
        let conn = self.transport.upgrade(&path).await?;

        AttachSession::new(conn, info.config.tty).run(io).await
    }

    // ========================================================================
    // Images
    // ========================================================================

    pub async fn list_images(&self, all: bool) -> Result<Vec<Image>> {
        self.get_json(&format!("/images/json?all={}", u8::from(all)))
            .await
    }

    pub async fn remove_image(&self, name: &str) -> Result<()> {
        self.call(Method::DELETE, &format!("/images/{}", name), None, &[])
            .await?;
        Ok(())
    }

    /// Pull `name` (`repo[:tag]` or `repo@digest`, tag defaults to `latest`).
    ///
    /// Every progress record is passed to `on_progress`; a record carrying
    /// an error fails the pull with [`DockwireError::Progress`].
    pub async fn pull_image<F>(
        &self,
        name: &str,
        auth: Option<&AuthConfig>,
        on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(&ProgressMessage),
    {
        let (image, tag) = split_image_tag(name);
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("fromImage", image);
        if let Some(tag) = tag {
            query.append_pair("tag", tag);
        }
        let path = self.path(&with_query("/images/create", &query.finish()));

        let encoded_auth = auth.map(AuthConfig::encode).transpose()?;
        let mut headers = Vec::new();
        if let Some(encoded) = encoded_auth.as_deref() {
            headers.push((REGISTRY_AUTH_HEADER, encoded));
        }

        let mut body = self
            .transport
            .stream(Method::POST, &path, None, &headers)
            .await?
            .into_body();
        let records = consume_progress(&mut body, on_progress).await?;

        tracing::debug!("Pulled {} ({} progress records)", name, records);
        Ok(())
    }

    // ========================================================================
    // Monitors
    // ========================================================================

    /// Unstarted monitor over any JSON feed at `path` (API-relative).
    pub fn monitor<T>(&self, path: &str) -> Monitor<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = self.path(path);
        let feed = HttpFeed::new(self.transport.clone(), path.clone());
        Monitor::new(Arc::new(feed), path, self.monitor_config.clone())
    }

    /// Unstarted monitor over the daemon event feed.
    pub fn monitor_events(&self, options: &EventsOptions) -> Monitor<Event> {
        self.monitor(&with_query("/events", &options.to_query()))
    }

    /// Unstarted monitor over a container's resource-usage samples.
    pub fn monitor_stats(&self, id: &str) -> Monitor<Stats> {
        self.monitor(&format!("/containers/{}/stats?stream=1", id))
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    fn path(&self, path: &str) -> String {
        if self.api_version.is_empty() {
            path.to_string()
        } else {
            format!("/{}{}", self.api_version, path)
        }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        headers: &[(&str, &str)],
    ) -> Result<Bytes> {
        self.transport
            .request(method, &self.path(path), body, headers)
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.call(Method::GET, path, None, &[]).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_json<B, T>(&self, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = body
            .map(|b| serde_json::to_vec(b).map(Bytes::from))
            .transpose()?;
        let response = self.call(Method::POST, path, body, &[]).await?;
        Ok(serde_json::from_slice(&response)?)
    }

    async fn post_empty(&self, path: &str) -> Result<()> {
        self.call(Method::POST, path, None, &[]).await?;
        Ok(())
    }
}

fn reject_follow(options: &LogOptions) -> Result<()> {
    if options.follow {
        return Err(DockwireError::InvalidArgument(
            "followed logs never end; use stream_logs".to_string(),
        ));
    }
    Ok(())
}

/// Split `repo[:tag]`, ignoring a registry port.
///
/// Digest references are pulled as given, without a tag.
fn split_image_tag(name: &str) -> (&str, Option<&str>) {
    if name.contains('@') {
        return (name, None);
    }
    match name.rfind(':') {
        Some(idx) if !name[idx + 1..].contains('/') => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, Some("latest")),
    }
}
