//! HTTP/1.1 over a daemon [`Connection`](super::Connection).
//!
//! Every call dials a fresh connection, performs the hyper handshake and
//! spawns the connection driver; the connection never carries more than one
//! logical stream. Upgrade requests keep the connection alive past the
//! response and hand the raw socket back to the caller.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_TYPE, HOST, UPGRADE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;

use super::{Connector, DaemonAddress};
use crate::error::{DockwireError, Result};

/// Raw bidirectional stream obtained from a `101 Switching Protocols` response.
pub type UpgradedStream = TokioIo<Upgraded>;

/// Source of body chunks, read one at a time.
#[async_trait]
pub trait ChunkStream: Send {
    /// Next non-empty data chunk, or `None` at end of body.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

#[async_trait]
impl ChunkStream for Incoming {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.frame().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        if !data.is_empty() {
                            return Ok(Some(data));
                        }
                    }
                }
            }
        }
    }
}

/// Request/response client bound to one daemon address.
#[derive(Clone)]
pub struct HttpTransport {
    connector: Connector,
    authority: String,
    timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(connector: Connector) -> Self {
        let authority = connector.address().authority();
        Self {
            connector,
            authority,
            timeout: None,
        }
    }

    /// Total timeout applied to [`request`](Self::request) only.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &DaemonAddress {
        self.connector.address()
    }

    /// Perform a one-shot call and return the whole response body.
    ///
    /// Status codes >= 400 become [`DockwireError::NotFound`] (404) or
    /// [`DockwireError::Api`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        headers: &[(&str, &str)],
    ) -> Result<Bytes> {
        let call = async {
            let response = self.stream(method, path, body, headers).await?;
            collect_body(response.into_body()).await
        };

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| DockwireError::Timeout)?,
            None => call.await,
        }
    }

    /// Send a request and return the response with its body still streaming.
    ///
    /// Failure statuses are classified as in [`request`](Self::request).
    pub async fn stream(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        headers: &[(&str, &str)],
    ) -> Result<Response<Incoming>> {
        let response = self.open(method, path, body, headers).await?;
        check_status(response).await
    }

    /// Send a request without looking at the response status.
    pub async fn open(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        headers: &[(&str, &str)],
    ) -> Result<Response<Incoming>> {
        let request = self.build_request(method, path, body, headers)?;
        self.send(request, false).await
    }

    /// POST `path` with an upgrade request and return the hijacked stream.
    ///
    /// Only `101 Switching Protocols` is accepted; a failure status is
    /// classified like any other call, any other status is a protocol error.
    pub async fn upgrade(&self, path: &str) -> Result<UpgradedStream> {
        let request = self.build_request(
            Method::POST,
            path,
            None,
            &[(CONNECTION.as_str(), "Upgrade"), (UPGRADE.as_str(), "tcp")],
        )?;

        let response = self.send(request, true).await?;
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            let response = check_status(response).await?;
            return Err(DockwireError::Protocol(format!(
                "expected 101 Switching Protocols from {}, got {}",
                path,
                response.status()
            )));
        }

        let upgraded = hyper::upgrade::on(response)
            .await
            .map_err(|e| DockwireError::Protocol(format!("connection upgrade failed: {}", e)))?;

        tracing::debug!("Upgraded connection for {}", path);
        Ok(TokioIo::new(upgraded))
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        headers: &[(&str, &str)],
    ) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, self.authority.as_str());

        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        Ok(builder.body(Full::new(body.unwrap_or_default()))?)
    }

    async fn send(
        &self,
        request: Request<Full<Bytes>>,
        upgrades: bool,
    ) -> Result<Response<Incoming>> {
        let conn = self.connector.connect().await?;
        let io = TokioIo::new(conn);

        let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| DockwireError::Connection(format!("HTTP handshake failed: {}", e)))?;

        if upgrades {
            tokio::spawn(async move {
                if let Err(e) = connection.with_upgrades().await {
                    tracing::debug!("Upgrade connection closed: {}", e);
                }
            });
        } else {
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::debug!("Connection closed: {}", e);
                }
            });
        }

        tracing::trace!("{} {}", request.method(), request.uri());
        Ok(sender.send_request(request).await?)
    }
}

/// Read a whole body into memory.
pub(crate) async fn collect_body(body: Incoming) -> Result<Bytes> {
    Ok(body.collect().await?.to_bytes())
}

/// Turn failure statuses into typed errors, passing other responses through.
async fn check_status(response: Response<Incoming>) -> Result<Response<Incoming>> {
    let status = response.status();
    if status.as_u16() < 400 {
        return Ok(response);
    }

    let body = collect_body(response.into_body()).await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

/// Build the error for a failure status from its body.
///
/// The daemon answers `{"message": "..."}`; anything else is used as text.
pub(crate) fn error_from_body(status: StatusCode, body: &[u8]) -> DockwireError {
    let mut message = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    if message.is_empty() {
        message = status.canonical_reason().unwrap_or("unknown error").to_string();
    }

    if status == StatusCode::NOT_FOUND {
        DockwireError::NotFound(message)
    } else {
        DockwireError::Api {
            status: status.as_u16(),
            message,
        }
    }
}
