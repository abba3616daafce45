//! Fake daemon for the client tests, served by hyper.
//!
//! Every request is logged and answered by a handler closure with a
//! [`Reply`]. Streamed bodies are fed from a channel so a test can end them
//! cleanly, abort them mid-body, or hold them open.

#![allow(dead_code)]

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use dockwire::{Client, ClientBuilder, MonitorConfig};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Body, Frame, Incoming};
use hyper::header::{CONNECTION, CONTENT_TYPE, UPGRADE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A logged request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }
}

/// How a streamed body ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Terminal chunk, clean end of body.
    Clean,
    /// Connection dropped mid-body.
    Abort,
    /// Body kept open until the client hangs up.
    Hold,
}

pub type UpgradeScript = Box<dyn FnOnce(Vec<u8>) -> Vec<u8> + Send>;

pub enum Reply {
    Full {
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
    },
    Stream {
        chunks: Vec<Vec<u8>>,
        end: StreamEnd,
    },
    /// `101 Switching Protocols`, then read `read_input` raw bytes and write
    /// back whatever `script` returns before closing.
    Upgrade {
        read_input: usize,
        script: UpgradeScript,
    },
    /// Never answer.
    Stall,
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Reply::Full {
            status: 200,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Reply::Full {
            status,
            content_type: "text/plain",
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn stream(chunks: &[&str], end: StreamEnd) -> Self {
        Reply::Stream {
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            end,
        }
    }

    pub fn upgrade(output: Vec<u8>) -> Self {
        Reply::Upgrade {
            read_input: 0,
            script: Box::new(move |_| output),
        }
    }
}

type Handler = Arc<dyn Fn(&Request) -> Reply + Send + Sync>;
type ReplyBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Response body fed from a channel; an `Err` item aborts the connection.
struct ChannelBody {
    rx: mpsc::Receiver<std::io::Result<Bytes>>,
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        self.rx
            .poll_recv(cx)
            .map(|item| item.map(|chunk| chunk.map(Frame::data)))
    }
}

pub struct FakeDaemon {
    pub address: String,
    requests: Arc<Mutex<Vec<Request>>>,
    task: JoinHandle<()>,
    _dir: Option<tempfile::TempDir>,
}

impl FakeDaemon {
    /// Serve on a Unix socket in a fresh temp dir.
    pub async fn unix<H>(handler: H) -> Self
    where
        H: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);
        let log = requests.clone();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, handler.clone(), log.clone()));
            }
        });

        Self {
            address: format!("unix://{}", path.display()),
            requests,
            task,
            _dir: Some(dir),
        }
    }

    /// Serve on TCP loopback.
    pub async fn tcp<H>(handler: H) -> Self
    where
        H: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);
        let log = requests.clone();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, handler.clone(), log.clone()));
            }
        });

        Self {
            address: format!("tcp://127.0.0.1:{}", port),
            requests,
            task,
            _dir: None,
        }
    }

    pub fn builder(&self) -> ClientBuilder {
        Client::builder(self.address.clone())
            .monitor_config(MonitorConfig::default().with_backoff(Duration::from_millis(20)))
    }

    pub fn client(&self) -> Client {
        self.builder().build().unwrap()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, route_suffix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.route().ends_with(route_suffix))
            .count()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<S>(stream: S, handler: Handler, log: Arc<Mutex<Vec<Request>>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        let handler = handler.clone();
        let log = log.clone();
        async move { Ok::<_, Infallible>(respond(request, handler, log).await) }
    });

    let _ = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await;
}

async fn respond(
    mut request: hyper::Request<Incoming>,
    handler: Handler,
    log: Arc<Mutex<Vec<Request>>>,
) -> Response<ReplyBody> {
    let on_upgrade = hyper::upgrade::on(&mut request);
    let (parts, body) = request.into_parts();
    let body = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    let request = Request {
        method: parts.method.to_string(),
        path: parts
            .uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string()),
        headers: parts
            .headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).to_string(),
                )
            })
            .collect(),
        body: body.to_vec(),
    };
    log.lock().unwrap().push(request.clone());

    match handler(&request) {
        Reply::Full {
            status,
            content_type,
            body,
        } => Response::builder()
            .status(status)
            .header(CONTENT_TYPE, content_type)
            .body(
                Full::new(Bytes::from(body))
                    .map_err(|never| match never {})
                    .boxed_unsync(),
            )
            .unwrap(),
        Reply::Stream { chunks, end } => {
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(async move {
                for chunk in chunks {
                    if tx.send(Ok(Bytes::from(chunk))).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                match end {
                    StreamEnd::Clean => {}
                    StreamEnd::Abort => {
                        let _ = tx
                            .send(Err(std::io::Error::new(
                                std::io::ErrorKind::ConnectionAborted,
                                "stream aborted",
                            )))
                            .await;
                    }
                    StreamEnd::Hold => tx.closed().await,
                }
            });

            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "application/json")
                .body(ChannelBody { rx }.boxed_unsync())
                .unwrap()
        }
        Reply::Upgrade { read_input, script } => {
            tokio::spawn(async move {
                let upgraded = match on_upgrade.await {
                    Ok(upgraded) => upgraded,
                    Err(_) => return,
                };
                let mut io = TokioIo::new(upgraded);

                let mut input = Vec::new();
                while input.len() < read_input {
                    let mut buf = [0u8; 256];
                    match io.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => input.extend_from_slice(&buf[..n]),
                    }
                }

                let output = script(input);
                let _ = io.write_all(&output).await;
                let _ = io.shutdown().await;
            });

            Response::builder()
                .status(StatusCode::SWITCHING_PROTOCOLS)
                .header(CONTENT_TYPE, "application/vnd.docker.raw-stream")
                .header(CONNECTION, "Upgrade")
                .header(UPGRADE, "tcp")
                .body(
                    Empty::<Bytes>::new()
                        .map_err(|never| match never {})
                        .boxed_unsync(),
                )
                .unwrap()
        }
        Reply::Stall => std::future::pending().await,
    }
}

/// Multiplexed frame bytes, built independently of the crate under test.
pub fn frame(stream_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![stream_type, 0, 0, 0];
    bytes.extend_from_slice(&u32::try_from(payload.len()).unwrap().to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}
