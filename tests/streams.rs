//! Long-lived streams against a fake daemon: logs, pulls, attach, monitors.
#![cfg(unix)]

mod common;

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use common::{frame, FakeDaemon, Reply, StreamEnd};
use dockwire::{
    AttachIo, AuthConfig, DockwireError, EventsOptions, LogOptions, MonitorState,
};
use tokio::io::AsyncWrite;

const INSPECT_TTY: &str = r#"{"Id":"c1","Config":{"Tty":true},"State":{"Running":true}}"#;
const INSPECT_PLAIN: &str = r#"{"Id":"c1","Config":{"Tty":false},"State":{"Running":true}}"#;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl AsyncWrite for SharedBuf {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn event(n: u32) -> String {
    format!(
        "{{\"status\":\"start\",\"id\":\"c{}\",\"from\":\"busybox\",\"time\":{}}}\n",
        n, n
    )
}

// ============================================================================
// Logs and pulls
// ============================================================================

#[tokio::test]
async fn test_container_logs_are_demultiplexed() {
    let daemon = FakeDaemon::unix(|_| {
        let mut body = frame(1, b"out-A\n");
        body.extend(frame(2, b"err-A\n"));
        body.extend(frame(1, b"out-B\n"));
        let (first, second) = body.split_at(11);
        Reply::Stream {
            chunks: vec![first.to_vec(), second.to_vec()],
            end: StreamEnd::Clean,
        }
    })
    .await;

    let logs = daemon
        .client()
        .container_logs("c1", &LogOptions::default())
        .await
        .unwrap();

    assert_eq!(logs.stdout, b"out-A\nout-B\n");
    assert_eq!(logs.stderr, b"err-A\n");
    assert!(daemon.requests()[0]
        .path
        .starts_with("/v1.43/containers/c1/logs?follow=0&stdout=1&stderr=1"));
}

#[tokio::test]
async fn test_pull_image_reports_progress_and_auth() {
    let daemon = FakeDaemon::unix(|_| {
        Reply::stream(
            &[
                "{\"status\":\"Pulling from library/busybox\",\"id\":\"1.36\"}\r\n",
                "{\"status\":\"Download complete\",\"id\":\"abc\"}\r\n",
            ],
            StreamEnd::Clean,
        )
    })
    .await;

    let mut statuses = Vec::new();
    daemon
        .client()
        .pull_image("busybox:1.36", Some(&AuthConfig::new("alice", "pw")), |msg| {
            statuses.push(msg.status.clone().unwrap_or_default())
        })
        .await
        .unwrap();

    assert_eq!(statuses.len(), 2);
    let request = &daemon.requests()[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/v1.43/images/create?fromImage=busybox&tag=1.36");
    assert!(request.header("x-registry-auth").is_some());
}

#[tokio::test]
async fn test_pull_image_error_record_fails() {
    let daemon = FakeDaemon::unix(|_| {
        Reply::stream(
            &[
                "{\"status\":\"Pulling\"}\n",
                "{\"error\":\"pull access denied\",\"errorDetail\":{\"message\":\"pull access denied\"}}\n",
            ],
            StreamEnd::Clean,
        )
    })
    .await;

    let err = daemon
        .client()
        .pull_image("private/app", None, |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, DockwireError::Progress(ref m) if m.contains("denied")));
}

#[tokio::test]
async fn test_followed_logs_stream_into_sinks_while_open() {
    let daemon = FakeDaemon::unix(|_| Reply::Stream {
        chunks: vec![frame(1, b"hi\n"), frame(2, b"warn\n")],
        end: StreamEnd::Hold,
    })
    .await;
    let client = daemon.client();
    let stdout = SharedBuf::default();
    let stderr = SharedBuf::default();

    let task = {
        let (mut out, mut err) = (stdout.clone(), stderr.clone());
        tokio::spawn(async move {
            let options = LogOptions {
                follow: true,
                ..Default::default()
            };
            client
                .stream_logs("c1", &options, Some(&mut out), Some(&mut err))
                .await
        })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while stderr.contents() != b"warn\n" {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(stdout.contents(), b"hi\n");
    assert!(!task.is_finished());
    assert!(daemon.requests()[0].path.contains("follow=1"));
    task.abort();
}

#[tokio::test]
async fn test_stream_logs_summary_at_clean_end() {
    let daemon = FakeDaemon::unix(|_| {
        let mut body = frame(1, b"out\n");
        body.extend(frame(2, b"err\n"));
        Reply::Stream {
            chunks: vec![body],
            end: StreamEnd::Clean,
        }
    })
    .await;

    let mut stdout = SharedBuf::default();
    let summary = daemon
        .client()
        .stream_logs("c1", &LogOptions::default(), Some(&mut stdout), None::<&mut SharedBuf>)
        .await
        .unwrap();

    assert_eq!(stdout.contents(), b"out\n");
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.stdout_bytes, 4);
    assert_eq!(summary.discarded_bytes, 4);
}

#[tokio::test]
async fn test_buffered_logs_reject_follow() {
    let daemon = FakeDaemon::unix(|_| Reply::json("{}")).await;
    let options = LogOptions {
        follow: true,
        ..Default::default()
    };

    let err = daemon.client().container_logs("c1", &options).await.unwrap_err();
    assert!(matches!(err, DockwireError::InvalidArgument(_)));
    let err = daemon
        .client()
        .container_logs_raw("c1", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, DockwireError::InvalidArgument(_)));
    assert!(daemon.requests().is_empty());
}

#[tokio::test]
async fn test_pull_by_digest_sends_no_tag() {
    let daemon = FakeDaemon::unix(|_| {
        Reply::stream(&["{\"status\":\"Digest: sha256:abcdef\"}\n"], StreamEnd::Clean)
    })
    .await;

    daemon
        .client()
        .pull_image("busybox@sha256:abcdef", None, |_| {})
        .await
        .unwrap();

    assert_eq!(
        daemon.requests()[0].path,
        "/v1.43/images/create?fromImage=busybox%40sha256%3Aabcdef"
    );
}

// ============================================================================
// Attach
// ============================================================================

#[tokio::test]
async fn test_attach_multiplexed() {
    let daemon = FakeDaemon::unix(|req| {
        if req.route().ends_with("/json") {
            return Reply::json(INSPECT_PLAIN);
        }
        assert_eq!(req.header("upgrade"), Some("tcp"));
        let mut output = frame(1, b"out-A");
        output.extend(frame(2, b"err-A"));
        output.extend(frame(1, b"out-B"));
        Reply::upgrade(output)
    })
    .await;

    let out = SharedBuf::default();
    let err = SharedBuf::default();
    daemon
        .client()
        .attach_container("c1", AttachIo::new().stdout(out.clone()).stderr(err.clone()))
        .await
        .unwrap();

    assert_eq!(out.contents(), b"out-Aout-B");
    assert_eq!(err.contents(), b"err-A");

    let attach = daemon
        .requests()
        .into_iter()
        .find(|r| r.route().ends_with("/attach"))
        .unwrap();
    assert_eq!(attach.method, "POST");
    assert_eq!(
        attach.path,
        "/v1.43/containers/c1/attach?stream=1&stdin=0&stdout=1&stderr=1&logs=0"
    );
}

#[tokio::test]
async fn test_attach_multiplexed_with_stdin() {
    let daemon = FakeDaemon::unix(|req| {
        if req.route().ends_with("/json") {
            return Reply::json(INSPECT_PLAIN);
        }
        Reply::Upgrade {
            read_input: 4,
            script: Box::new(|input| frame(1, &input)),
        }
    })
    .await;

    let out = SharedBuf::default();
    daemon
        .client()
        .attach_container("c1", AttachIo::new().stdin(&b"ping"[..]).stdout(out.clone()))
        .await
        .unwrap();

    assert_eq!(out.contents(), b"ping");
}

#[tokio::test]
async fn test_attach_tty_passthrough() {
    let daemon = FakeDaemon::unix(|req| {
        if req.route().ends_with("/json") {
            return Reply::json(INSPECT_TTY);
        }
        Reply::upgrade(b"\x01\x00\x00\x00raw terminal bytes".to_vec())
    })
    .await;

    let out = SharedBuf::default();
    daemon
        .client()
        .attach_container("c1", AttachIo::new().stdout(out.clone()))
        .await
        .unwrap();

    assert_eq!(out.contents(), b"\x01\x00\x00\x00raw terminal bytes");
}

#[tokio::test]
async fn test_attach_fails_when_inspect_fails() {
    let daemon = FakeDaemon::unix(|_| Reply::status(404, "no such container")).await;

    let err = daemon
        .client()
        .attach_container("ghost", AttachIo::new().stdout(SharedBuf::default()))
        .await
        .unwrap_err();

    assert!(matches!(err, DockwireError::Inspect(_)));
    assert!(err.is_not_found());
    assert_eq!(daemon.count("/attach"), 0);
}

#[tokio::test]
async fn test_attach_without_upgrade_is_protocol_error() {
    let daemon = FakeDaemon::unix(|req| {
        if req.route().ends_with("/json") {
            return Reply::json(INSPECT_PLAIN);
        }
        Reply::json("{}")
    })
    .await;

    let err = daemon
        .client()
        .attach_container("c1", AttachIo::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DockwireError::Protocol(_)));
}

// ============================================================================
// Monitors
// ============================================================================

#[tokio::test]
async fn test_events_arrive_in_order() {
    let daemon = FakeDaemon::unix(|_| {
        let records: Vec<String> = (1..=5).map(event).collect();
        let joined = records.concat();
        let (a, b) = joined.split_at(joined.len() / 2);
        Reply::Stream {
            chunks: vec![a.as_bytes().to_vec(), b.as_bytes().to_vec()],
            end: StreamEnd::Hold,
        }
    })
    .await;

    let mut events = daemon.client().monitor_events(&EventsOptions::default());
    events.start().unwrap();

    let mut ids = Vec::new();
    for _ in 0..5 {
        let record = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        ids.push(record.id);
    }

    assert_eq!(ids, vec!["c1", "c2", "c3", "c4", "c5"]);
    assert_eq!(daemon.count("/events"), 1);
    events.shutdown().await;
}

#[tokio::test]
async fn test_events_resume_after_unexpected_close() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = attempts.clone();
    let daemon = FakeDaemon::unix(move |_| match seen.fetch_add(1, Ordering::SeqCst) {
        0 => Reply::Stream {
            chunks: vec![
                event(1).into_bytes(),
                event(2).into_bytes(),
                b"{\"status\":\"sta".to_vec(),
            ],
            end: StreamEnd::Abort,
        },
        1 => Reply::status(500, "daemon restarting"),
        _ => Reply::Stream {
            chunks: vec![event(3).into_bytes(), event(4).into_bytes()],
            end: StreamEnd::Hold,
        },
    })
    .await;

    let mut events = daemon.client().monitor_events(&EventsOptions::default());
    events.start().unwrap();

    let mut ids = Vec::new();
    for _ in 0..4 {
        let record = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .expect("monitor must survive the dropped connection");
        ids.push(record.id);
    }

    assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
    assert!(attempts.load(Ordering::SeqCst) >= 3);
    events.shutdown().await;
}

#[tokio::test]
async fn test_stop_ends_delivery_within_backoff() {
    let daemon = FakeDaemon::unix(|_| {
        Reply::Stream {
            chunks: (1..=50).map(|n| event(n).into_bytes()).collect(),
            end: StreamEnd::Hold,
        }
    })
    .await;

    let mut events = daemon.client().monitor_events(&EventsOptions::default());
    events.start().unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id, "c1");

    events.stop();
    assert_eq!(events.state(), MonitorState::Stopped);
    assert!(events.recv().await.is_none());

    tokio::time::timeout(Duration::from_millis(20 + 500), events.join())
        .await
        .expect("monitor task outlived the stop request");
}

#[tokio::test]
async fn test_stats_monitor_path_and_decoding() {
    let daemon = FakeDaemon::unix(|_| {
        Reply::stream(
            &["{\"read\":\"t1\",\"memory_stats\":{\"usage\":100,\"limit\":1000}}\n"],
            StreamEnd::Hold,
        )
    })
    .await;

    let mut stats = daemon.client().monitor_stats("c1");
    stats.start().unwrap();

    let sample = tokio::time::timeout(Duration::from_secs(5), stats.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sample.read, "t1");
    assert_eq!(sample.memory_stats.usage, Some(100));
    assert_eq!(
        daemon.requests()[0].path,
        "/v1.43/containers/c1/stats?stream=1"
    );
    stats.shutdown().await;
}
