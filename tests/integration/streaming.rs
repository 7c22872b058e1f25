//! Streaming relay integration tests
//!
//! These run the proxy and a hand-built upstream over real TCP so chunk
//! timing and connection teardown behave as they do in production.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use bytes::Bytes;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use crate::common::{constants::TEST_SECRET, spawn_proxy, spawn_router};
use crate::mocks::MockUpstream;

/// Sets the flag when the upstream body stream is dropped
struct DropSignal(Arc<AtomicBool>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

async fn post_stream(addr: SocketAddr) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .bearer_auth(TEST_SECRET)
        .json(&json!({"model": "qwen", "messages": [], "stream": true}))
        .send()
        .await
        .expect("proxy request failed")
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

/// Read one request, head and body, off a raw upstream socket
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}

/// Upstream that starts a chunked SSE response and hangs up after one chunk
async fn spawn_truncating_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\n\
                  content-type: text/event-stream\r\n\
                  transfer-encoding: chunked\r\n\r\n\
                  9\r\ndata: 1\n\n\r\n",
            )
            .await
            .unwrap();
        socket.shutdown().await.ok();
    });
    addr
}

#[tokio::test]
async fn test_chunks_arrive_before_upstream_finishes() {
    let release = Arc::new(Notify::new());
    let upstream_release = release.clone();

    let upstream = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let release = upstream_release.clone();
            async move {
                let events = async_stream::stream! {
                    yield Ok::<_, std::io::Error>(Bytes::from_static(b"data: 1\n\n"));
                    release.notified().await;
                    yield Ok(Bytes::from_static(b"data: 2\n\n"));
                };
                // No content type, the proxy must supply one
                Response::new(Body::from_stream(events))
            }
        }),
    );
    let upstream_addr = spawn_router(upstream).await;
    let (proxy_addr, _state) = spawn_proxy(&format!("http://{}", upstream_addr)).await;

    let response = post_stream(proxy_addr).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let mut body = response.bytes_stream();
    let mut received: Vec<u8> = Vec::new();
    while !received.ends_with(b"data: 1\n\n") {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("first event was held back")
            .unwrap()
            .unwrap();
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, b"data: 1\n\n".to_vec());

    // The upstream has not produced the second event yet
    release.notify_one();
    while let Some(chunk) = body.next().await {
        received.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(received, b"data: 1\n\ndata: 2\n\n".to_vec());
}

#[tokio::test]
async fn test_upstream_content_type_is_kept() {
    let upstream = MockUpstream::start().await;
    upstream
        .mock_sse(
            "/v1/chat/completions",
            &[r#"{"choices":[{"delta":{"content":"Hi"}}]}"#, "[DONE]"],
        )
        .await;
    let (proxy_addr, state) = spawn_proxy(&upstream.uri()).await;

    let response = post_stream(proxy_addr).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream; charset=utf-8"
    );
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");

    let body = response.text().await.unwrap();
    assert_eq!(
        body,
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n"
    );
    assert!(wait_until(|| state.relay.tracker().active() == 0).await);
}

#[tokio::test]
async fn test_stream_flag_false_is_buffered() {
    let upstream = MockUpstream::start().await;
    upstream
        .mock_raw(
            "POST",
            "/v1/chat/completions",
            200,
            "application/json",
            br#"{"id": "cmpl-1"}"#.to_vec(),
        )
        .await;
    let (proxy_addr, state) = spawn_proxy(&upstream.uri()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", proxy_addr))
        .bearer_auth(TEST_SECRET)
        .json(&json!({"model": "qwen", "messages": [], "stream": false}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    // Buffered responses are re-encoded, so the whitespace is gone
    assert_eq!(response.text().await.unwrap(), r#"{"id":"cmpl-1"}"#);
    assert_eq!(state.relay.tracker().active(), 0);
}

#[tokio::test]
async fn test_caller_disconnect_releases_upstream() {
    let upstream_dropped = Arc::new(AtomicBool::new(false));
    let signal = upstream_dropped.clone();

    let upstream = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let signal = DropSignal(signal.clone());
            async move {
                let events = async_stream::stream! {
                    let _signal = signal;
                    let mut ticks = tokio::time::interval(Duration::from_millis(20));
                    let mut n = 0u64;
                    loop {
                        ticks.tick().await;
                        n += 1;
                        yield Ok::<_, std::io::Error>(Bytes::from(format!("data: {}\n\n", n)));
                    }
                };
                (
                    [(header::CONTENT_TYPE, "text/event-stream")],
                    Body::from_stream(events),
                )
                    .into_response()
            }
        }),
    );
    let upstream_addr = spawn_router(upstream).await;
    let (proxy_addr, state) = spawn_proxy(&format!("http://{}", upstream_addr)).await;

    let response = post_stream(proxy_addr).await;
    let mut body = response.bytes_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(first.starts_with(b"data: 1\n\n"));
    assert_eq!(state.relay.tracker().active(), 1);

    drop(body);

    assert!(
        wait_until(|| state.relay.tracker().active() == 0).await,
        "proxy kept the relay open after the caller left"
    );
    assert!(
        wait_until(|| upstream_dropped.load(Ordering::SeqCst)).await,
        "upstream stream was not released"
    );
}

#[tokio::test]
async fn test_upstream_failure_mid_stream_terminates_body() {
    let upstream_addr = spawn_truncating_upstream().await;
    let (proxy_addr, state) = spawn_proxy(&format!("http://{}", upstream_addr)).await;

    let response = post_stream(proxy_addr).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let mut body = response.bytes_stream();
    let first = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("first chunk never arrived");
    assert_eq!(first.unwrap().unwrap(), Bytes::from_static(b"data: 1\n\n"));

    // The partial chunk is kept, then the body ends in an error instead of hanging
    let end = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("body hung after the upstream hung up");
    assert!(matches!(end, Some(Err(_))), "body ended cleanly: {:?}", end);

    assert!(
        wait_until(|| state.relay.tracker().active() == 0).await,
        "relay still counted as active after the upstream failed"
    );
}
