//! Minimal hand-rolled HTTP/SSE control surface.
//!
//! A bare `TcpListener` accept loop, one task per connection, a
//! `httparse`-parsed request line, and an SSE body written straight to the
//! socket. No routing framework, no TLS, no keep-alive pipelining — this
//! stays a thin boundary; everything it does delegates straight into
//! [`crate::runner::Runner`].

use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::config::TestConfig;
use crate::runner::Runner;
use crate::telemetry::BroadcastTelemetrySink;

const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Accept loop: binds `addr` and spawns one task per connection. Runs until
/// the listener errors (the caller decides whether that's fatal).
pub async fn serve(
    addr: &str,
    runner: Arc<Runner>,
    telemetry: Arc<BroadcastTelemetrySink>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr, "control surface listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let runner = runner.clone();
        let telemetry = telemetry.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, runner, telemetry).await {
                warn!(%peer, "connection error: {e}");
            }
        });
    }
}

struct ParsedRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

/// Read one HTTP request off `stream`: headers first, then exactly
/// `Content-Length` bytes of body. Returns `Ok(None)` on a clean EOF before
/// a full request arrived (client closed without sending anything).
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<ParsedRequest>> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request headers too large",
            ));
        }
    };

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut parsed = httparse::Request::new(&mut headers);
    let status = parsed
        .parse(&buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    if status.is_partial() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "incomplete request line",
        ));
    }

    let method = parsed.method.unwrap_or("GET").to_string();
    let path = parsed.path.unwrap_or("/").to_string();
    let content_length = parsed
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        .and_then(|h| std::str::from_utf8(h.value).ok())
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(ParsedRequest { method, path, body }))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

async fn handle_connection(
    mut stream: TcpStream,
    runner: Arc<Runner>,
    telemetry: Arc<BroadcastTelemetrySink>,
) -> std::io::Result<()> {
    let req = match read_request(&mut stream).await? {
        Some(r) => r,
        None => return Ok(()),
    };

    // Strip a query string; this surface has no routes that take one.
    let path = req.path.split('?').next().unwrap_or("/");

    match (req.method.as_str(), path) {
        ("GET", "/status") => {
            let body = serde_json::json!({ "active": runner.is_active() });
            write_json(&mut stream, 200, &body).await
        }
        ("POST", "/start") => handle_start(&mut stream, &runner, &req.body).await,
        ("POST", "/stop") => {
            runner.stop_test();
            write_json(&mut stream, 200, &serde_json::json!({ "stopped": true })).await
        }
        ("POST", "/marker") => handle_marker(&mut stream, &runner, &req.body).await,
        ("GET", "/stream") => stream_events(stream, telemetry).await,
        _ => write_json(&mut stream, 404, &serde_json::json!({ "error": "not found" })).await,
    }
}

async fn handle_start(
    stream: &mut TcpStream,
    runner: &Arc<Runner>,
    body: &[u8],
) -> std::io::Result<()> {
    // Optimistic check: the authoritative reject still happens inside
    // `Runner::start_test`'s atomic compare-exchange. A second request
    // landing in the race window gets its rejection logged rather than
    // returned, since the HTTP accept has already been sent.
    if runner.is_active() {
        return write_json(stream, 409, &serde_json::json!({ "error": "already active" })).await;
    }

    let config: TestConfig = match serde_json::from_slice(body) {
        Ok(c) => c,
        Err(e) => {
            return write_json(
                stream,
                400,
                &serde_json::json!({ "error": format!("invalid config: {e}") }),
            )
            .await
        }
    };
    if let Err(e) = config.validate() {
        return write_json(stream, 400, &serde_json::json!({ "error": e.to_string() })).await;
    }

    let runner = runner.clone();
    tokio::spawn(async move {
        if let Err(e) = runner.start_test(config).await {
            warn!("test run rejected: {e}");
        }
    });
    write_json(stream, 202, &serde_json::json!({ "accepted": true })).await
}

#[derive(Deserialize)]
struct MarkerBody {
    message: String,
}

async fn handle_marker(
    stream: &mut TcpStream,
    runner: &Arc<Runner>,
    body: &[u8],
) -> std::io::Result<()> {
    let parsed: MarkerBody = match serde_json::from_slice(body) {
        Ok(m) => m,
        Err(e) => {
            return write_json(
                stream,
                400,
                &serde_json::json!({ "error": format!("invalid body: {e}") }),
            )
            .await
        }
    };
    match runner.add_marker(&parsed.message) {
        Ok(()) => write_json(stream, 200, &serde_json::json!({ "accepted": true })).await,
        Err(e) => {
            write_json(
                stream,
                403,
                &serde_json::json!({ "accepted": false, "error": e.to_string() }),
            )
            .await
        }
    }
}

async fn stream_events(
    mut stream: TcpStream,
    telemetry: Arc<BroadcastTelemetrySink>,
) -> std::io::Result<()> {
    let headers = "HTTP/1.1 200 OK\r\n\
         Content-Type: text/event-stream\r\n\
         Cache-Control: no-cache\r\n\
         Connection: keep-alive\r\n\
         Access-Control-Allow-Origin: *\r\n\r\n";
    stream.write_all(headers.as_bytes()).await?;

    let mut points = telemetry.subscribe_points();
    let mut done = telemetry.subscribe_done();

    loop {
        tokio::select! {
            point = points.recv() => {
                match point {
                    Ok(p) => {
                        let json = serde_json::to_string(&p).unwrap_or_default();
                        let sse = format!("data: {json}\n\n");
                        if stream.write_all(sse.as_bytes()).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return Ok(()),
                }
            }
            signal = done.recv() => {
                if signal.is_ok() {
                    let _ = stream.write_all(b"event: done\ndata: {}\n\n").await;
                }
                return Ok(());
            }
        }
    }
}

async fn write_json(
    stream: &mut TcpStream,
    status: u16,
    body: &serde_json::Value,
) -> std::io::Result<()> {
    let body = body.to_string();
    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        reason_phrase(status),
        body.len(),
    );
    stream.write_all(response.as_bytes()).await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        _ => "Internal Server Error",
    }
}
