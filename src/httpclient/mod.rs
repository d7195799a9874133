//! HTTP Client Pool: one raw TCP/TLS connection per transaction, no
//! connection reuse (matches the original's one-shot curl easy handle per
//! request). Exposes `fetch` (spawn one outbound transaction) and
//! [`ClientPool`] (add/remove/in-flight accounting for the event loop and
//! metrics layer).

mod stream;
mod tls;

pub use stream::OriginStream;

use crate::error::ProxyError;
use crate::headers::{parse_origin_response, OriginResponseHead};
use crate::pump::{body_channel, ResponseBody};
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(60);
const READ_CHUNK: usize = 16 * 1024;

/// One fully-resolved outbound request, ready to be serialized to the wire.
pub struct OutboundRequest {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path_and_query: String,
    pub version: &'static str,
    pub header_lines: Vec<String>,
}

/// Handles returned to the caller once the fetch task has been spawned.
pub struct OutboundFetch {
    pub head_rx: oneshot::Receiver<Result<OriginResponseHead, ProxyError>>,
    pub body: ResponseBody,
    pub join: JoinHandle<()>,
}

/// Registry of in-flight outbound fetches, keyed by transaction id.
pub struct ClientPool {
    inflight: DashMap<u64, JoinHandle<()>>,
    next_id: AtomicU64,
}

impl ClientPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inflight: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(&self, id: u64, join: JoinHandle<()>) {
        self.inflight.insert(id, join);
        metrics::gauge!("spdy2http_transactions_in_flight").increment(1.0);
    }

    /// Removes a transaction from the pool. A missing entry is logged, not
    /// treated as fatal (§4.4: "a pool-removal inconsistency is logged but
    /// not fatal").
    pub fn remove(&self, id: u64) {
        match self.inflight.remove(&id) {
            Some(_) => metrics::gauge!("spdy2http_transactions_in_flight").decrement(1.0),
            None => warn!(transaction_id = id, "httpclient: pool-removal inconsistency"),
        }
    }

    pub fn abort(&self, id: u64) {
        if let Some((_, join)) = self.inflight.remove(&id) {
            join.abort();
            metrics::gauge!("spdy2http_transactions_in_flight").decrement(1.0);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

/// Connect, send the request, and spawn a task that reads the origin
/// response head then streams the body into a bounded channel.
pub async fn fetch(req: OutboundRequest, origin_verbose: bool) -> Result<OutboundFetch, ProxyError> {
    let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, connect(&req))
        .await
        .map_err(|_| ProxyError::Io(format!("connect to {}:{} timed out", req.host, req.port)))??;

    let wire = serialize_request(&req);
    if origin_verbose {
        debug!(request = %wire, "httpclient: sending request");
    }
    tokio::time::timeout(CONNECT_TIMEOUT, conn.write_all(wire.as_bytes()))
        .await
        .map_err(|_| ProxyError::Io("write to origin timed out".to_string()))?
        .map_err(|e| ProxyError::Io(format!("write to origin failed: {e}")))?;

    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body) = body_channel();

    let join = tokio::spawn(async move {
        pump_origin(conn, head_tx, body_tx, origin_verbose).await;
    });

    Ok(OutboundFetch { head_rx, body, join })
}

async fn connect(req: &OutboundRequest) -> Result<OriginStream, ProxyError> {
    let addr = format!("{}:{}", req.host, req.port);
    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| ProxyError::Io(format!("connect to {addr} failed: {e}")))?;
    let _ = tcp.set_nodelay(true);

    if req.scheme.eq_ignore_ascii_case("https") {
        let connector = tokio_rustls::TlsConnector::from(tls::insecure_client_config());
        let server_name = rustls::pki_types::ServerName::try_from(req.host.clone())
            .map_err(|_| ProxyError::Io(format!("invalid TLS server name: {}", req.host)))?
            .to_owned();
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ProxyError::Io(format!("TLS handshake with {addr} failed: {e}")))?;
        Ok(OriginStream::Tls(Box::new(tls_stream)))
    } else {
        Ok(OriginStream::Plain(tcp))
    }
}

fn serialize_request(req: &OutboundRequest) -> String {
    let mut out = format!("{} {} {}\r\n", req.method, req.path_and_query, req.version);
    for line in &req.header_lines {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out
}

/// Reads the origin's status line + headers, forwards that to `head_tx`,
/// then streams whatever body bytes follow into `body_tx` until the
/// origin closes the connection (there is no keep-alive to bound the body
/// by anything other than EOF in this one-shot-per-transaction model).
async fn pump_origin(
    mut conn: OriginStream,
    head_tx: oneshot::Sender<Result<OriginResponseHead, ProxyError>>,
    body_tx: mpsc::Sender<Bytes>,
    origin_verbose: bool,
) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let head = match read_head(&mut conn, &mut buf).await {
        Ok(head) => head,
        Err(e) => {
            let _ = head_tx.send(Err(e));
            return;
        }
    };

    if origin_verbose {
        debug!(status = head.status_code, "httpclient: received origin headers");
    }

    let leftover = buf.split_off(head.consumed);
    if head_tx.send(Ok(head)).is_err() {
        return;
    }

    if !leftover.is_empty() && body_tx.send(leftover.freeze()).await.is_err() {
        return;
    }

    loop {
        let mut chunk = vec![0u8; READ_CHUNK];
        let n = match tokio::time::timeout(TOTAL_TIMEOUT, conn.read(&mut chunk)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(error = %e, "httpclient: read from origin failed mid-body");
                return;
            }
            Err(_) => {
                warn!("httpclient: origin body read timed out");
                return;
            }
        };
        if n == 0 {
            return;
        }
        chunk.truncate(n);
        if body_tx.send(Bytes::from(chunk)).await.is_err() {
            return;
        }
    }
}

async fn read_head(
    conn: &mut OriginStream,
    buf: &mut BytesMut,
) -> Result<OriginResponseHead, ProxyError> {
    loop {
        let mut chunk = [0u8; READ_CHUNK];
        let n = tokio::time::timeout(TOTAL_TIMEOUT, conn.read(&mut chunk))
            .await
            .map_err(|_| ProxyError::Io("origin response timed out".to_string()))?
            .map_err(|e| ProxyError::Io(format!("read from origin failed: {e}")))?;
        if n == 0 {
            return Err(ProxyError::Protocol(
                "origin closed connection before sending a response".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head) = parse_origin_response(buf)? {
            return Ok(head);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_request_builds_request_line_and_blank_terminator() {
        let req = OutboundRequest {
            method: "GET".to_string(),
            scheme: "http".to_string(),
            host: "origin.test".to_string(),
            port: 80,
            path_and_query: "/a?b=1".to_string(),
            version: "HTTP/1.1",
            header_lines: vec!["Host: origin.test".to_string(), "Accept: a, b".to_string()],
        };
        let wire = serialize_request(&req);
        assert_eq!(
            wire,
            "GET /a?b=1 HTTP/1.1\r\nHost: origin.test\r\nAccept: a, b\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn client_pool_tracks_registration_and_removal() {
        let pool = ClientPool::new();
        let id = pool.next_id();
        let join = tokio::spawn(async {});
        pool.register(id, join);
        assert_eq!(pool.in_flight(), 1);
        pool.remove(id);
        assert_eq!(pool.in_flight(), 0);
    }
}
