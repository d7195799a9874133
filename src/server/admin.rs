//! Hand-rolled HTTP/1.1 admin endpoint: `/healthz`, `/readyz`, `/metrics`.
//!
//! Kept deliberately separate from the SPDY bridging core (§6) and from
//! hyper — the only other HTTP surface this crate speaks is the raw
//! outbound client in `httpclient`, so the admin responder reuses the same
//! "parse with httparse, write the response by hand" approach rather than
//! reintroducing a framework dependency for three static routes.

use crate::error::ProxyError;
use crate::metrics::Metrics;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

const MAX_REQUEST_HEAD: usize = 8 * 1024;

pub async fn run(addr: &str, metrics: Metrics) -> Result<(), ProxyError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ProxyError::Startup(format!("admin bind on {addr} failed: {e}")))?;
    info!(addr, "server: admin listening");

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| ProxyError::Io(format!("admin accept failed: {e}")))?;
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, metrics).await {
                debug!(error = %e, "server: admin connection error");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, metrics: Metrics) -> Result<(), ProxyError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let path = loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| ProxyError::Io(format!("admin read failed: {e}")))?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_REQUEST_HEAD {
            return Err(ProxyError::Protocol("admin request head too large".to_string()));
        }

        let mut headers = [httparse::EMPTY_HEADER; 16];
        let mut req = httparse::Request::new(&mut headers);
        match req
            .parse(&buf)
            .map_err(|e| ProxyError::Protocol(format!("malformed admin request: {e}")))?
        {
            httparse::Status::Complete(_) => break req.path.unwrap_or("/").to_string(),
            httparse::Status::Partial => continue,
        }
    };

    let (status, content_type, body) = route(&path, &metrics);
    let response = format!(
        "HTTP/1.1 {status} {}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        reason_phrase(status),
        body.len(),
    );

    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| ProxyError::Io(format!("admin write failed: {e}")))?;
    Ok(())
}

fn route(path: &str, metrics: &Metrics) -> (u16, &'static str, String) {
    match path {
        "/healthz" => (200, "application/json", r#"{"status":"ok"}"#.to_string()),
        "/readyz" => (200, "application/json", r#"{"status":"ready"}"#.to_string()),
        "/metrics" => (
            200,
            "text/plain; version=0.0.4; charset=utf-8",
            metrics.render(),
        ),
        _ => (404, "application/json", r#"{"error":"not found"}"#.to_string()),
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        _ => "",
    }
}
