//! Per-connection SPDY/2 actor: one task owns the frame read/write loop
//! for a connection (accepting multiple interleaved streams), and spawns
//! one task per inbound request to drive that request's HTTP fetch and
//! feed header/body/done events back over a channel (§4.5).

use crate::config::GlobalOptions;
use crate::error::ProxyError;
use crate::headers::HeaderMultiMap;
use crate::httpclient::{ClientPool, OutboundFetch};
use crate::proxy::handler::{self, HandledRequest};
use crate::spdy::frame::{self, Frame};
use crate::spdy::zlib_dict::HeaderCodec;
use crate::spdy::InboundRequest;
use bytes::{Bytes, BytesMut};
use rustls_pemfile::{certs, private_key};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Idle-connection timeout: mirrors the original SPDY session timeout
/// default (§4.5, §5).
const IDLE_TIMEOUT: Duration = Duration::from_secs(1800);
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_DATA_CHUNK: usize = 16 * 1024;

/// Build the inbound TLS server config from a PEM cert/key pair,
/// advertising `spdy/2` over ALPN.
pub fn build_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, ProxyError> {
    let cert_file = std::fs::File::open(cert_path)
        .map_err(|e| ProxyError::Startup(format!("cannot open certificate {}: {e}", cert_path.display())))?;
    let key_file = std::fs::File::open(key_path)
        .map_err(|e| ProxyError::Startup(format!("cannot open certificate key {}: {e}", key_path.display())))?;

    let cert_chain = certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProxyError::Startup(format!("invalid certificate PEM: {e}")))?;
    let key = private_key(&mut BufReader::new(key_file))
        .map_err(|e| ProxyError::Startup(format!("invalid key PEM: {e}")))?
        .ok_or_else(|| ProxyError::Startup("no private key found in key file".to_string()))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| ProxyError::Startup(format!("invalid TLS certificate/key pair: {e}")))?;
    config.alpn_protocols = vec![b"spdy/2".to_vec()];

    Ok(Arc::new(config))
}

/// The SPDY daemon: accepts TLS connections and spawns one connection
/// actor per accepted socket.
pub struct SpdyDaemon {
    opts: Arc<GlobalOptions>,
    pool: Arc<ClientPool>,
    acceptor: TlsAcceptor,
}

impl SpdyDaemon {
    pub fn new(opts: Arc<GlobalOptions>, pool: Arc<ClientPool>, tls_config: Arc<ServerConfig>) -> Self {
        Self {
            opts,
            pool,
            acceptor: TlsAcceptor::from(tls_config),
        }
    }

    /// Runs the accept loop until `shutdown` is notified. New connections
    /// stop being accepted at that point; already-accepted connections
    /// continue running independently (the bounded drain window is
    /// enforced by the caller, per §4.5).
    pub async fn run(&self, listener: TcpListener, shutdown: Arc<Notify>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            let acceptor = self.acceptor.clone();
                            let opts = self.opts.clone();
                            let pool = self.pool.clone();
                            metrics::counter!("spdy2http_connections_total", "status" => "accepted").increment(1);
                            tokio::spawn(async move {
                                match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                                    Ok(Ok(tls_stream)) => {
                                        metrics::gauge!("spdy2http_connections_active").increment(1.0);
                                        if let Err(e) = handle_connection(tls_stream, opts, pool).await {
                                            debug!(peer = %peer_addr, error = %e, "spdy: connection ended");
                                        }
                                        metrics::gauge!("spdy2http_connections_active").decrement(1.0);
                                    }
                                    Ok(Err(e)) => warn!(peer = %peer_addr, error = %e, "spdy: TLS handshake failed"),
                                    Err(_) => warn!(peer = %peer_addr, "spdy: TLS handshake timed out"),
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "spdy: accept failed");
                            metrics::counter!("spdy2http_connections_total", "status" => "error").increment(1);
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("spdy: accept loop stopping, no longer taking new connections");
                    break;
                }
            }
        }
    }
}

/// Commands sent from per-request tasks to the connection's single writer
/// task, which serializes all outbound frames for streams it owns.
enum ConnCommand {
    SynReply {
        stream_id: u32,
        status: u16,
        status_text: String,
        version: String,
        headers: HeaderMultiMap,
    },
    Data {
        stream_id: u32,
        bytes: Bytes,
        fin: bool,
    },
    Ping {
        id: u32,
    },
}

/// Per-stream handle handed to the Request Handler / Response Pump so
/// they can queue a response and stream body bytes without touching the
/// connection's socket directly.
#[derive(Clone)]
pub struct ResponseSink {
    tx: mpsc::UnboundedSender<ConnCommand>,
    stream_id: u32,
}

impl ResponseSink {
    pub fn queue_response(
        &self,
        status: u16,
        status_text: &str,
        version: &str,
        headers: HeaderMultiMap,
    ) -> Result<(), ProxyError> {
        self.tx
            .send(ConnCommand::SynReply {
                stream_id: self.stream_id,
                status,
                status_text: status_text.to_string(),
                version: version.to_string(),
                headers,
            })
            .map_err(|_| ProxyError::Io("connection writer has shut down".to_string()))
    }

    pub fn write_data(&self, payload: Bytes, fin: bool) -> Result<(), ProxyError> {
        self.tx
            .send(ConnCommand::Data {
                stream_id: self.stream_id,
                bytes: payload,
                fin,
            })
            .map_err(|_| ProxyError::Io("connection writer has shut down".to_string()))
    }
}

async fn handle_connection<S>(
    stream: tokio_rustls::server::TlsStream<S>,
    opts: Arc<GlobalOptions>,
    pool: Arc<ClientPool>,
) -> Result<(), ProxyError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut read_half, write_half) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel::<ConnCommand>();

    let writer = tokio::spawn(run_writer(write_half, rx));

    let mut inbound_codec = HeaderCodec::new();
    let mut buf = BytesMut::with_capacity(16 * 1024);
    let mut read_chunk = vec![0u8; 16 * 1024];

    loop {
        let frame = loop {
            if let Some(frame) = frame::decode(&mut buf)? {
                break frame;
            }
            let n = match tokio::time::timeout(IDLE_TIMEOUT, read_half.read(&mut read_chunk)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(ProxyError::Io(format!("connection read failed: {e}"))),
                Err(_) => return Err(ProxyError::Io("connection idle timeout".to_string())),
            };
            if n == 0 {
                drop(tx);
                let _ = writer.await;
                return Ok(());
            }
            buf.extend_from_slice(&read_chunk[..n]);
        };

        match frame {
            Frame::SynStream {
                stream_id,
                header_block,
                ..
            } => {
                let headers = inbound_codec.decompress_headers(&header_block)?;
                match inbound_request_from_block(headers) {
                    Ok(req) => {
                        let sink = ResponseSink {
                            tx: tx.clone(),
                            stream_id,
                        };
                        let opts = opts.clone();
                        let pool = pool.clone();
                        tokio::spawn(async move {
                            dispatch(stream_id as u64, req, sink, opts, pool).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "spdy: malformed SYN_STREAM");
                        let _ = tx.send(ConnCommand::SynReply {
                            stream_id,
                            status: e.status_code(),
                            status_text: String::new(),
                            version: "HTTP/1.1".to_string(),
                            headers: HeaderMultiMap::new(),
                        });
                        let _ = tx.send(ConnCommand::Data {
                            stream_id,
                            bytes: Bytes::new(),
                            fin: true,
                        });
                    }
                }
            }
            Frame::Ping { id } => {
                let _ = tx.send(ConnCommand::Ping { id });
            }
            Frame::Settings { .. } => {
                // Accepted and not acted upon — this revision has no
                // flow-control tuning to apply.
            }
            Frame::WindowUpdate { .. } => {}
            Frame::RstStream { stream_id, .. } => {
                debug!(stream_id, "spdy: client reset stream");
            }
            Frame::Goaway { .. } => {
                drop(tx);
                let _ = writer.await;
                return Ok(());
            }
            Frame::Data { .. } | Frame::SynReply { .. } => {
                // Request bodies are not forwarded in this revision
                // (Non-goal); a client-sent SYN_REPLY is nonsensical for
                // a server role and is ignored rather than torn down.
            }
        }
    }
}

async fn run_writer<W>(mut write_half: W, mut rx: mpsc::UnboundedReceiver<ConnCommand>)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut codec = HeaderCodec::new();
    while let Some(cmd) = rx.recv().await {
        let frame = match cmd {
            ConnCommand::SynReply {
                stream_id,
                status,
                status_text,
                version,
                mut headers,
            } => {
                headers.add(":status", &status.to_string());
                headers.add(":status-text", &status_text);
                headers.add(":version", &version);
                match codec.compress_headers(&headers) {
                    Ok(header_block) => Frame::SynReply {
                        stream_id,
                        fin: false,
                        header_block,
                    },
                    Err(e) => {
                        warn!(error = %e, "spdy: failed to compress response headers");
                        continue;
                    }
                }
            }
            ConnCommand::Data { stream_id, bytes, fin } => Frame::Data { stream_id, fin, payload: bytes },
            ConnCommand::Ping { id } => Frame::Ping { id },
        };

        let encoded = frame::encode(&frame);
        if write_half.write_all(&encoded).await.is_err() {
            break;
        }
    }
    let _ = write_half.flush().await;
}

fn inbound_request_from_block(mut headers: HeaderMultiMap) -> Result<InboundRequest, ProxyError> {
    let method = take_first(&mut headers, ":method").unwrap_or_else(|| "GET".to_string());
    let scheme = take_first(&mut headers, ":scheme").unwrap_or_else(|| "https".to_string());
    let host = take_first(&mut headers, ":host").unwrap_or_default();
    let path = take_first(&mut headers, ":path")
        .ok_or_else(|| ProxyError::Protocol(":path pseudo-header missing".to_string()))?;
    let version = take_first(&mut headers, ":version").unwrap_or_else(|| "HTTP/1.1".to_string());

    Ok(InboundRequest {
        method,
        scheme,
        host,
        path,
        version,
        headers,
    })
}

fn take_first(headers: &mut HeaderMultiMap, name: &str) -> Option<String> {
    headers.remove(name).and_then(|values| values.into_iter().next())
}

/// Drives one request end to end: resolve + fetch + stream the response
/// back through `sink`, then retire the transaction from the pool.
async fn dispatch(id: u64, req: InboundRequest, sink: ResponseSink, opts: Arc<GlobalOptions>, pool: Arc<ClientPool>) {
    let started = std::time::Instant::now();

    let outcome = match handler::handle_request(id, &req, &opts).await {
        Ok(HandledRequest { mut transaction, fetch }) => {
            let OutboundFetch { head_rx, mut body, join } = fetch;
            pool.register(id, join);

            let outcome = match head_rx.await {
                Ok(Ok(head)) => {
                    transaction.apply_origin_head(&head);
                    if sink
                        .queue_response(
                            transaction.response_status_code,
                            &transaction.response_status_text,
                            &transaction.response_version,
                            transaction.response_headers.clone(),
                        )
                        .is_ok()
                    {
                        let mut total_bytes: u64 = 0;
                        loop {
                            let (chunk, more) = body.next_step_blocking(OUTBOUND_DATA_CHUNK).await;
                            total_bytes += chunk.len() as u64;
                            let fin = !more;
                            let sent = sink.write_data(chunk, fin).is_ok();
                            if !sent || !more {
                                break;
                            }
                        }
                        metrics::histogram!("spdy2http_response_size_bytes").record(total_bytes as f64);
                    }
                    transaction.mark_origin_done();
                    "ok"
                }
                Ok(Err(e)) => {
                    synthesize_error(&sink, &e);
                    "origin_error"
                }
                Err(_) => {
                    synthesize_error(
                        &sink,
                        &ProxyError::Io("origin fetch task ended without a response".to_string()),
                    );
                    "origin_error"
                }
            };

            pool.remove(id);
            outcome
        }
        Err(e) => {
            synthesize_error(&sink, &e);
            "handler_error"
        }
    };

    if outcome != "ok" {
        metrics::counter!("spdy2http_origin_errors_total").increment(1);
    }
    metrics::counter!("spdy2http_transactions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("spdy2http_transaction_duration_seconds").record(started.elapsed().as_secs_f64());
}

fn synthesize_error(sink: &ResponseSink, err: &ProxyError) {
    warn!(error = %err, "proxy: transaction failed, synthesizing error response");
    let _ = sink.queue_response(err.status_code(), "", "HTTP/1.1", HeaderMultiMap::new());
    let _ = sink.write_data(Bytes::new(), true);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_request_extracts_pseudo_headers() {
        let mut headers = HeaderMultiMap::new();
        headers.add(":method", "GET");
        headers.add(":scheme", "https");
        headers.add(":host", "origin.test");
        headers.add(":path", "/a?b=1");
        headers.add(":version", "HTTP/1.1");
        headers.add("accept", "a");

        let req = inbound_request_from_block(headers).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.scheme, "https");
        assert_eq!(req.host, "origin.test");
        assert_eq!(req.path, "/a?b=1");
        assert_eq!(req.headers.get(":method"), None);
        assert_eq!(req.headers.get("accept"), Some(&["a".to_string()][..]));
    }

    #[test]
    fn inbound_request_requires_path() {
        let headers = HeaderMultiMap::new();
        assert!(matches!(
            inbound_request_from_block(headers),
            Err(ProxyError::Protocol(_))
        ));
    }

    #[test]
    fn inbound_request_defaults_missing_method_and_scheme() {
        let mut headers = HeaderMultiMap::new();
        headers.add(":path", "/");
        let req = inbound_request_from_block(headers).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.scheme, "https");
    }
}
