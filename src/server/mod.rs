pub mod admin;
pub mod bootstrap;
pub mod runtime;

use crate::config::GlobalOptions;
use crate::error::ProxyError;
use crate::httpclient::ClientPool;
use crate::spdy::daemon;
use crate::spdy::SpdyDaemon;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::info;

/// Bind the inbound SPDY/2 listener and run the daemon until `shutdown` is
/// notified. Mirrors the shape of the admin server below: resolve the
/// listen address, bind, then hand off to a dedicated accept loop.
pub async fn run_proxy_server(
    opts: Arc<GlobalOptions>,
    pool: Arc<ClientPool>,
    shutdown: Arc<Notify>,
) -> Result<(), ProxyError> {
    let tls_config = daemon::build_server_config(&opts.certificate, &opts.certificate_key)?;
    let addr = format!("0.0.0.0:{}", opts.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ProxyError::Startup(format!("listen on {addr} failed: {e}")))?;
    info!(addr, "server: spdy listening");

    let spdy_daemon = SpdyDaemon::new(opts, pool, tls_config);
    spdy_daemon.run(listener, shutdown).await;
    Ok(())
}
