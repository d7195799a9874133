//! Process entry point: parse CLI options, wire up the TLS crypto
//! provider, metrics recorder and tracing subscriber, then run the SPDY
//! daemon and admin server side by side until SIGINT.

use crate::config::GlobalOptions;
use crate::error::ProxyError;
use crate::httpclient::ClientPool;
use crate::metrics::Metrics;
use crate::server;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(opts: GlobalOptions) -> Result<(), ProxyError> {
    init_tracing(opts.verbose);

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| ProxyError::Startup("failed to install TLS crypto provider".to_string()))?;

    let metrics = Metrics::install();
    let opts = Arc::new(opts);
    let pool = ClientPool::new();
    let shutdown = Arc::new(Notify::new());

    let proxy_task = {
        let opts = opts.clone();
        let pool = pool.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_proxy_server(opts, pool, shutdown).await {
                error!(error = %e, "server: proxy task exited with error");
            }
        })
    };

    let admin_task = {
        let admin_listen = opts.admin_listen.clone();
        tokio::spawn(async move {
            if let Err(e) = server::admin::run(&admin_listen, metrics).await {
                error!(error = %e, "server: admin task exited with error");
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ProxyError::Startup(format!("failed to install signal handler: {e}")))?;
    info!("server: SIGINT received, shutting down");
    shutdown.notify_waiters();

    admin_task.abort();
    let _ = tokio::time::timeout(DRAIN_TIMEOUT, proxy_task).await;

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let (non_blocking, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    // The non-blocking writer flushes on drop; leaking the guard keeps it
    // alive for the life of the process instead of tying it to this
    // function's stack frame.
    std::mem::forget(guard);
}
