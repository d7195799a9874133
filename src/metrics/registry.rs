use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for transaction duration (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Histogram bucket boundaries for response body size (bytes).
const SIZE_BUCKETS: &[f64] = &[
    100.0, 500.0, 1000.0, 5000.0, 10000.0, 50000.0, 100000.0, 500000.0, 1000000.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The `PrometheusHandle`
/// is retained solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup before any `counter!` / `gauge!` /
    /// `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full("spdy2http_response_size_bytes".to_string()),
                SIZE_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        describe_counter!(
            "spdy2http_transactions_total",
            Unit::Count,
            "Total proxy transactions completed, labeled by outcome"
        );
        describe_gauge!(
            "spdy2http_transactions_in_flight",
            Unit::Count,
            "Number of transactions currently bridging a SPDY stream to an origin fetch"
        );
        describe_histogram!(
            "spdy2http_transaction_duration_seconds",
            Unit::Seconds,
            "Time from inbound SYN_STREAM to response-done for one transaction"
        );
        describe_histogram!(
            "spdy2http_response_size_bytes",
            Unit::Bytes,
            "Origin response body size bridged to the SPDY client"
        );
        describe_counter!(
            "spdy2http_origin_errors_total",
            Unit::Count,
            "Total transactions that failed to reach or read from the origin"
        );
        describe_counter!(
            "spdy2http_connections_total",
            Unit::Count,
            "Total inbound SPDY connections accepted, labeled by status"
        );
        describe_gauge!(
            "spdy2http_connections_active",
            Unit::Count,
            "Number of currently open inbound SPDY connections"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
