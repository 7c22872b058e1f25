//! Prometheus metrics
//!
//! Metrics are always recorded through the `metrics` facade. The exporter
//! only runs when a metrics address is configured, on its own listener, so
//! the proxy's public surface stays limited to `/health`.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and describe the proxy's metrics
pub fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    register_metrics();
    Ok(())
}

/// Describe all custom metrics
fn register_metrics() {
    metrics::describe_counter!(
        "vllm_gate_requests_total",
        "Total number of relayed requests"
    );
    metrics::describe_histogram!(
        "vllm_gate_request_duration_seconds",
        "Time until the upstream response head was relayed"
    );
    metrics::describe_counter!(
        "vllm_gate_auth_rejections_total",
        "Requests rejected by the credential check"
    );
    metrics::describe_counter!(
        "vllm_gate_upstream_failures_total",
        "Failures contacting the upstream"
    );
    metrics::describe_gauge!(
        "vllm_gate_active_streams",
        "Streaming relays currently holding an upstream stream"
    );
    metrics::describe_counter!(
        "vllm_gate_streams_total",
        "Streaming relays by how they ended"
    );
    metrics::describe_histogram!(
        "vllm_gate_stream_chunks",
        "Chunks forwarded per streaming relay"
    );
    metrics::describe_histogram!(
        "vllm_gate_stream_duration_seconds",
        "Lifetime of streaming relays"
    );
}

/// Record a relayed request
pub fn record_request(mode: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "vllm_gate_requests_total",
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("vllm_gate_request_duration_seconds", "mode" => mode.to_string())
        .record(duration_secs);
}

/// Record a rejected credential
pub fn record_auth_rejection(reason: &str) {
    metrics::counter!("vllm_gate_auth_rejections_total", "reason" => reason.to_string())
        .increment(1);
}

/// Record a failure reaching or reading from the upstream
pub fn record_upstream_failure(kind: &str) {
    metrics::counter!("vllm_gate_upstream_failures_total", "kind" => kind.to_string())
        .increment(1);
}

/// Update active streams gauge
pub fn set_active_streams(count: usize) {
    metrics::gauge!("vllm_gate_active_streams").set(count as f64);
}

/// Record the end of a streaming relay
pub fn record_stream(outcome: &str, chunks: usize, duration_secs: f64) {
    metrics::counter!("vllm_gate_streams_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("vllm_gate_stream_chunks").record(chunks as f64);
    metrics::histogram!("vllm_gate_stream_duration_seconds").record(duration_secs);
}
