//! Prometheus metrics exposition
//!
//! - `gateway_requests_total` (counter): labels `route`, `status`
//! - `gateway_request_duration_seconds` (histogram): label `route`
//! - `gateway_upstream_errors_total` (counter): label `error_type`
//! - `gateway_token_exchanges_total` (counter): label `outcome`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "gateway_request_duration_seconds";

/// Bucket boundaries from 5ms to 30s, the default outbound timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}

/// Label for a request path. Unmatched paths collapse to "other" to keep
/// label cardinality bounded.
pub fn route_label(path: &str) -> &'static str {
    match path {
        "/auth" => "auth",
        "/callback" => "callback",
        "/status" => "status",
        "/connect" => "connect",
        "/token" => "token",
        "/start" => "start",
        "/addPublicKey" => "add_public_key",
        _ => "other",
    }
}

/// Record a completed request.
pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!("gateway_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "route" => route).record(duration_secs);
}

/// Record a failed call to the token endpoint or Cloud Shell API.
pub fn record_upstream_error(error_type: &'static str) {
    metrics::counter!("gateway_upstream_errors_total", "error_type" => error_type).increment(1);
}

/// Record a code exchange: "stored", "rejected" or "failed".
pub fn record_token_exchange(outcome: &'static str) {
    metrics::counter!("gateway_token_exchanges_total", "outcome" => outcome).increment(1);
}
