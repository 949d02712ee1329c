//! Prometheus metrics exposition
//!
//! Renders the API client's request metrics alongside the monitor's own:
//!
//! - `status_monitor_checks_total` (counter): labels `target`, `outcome`
//! - `status_monitor_target_up` (gauge): label `target`
//! - `status_monitor_check_latency_seconds` (histogram): label `target`

use api_client::metrics::REQUEST_DURATION_METRIC;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const CHECK_LATENCY_METRIC: &str = "status_monitor_check_latency_seconds";

/// 5ms to 60s, covering the configurable request timeout.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION_METRIC.to_string()), LATENCY_BUCKETS)
        .and_then(|b| b.set_buckets_for_metric(Matcher::Full(CHECK_LATENCY_METRIC.to_string()), LATENCY_BUCKETS))
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record one check of `target` (`backend` or a probe name).
pub fn record_check(target: &str, up: bool, latency_secs: f64) {
    let outcome = if up { "up" } else { "down" };
    metrics::counter!("status_monitor_checks_total", "target" => target.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::gauge!("status_monitor_target_up", "target" => target.to_string())
        .set(if up { 1.0 } else { 0.0 });
    metrics::histogram!(CHECK_LATENCY_METRIC, "target" => target.to_string()).record(latency_secs);
}
