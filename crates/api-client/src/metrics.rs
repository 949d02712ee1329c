//! Client-side request metrics
//!
//! Recorded through the `metrics` facade; calls are no-ops until a recorder
//! is installed (the status monitor installs the Prometheus one).
//!
//! - `api_client_requests_total` (counter): labels `method`, `status`
//! - `api_client_request_duration_seconds` (histogram): label `method`
//! - `api_client_retries_total` (counter): label `reason`
//! - `api_client_transport_errors_total` (counter): label `kind`

pub const REQUEST_DURATION_METRIC: &str = "api_client_request_duration_seconds";

/// Record one attempt that received an HTTP response.
pub fn record_request(method: &str, status: u16, duration_secs: f64) {
    metrics::counter!("api_client_requests_total", "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    metrics::histogram!(REQUEST_DURATION_METRIC, "method" => method.to_string())
        .record(duration_secs);
}

/// Record a retry; `reason` is a status code or transport error kind.
pub fn record_retry(reason: &str) {
    metrics::counter!("api_client_retries_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_transport_error(kind: &str) {
    metrics::counter!("api_client_transport_errors_total", "kind" => kind.to_string())
        .increment(1);
}
