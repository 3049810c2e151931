//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder. Pipeline metrics from the worker crate
/// are exported through the same handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "camcount_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "camcount_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "camcount_http_requests_in_flight";
    pub const REFRESH_RUNS_TOTAL: &str = "camcount_refresh_runs_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", route_label(path).to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record the outcome of one auto-refresh cycle.
pub fn record_refresh(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::REFRESH_RUNS_TOTAL, &labels).increment(1);
}

/// Collapse static file paths so clip names don't explode label cardinality.
fn route_label(path: &str) -> &str {
    if path == "/videos" || path.starts_with("/videos/") {
        "/videos/*"
    } else {
        path
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}
