//! Service middleware and metric helpers.
//!
//! Metrics are structured tracing events on target `pii_vault::metrics`,
//! aggregated downstream from the logs:
//!
//! - `metric_type = "request"`: path, method, status, latency
//! - `metric_type = "admin_access"`: administrative reads and row counts

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;

/// Metrics middleware that records request counts and latency.
///
/// Uses the matched route template as the path label so that unknown paths
/// collapse into one series.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "pii_vault::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Record an administrative read (vault or audit listing).
pub fn record_admin_access(resource: &str, row_count: usize) {
    info!(
        target: "pii_vault::metrics",
        metric_type = "admin_access",
        resource = resource,
        row_count = row_count,
        "admin_access_metric"
    );
}
