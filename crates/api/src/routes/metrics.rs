//! Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics: command, dispatcher and projector metrics in text format.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    // Drains histogram buckets that would otherwise grow between scrapes.
    handle.run_upkeep();
    ([(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], handle.render())
}
