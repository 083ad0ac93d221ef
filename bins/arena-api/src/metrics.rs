// Prometheus metrics for the run and submit workflows
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arena_requests_total",
        "Execution requests by workflow and final status",
        &["workflow", "status"]
    )
    .expect("metric can be registered");
    pub static ref REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arena_rejected_total",
        "Execution requests rejected because the worker pool was full",
        &["workflow"]
    )
    .expect("metric can be registered");
    pub static ref EXECUTION_SECONDS: HistogramVec = register_histogram_vec!(
        "arena_execution_seconds",
        "Wall time from dequeue to report, per workflow",
        &["workflow"],
        vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
    )
    .expect("metric can be registered");
}

pub fn record_request(workflow: &str, status: &str) {
    REQUESTS_TOTAL.with_label_values(&[workflow, status]).inc();
}

pub fn record_rejection(workflow: &str) {
    REJECTED_TOTAL.with_label_values(&[workflow]).inc();
}

pub fn observe_execution(workflow: &str, seconds: f64) {
    EXECUTION_SECONDS.with_label_values(&[workflow]).observe(seconds);
}

/// Render every registered metric in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// GET /metrics
pub async fn metrics_handler() -> Response {
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}
