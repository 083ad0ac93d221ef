use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::handlers;
use crate::metrics;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(handlers::health_check))
        .route("/languages", get(handlers::list_languages))
        .route("/problems/:problem_id/run", post(handlers::run_problem))
        .route("/problems/:problem_id/submit", post(handlers::submit_problem))
        .route("/submissions/:id", get(handlers::get_submission))
        .route("/metrics", get(metrics::metrics_handler))
}
