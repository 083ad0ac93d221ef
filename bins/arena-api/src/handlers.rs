// HTTP route handlers for the Arena API

use arena_common::types::{ExecutionReport, Problem};
use arena_engine::config::LanguageConfig;
use arena_engine::{EngineError, PoolError, RunRequest, SubmitRequest, WorkerPool};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LanguageSummary {
    pub name: String,
    pub version: String,
    pub file_extension: String,
}

impl From<&LanguageConfig> for LanguageSummary {
    fn from(config: &LanguageConfig) -> Self {
        Self {
            name: config.name.to_string(),
            version: config.version.clone(),
            file_extension: config.file_extension.clone(),
        }
    }
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /languages - Languages the sandbox is configured for
pub async fn list_languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let languages: Vec<LanguageSummary> = state
        .executor
        .languages()
        .configs()
        .map(LanguageSummary::from)
        .collect();
    (StatusCode::OK, Json(serde_json::json!({ "languages": languages })))
}

/// POST /problems/{problem_id}/run - Execute against the public cases
pub async fn run_problem(
    State(state): State<Arc<AppState>>,
    Path(problem_id): Path<String>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_body(rejection),
    };
    let problem = match load_problem(&state, &problem_id).await {
        Ok(problem) => problem,
        Err(response) => return response,
    };

    let executor = state.executor.clone();
    let outcome = execute_in_pool(&state.run_pool, "run", async move {
        executor.run(&problem, &request).await
    })
    .await;
    respond(outcome)
}

/// POST /problems/{problem_id}/submit - Execute against every case
pub async fn submit_problem(
    State(state): State<Arc<AppState>>,
    Path(problem_id): Path<String>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_body(rejection),
    };
    if request.user_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "user_id must not be empty".to_string());
    }
    let problem = match load_problem(&state, &problem_id).await {
        Ok(problem) => problem,
        Err(response) => return response,
    };

    let executor = state.executor.clone();
    let outcome = execute_in_pool(&state.submit_pool, "submit", async move {
        executor.submit(&problem, &request).await
    })
    .await;
    respond(outcome)
}

/// GET /submissions/{id} - Fetch an accepted submission
pub async fn get_submission(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let submission_id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid submission ID format".to_string());
        }
    };

    match state.submissions.get_submission(&submission_id).await {
        Ok(Some(record)) => {
            info!(submission_id = %submission_id, "Submission retrieved");
            (StatusCode::OK, Json(record)).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Submission {} not found", submission_id)),
        Err(e) => {
            error!(submission_id = %submission_id, error = %e, "Failed to fetch submission");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to query submission: {}", e),
            )
        }
    }
}

async fn load_problem(state: &AppState, problem_id: &str) -> Result<Problem, Response> {
    match state.problems.get_problem(problem_id).await {
        Ok(Some(problem)) => Ok(problem),
        Ok(None) => {
            warn!(problem_id = %problem_id, "Unknown problem");
            Err(error_response(StatusCode::NOT_FOUND, format!("Problem {} not found", problem_id)))
        }
        Err(e) => {
            error!(problem_id = %problem_id, error = %e, "Failed to load problem");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to load problem: {}", e),
            ))
        }
    }
}

/// Either the failure of the pool itself or of the workflow inside it
#[derive(Debug)]
pub enum WorkflowFailure {
    Pool(PoolError),
    Engine(EngineError),
}

/// Run `job` on `pool`, recording request and rejection metrics under `workflow`
async fn execute_in_pool<F>(pool: &WorkerPool, workflow: &'static str, job: F) -> Result<ExecutionReport, WorkflowFailure>
where
    F: Future<Output = Result<ExecutionReport, EngineError>> + Send + 'static,
{
    let started = Instant::now();
    match pool.try_execute(job).await {
        Ok(Ok(report)) => {
            metrics::observe_execution(workflow, started.elapsed().as_secs_f64());
            metrics::record_request(workflow, &report.outcome.overall_status.to_string());
            Ok(report)
        }
        Ok(Err(e)) => {
            metrics::record_request(workflow, "error");
            Err(WorkflowFailure::Engine(e))
        }
        Err(e) => {
            if matches!(e, PoolError::Saturated { .. }) {
                metrics::record_rejection(workflow);
            }
            metrics::record_request(workflow, "rejected");
            Err(WorkflowFailure::Pool(e))
        }
    }
}

fn respond(outcome: Result<ExecutionReport, WorkflowFailure>) -> Response {
    match outcome {
        Ok(report) => (StatusCode::OK, Json(redact_report(report))).into_response(),
        Err(failure) => {
            let status = failure_status(&failure);
            let message = match &failure {
                WorkflowFailure::Pool(e) => e.to_string(),
                WorkflowFailure::Engine(e) => e.to_string(),
            };
            if status.is_server_error() {
                error!(status = %status, error = %message, "Execution request failed");
            } else {
                info!(status = %status, error = %message, "Execution request refused");
            }
            error_response(status, message)
        }
    }
}

/// Hidden cases keep their verdict and metrics but lose their text
pub fn redact_report(mut report: ExecutionReport) -> ExecutionReport {
    report.results = report.results.into_iter().map(|r| r.redacted()).collect();
    report
}

pub fn failure_status(failure: &WorkflowFailure) -> StatusCode {
    match failure {
        WorkflowFailure::Pool(PoolError::Saturated { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        WorkflowFailure::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        WorkflowFailure::Engine(e) if e.is_invalid_input() => StatusCode::BAD_REQUEST,
        WorkflowFailure::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn invalid_body(rejection: JsonRejection) -> Response {
    error_response(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", rejection.body_text()))
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_common::types::{CaseStatus, ExecutionOutcome, Language, TestCaseResult};
    use arena_engine::SynthesisError;

    fn result(case_number: usize, visible: bool) -> TestCaseResult {
        TestCaseResult {
            case_number,
            input: "[1,2]\n3".to_string(),
            expected_output: "[0,1]".to_string(),
            actual_output: "[0,1]".to_string(),
            passed: true,
            status: CaseStatus::Passed,
            runtime_ms: 1.0,
            memory_kb: 1024,
            visible,
        }
    }

    #[test]
    fn test_saturated_pool_maps_to_503() {
        let failure = WorkflowFailure::Pool(PoolError::Saturated { pool: "run".to_string() });
        assert_eq!(failure_status(&failure), StatusCode::SERVICE_UNAVAILABLE);
        let lost = WorkflowFailure::Pool(PoolError::WorkerLost { pool: "run".to_string() });
        assert_eq!(failure_status(&lost), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_input_maps_to_400() {
        for e in [
            EngineError::NoTestCases,
            EngineError::LanguageNotConfigured(Language::Cpp),
            EngineError::Synthesis(SynthesisError::MissingFunctionName),
        ] {
            assert_eq!(failure_status(&WorkflowFailure::Engine(e)), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_hidden_results_are_redacted() {
        let results = vec![result(1, true), result(2, false)];
        let report = ExecutionReport {
            request_id: Uuid::new_v4(),
            language: Language::Python,
            outcome: ExecutionOutcome::fold(&results),
            results,
            message: "All 2 test cases passed".to_string(),
            submission_id: None,
        };

        let redacted = redact_report(report);
        assert_eq!(redacted.results[0].input, "[1,2]\n3");
        assert_eq!(redacted.results[1].input, "hidden");
        assert_eq!(redacted.results[1].actual_output, "hidden");
        assert!(redacted.results[1].passed);
        assert_eq!(redacted.outcome.passed_count, 2);
    }
}
