/// Execution Orchestrator - Run and Submit Workflows
///
/// **Responsibility:**
/// Coordinate synthesis, dispatch and reconciliation into one report.
///
/// **Architecture:**
/// 1. Synthesize one program for all selected cases, stamped with the
///    request id (synth/)
/// 2. Dispatch it once and wait for a verdict (engine.rs)
/// 3. Reconcile the console output per case, trusting only markers that
///    carry the request id (evaluator.rs)
/// 4. Overlay the sandbox verdict and fold an outcome
///
/// This module is the glue layer. It knows nothing about:
/// - How code executes (engine's job)
/// - How console output is read (evaluator's job)
use crate::config::LanguageConfigManager;
use crate::engine::{Dispatcher, ExecutionOutput, SandboxRequest, SandboxVerdict};
use crate::error::EngineError;
use crate::evaluator::{Reconciler, SandboxMetrics};
use crate::synth::SynthesizerRegistry;
use arena_common::store::SubmissionStore;
use arena_common::types::{
    CaseStatus, ExecutionOutcome, ExecutionReport, Language, OverallStatus, Problem, SubmissionRecord,
    TestCase, TestCaseResult,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub language: Language,
    pub source_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub user_id: String,
    pub language: Language,
    pub source_code: String,
}

#[derive(Clone)]
pub struct Executor {
    synthesizers: Arc<SynthesizerRegistry>,
    reconciler: Arc<Reconciler>,
    dispatcher: Dispatcher,
    languages: Arc<LanguageConfigManager>,
    submissions: Arc<dyn SubmissionStore>,
}

impl Executor {
    pub fn new(
        dispatcher: Dispatcher,
        languages: Arc<LanguageConfigManager>,
        submissions: Arc<dyn SubmissionStore>,
    ) -> Self {
        Self {
            synthesizers: Arc::new(SynthesizerRegistry::default()),
            reconciler: Arc::new(Reconciler::default()),
            dispatcher,
            languages,
            submissions,
        }
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = Arc::new(reconciler);
        self
    }

    pub fn languages(&self) -> &LanguageConfigManager {
        &self.languages
    }

    /// Execute against the visible cases only.
    ///
    /// The outcome covers every visible case; the returned list stops at the
    /// first failing case.
    #[tracing::instrument(skip(self, problem, request), fields(problem_id = %problem.id, language = %request.language))]
    pub async fn run(&self, problem: &Problem, request: &RunRequest) -> Result<ExecutionReport, EngineError> {
        let request_id = Uuid::new_v4();
        let cases = problem.visible_cases();
        info!(request_id = %request_id, cases = cases.len(), "Starting run");

        let (mut results, output) = self
            .execute(request_id, problem, request.language, &request.source_code, &cases)
            .await?;
        let outcome = ExecutionOutcome::fold(&results);
        if let Some(first_failure) = results.iter().position(|r| !r.passed) {
            results.truncate(first_failure + 1);
        }

        let message = summarize(&outcome, &results, &output);
        info!(
            request_id = %request_id,
            status = %outcome.overall_status,
            passed = outcome.passed_count,
            total = outcome.total_count,
            "Run finished"
        );

        Ok(ExecutionReport {
            request_id,
            language: request.language,
            outcome,
            results,
            message,
            submission_id: None,
        })
    }

    /// Execute against every case and record the submission when all pass
    #[tracing::instrument(skip(self, problem, request), fields(problem_id = %problem.id, language = %request.language))]
    pub async fn submit(&self, problem: &Problem, request: &SubmitRequest) -> Result<ExecutionReport, EngineError> {
        let request_id = Uuid::new_v4();
        let cases = problem.ordered_cases();
        info!(request_id = %request_id, user_id = %request.user_id, cases = cases.len(), "Starting submission");

        let (results, output) = self
            .execute(request_id, problem, request.language, &request.source_code, &cases)
            .await?;
        let outcome = ExecutionOutcome::fold(&results);

        let submission_id = if outcome.all_passed() {
            let record = SubmissionRecord {
                id: Uuid::new_v4(),
                user_id: request.user_id.clone(),
                problem_id: problem.id.clone(),
                language: request.language,
                source_code: request.source_code.clone(),
                runtime_ms: outcome.total_runtime_ms,
                memory_kb: outcome.max_memory_kb,
                passed_count: outcome.passed_count,
                total_count: outcome.total_count,
                created_at: Utc::now(),
            };
            self.submissions.record_submission(&record).await?;
            info!(request_id = %request_id, submission_id = %record.id, "Accepted submission recorded");
            Some(record.id)
        } else {
            None
        };

        let message = summarize(&outcome, &results, &output);
        info!(
            request_id = %request_id,
            status = %outcome.overall_status,
            passed = outcome.passed_count,
            total = outcome.total_count,
            "Submission finished"
        );

        Ok(ExecutionReport {
            request_id,
            language: request.language,
            outcome,
            results,
            message,
            submission_id,
        })
    }

    async fn execute(
        &self,
        request_id: Uuid,
        problem: &Problem,
        language: Language,
        source_code: &str,
        cases: &[TestCase],
    ) -> Result<(Vec<TestCaseResult>, ExecutionOutput), EngineError> {
        if cases.is_empty() {
            return Err(EngineError::NoTestCases);
        }
        let config = self
            .languages
            .get_config(language)
            .ok_or(EngineError::LanguageNotConfigured(language))?;

        let run_token = request_id.simple().to_string();
        let program = self.synthesizers.synthesize_with_token(
            language,
            source_code,
            &problem.signature,
            cases,
            &run_token,
        )?;

        let request = SandboxRequest {
            source: program.source,
            language_id: config.sandbox_language_id,
            cpu_time_limit_secs: config.cpu_time_limit_secs,
            memory_limit_kb: config.memory_limit_kb,
        };
        let output = self.dispatcher.dispatch_or_internal(&request).await;

        let metrics = SandboxMetrics {
            time_ms: output.time_ms,
            memory_kb: output.memory_kb,
        };
        let mut results = self
            .reconciler
            .reconcile_run(&output.stdout, cases, metrics, Some(&run_token));
        apply_verdict(&mut results, &output);

        Ok((results, output))
    }
}

/// Let a whole-program sandbox verdict override or fill in per-case results
pub fn apply_verdict(results: &mut [TestCaseResult], output: &ExecutionOutput) {
    match output.verdict {
        SandboxVerdict::CompilationError => {
            let compiler_text = first_non_empty(&[&output.compile_output, &output.stderr, &output.message]);
            for result in results.iter_mut() {
                result.passed = false;
                result.status = CaseStatus::CompilationError;
                result.actual_output = compiler_text.clone();
            }
        }
        SandboxVerdict::InternalError => {
            let message = first_non_empty(&[&output.message, &output.stderr, &output.status_description]);
            for result in results.iter_mut() {
                result.passed = false;
                result.status = CaseStatus::InternalError;
                result.actual_output = message.clone();
            }
        }
        SandboxVerdict::TimeLimitExceeded | SandboxVerdict::RuntimeError => {
            let status = if output.verdict == SandboxVerdict::TimeLimitExceeded {
                CaseStatus::TimeLimitExceeded
            } else {
                CaseStatus::RuntimeError
            };
            let stderr = output.stderr.trim().to_string();
            for result in results.iter_mut().filter(|r| is_undecided(r)) {
                result.status = status;
                if status == CaseStatus::RuntimeError && !stderr.is_empty() {
                    result.actual_output = stderr.clone();
                }
            }
        }
        _ => {}
    }

    if output.verdict != SandboxVerdict::Accepted && results.iter().all(is_undecided) {
        warn!(verdict = %output.verdict, "Sandbox verdict left every case undecided");
    }
}

fn is_undecided(result: &TestCaseResult) -> bool {
    !result.passed && matches!(result.status, CaseStatus::Undetermined | CaseStatus::NoOutput)
}

fn first_non_empty(candidates: &[&String]) -> String {
    candidates
        .iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_string()
}

/// User-facing one-line summary
pub fn summarize(outcome: &ExecutionOutcome, results: &[TestCaseResult], output: &ExecutionOutput) -> String {
    if outcome.all_passed() {
        return format!("All {} test cases passed", outcome.total_count);
    }

    match outcome.overall_status {
        OverallStatus::CompilationError => {
            let text = first_non_empty(&[&output.compile_output, &output.stderr]);
            match text.lines().next() {
                Some(line) => format!("Compilation error: {}", line),
                None => "Compilation error".to_string(),
            }
        }
        OverallStatus::InternalError => {
            let text = first_non_empty(&[&output.message, &output.status_description]);
            if text.is_empty() {
                "Execution failed inside the sandbox".to_string()
            } else {
                format!("Execution failed inside the sandbox: {}", text)
            }
        }
        status => {
            let phrase = match status {
                OverallStatus::RuntimeError => "Runtime error",
                OverallStatus::TimeLimitExceeded => "Time limit exceeded",
                _ => "Wrong answer",
            };
            match results.iter().find(|r| !r.passed) {
                Some(failed) => format!(
                    "{} on test case {} ({}/{} passed)",
                    phrase, failed.case_number, outcome.passed_count, outcome.total_count
                ),
                None => format!("{} ({}/{} passed)", phrase, outcome.passed_count, outcome.total_count),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::output;

    fn result(n: usize, passed: bool, status: CaseStatus) -> TestCaseResult {
        TestCaseResult {
            case_number: n,
            input: n.to_string(),
            expected_output: n.to_string(),
            actual_output: if passed { n.to_string() } else { String::new() },
            passed,
            status,
            runtime_ms: 1.0,
            memory_kb: 100,
            visible: true,
        }
    }

    #[test]
    fn test_compilation_error_overrides_every_case() {
        let mut results = vec![result(1, true, CaseStatus::Passed), result(2, false, CaseStatus::NoOutput)];
        let mut out = output(SandboxVerdict::CompilationError, "");
        out.compile_output = "Main.java:3: error: ';' expected\n1 error".to_string();

        apply_verdict(&mut results, &out);
        assert!(results.iter().all(|r| !r.passed && r.status == CaseStatus::CompilationError));
        assert!(results[0].actual_output.starts_with("Main.java:3"));

        let outcome = ExecutionOutcome::fold(&results);
        assert_eq!(summarize(&outcome, &results, &out), "Compilation error: Main.java:3: error: ';' expected");
    }

    #[test]
    fn test_runtime_error_fills_only_undecided_cases() {
        let mut results = vec![
            result(1, true, CaseStatus::Passed),
            result(2, false, CaseStatus::WrongAnswer),
            result(3, false, CaseStatus::Undetermined),
        ];
        let mut out = output(SandboxVerdict::RuntimeError, "");
        out.stderr = "Segmentation fault".to_string();

        apply_verdict(&mut results, &out);
        assert_eq!(results[0].status, CaseStatus::Passed);
        assert_eq!(results[1].status, CaseStatus::WrongAnswer);
        assert_eq!(results[2].status, CaseStatus::RuntimeError);
        assert_eq!(results[2].actual_output, "Segmentation fault");
    }

    #[test]
    fn test_time_limit_marks_unreached_cases() {
        let mut results = vec![result(1, true, CaseStatus::Passed), result(2, false, CaseStatus::Undetermined)];
        apply_verdict(&mut results, &output(SandboxVerdict::TimeLimitExceeded, ""));
        assert_eq!(results[1].status, CaseStatus::TimeLimitExceeded);

        let outcome = ExecutionOutcome::fold(&results);
        assert_eq!(outcome.overall_status, OverallStatus::TimeLimitExceeded);
        assert_eq!(
            summarize(&outcome, &results, &output(SandboxVerdict::TimeLimitExceeded, "")),
            "Time limit exceeded on test case 2 (1/2 passed)"
        );
    }

    #[test]
    fn test_internal_error_message() {
        let mut results = vec![result(1, false, CaseStatus::NoOutput)];
        let out = ExecutionOutput::internal_error("sandbox did not finish after 20 polls");
        apply_verdict(&mut results, &out);
        assert_eq!(results[0].status, CaseStatus::InternalError);

        let outcome = ExecutionOutcome::fold(&results);
        assert_eq!(
            summarize(&outcome, &results, &out),
            "Execution failed inside the sandbox: sandbox did not finish after 20 polls"
        );
    }

    #[test]
    fn test_accepted_message() {
        let results = vec![result(1, true, CaseStatus::Passed), result(2, true, CaseStatus::Passed)];
        let outcome = ExecutionOutcome::fold(&results);
        assert_eq!(
            summarize(&outcome, &results, &output(SandboxVerdict::Accepted, "")),
            "All 2 test cases passed"
        );
    }
}
