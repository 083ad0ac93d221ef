/// Execution Engine - Sandbox Dispatch
///
/// **Core Responsibility:**
/// Ship one synthesized program to the remote sandbox and wait for a
/// terminal verdict.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (submit, poll, retry)
/// - Engine does NOT know the marker protocol or scoring rules
/// - Engine returns raw stdout and sandbox metrics for the Reconciler
///
/// **Dispatch States:**
/// `Submitted → Queued → Processing → {Accepted | WrongAnswer |
/// TimeLimitExceeded | CompilationError | RuntimeError | InternalError}`
use crate::error::SandboxError;
use arena_common::config::SandboxSettings;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Terminal and transient states reported by the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxVerdict {
    Queued,
    Processing,
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    CompilationError,
    RuntimeError,
    InternalError,
}

impl SandboxVerdict {
    /// 1=Queued, 2=Processing, 3=Accepted, 4=WrongAnswer, 5=TLE, 6=CE,
    /// 7-12 runtime variants, everything else internal
    pub fn from_status_id(id: u32) -> Self {
        match id {
            1 => SandboxVerdict::Queued,
            2 => SandboxVerdict::Processing,
            3 => SandboxVerdict::Accepted,
            4 => SandboxVerdict::WrongAnswer,
            5 => SandboxVerdict::TimeLimitExceeded,
            6 => SandboxVerdict::CompilationError,
            7..=12 => SandboxVerdict::RuntimeError,
            _ => SandboxVerdict::InternalError,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SandboxVerdict::Queued | SandboxVerdict::Processing)
    }
}

impl fmt::Display for SandboxVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SandboxVerdict::Queued => "queued",
            SandboxVerdict::Processing => "processing",
            SandboxVerdict::Accepted => "accepted",
            SandboxVerdict::WrongAnswer => "wrong_answer",
            SandboxVerdict::TimeLimitExceeded => "time_limit_exceeded",
            SandboxVerdict::CompilationError => "compilation_error",
            SandboxVerdict::RuntimeError => "runtime_error",
            SandboxVerdict::InternalError => "internal_error",
        };
        write!(f, "{}", s)
    }
}

/// One program submission
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxRequest {
    pub source: String,
    pub language_id: u32,
    pub cpu_time_limit_secs: f64,
    pub memory_limit_kb: u64,
}

/// Decoded sandbox result
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    pub verdict: SandboxVerdict,
    pub status_description: String,
    pub stdout: String,
    pub stderr: String,
    pub compile_output: String,
    pub message: String,
    pub time_ms: f64,
    pub memory_kb: u64,
}

impl ExecutionOutput {
    /// Synthetic result for dispatches that never reached a verdict
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            verdict: SandboxVerdict::InternalError,
            status_description: "Internal Error".to_string(),
            stdout: String::new(),
            stderr: String::new(),
            compile_output: String::new(),
            message: message.into(),
            time_ms: 0.0,
            memory_kb: 0,
        }
    }
}

/// Transport to a sandbox service
#[async_trait]
pub trait SandboxClient: Send + Sync {
    /// Create a submission and return its token
    async fn submit(&self, request: &SandboxRequest) -> Result<String, SandboxError>;

    /// Current state of a submission
    async fn fetch(&self, token: &str) -> Result<ExecutionOutput, SandboxError>;
}

#[derive(Serialize)]
struct CreateSubmission<'a> {
    source_code: String,
    language_id: u32,
    stdin: &'a str,
    cpu_time_limit: f64,
    memory_limit: u64,
}

#[derive(Deserialize)]
struct CreatedSubmission {
    token: String,
}

#[derive(Deserialize)]
struct WireStatus {
    id: u32,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct WireResult {
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    message: Option<String>,
    status: WireStatus,
    time: Option<serde_json::Value>,
    memory: Option<u64>,
}

impl WireResult {
    fn into_output(self) -> Result<ExecutionOutput, SandboxError> {
        Ok(ExecutionOutput {
            verdict: SandboxVerdict::from_status_id(self.status.id),
            status_description: self.status.description,
            stdout: decode_field(self.stdout)?,
            stderr: decode_field(self.stderr)?,
            compile_output: decode_field(self.compile_output)?,
            message: decode_field(self.message)?,
            time_ms: self.time.as_ref().map(seconds_to_ms).unwrap_or(0.0),
            memory_kb: self.memory.unwrap_or(0),
        })
    }
}

/// Base64 fields may be wrapped across lines
fn decode_field(field: Option<String>) -> Result<String, SandboxError> {
    let Some(encoded) = field else {
        return Ok(String::new());
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| SandboxError::Decode(format!("invalid base64 field: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Sandbox time is reported in seconds, as a decimal string or a number
fn seconds_to_ms(value: &serde_json::Value) -> f64 {
    let seconds = match value {
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    };
    seconds * 1000.0
}

/// Judge0-compatible HTTP client
pub struct HttpSandboxClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSandboxClient {
    pub fn new(settings: &SandboxSettings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = [
            ("x-auth-token", &settings.auth_token),
            ("x-rapidapi-key", &settings.rapidapi_key),
            ("x-rapidapi-host", &settings.rapidapi_host),
        ];
        for (name, value) in auth {
            if let Some(value) = value {
                headers.insert(HeaderName::from_static(name), HeaderValue::from_str(value)?);
            }
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SandboxError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SandboxError::Http { status: status.as_u16(), body })
}

#[async_trait]
impl SandboxClient for HttpSandboxClient {
    async fn submit(&self, request: &SandboxRequest) -> Result<String, SandboxError> {
        let url = format!("{}/submissions?base64_encoded=true&wait=false", self.base_url);
        let body = CreateSubmission {
            source_code: general_purpose::STANDARD.encode(request.source.as_bytes()),
            language_id: request.language_id,
            stdin: "",
            cpu_time_limit: request.cpu_time_limit_secs,
            memory_limit: request.memory_limit_kb,
        };

        let response = ensure_success(self.http.post(&url).json(&body).send().await?).await?;
        let created: CreatedSubmission = response.json().await?;
        Ok(created.token)
    }

    async fn fetch(&self, token: &str) -> Result<ExecutionOutput, SandboxError> {
        let url = format!(
            "{}/submissions/{}?base64_encoded=true&fields=stdout,stderr,compile_output,message,status,time,memory",
            self.base_url, token
        );

        let response = ensure_success(self.http.get(&url).send().await?).await?;
        let result: WireResult = response.json().await?;
        result.into_output()
    }
}

/// Progressive polling: short early, capped later
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub step: Duration,
    pub max_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_delay: Duration::from_millis(500),
            step: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl PollPolicy {
    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self {
            max_attempts: settings.poll_max_attempts,
            initial_delay: Duration::from_millis(settings.poll_initial_delay_ms),
            max_delay: Duration::from_millis(settings.poll_max_delay_ms),
            ..Self::default()
        }
    }

    /// No waiting between polls
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            step: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        (self.initial_delay + self.step * attempt).min(self.max_delay)
    }
}

/// Exponential backoff for transport failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self {
            max_attempts: settings.retry_max_attempts,
            ..Self::default()
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, base_delay: Duration::ZERO }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Submit-then-poll driver over any `SandboxClient`
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn SandboxClient>,
    poll: PollPolicy,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn SandboxClient>, poll: PollPolicy, retry: RetryPolicy) -> Self {
        Self { client, poll, retry }
    }

    /// Dispatch one program and wait for its terminal verdict.
    ///
    /// Transport failures are retried per `RetryPolicy`; everything else,
    /// including an exhausted poll budget, is returned as an error.
    #[tracing::instrument(skip(self, request), fields(language_id = request.language_id))]
    pub async fn dispatch(&self, request: &SandboxRequest) -> Result<ExecutionOutput, SandboxError> {
        let token = self.with_retry("submit", || self.client.submit(request)).await?;
        info!(token = %token, state = "submitted", "Sandbox accepted submission");

        for attempt in 0..self.poll.max_attempts {
            tokio::time::sleep(self.poll.delay_for(attempt)).await;

            let output = self.with_retry("fetch", || self.client.fetch(&token)).await?;
            if output.verdict.is_terminal() {
                info!(
                    token = %token,
                    state = %output.verdict,
                    polls = attempt + 1,
                    time_ms = output.time_ms,
                    memory_kb = output.memory_kb,
                    "Sandbox finished"
                );
                return Ok(output);
            }
            debug!(token = %token, state = %output.verdict, attempt, "Still waiting on sandbox");
        }

        warn!(token = %token, polls = self.poll.max_attempts, "Gave up polling sandbox");
        Err(SandboxError::PollExhausted(self.poll.max_attempts))
    }

    /// Like `dispatch`, but failures become an `InternalError` output
    pub async fn dispatch_or_internal(&self, request: &SandboxRequest) -> ExecutionOutput {
        match self.dispatch(request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Dispatch failed");
                ExecutionOutput::internal_error(e.to_string())
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, SandboxError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SandboxError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(op, attempt = attempt + 1, error = %e, delay_ms = delay.as_millis() as u64, "Retrying sandbox call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Scripted in-memory sandbox for tests
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use regex::Regex;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replaced in scripted stdout by the run token of the last submitted
    /// harness, so scripts can speak for the real program
    pub(crate) const RUN_PLACEHOLDER: &str = "@run@";

    #[derive(Default)]
    pub(crate) struct ScriptedSandbox {
        submits: Mutex<VecDeque<Result<String, SandboxError>>>,
        fetches: Mutex<VecDeque<Result<ExecutionOutput, SandboxError>>>,
        pub(crate) submitted: Mutex<Vec<SandboxRequest>>,
    }

    impl ScriptedSandbox {
        /// Accepts one submission and immediately reports `output`
        pub(crate) fn finishing_with(output: ExecutionOutput) -> Self {
            let sandbox = Self::default();
            sandbox.push_fetch(Ok(output));
            sandbox
        }

        pub(crate) fn push_submit(&self, result: Result<String, SandboxError>) {
            self.submits.lock().unwrap().push_back(result);
        }

        pub(crate) fn push_fetch(&self, result: Result<ExecutionOutput, SandboxError>) {
            self.fetches.lock().unwrap().push_back(result);
        }

        pub(crate) fn submission_count(&self) -> usize {
            self.submitted.lock().unwrap().len()
        }

        pub(crate) fn last_source(&self) -> Option<String> {
            self.submitted.lock().unwrap().last().map(|r| r.source.clone())
        }

        /// Run token stamped into the last submitted harness
        pub(crate) fn last_run_token(&self) -> Option<String> {
            let source = self.last_source()?;
            let re = Regex::new(r#"run\\?['"]?\s*:\s*\\?['"]([0-9a-f]{32})"#).unwrap();
            re.captures(&source).map(|caps| caps[1].to_string())
        }
    }

    #[async_trait]
    impl SandboxClient for ScriptedSandbox {
        async fn submit(&self, request: &SandboxRequest) -> Result<String, SandboxError> {
            let scripted = self.submits.lock().unwrap().pop_front();
            let result = scripted.unwrap_or_else(|| Ok("token-1".to_string()));
            if result.is_ok() {
                self.submitted.lock().unwrap().push(request.clone());
            }
            result
        }

        async fn fetch(&self, _token: &str) -> Result<ExecutionOutput, SandboxError> {
            let scripted = self
                .fetches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SandboxError::Decode("script exhausted".to_string())));
            let run = self.last_run_token().unwrap_or_default();
            scripted.map(|mut out| {
                out.stdout = out.stdout.replace(RUN_PLACEHOLDER, &run);
                out
            })
        }
    }

    pub(crate) fn output(verdict: SandboxVerdict, stdout: &str) -> ExecutionOutput {
        ExecutionOutput {
            verdict,
            status_description: verdict.to_string(),
            stdout: stdout.to_string(),
            stderr: String::new(),
            compile_output: String::new(),
            message: String::new(),
            time_ms: 12.0,
            memory_kb: 2048,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{output, ScriptedSandbox};
    use super::*;

    fn request() -> SandboxRequest {
        SandboxRequest {
            source: "print(1)".to_string(),
            language_id: 71,
            cpu_time_limit_secs: 2.0,
            memory_limit_kb: 128_000,
        }
    }

    fn dispatcher(sandbox: Arc<ScriptedSandbox>, polls: u32, retries: u32) -> Dispatcher {
        Dispatcher::new(sandbox, PollPolicy::immediate(polls), RetryPolicy::immediate(retries))
    }

    #[test]
    fn test_status_ids_map_to_verdicts() {
        assert_eq!(SandboxVerdict::from_status_id(1), SandboxVerdict::Queued);
        assert_eq!(SandboxVerdict::from_status_id(2), SandboxVerdict::Processing);
        assert_eq!(SandboxVerdict::from_status_id(3), SandboxVerdict::Accepted);
        assert_eq!(SandboxVerdict::from_status_id(5), SandboxVerdict::TimeLimitExceeded);
        assert_eq!(SandboxVerdict::from_status_id(6), SandboxVerdict::CompilationError);
        assert_eq!(SandboxVerdict::from_status_id(7), SandboxVerdict::RuntimeError);
        assert_eq!(SandboxVerdict::from_status_id(12), SandboxVerdict::RuntimeError);
        assert_eq!(SandboxVerdict::from_status_id(13), SandboxVerdict::InternalError);
        assert_eq!(SandboxVerdict::from_status_id(14), SandboxVerdict::InternalError);
        assert!(!SandboxVerdict::Queued.is_terminal());
        assert!(SandboxVerdict::WrongAnswer.is_terminal());
    }

    #[test]
    fn test_poll_delay_grows_then_caps() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(750));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(6), Duration::from_secs(2));
        assert_eq!(policy.delay_for(19), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_wire_result_is_decoded() {
        let json = serde_json::json!({
            "stdout": general_purpose::STANDARD.encode("Test Case 1: PASS\n"),
            "stderr": null,
            "compile_output": null,
            "message": null,
            "status": { "id": 3, "description": "Accepted" },
            "time": "0.025",
            "memory": 3456
        });
        let wire: WireResult = serde_json::from_value(json).unwrap();
        let output = wire.into_output().unwrap();
        assert_eq!(output.verdict, SandboxVerdict::Accepted);
        assert_eq!(output.stdout, "Test Case 1: PASS\n");
        assert_eq!(output.stderr, "");
        assert!((output.time_ms - 25.0).abs() < 1e-9);
        assert_eq!(output.memory_kb, 3456);
    }

    #[test]
    fn test_wrapped_base64_is_accepted() {
        let encoded = general_purpose::STANDARD.encode("hello world, this is output");
        let wrapped = format!("{}\n{}", &encoded[..10], &encoded[10..]);
        assert_eq!(decode_field(Some(wrapped)).unwrap(), "hello world, this is output");
        assert!(matches!(decode_field(Some("%%%".into())), Err(SandboxError::Decode(_))));
    }

    #[tokio::test]
    async fn test_dispatch_polls_until_terminal() {
        let sandbox = Arc::new(ScriptedSandbox::default());
        sandbox.push_fetch(Ok(output(SandboxVerdict::Queued, "")));
        sandbox.push_fetch(Ok(output(SandboxVerdict::Processing, "")));
        sandbox.push_fetch(Ok(output(SandboxVerdict::Accepted, "done")));

        let result = dispatcher(sandbox.clone(), 5, 1).dispatch(&request()).await.unwrap();
        assert_eq!(result.verdict, SandboxVerdict::Accepted);
        assert_eq!(result.stdout, "done");
        assert_eq!(sandbox.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_gives_up_after_poll_budget() {
        let sandbox = Arc::new(ScriptedSandbox::default());
        for _ in 0..3 {
            sandbox.push_fetch(Ok(output(SandboxVerdict::Processing, "")));
        }

        let err = dispatcher(sandbox.clone(), 3, 1).dispatch(&request()).await.unwrap_err();
        assert!(matches!(err, SandboxError::PollExhausted(3)));

        let fallback = dispatcher(sandbox, 0, 1).dispatch_or_internal(&request()).await;
        assert_eq!(fallback.verdict, SandboxVerdict::InternalError);
        assert!(fallback.message.contains("0 polls"));
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let sandbox = Arc::new(ScriptedSandbox::default());
        sandbox.push_submit(Err(SandboxError::Transport("connection reset".into())));
        sandbox.push_submit(Ok("tok".into()));
        sandbox.push_fetch(Err(SandboxError::Transport("timed out".into())));
        sandbox.push_fetch(Ok(output(SandboxVerdict::Accepted, "ok")));

        let result = dispatcher(sandbox.clone(), 2, 3).dispatch(&request()).await.unwrap();
        assert_eq!(result.stdout, "ok");
        assert_eq!(sandbox.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let sandbox = Arc::new(ScriptedSandbox::default());
        for _ in 0..3 {
            sandbox.push_submit(Err(SandboxError::Transport("refused".into())));
        }
        sandbox.push_submit(Ok("never-reached".into()));

        let err = dispatcher(sandbox.clone(), 2, 3).dispatch(&request()).await.unwrap_err();
        assert!(matches!(err, SandboxError::Transport(_)));
        assert_eq!(sandbox.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_http_errors_are_terminal() {
        let sandbox = Arc::new(ScriptedSandbox::default());
        sandbox.push_submit(Err(SandboxError::Http { status: 422, body: "bad language".into() }));
        sandbox.push_submit(Ok("never-reached".into()));

        let err = dispatcher(sandbox.clone(), 2, 3).dispatch(&request()).await.unwrap_err();
        assert!(matches!(err, SandboxError::Http { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_compilation_verdict_is_not_retried() {
        let sandbox = Arc::new(ScriptedSandbox::finishing_with(output(SandboxVerdict::CompilationError, "")));
        let result = dispatcher(sandbox.clone(), 5, 3).dispatch(&request()).await.unwrap();
        assert_eq!(result.verdict, SandboxVerdict::CompilationError);
        assert_eq!(sandbox.submission_count(), 1);
    }
}
