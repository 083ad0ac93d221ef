use arena_common::store::StoreError;
use arena_common::types::Language;
use thiserror::Error;

/// Failures raised before anything is sent to the sandbox
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("no harness synthesizer for language: {0}")]
    UnsupportedLanguage(Language),
    #[error("problem declares no function name")]
    MissingFunctionName,
    #[error("test case {case} has a literal that cannot be embedded in source: {literal:?}")]
    UnrepresentableLiteral { case: usize, literal: String },
}

#[derive(Debug, Error)]
pub enum SandboxError {
    /// Connection refused/reset or timed out. The only retryable class.
    #[error("sandbox transport error: {0}")]
    Transport(String),
    #[error("sandbox returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("could not decode sandbox response: {0}")]
    Decode(String),
    #[error("sandbox did not finish after {0} polls")]
    PollExhausted(u32),
}

impl SandboxError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SandboxError::Transport(_))
    }
}

impl From<reqwest::Error> for SandboxError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            SandboxError::Transport(e.to_string())
        } else if e.is_decode() || e.is_body() {
            SandboxError::Decode(e.to_string())
        } else {
            SandboxError::Http {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                body: e.to_string(),
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no test cases to evaluate")]
    NoTestCases,
    #[error("language not configured: {0}")]
    LanguageNotConfigured(Language),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Whether the caller sent something unusable, as opposed to a server-side failure
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            EngineError::NoTestCases | EngineError::LanguageNotConfigured(_) | EngineError::Synthesis(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(SandboxError::Transport("reset".into()).is_retryable());
        assert!(!SandboxError::Http { status: 500, body: String::new() }.is_retryable());
        assert!(!SandboxError::Decode("bad json".into()).is_retryable());
        assert!(!SandboxError::PollExhausted(3).is_retryable());
    }

    #[test]
    fn test_input_errors_are_classified() {
        assert!(EngineError::NoTestCases.is_invalid_input());
        assert!(EngineError::from(SynthesisError::MissingFunctionName).is_invalid_input());
    }
}
