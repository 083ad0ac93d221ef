use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Target languages a harness can be synthesized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Cpp,
    JavaScript,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::Java,
        Language::Cpp,
        Language::JavaScript,
    ];
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::JavaScript => "javascript",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Hidden,
}

/// A single test case as stored with its problem. Literals are raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u32,
    pub input: String,
    pub expected_output: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub sort_order: i32,
}

impl TestCase {
    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// Declared shape of the function the user implements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemSignature {
    pub function_name: String,
    /// Semantic type name, e.g. `int[]`, `string`, `void`
    pub return_type: String,
    /// Optional per-language signature text, e.g. `int[] twoSum(int[] nums, int target)`
    #[serde(default)]
    pub signatures: BTreeMap<Language, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub signature: ProblemSignature,
    pub test_cases: Vec<TestCase>,
}

impl Problem {
    /// Test cases ordered by `sort_order`, then id
    pub fn ordered_cases(&self) -> Vec<TestCase> {
        let mut cases = self.test_cases.clone();
        cases.sort_by_key(|tc| (tc.sort_order, tc.id));
        cases
    }

    pub fn visible_cases(&self) -> Vec<TestCase> {
        self.ordered_cases()
            .into_iter()
            .filter(TestCase::is_visible)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    WrongAnswer,
    RuntimeError,
    TimeLimitExceeded,
    CompilationError,
    InternalError,
    NoOutput,
    Undetermined,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseStatus::Passed => "passed",
            CaseStatus::WrongAnswer => "wrong answer",
            CaseStatus::RuntimeError => "runtime error",
            CaseStatus::TimeLimitExceeded => "time limit exceeded",
            CaseStatus::CompilationError => "compilation error",
            CaseStatus::InternalError => "internal error",
            CaseStatus::NoOutput => "no output",
            CaseStatus::Undetermined => "unable to determine",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Accepted,
    WrongAnswer,
    CompilationError,
    RuntimeError,
    TimeLimitExceeded,
    InternalError,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Accepted => "accepted",
            OverallStatus::WrongAnswer => "wrong_answer",
            OverallStatus::CompilationError => "compilation_error",
            OverallStatus::RuntimeError => "runtime_error",
            OverallStatus::TimeLimitExceeded => "time_limit_exceeded",
            OverallStatus::InternalError => "internal_error",
        };
        write!(f, "{}", s)
    }
}

impl From<CaseStatus> for OverallStatus {
    /// Overall status implied by a failing case. Ambiguous cases count as wrong answers.
    fn from(status: CaseStatus) -> Self {
        match status {
            CaseStatus::Passed => OverallStatus::Accepted,
            CaseStatus::RuntimeError => OverallStatus::RuntimeError,
            CaseStatus::TimeLimitExceeded => OverallStatus::TimeLimitExceeded,
            CaseStatus::CompilationError => OverallStatus::CompilationError,
            CaseStatus::InternalError => OverallStatus::InternalError,
            CaseStatus::WrongAnswer | CaseStatus::NoOutput | CaseStatus::Undetermined => {
                OverallStatus::WrongAnswer
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub case_number: usize,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
    pub status: CaseStatus,
    pub runtime_ms: f64,
    pub memory_kb: u64,
    pub visible: bool,
}

impl TestCaseResult {
    /// Hidden cases are reported without their literals
    pub fn redacted(mut self) -> Self {
        if !self.visible {
            self.input = "hidden".to_string();
            self.expected_output = "hidden".to_string();
            self.actual_output = "hidden".to_string();
        }
        self
    }
}

/// Aggregate over a complete result list. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub overall_status: OverallStatus,
    pub passed_count: usize,
    pub total_count: usize,
    pub total_runtime_ms: f64,
    pub max_memory_kb: u64,
}

impl ExecutionOutcome {
    pub fn fold(results: &[TestCaseResult]) -> Self {
        let overall_status = results
            .iter()
            .find(|r| !r.passed)
            .map(|r| OverallStatus::from(r.status))
            .unwrap_or(OverallStatus::Accepted);

        Self {
            overall_status,
            passed_count: results.iter().filter(|r| r.passed).count(),
            total_count: results.len(),
            total_runtime_ms: results.iter().map(|r| r.runtime_ms).sum(),
            max_memory_kb: results.iter().map(|r| r.memory_kb).max().unwrap_or(0),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.total_count > 0 && self.passed_count == self.total_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub request_id: Uuid,
    pub language: Language,
    pub outcome: ExecutionOutcome,
    pub results: Vec<TestCaseResult>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<Uuid>,
}

/// Durable record of an accepted submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub problem_id: String,
    pub language: Language,
    pub source_code: String,
    pub runtime_ms: f64,
    pub memory_kb: u64,
    pub passed_count: usize,
    pub total_count: usize,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(n: usize, passed: bool, status: CaseStatus, ms: f64, kb: u64) -> TestCaseResult {
        TestCaseResult {
            case_number: n,
            input: "1".to_string(),
            expected_output: "1".to_string(),
            actual_output: "1".to_string(),
            passed,
            status,
            runtime_ms: ms,
            memory_kb: kb,
            visible: true,
        }
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("Python".parse::<Language>(), Ok(Language::Python));
        assert_eq!("c++".parse::<Language>(), Ok(Language::Cpp));
        assert_eq!("node".parse::<Language>(), Ok(Language::JavaScript));
        assert!("cobol".parse::<Language>().is_err());
        assert_eq!(Language::JavaScript.to_string(), "javascript");
    }

    #[test]
    fn test_language_serde_roundtrip_is_lowercase() {
        let json = serde_json::to_string(&Language::Cpp).unwrap();
        assert_eq!(json, "\"cpp\"");
    }

    #[test]
    fn test_fold_all_passed() {
        let results = vec![
            result(1, true, CaseStatus::Passed, 1.5, 100),
            result(2, true, CaseStatus::Passed, 2.5, 300),
        ];
        let outcome = ExecutionOutcome::fold(&results);
        assert_eq!(outcome.overall_status, OverallStatus::Accepted);
        assert_eq!(outcome.passed_count, 2);
        assert_eq!(outcome.total_count, 2);
        assert_eq!(outcome.total_runtime_ms, 4.0);
        assert_eq!(outcome.max_memory_kb, 300);
        assert!(outcome.all_passed());
    }

    #[test]
    fn test_fold_first_failure_decides_status() {
        let results = vec![
            result(1, true, CaseStatus::Passed, 1.0, 10),
            result(2, false, CaseStatus::RuntimeError, 1.0, 10),
            result(3, false, CaseStatus::WrongAnswer, 1.0, 10),
        ];
        let outcome = ExecutionOutcome::fold(&results);
        assert_eq!(outcome.overall_status, OverallStatus::RuntimeError);
        assert_eq!(outcome.passed_count, 1);
        assert!(!outcome.all_passed());
    }

    #[test]
    fn test_fold_undetermined_is_wrong_answer() {
        let results = vec![result(1, false, CaseStatus::Undetermined, 0.0, 0)];
        assert_eq!(
            ExecutionOutcome::fold(&results).overall_status,
            OverallStatus::WrongAnswer
        );
    }

    #[test]
    fn test_empty_fold_is_not_a_pass() {
        let outcome = ExecutionOutcome::fold(&[]);
        assert!(!outcome.all_passed());
    }

    #[test]
    fn test_redaction_only_touches_hidden() {
        let mut hidden = result(1, true, CaseStatus::Passed, 0.0, 0);
        hidden.visible = false;
        let redacted = hidden.redacted();
        assert_eq!(redacted.input, "hidden");
        assert!(redacted.passed);

        let shown = result(2, true, CaseStatus::Passed, 0.0, 0).redacted();
        assert_eq!(shown.input, "1");
    }

    #[test]
    fn test_cases_ordered_by_sort_order() {
        let problem = Problem {
            id: "p".to_string(),
            title: String::new(),
            signature: ProblemSignature {
                function_name: "f".to_string(),
                return_type: "int".to_string(),
                signatures: BTreeMap::new(),
            },
            test_cases: vec![
                TestCase {
                    id: 1,
                    input: "a".to_string(),
                    expected_output: "a".to_string(),
                    visibility: Visibility::Hidden,
                    sort_order: 2,
                },
                TestCase {
                    id: 2,
                    input: "b".to_string(),
                    expected_output: "b".to_string(),
                    visibility: Visibility::Public,
                    sort_order: 1,
                },
            ],
        };
        let ordered: Vec<u32> = problem.ordered_cases().iter().map(|c| c.id).collect();
        assert_eq!(ordered, vec![2, 1]);
        assert_eq!(problem.visible_cases().len(), 1);
    }
}
