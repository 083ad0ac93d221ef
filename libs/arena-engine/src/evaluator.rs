/// Result Reconciler - Language-Agnostic Scoring Logic
///
/// **Core Responsibility:**
/// Turn the console text of one harness run into exactly one
/// `TestCaseResult` per submitted test case, in order.
///
/// **Critical Properties:**
/// - Knows nothing about the sandbox transport
/// - Knows nothing about language runtimes
/// - Pure function: (stdout, test cases, sandbox metrics) → results
/// - Never fails; ambiguity yields a failed "unable to determine" result
///
/// **Extraction Priority (first strategy that answers wins):**
/// 1. `##CASE {json}` debug marker for the case
/// 2. `Test Case <n>: PASS|FAIL` verdict line
/// 3. `Expected:` / `Actual:` (or `Output:`, `Got:`) pair for the case
/// 4. `Results: P/T test cases passed` summary line
///
/// **Forged Output:**
/// - A case reported twice (two markers or two verdict lines) is undetermined
/// - A second summary line voids the summary
/// - Given the run token, only markers stamped with it count as evidence, and
///   a single marker without it voids the whole transcript
///
/// **Normalization Rules:**
/// - Expected/actual comparison trims leading and trailing whitespace
/// - Case sensitivity: YES (exact match required)
use crate::inference::display_literal;
use crate::synth::CASE_MARKER;
use arena_common::types::{CaseStatus, TestCase, TestCaseResult};
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Metrics the sandbox reports for the whole program
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SandboxMetrics {
    pub time_ms: f64,
    pub memory_kb: u64,
}

/// Structured per-case line printed by every synthesized harness
#[derive(Debug, Clone, Deserialize)]
struct CaseMarker {
    case: usize,
    #[serde(default)]
    run: Option<String>,
    status: String,
    #[serde(default)]
    actual: String,
    #[serde(default)]
    ms: Option<f64>,
}

/// Expected/actual lines collected for one case
#[derive(Debug, Clone, Default)]
struct OutputPair {
    expected: Option<String>,
    actual: Option<String>,
    error: Option<String>,
}

impl OutputPair {
    fn is_empty(&self) -> bool {
        self.expected.is_none() && self.actual.is_none() && self.error.is_none()
    }
}

/// stdout parsed once, queried by every strategy
#[derive(Debug, Default)]
pub struct Transcript {
    empty: bool,
    markers: HashMap<usize, CaseMarker>,
    verdicts: HashMap<usize, bool>,
    blocks: HashMap<usize, OutputPair>,
    ordinal_pairs: Vec<OutputPair>,
    has_headers: bool,
    summary: Option<(usize, usize)>,
    summary_repeated: bool,
    /// Cases reported more than once
    contested: HashSet<usize>,
    /// Markers that do not carry the expected run token
    foreign_markers: usize,
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:test\s+)?case\s*#?\s*(\d+)\s*:?\s*(passed|failed|pass|fail)?\b")
            .expect("static regex")
    })
}

fn summary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^results?\s*:\s*(\d+)\s*/\s*(\d+)").expect("static regex"))
}

/// Value after a `Label:` prefix, if the line carries one of `labels`
fn labelled<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    let (label, rest) = line.split_once(':')?;
    labels
        .iter()
        .any(|l| label.trim().eq_ignore_ascii_case(l))
        .then(|| rest.trim())
}

impl Transcript {
    /// Parse output of unknown origin: every recognised line is evidence
    pub fn parse(stdout: &str) -> Self {
        Self::parse_run(stdout, None)
    }

    /// With `run_token`, only markers stamped with it are kept and every
    /// other line is ignored
    pub fn parse_run(stdout: &str, run_token: Option<&str>) -> Self {
        let mut transcript = Transcript {
            empty: stdout.trim().is_empty(),
            ..Default::default()
        };
        let mut current: Option<usize> = None;

        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(json) = line.strip_prefix(CASE_MARKER) {
                match serde_json::from_str::<CaseMarker>(json.trim()) {
                    Ok(marker) if run_token.is_some() && marker.run.as_deref() != run_token => {
                        transcript.foreign_markers += 1;
                    }
                    Ok(marker) => {
                        let case = marker.case;
                        if transcript.markers.insert(case, marker).is_some() {
                            transcript.contested.insert(case);
                        }
                    }
                    Err(_) if run_token.is_some() => transcript.foreign_markers += 1,
                    Err(e) => tracing::debug!(error = %e, "Ignoring malformed case marker"),
                }
                continue;
            }

            if run_token.is_some() {
                continue;
            }

            if let Some(caps) = header_re().captures(line) {
                let Ok(n) = caps[1].parse::<usize>() else {
                    continue;
                };
                transcript.has_headers = true;
                current = Some(n);
                if let Some(word) = caps.get(2) {
                    let passed = word.as_str().to_ascii_lowercase().starts_with("pass");
                    if transcript.verdicts.insert(n, passed).is_some() {
                        transcript.contested.insert(n);
                    }
                }
                continue;
            }

            if let Some(caps) = summary_re().captures(line) {
                if let (Ok(p), Ok(t)) = (caps[1].parse(), caps[2].parse()) {
                    if transcript.summary.is_some() || transcript.summary_repeated {
                        transcript.summary_repeated = true;
                        transcript.summary = None;
                    } else {
                        transcript.summary = Some((p, t));
                    }
                }
                continue;
            }

            if let Some(value) = labelled(line, &["expected"]) {
                transcript.pair_for(current, |p| p.expected.is_some()).expected = Some(value.to_string());
            } else if let Some(value) = labelled(line, &["actual", "output", "got"]) {
                transcript.pair_for(current, |p| p.actual.is_some()).actual = Some(value.to_string());
            } else if let Some(value) = labelled(line, &["error"]) {
                transcript.pair_for(current, |p| p.error.is_some()).error = Some(value.to_string());
            }
        }

        transcript
    }

    /// Pair receiving the next labelled line. Without headers a new ordinal
    /// pair starts whenever the field is already taken.
    fn pair_for(&mut self, current: Option<usize>, taken: impl Fn(&OutputPair) -> bool) -> &mut OutputPair {
        if let Some(n) = current {
            return self.blocks.entry(n).or_default();
        }
        let start_new = self.ordinal_pairs.last().map_or(true, |p| taken(p));
        if start_new {
            self.ordinal_pairs.push(OutputPair::default());
        }
        let last = self.ordinal_pairs.len() - 1;
        &mut self.ordinal_pairs[last]
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Some marker was not printed by the harness this transcript belongs to
    pub fn is_forged(&self) -> bool {
        self.foreign_markers > 0
    }

    pub fn is_contested(&self, case_number: usize) -> bool {
        self.contested.contains(&case_number)
    }

    fn pair(&self, case_number: usize) -> Option<&OutputPair> {
        let pair = if self.has_headers {
            self.blocks.get(&case_number)
        } else {
            self.ordinal_pairs.get(case_number.checked_sub(1)?)
        };
        pair.filter(|p| !p.is_empty())
    }
}

/// What one strategy concluded about one case
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub passed: bool,
    pub status: CaseStatus,
    pub actual: String,
    pub runtime_ms: Option<f64>,
}

impl Extraction {
    fn passed(actual: impl Into<String>) -> Self {
        Self { passed: true, status: CaseStatus::Passed, actual: actual.into(), runtime_ms: None }
    }

    fn failed(status: CaseStatus, actual: impl Into<String>) -> Self {
        Self { passed: false, status, actual: actual.into(), runtime_ms: None }
    }
}

/// One link of the reconciliation chain
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_extract(&self, transcript: &Transcript, case_number: usize, case: &TestCase) -> Option<Extraction>;
}

pub struct DebugMarkerStrategy;

impl ExtractionStrategy for DebugMarkerStrategy {
    fn name(&self) -> &'static str {
        "debug_marker"
    }

    fn try_extract(&self, transcript: &Transcript, case_number: usize, _case: &TestCase) -> Option<Extraction> {
        let marker = transcript.markers.get(&case_number)?;
        let mut extraction = match marker.status.to_ascii_uppercase().as_str() {
            "PASS" => Extraction::passed(marker.actual.clone()),
            "FAIL" => Extraction::failed(CaseStatus::WrongAnswer, marker.actual.clone()),
            "ERROR" => Extraction::failed(CaseStatus::RuntimeError, marker.actual.clone()),
            _ => return None,
        };
        extraction.runtime_ms = marker.ms;
        Some(extraction)
    }
}

pub struct VerdictLineStrategy;

impl ExtractionStrategy for VerdictLineStrategy {
    fn name(&self) -> &'static str {
        "verdict_line"
    }

    fn try_extract(&self, transcript: &Transcript, case_number: usize, case: &TestCase) -> Option<Extraction> {
        let passed = *transcript.verdicts.get(&case_number)?;
        if passed {
            return Some(Extraction::passed(case.expected_output.trim()));
        }
        let pair = transcript.blocks.get(&case_number);
        let extraction = match pair.and_then(|p| p.error.as_ref()) {
            Some(error) => Extraction::failed(CaseStatus::RuntimeError, format!("Error: {}", error)),
            None => Extraction::failed(
                CaseStatus::WrongAnswer,
                pair.and_then(|p| p.actual.clone()).unwrap_or_default(),
            ),
        };
        Some(extraction)
    }
}

pub struct ExpectedActualPairStrategy;

impl ExtractionStrategy for ExpectedActualPairStrategy {
    fn name(&self) -> &'static str {
        "expected_actual_pair"
    }

    fn try_extract(&self, transcript: &Transcript, case_number: usize, case: &TestCase) -> Option<Extraction> {
        let pair = transcript.pair(case_number)?;
        if let Some(error) = &pair.error {
            return Some(Extraction::failed(CaseStatus::RuntimeError, format!("Error: {}", error)));
        }
        let actual = pair.actual.as_deref()?;
        let expected = pair.expected.as_deref().unwrap_or(&case.expected_output);
        if normalize_output(actual) == normalize_output(expected) {
            Some(Extraction::passed(normalize_output(actual)))
        } else {
            Some(Extraction::failed(CaseStatus::WrongAnswer, normalize_output(actual)))
        }
    }
}

/// Fail-closed: a partial summary cannot say which cases failed, so all fail
pub struct SummaryLineStrategy;

impl ExtractionStrategy for SummaryLineStrategy {
    fn name(&self) -> &'static str {
        "summary_line"
    }

    fn try_extract(&self, transcript: &Transcript, case_number: usize, case: &TestCase) -> Option<Extraction> {
        let (passed, total) = transcript.summary?;
        if case_number > total {
            return None;
        }
        if passed == total {
            Some(Extraction::passed(case.expected_output.trim()))
        } else {
            Some(Extraction::failed(CaseStatus::Undetermined, String::new()))
        }
    }
}

/// Trim leading/trailing whitespace. Internal whitespace and case are preserved.
fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Chain of extraction strategies with a fail-closed fallback
pub struct Reconciler {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(DebugMarkerStrategy),
                Box::new(VerdictLineStrategy),
                Box::new(ExpectedActualPairStrategy),
                Box::new(SummaryLineStrategy),
            ],
        }
    }
}

impl Reconciler {
    /// Append a strategy after the built-in ones
    pub fn with_strategy(mut self, strategy: Box<dyn ExtractionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Reconcile `stdout` against `cases`. Always returns `cases.len()` results.
    pub fn reconcile(&self, stdout: &str, cases: &[TestCase], metrics: SandboxMetrics) -> Vec<TestCaseResult> {
        self.reconcile_run(stdout, cases, metrics, None)
    }

    /// Like [`Reconciler::reconcile`], trusting only markers stamped with
    /// `run_token` when one is given
    pub fn reconcile_run(
        &self,
        stdout: &str,
        cases: &[TestCase],
        metrics: SandboxMetrics,
        run_token: Option<&str>,
    ) -> Vec<TestCaseResult> {
        let transcript = Transcript::parse_run(stdout, run_token);
        if transcript.is_forged() {
            tracing::warn!(
                foreign_markers = transcript.foreign_markers,
                "Output carries case markers from outside the harness, failing every case"
            );
        }
        let even_share = if cases.is_empty() { 0.0 } else { metrics.time_ms / cases.len() as f64 };

        let results: Vec<TestCaseResult> = cases
            .iter()
            .enumerate()
            .map(|(idx, case)| {
                let case_number = idx + 1;
                let extraction = self.extract(&transcript, case_number, case);
                TestCaseResult {
                    case_number,
                    input: display_literal(&case.input),
                    expected_output: case.expected_output.trim().to_string(),
                    actual_output: extraction.actual,
                    passed: extraction.passed,
                    status: extraction.status,
                    runtime_ms: extraction.runtime_ms.unwrap_or(even_share),
                    memory_kb: metrics.memory_kb,
                    visible: case.is_visible(),
                }
            })
            .collect();

        tracing::debug!(
            cases = cases.len(),
            passed = results.iter().filter(|r| r.passed).count(),
            markers = transcript.markers.len(),
            contested = transcript.contested.len(),
            "Reconciled harness output"
        );
        results
    }

    fn extract(&self, transcript: &Transcript, case_number: usize, case: &TestCase) -> Extraction {
        if transcript.is_forged() || transcript.is_contested(case_number) {
            return Extraction::failed(CaseStatus::Undetermined, String::new());
        }
        for strategy in &self.strategies {
            if let Some(extraction) = strategy.try_extract(transcript, case_number, case) {
                tracing::trace!(case = case_number, strategy = strategy.name(), passed = extraction.passed, "Case extracted");
                return extraction;
            }
        }
        let status = if transcript.is_empty() { CaseStatus::NoOutput } else { CaseStatus::Undetermined };
        Extraction::failed(status, String::new())
    }
}
