/// Harness Synthesis
///
/// **Core Responsibility:**
/// Turn (user code, problem signature, ordered test cases) into one
/// self-contained program per target language.
///
/// **Emitted Program Contract (all languages):**
/// - standard imports and a stdout guard, then the user's code verbatim
/// - a parsing/rendering/comparison helper library
/// - one isolated evaluation per case, printing
///   `Test Case <n>: PASS|FAIL`, `Expected:`/`Got:` on failure, and a
///   `##CASE {json}` debug marker stamped with the run token
/// - a final `Results: <passed>/<total> test cases passed` line
///
/// User code never writes to the real stdout: the guard mutes it before the
/// user's code loads and again before every call, and the harness reports
/// through a handle it saved first.
///
/// Generation is deterministic: identical inputs (token included) produce
/// identical text.
mod cpp;
mod java;
mod javascript;
mod python;

pub use cpp::CppSynthesizer;
pub use java::JavaSynthesizer;
pub use javascript::JavaScriptSynthesizer;
pub use python::PythonSynthesizer;

use crate::error::SynthesisError;
use crate::inference::{infer, is_void_type, InferredLiteral, ValueType};
use crate::signature::{self, ArgSource, Param};
use arena_common::types::{Language, ProblemSignature, TestCase};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use uuid::Uuid;

/// Prefix of the structured per-case line every harness prints
pub const CASE_MARKER: &str = "##CASE";

/// How the value under comparison is obtained after the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Returned,
    /// `void` functions: the first argument is compared after the call
    MutatedFirstArgument,
}

/// Everything a language strategy needs to emit one case
#[derive(Debug, Clone, PartialEq)]
pub struct CasePlan {
    pub number: usize,
    pub raw_input: String,
    pub params: Vec<Param>,
    pub expected: InferredLiteral,
    /// Type used to parse the expected literal and choose the comparison
    pub compare_as: ValueType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessPlan {
    /// Embedded in every debug marker; markers without it are not ours
    pub run_token: String,
    pub function_name: String,
    pub uses_solution_class: bool,
    pub result: ResultKind,
    pub cases: Vec<CasePlan>,
}

impl HarnessPlan {
    /// Annotate every case with its inferred literals and detected signature
    pub fn build(
        language: Language,
        user_code: &str,
        problem: &ProblemSignature,
        test_cases: &[TestCase],
    ) -> Result<Self, SynthesisError> {
        let function_name = problem.function_name.trim();
        if function_name.is_empty() {
            return Err(SynthesisError::MissingFunctionName);
        }

        let declared_params = problem
            .signatures
            .get(&language)
            .and_then(|decl| signature::declared_params(decl));
        let declared_return = ValueType::from_declared(&problem.return_type);
        let result = if is_void_type(&problem.return_type) {
            ResultKind::MutatedFirstArgument
        } else {
            ResultKind::Returned
        };

        let mut cases = Vec::with_capacity(test_cases.len());
        for (idx, tc) in test_cases.iter().enumerate() {
            let number = idx + 1;
            for literal in [&tc.input, &tc.expected_output] {
                if infer(literal) == ValueType::Unknown {
                    return Err(SynthesisError::UnrepresentableLiteral {
                        case: number,
                        literal: literal.clone(),
                    });
                }
            }

            let sig = signature::resolve(&tc.input, declared_params.as_deref());
            let expected = InferredLiteral::new(&tc.expected_output);
            let compare_as = match result {
                ResultKind::Returned => declared_return.unwrap_or(expected.ty),
                ResultKind::MutatedFirstArgument => sig
                    .params
                    .first()
                    .map(|p| p.ty)
                    .filter(|ty| !ty.is_opaque())
                    .unwrap_or(expected.ty),
            };

            cases.push(CasePlan {
                number,
                raw_input: tc.input.trim().to_string(),
                params: sig.params,
                expected,
                compare_as,
            });
        }

        Ok(Self {
            run_token: derive_run_token(language, user_code, problem, test_cases),
            function_name: function_name.to_string(),
            uses_solution_class: declares_solution_class(user_code),
            result,
            cases,
        })
    }
}

/// Name-based UUID over everything the program is built from
fn derive_run_token(
    language: Language,
    user_code: &str,
    problem: &ProblemSignature,
    test_cases: &[TestCase],
) -> String {
    let mut name = format!("{}\0{}\0{}\0{}", language, problem.function_name, problem.return_type, user_code);
    for tc in test_cases {
        name.push('\0');
        name.push_str(&tc.input);
        name.push('\0');
        name.push_str(&tc.expected_output);
    }
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).simple().to_string()
}

fn declares_solution_class(user_code: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bclass\s+Solution\b").expect("static regex"))
        .is_match(user_code)
}

/// One target language's code generator
pub trait LanguageSynthesizer: Send + Sync {
    fn language(&self) -> Language;

    /// Source-level type of a parsed value (an annotation where the
    /// language has no declared types)
    fn type_name(&self, ty: ValueType) -> String;

    /// Source-level string literal holding `raw` exactly
    fn string_literal(&self, raw: &str) -> String;

    /// Expression producing the text an argument is parsed from
    fn source_expr(&self, source: &ArgSource, raw_var: &str) -> String;

    /// Expression turning a text expression into a typed value
    fn parse_expr(&self, ty: ValueType, text_expr: &str) -> String;

    /// Boolean expression comparing an actual value with the parsed expected value
    fn compare_expr(&self, ty: ValueType, actual: &str, expected: &str) -> String;

    /// String expression rendering a parsed expected value for display
    fn render_expr(&self, ty: ValueType, value: &str) -> String;

    /// Complete program text
    fn emit_program(&self, plan: &HarnessPlan, user_code: &str) -> String;
}

/// Generated source for one request. Discarded after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedProgram {
    pub language: Language,
    pub source: String,
    pub case_count: usize,
    pub run_token: String,
}

/// Lookup table from language to strategy
pub struct SynthesizerRegistry {
    strategies: HashMap<Language, Box<dyn LanguageSynthesizer>>,
}

impl Default for SynthesizerRegistry {
    fn default() -> Self {
        let mut registry = Self { strategies: HashMap::new() };
        registry.register(Box::new(PythonSynthesizer));
        registry.register(Box::new(JavaSynthesizer));
        registry.register(Box::new(CppSynthesizer));
        registry.register(Box::new(JavaScriptSynthesizer));
        registry
    }
}

impl SynthesizerRegistry {
    pub fn empty() -> Self {
        Self { strategies: HashMap::new() }
    }

    pub fn register(&mut self, strategy: Box<dyn LanguageSynthesizer>) {
        self.strategies.insert(strategy.language(), strategy);
    }

    pub fn get(&self, language: Language) -> Option<&dyn LanguageSynthesizer> {
        self.strategies.get(&language).map(|s| s.as_ref())
    }

    pub fn supports(&self, language: Language) -> bool {
        self.strategies.contains_key(&language)
    }

    /// Program whose run token is derived from its inputs
    pub fn synthesize(
        &self,
        language: Language,
        user_code: &str,
        problem: &ProblemSignature,
        test_cases: &[TestCase],
    ) -> Result<SynthesizedProgram, SynthesisError> {
        let plan = HarnessPlan::build(language, user_code, problem, test_cases)?;
        self.emit(language, plan, user_code)
    }

    /// Program stamped with a caller-chosen token, e.g. the request id
    pub fn synthesize_with_token(
        &self,
        language: Language,
        user_code: &str,
        problem: &ProblemSignature,
        test_cases: &[TestCase],
        run_token: &str,
    ) -> Result<SynthesizedProgram, SynthesisError> {
        let mut plan = HarnessPlan::build(language, user_code, problem, test_cases)?;
        plan.run_token = run_token.to_string();
        self.emit(language, plan, user_code)
    }

    fn emit(
        &self,
        language: Language,
        plan: HarnessPlan,
        user_code: &str,
    ) -> Result<SynthesizedProgram, SynthesisError> {
        let strategy = self
            .get(language)
            .ok_or(SynthesisError::UnsupportedLanguage(language))?;
        let source = strategy.emit_program(&plan, user_code);

        tracing::debug!(
            language = %language,
            cases = plan.cases.len(),
            source_bytes = source.len(),
            "Synthesized harness"
        );

        Ok(SynthesizedProgram {
            language,
            source,
            case_count: plan.cases.len(),
            run_token: plan.run_token,
        })
    }
}

/// Double-quoted literal with C-style escapes. With `ascii_only`, non-ASCII
/// characters become `\uXXXX` UTF-16 escapes.
pub(crate) fn escape_c_like(raw: &str, ascii_only: bool) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if ascii_only && !c.is_ascii() => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Indent every non-empty line of `code` by `width` spaces
pub(crate) fn indent(code: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    code.lines()
        .map(|line| if line.trim().is_empty() { String::new() } else { format!("{}{}", pad, line) })
        .collect::<Vec<_>>()
        .join("\n")
}
