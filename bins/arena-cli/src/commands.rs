// CLI commands for working with harnesses offline and against a sandbox
use anyhow::{bail, Context, Result};
use arena_common::config::AppConfig;
use arena_common::store::MemoryStore;
use arena_common::types::{ExecutionReport, Language, Problem, TestCase};
use arena_engine::config::LanguageConfigManager;
use arena_engine::evaluator::SandboxMetrics;
use arena_engine::inference::InferredLiteral;
use arena_engine::signature::{declared_params, resolve, ArgSource};
use arena_engine::{
    Dispatcher, Executor, HttpSandboxClient, PollPolicy, Reconciler, RetryPolicy, RunRequest, SubmitRequest,
    SynthesizerRegistry,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Load a JSON problem document
fn load_problem(path: &Path) -> Result<Problem> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let problem: Problem =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse problem {}", path.display()))?;
    Ok(problem)
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read source {}", path.display()))
}

/// Public cases for a run, every case for a submission
pub fn select_cases(problem: &Problem, all: bool) -> Vec<TestCase> {
    if all {
        problem.ordered_cases()
    } else {
        problem.visible_cases()
    }
}

/// Generate the harness program and print or save it
pub fn synth(problem_path: &Path, language: Language, source_path: &Path, all: bool, output: Option<&Path>) -> Result<()> {
    let problem = load_problem(problem_path)?;
    let user_code = read_source(source_path)?;
    let cases = select_cases(&problem, all);
    if cases.is_empty() {
        bail!("Problem {} has no test cases to synthesize", problem.id);
    }

    let program = SynthesizerRegistry::default()
        .synthesize(language, &user_code, &problem.signature, &cases)
        .context("Harness synthesis failed")?;

    match output {
        Some(path) => {
            fs::write(path, &program.source).with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "✅ Wrote {} harness for {} cases to {} (run token {})",
                language,
                program.case_count,
                path.display(),
                program.run_token
            );
        }
        None => print!("{}", program.source),
    }
    Ok(())
}

/// Reconcile saved console output against a problem's cases
pub fn reconcile(
    problem_path: &Path,
    stdout_path: &Path,
    all: bool,
    run_token: Option<&str>,
    time_ms: f64,
    memory_kb: u64,
) -> Result<()> {
    let problem = load_problem(problem_path)?;
    let stdout =
        fs::read_to_string(stdout_path).with_context(|| format!("Failed to read {}", stdout_path.display()))?;
    let cases = select_cases(&problem, all);

    let results =
        Reconciler::default().reconcile_run(&stdout, &cases, SandboxMetrics { time_ms, memory_kb }, run_token);
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// One line per literal: raw text, inferred tag and detected arguments
pub fn describe_literal(raw: &str, declared: Option<&str>) -> String {
    let literal = InferredLiteral::new(raw);
    let declared_types = declared.and_then(declared_params);
    let signature = resolve(raw, declared_types.as_deref());

    let params: Vec<String> = signature
        .params
        .iter()
        .map(|p| match &p.source {
            ArgSource::Piece(text) => format!("{}={}", p.ty, text),
            ArgSource::Whole => format!("{}=<whole>", p.ty),
            ArgSource::ArrayPart => format!("{}=<array part>", p.ty),
            ArgSource::TargetPart => format!("{}=<target part>", p.ty),
        })
        .collect();

    format!(
        "{:?} -> {} | signature {:?} ({})",
        literal.raw,
        literal.ty,
        signature.shape,
        params.join(", ")
    )
}

pub fn infer(literals: &[String], declared: Option<&str>) -> Result<()> {
    if let Some(declaration) = declared {
        if declared_params(declaration).is_none() {
            bail!("Cannot read parameter types from declaration: {}", declaration);
        }
    }
    for raw in literals {
        let raw = raw.replace("\\n", "\n");
        println!("{}", describe_literal(&raw, declared));
    }
    Ok(())
}

/// Run or submit a solution against the sandbox from the environment
pub async fn run(problem_path: &Path, language: Language, source_path: &Path, submit: bool, user_id: &str) -> Result<()> {
    let problem = load_problem(problem_path)?;
    let source_code = read_source(source_path)?;
    let config = AppConfig::from_env()?;

    let languages = Arc::new(LanguageConfigManager::load(Path::new(&config.languages_config))?);
    let client = HttpSandboxClient::new(&config.sandbox)?;
    let dispatcher = Dispatcher::new(
        Arc::new(client),
        PollPolicy::from_settings(&config.sandbox),
        RetryPolicy::from_settings(&config.sandbox),
    );
    let store = Arc::new(MemoryStore::new());
    let executor = Executor::new(dispatcher, languages, store);

    let action = if submit { "Submitting" } else { "Running" };
    println!("🚀 {} {} in {} against {}", action, problem.id, language, config.sandbox.base_url);

    let report = if submit {
        let request = SubmitRequest {
            user_id: user_id.to_string(),
            language,
            source_code,
        };
        executor.submit(&problem, &request).await?
    } else {
        executor.run(&problem, &RunRequest { language, source_code }).await?
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &ExecutionReport) {
    for result in &report.results {
        let mark = if result.passed { "✅" } else { "❌" };
        println!(
            "{} Test Case {}: {} ({:.1} ms)",
            mark, result.case_number, result.status, result.runtime_ms
        );
        if !result.passed && result.visible {
            println!("   Input:    {}", result.input.replace('\n', " | "));
            println!("   Expected: {}", result.expected_output);
            println!("   Got:      {}", result.actual_output);
        }
    }
    println!();
    println!(
        "{} ({}/{} passed, {:.1} ms, {} KB)",
        report.outcome.overall_status,
        report.outcome.passed_count,
        report.outcome.total_count,
        report.outcome.total_runtime_ms,
        report.outcome.max_memory_kb
    );
    println!("{}", report.message);
    if let Some(id) = report.submission_id {
        println!("Submission recorded: {}", id);
    }
}

pub fn list_languages(config_path: &Path) -> Result<()> {
    let manager = LanguageConfigManager::load(config_path)?;
    println!("📋 Configured languages:");
    for config in manager.configs() {
        println!(
            "  {:<12} {:<18} sandbox id {:<4} {:.1}s / {} KB",
            config.name, config.version, config.sandbox_language_id, config.cpu_time_limit_secs, config.memory_limit_kb
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_common::types::{ProblemSignature, Visibility};
    use std::collections::BTreeMap;

    fn problem() -> Problem {
        let case = |id, visibility| TestCase {
            id,
            input: "[2,7,11,15]\n9".to_string(),
            expected_output: "[0,1]".to_string(),
            visibility,
            sort_order: id as i32,
        };
        Problem {
            id: "two-sum".to_string(),
            title: "Two Sum".to_string(),
            signature: ProblemSignature {
                function_name: "twoSum".to_string(),
                return_type: "int[]".to_string(),
                signatures: BTreeMap::new(),
            },
            test_cases: vec![case(2, Visibility::Hidden), case(1, Visibility::Public)],
        }
    }

    #[test]
    fn test_select_cases_respects_visibility() {
        let problem = problem();
        let visible = select_cases(&problem, false);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, 1);
        let all: Vec<u32> = select_cases(&problem, true).iter().map(|c| c.id).collect();
        assert_eq!(all, vec![1, 2]);
    }

    #[test]
    fn test_describe_array_target_literal() {
        let line = describe_literal("[2,7,11,15]\n9", None);
        assert!(line.contains("ArrayTarget"), "{}", line);
        assert!(line.contains("<array part>"));
        assert!(line.contains("<target part>"));
    }

    #[test]
    fn test_describe_scalar_literal() {
        let line = describe_literal("42", None);
        assert!(line.contains("-> integer"), "{}", line);
    }
}
