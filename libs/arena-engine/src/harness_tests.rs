/// Executed round trips through local language toolchains
///
/// Each test synthesizes one harness, runs it with the local interpreter or
/// compiler and reconciles its stdout against the same cases:
/// 1. Every supported value type passes through parse, call and compare
/// 2. A wrong answer and a thrown exception land on their own cases
/// 3. User output (top level and inside calls) never reaches the transcript
///
/// They are ignored by default and return early when the toolchain is missing:
/// `cargo test -p arena-engine round_trip -- --ignored`

#[cfg(test)]
mod round_trip_tests {
    use crate::evaluator::{Reconciler, SandboxMetrics};
    use crate::synth::{SynthesizerRegistry, CASE_MARKER};
    use arena_common::types::{CaseStatus, Language, ProblemSignature, TestCase, Visibility};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::process::Output;
    use tempfile::TempDir;
    use tokio::process::Command;

    const STRING_LITERAL: &str = r#""say \"hi\" \\ ok""#;

    /// One case per value type, then a wrong answer and a throwing call
    fn cases() -> Vec<TestCase> {
        let pairs = [
            ("7", "7"),
            ("3000000000", "3000000000"),
            ("2.5", "2.5"),
            ("true", "true"),
            (STRING_LITERAL, STRING_LITERAL),
            ("[1,2,3]", "[1,2,3]"),
            ("[1.5,2.25]", "[1.5,2.25]"),
            ("[\"a\",\"b c\"]", "[\"a\",\"b c\"]"),
            ("[[1,2],[3,4]]", "[[1,2],[3,4]]"),
            ("[]", "[]"),
            ("2", "3"),
            ("13", "13"),
        ];
        pairs
            .iter()
            .enumerate()
            .map(|(i, (input, expected))| TestCase {
                id: i as u32 + 1,
                input: input.to_string(),
                expected_output: expected.to_string(),
                visibility: Visibility::Public,
                sort_order: i as i32,
            })
            .collect()
    }

    fn echo_problem() -> ProblemSignature {
        ProblemSignature {
            function_name: "echo".to_string(),
            return_type: "auto".to_string(),
            signatures: BTreeMap::new(),
        }
    }

    const PYTHON_ECHO: &str = r#"
print('##CASE {"case": 1, "status": "PASS", "actual": "7"}')

def echo(x):
    print('##CASE {"case": 11, "status": "PASS", "actual": "3"}')
    if x == 13:
        raise ValueError('unlucky')
    return x
"#;

    const JAVASCRIPT_ECHO: &str = r#"
console.log('##CASE {"case": 1, "status": "PASS", "actual": "7"}');

function echo(x) {
  process.stdout.write('##CASE {"case": 11, "status": "PASS", "actual": "3"}\n');
  if (x === 13) throw new Error('unlucky');
  return x;
}
"#;

    const JAVA_ECHO: &str = r###"
static {
    System.out.println("##CASE {\"case\": 1, \"status\": \"PASS\", \"actual\": \"7\"}");
}

public int echo(int x) {
    System.out.println("##CASE {\"case\": 11, \"status\": \"PASS\", \"actual\": \"3\"}");
    if (x == 13) throw new IllegalStateException("unlucky");
    return x;
}
public long echo(long x) { return x; }
public double echo(double x) { return x; }
public boolean echo(boolean x) { return x; }
public String echo(String x) { return x; }
public int[] echo(int[] x) { return x; }
public double[] echo(double[] x) { return x; }
public String[] echo(String[] x) { return x; }
public int[][] echo(int[][] x) { return x; }
"###;

    const CPP_ECHO: &str = r###"
struct Noisy {
    Noisy() { cout << "##CASE {\"case\": 1, \"status\": \"PASS\", \"actual\": \"7\"}" << endl; }
} noisy;

int echo(int x) {
    cout << "##CASE {\"case\": 11, \"status\": \"PASS\", \"actual\": \"3\"}" << endl;
    if (x == 13) throw runtime_error("unlucky");
    return x;
}
long long echo(long long x) { return x; }
double echo(double x) { return x; }
bool echo(bool x) { return x; }
string echo(string x) { return x; }
vector<int> echo(vector<int> x) { return x; }
vector<double> echo(vector<double> x) { return x; }
vector<string> echo(vector<string> x) { return x; }
vector<vector<int>> echo(vector<vector<int>> x) { return x; }
"###;

    async fn available(tool: &str) -> bool {
        match Command::new(tool).arg("--version").output().await {
            Ok(out) => out.status.success(),
            Err(_) => false,
        }
    }

    async fn output_of(program: &Path, args: &[&str], cwd: &Path) -> Output {
        Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .unwrap_or_else(|e| panic!("failed to start {}: {}", program.display(), e))
    }

    fn assert_success(step: &str, out: &Output) {
        assert!(
            out.status.success(),
            "{} exited with {}:\n{}",
            step,
            out.status,
            String::from_utf8_lossy(&out.stderr)
        );
    }

    /// stdout of the program, or `None` when the toolchain is not installed
    async fn execute(language: Language, source: &str) -> Option<String> {
        let tool = match language {
            Language::Python => "python3",
            Language::JavaScript => "node",
            Language::Java => "javac",
            Language::Cpp => "g++",
        };
        if !available(tool).await {
            eprintln!("skipping {} round trip: {} not found", language, tool);
            return None;
        }

        let dir = TempDir::new().unwrap();
        let cwd = dir.path();
        let file = match language {
            Language::Python => "main.py",
            Language::JavaScript => "main.js",
            Language::Java => "Main.java",
            Language::Cpp => "main.cpp",
        };
        std::fs::write(cwd.join(file), source).unwrap();

        let run = match language {
            Language::Python => output_of(Path::new("python3"), &[file], cwd).await,
            Language::JavaScript => output_of(Path::new("node"), &[file], cwd).await,
            Language::Java => {
                assert_success("javac", &output_of(Path::new("javac"), &[file], cwd).await);
                output_of(Path::new("java"), &["-cp", ".", "Main"], cwd).await
            }
            Language::Cpp => {
                let compile = output_of(Path::new("g++"), &["-std=c++17", "-O0", "-o", "main", file], cwd).await;
                assert_success("g++", &compile);
                output_of(&cwd.join("main"), &[], cwd).await
            }
        };
        assert_success(tool, &run);
        Some(String::from_utf8_lossy(&run.stdout).into_owned())
    }

    async fn assert_round_trip(language: Language, user_code: &str) {
        let cases = cases();
        let program = SynthesizerRegistry::default()
            .synthesize(language, user_code, &echo_problem(), &cases)
            .unwrap();
        let Some(stdout) = execute(language, &program.source).await else {
            return;
        };

        let results =
            Reconciler::default().reconcile_run(&stdout, &cases, SandboxMetrics::default(), Some(&program.run_token));

        let statuses: Vec<CaseStatus> = results.iter().map(|r| r.status).collect();
        let mut expected = vec![CaseStatus::Passed; 10];
        expected.push(CaseStatus::WrongAnswer);
        expected.push(CaseStatus::RuntimeError);
        assert_eq!(statuses, expected, "{} stdout:\n{}", language, stdout);

        assert_eq!(results[4].actual_output, STRING_LITERAL, "{}", language);
        assert_eq!(results[10].actual_output, "2", "{}", language);
        assert!(results[11].actual_output.contains("unlucky"), "{}", language);
        assert!(stdout.contains("Results: 10/12 test cases passed"), "{}", language);
        for line in stdout.lines().filter(|l| l.starts_with(CASE_MARKER)) {
            assert!(line.contains(&program.run_token), "{} leaked user output: {}", language, line);
        }
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_round_trip() {
        assert_round_trip(Language::Python, PYTHON_ECHO).await;
    }

    #[tokio::test]
    #[ignore] // Requires node
    async fn test_javascript_round_trip() {
        assert_round_trip(Language::JavaScript, JAVASCRIPT_ECHO).await;
    }

    #[tokio::test]
    #[ignore] // Requires a JDK (javac and java)
    async fn test_java_round_trip() {
        assert_round_trip(Language::Java, JAVA_ECHO).await;
    }

    #[tokio::test]
    #[ignore] // Requires g++
    async fn test_cpp_round_trip() {
        assert_round_trip(Language::Cpp, CPP_ECHO).await;
    }
}
