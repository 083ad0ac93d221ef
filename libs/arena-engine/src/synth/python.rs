use super::{HarnessPlan, LanguageSynthesizer, ResultKind, CASE_MARKER};
use crate::inference::ValueType;
use crate::signature::ArgSource;
use arena_common::types::Language;
use std::fmt::Write;

const PRELUDE: &str = r#"import json
import math
import re
import sys
import time
import heapq
import bisect
import itertools
import functools
import contextlib
import io
from typing import *
from collections import *

sys.setrecursionlimit(10000)


class _HSink(io.TextIOBase):
    def writable(self):
        return True

    def write(self, s):
        return len(s)


_h_stdout = sys.stdout
_h_sink = _HSink()
sys.stdout = _h_sink
"#;

const HELPERS: &str = r##"
def _h_split_top(s):
    parts, cur = [], []
    depth, quote, esc = 0, None, False
    for ch in s:
        if quote:
            cur.append(ch)
            if esc:
                esc = False
            elif ch == '\\':
                esc = True
            elif ch == quote:
                quote = None
            continue
        if ch in '"\'':
            quote = ch
            cur.append(ch)
        elif ch == '[':
            depth += 1
            cur.append(ch)
        elif ch == ']':
            depth -= 1
            cur.append(ch)
        elif ch == ',' and depth == 0:
            parts.append(''.join(cur).strip())
            cur = []
        else:
            cur.append(ch)
    tail = ''.join(cur).strip()
    if tail:
        parts.append(tail)
    return parts


def _h_inner(s):
    s = s.strip()
    if not (s.startswith('[') and s.endswith(']')):
        raise ValueError('expected a bracketed list: ' + s)
    return s[1:-1].strip()


def _h_unescape(body):
    out, i = [], 0
    while i < len(body):
        ch = body[i]
        if ch == '\\' and i + 1 < len(body):
            nxt = body[i + 1]
            out.append({'n': '\n', 't': '\t', 'r': '\r'}.get(nxt, nxt))
            i += 2
        else:
            out.append(ch)
            i += 1
    return ''.join(out)


def _h_parse_int(s):
    return int(s.strip())


def _h_parse_double(s):
    return float(s.strip())


def _h_parse_bool(s):
    return s.strip().lower() == 'true'


def _h_parse_string(s):
    s = s.strip()
    if len(s) >= 2 and s[0] == s[-1] and s[0] in '"\'':
        return _h_unescape(s[1:-1])
    return s


def _h_parse_int_array(s):
    return [_h_parse_int(p) for p in _h_split_top(_h_inner(s))]


def _h_parse_double_array(s):
    return [_h_parse_double(p) for p in _h_split_top(_h_inner(s))]


def _h_parse_string_array(s):
    return [_h_parse_string(p) for p in _h_split_top(_h_inner(s))]


def _h_parse_int_matrix(s):
    return [_h_parse_int_array(row) for row in _h_split_top(_h_inner(s))]


def _h_extract_array(s):
    start = s.find('[')
    if start < 0:
        raise ValueError('no array in input: ' + s)
    depth, quote, esc = 0, None, False
    for i in range(start, len(s)):
        ch = s[i]
        if quote:
            if esc:
                esc = False
            elif ch == '\\':
                esc = True
            elif ch == quote:
                quote = None
            continue
        if ch in '"\'':
            quote = ch
        elif ch == '[':
            depth += 1
        elif ch == ']':
            depth -= 1
            if depth == 0:
                return s[start:i + 1]
    raise ValueError('unbalanced array in input: ' + s)


def _h_extract_target(s):
    arr = _h_extract_array(s)
    rest = s[s.find('[') + len(arr):]
    rest = re.sub(r'^[\s,]+', '', rest)
    rest = re.sub(r'^[A-Za-z_]\w*\s*=(?!=)\s*', '', rest)
    rest = rest.strip().rstrip(',').strip()
    if not rest:
        raise ValueError('no target after array: ' + s)
    return rest


def _h_render(v):
    if v is None:
        return 'null'
    if isinstance(v, bool):
        return 'true' if v else 'false'
    if isinstance(v, int):
        return str(v)
    if isinstance(v, float):
        t = ('%.5f' % v).rstrip('0').rstrip('.')
        return '0' if t in ('-0', '') else t
    if isinstance(v, str):
        return json.dumps(v, ensure_ascii=False)
    if isinstance(v, (list, tuple)):
        return '[' + ','.join(_h_render(x) for x in v) + ']'
    return str(v)


def _h_same(a, b, approx):
    if isinstance(b, (list, tuple)):
        return (isinstance(a, (list, tuple)) and len(a) == len(b)
                and all(_h_same(x, y, approx) for x, y in zip(a, b)))
    if isinstance(a, bool) or isinstance(b, bool):
        return a == b
    if isinstance(a, (int, float)) and isinstance(b, (int, float)):
        if approx or isinstance(a, float) or isinstance(b, float):
            return abs(a - b) <= 1e-6 * max(1.0, abs(a), abs(b))
    return a == b


def _h_same_text(actual, expected_text):
    want = re.sub(r'\s+', '', expected_text)
    return (re.sub(r'\s+', '', _h_render(actual)) == want
            or re.sub(r'\s+', '', str(actual)) == want)


def _h_emit(*lines):
    for line in lines:
        _h_stdout.write(line + '\n')
    _h_stdout.flush()


def _h_report(case, ok, raw, expected, actual, ms):
    status = 'PASS' if ok else 'FAIL'
    lines = ['Test Case %d: %s' % (case, status)]
    if not ok:
        lines += ['Expected: ' + expected, 'Got: ' + actual]
    lines.append('@@MARKER@@ ' + json.dumps({'case': case, 'run': '@@RUN@@', 'status': status, 'input': raw,
                                             'expected': expected, 'actual': actual, 'ms': round(ms, 3)}))
    _h_emit(*lines)


def _h_report_error(case, raw, expected, err):
    _h_emit('Test Case %d: FAIL' % case,
            'Expected: ' + expected,
            'Error: ' + err,
            '@@MARKER@@ ' + json.dumps({'case': case, 'run': '@@RUN@@', 'status': 'ERROR', 'input': raw,
                                        'expected': expected, 'actual': 'Error: ' + err, 'ms': 0}))
"##;

pub struct PythonSynthesizer;

impl LanguageSynthesizer for PythonSynthesizer {
    fn language(&self) -> Language {
        Language::Python
    }

    fn string_literal(&self, raw: &str) -> String {
        // JSON string syntax is a subset of Python's
        serde_json::Value::String(raw.to_string()).to_string()
    }

    fn source_expr(&self, source: &ArgSource, raw_var: &str) -> String {
        match source {
            ArgSource::Whole => raw_var.to_string(),
            ArgSource::ArrayPart => format!("_h_extract_array({})", raw_var),
            ArgSource::TargetPart => format!("_h_extract_target({})", raw_var),
            ArgSource::Piece(text) => self.string_literal(text),
        }
    }

    fn type_name(&self, ty: ValueType) -> String {
        match ty {
            ValueType::Integer | ValueType::Long => "int",
            ValueType::Double => "float",
            ValueType::Boolean => "bool",
            ValueType::String => "str",
            ValueType::IntArray => "List[int]",
            ValueType::StringArray => "List[str]",
            ValueType::DoubleArray => "List[float]",
            ValueType::IntMatrix => "List[List[int]]",
            ValueType::Object | ValueType::Null | ValueType::Unknown => "Any",
        }
        .to_string()
    }

    fn parse_expr(&self, ty: ValueType, text_expr: &str) -> String {
        let helper = match ty {
            ValueType::Integer | ValueType::Long => "_h_parse_int",
            ValueType::Double => "_h_parse_double",
            ValueType::Boolean => "_h_parse_bool",
            ValueType::String => "_h_parse_string",
            ValueType::IntArray => "_h_parse_int_array",
            ValueType::StringArray => "_h_parse_string_array",
            ValueType::DoubleArray => "_h_parse_double_array",
            ValueType::IntMatrix => "_h_parse_int_matrix",
            ValueType::Object | ValueType::Null | ValueType::Unknown => return text_expr.to_string(),
        };
        format!("{}({})", helper, text_expr)
    }

    fn compare_expr(&self, ty: ValueType, actual: &str, expected: &str) -> String {
        if ty.is_opaque() {
            format!("_h_same_text({}, {})", actual, expected)
        } else {
            let approx = if ty.is_approximate() { "True" } else { "False" };
            format!("_h_same({}, {}, {})", actual, expected, approx)
        }
    }

    fn render_expr(&self, ty: ValueType, value: &str) -> String {
        if ty.is_opaque() {
            value.to_string()
        } else {
            format!("_h_render({})", value)
        }
    }

    fn emit_program(&self, plan: &HarnessPlan, user_code: &str) -> String {
        let mut out = String::new();
        out.push_str(PRELUDE);
        out.push('\n');
        out.push_str(user_code.trim_end());
        out.push_str("\n\n");
        out.push_str(
            &HELPERS
                .replace("@@MARKER@@", CASE_MARKER)
                .replace("@@RUN@@", &plan.run_token),
        );
        out.push('\n');

        let callee = if plan.uses_solution_class {
            format!("Solution().{}", plan.function_name)
        } else {
            plan.function_name.clone()
        };

        let _ = writeln!(out, "_passed = 0");
        let _ = writeln!(out, "_total = {}", plan.cases.len());

        for case in &plan.cases {
            let n = case.number;
            let args: Vec<String> = (0..case.params.len()).map(|i| format!("_a{}", i)).collect();

            let _ = writeln!(out, "\n# Test Case {}", n);
            let _ = writeln!(out, "_raw = {}", self.string_literal(&case.raw_input));
            let _ = writeln!(out, "_expected_text = {}", self.string_literal(&case.expected.raw));
            let _ = writeln!(out, "try:");
            for (arg, param) in args.iter().zip(&case.params) {
                let text = self.source_expr(&param.source, "_raw");
                let _ = writeln!(
                    out,
                    "    {}: {} = {}",
                    arg,
                    self.type_name(param.ty),
                    self.parse_expr(param.ty, &text)
                );
            }
            let _ = writeln!(out, "    _expected = {}", self.parse_expr(case.compare_as, "_expected_text"));
            let _ = writeln!(out, "    _start = time.perf_counter()");
            let _ = writeln!(out, "    with contextlib.redirect_stdout(_h_sink):");
            match plan.result {
                ResultKind::Returned => {
                    let _ = writeln!(out, "        _actual = {}({})", callee, args.join(", "));
                }
                ResultKind::MutatedFirstArgument => {
                    let _ = writeln!(out, "        {}({})", callee, args.join(", "));
                    let first = args.first().map(String::as_str).unwrap_or("None");
                    let _ = writeln!(out, "    _actual = {}", first);
                }
            }
            let _ = writeln!(out, "    _ms = (time.perf_counter() - _start) * 1000.0");
            let _ = writeln!(
                out,
                "    _ok = {}",
                self.compare_expr(case.compare_as, "_actual", "_expected")
            );
            let _ = writeln!(
                out,
                "    _h_report({}, _ok, _raw, {}, _h_render(_actual), _ms)",
                n,
                self.render_expr(case.compare_as, "_expected")
            );
            let _ = writeln!(out, "    if _ok:");
            let _ = writeln!(out, "        _passed += 1");
            let _ = writeln!(out, "except Exception as _e:");
            let _ = writeln!(
                out,
                "    _h_report_error({}, _raw, _expected_text, '%s: %s' % (type(_e).__name__, _e))",
                n
            );
        }

        let _ = writeln!(
            out,
            "\n_h_emit('Results: %d/%d test cases passed' % (_passed, _total))"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::SynthesizerRegistry;
    use crate::synth::tests::{case, problem};

    fn emit(user_code: &str, function: &str, return_type: &str, cases: &[(&str, &str)]) -> String {
        let cases: Vec<_> = cases
            .iter()
            .enumerate()
            .map(|(i, (input, expected))| case(i as u32 + 1, input, expected))
            .collect();
        SynthesizerRegistry::default()
            .synthesize(Language::Python, user_code, &problem(function, return_type), &cases)
            .unwrap()
            .source
    }

    #[test]
    fn test_two_sum_harness() {
        let src = emit(
            "class Solution:\n    def twoSum(self, nums, target):\n        return [0, 1]",
            "twoSum",
            "int[]",
            &[("[2,7,11,15]\n9", "[0,1]"), ("[3,2,4]\n6", "[1,2]")],
        );
        assert!(src.starts_with("import json"));
        assert!(src.contains("class Solution:\n    def twoSum"));
        assert!(src.contains("_a0: List[int] = _h_parse_int_array(_h_extract_array(_raw))"));
        assert!(src.contains("_a1: int = _h_parse_int(_h_extract_target(_raw))"));
        assert!(src.contains("_actual = Solution().twoSum(_a0, _a1)"));
        assert!(src.contains("_h_same(_actual, _expected, False)"));
        assert!(src.contains("_raw = \"[2,7,11,15]\\n9\""));
        assert!(src.contains("# Test Case 2"));
        assert!(src.contains("_total = 2"));
        assert!(src.contains("'##CASE ' + json.dumps("));
        assert!(!src.contains("@@MARKER@@"));
        assert!(!src.contains("@@RUN@@"));
    }

    #[test]
    fn test_free_function_and_doubles() {
        let src = emit("def average(a, b):\n    return (a + b) / 2", "average", "double", &[("1\n2", "1.5")]);
        assert!(src.contains("_actual = average(_a0, _a1)"));
        assert!(src.contains("_expected = _h_parse_double(_expected_text)"));
        assert!(src.contains("_h_same(_actual, _expected, True)"));
    }

    #[test]
    fn test_void_function_compares_first_argument() {
        let src = emit("def reverse(a):\n    a.reverse()", "reverse", "void", &[("[1,2,3]", "[3,2,1]")]);
        assert!(src.contains("        reverse(_a0)\n    _actual = _a0\n"));
    }

    #[test]
    fn test_opaque_expected_compares_text() {
        let src = emit("def build(n):\n    return {'n': n}", "build", "Node", &[("3", "{\"n\": 3}")]);
        assert!(src.contains("_expected = _expected_text"));
        assert!(src.contains("_h_same_text(_actual, _expected)"));
    }

    #[test]
    fn test_user_output_is_captured_during_calls() {
        let src = emit("def f(x):\n    print('##CASE {}')\n    return x", "f", "int", &[("1", "1")]);
        let capture = src.find("sys.stdout = _h_sink").unwrap();
        let user = src.find("def f(x):").unwrap();
        assert!(capture < user, "stdout must be muted before user code runs");
        assert!(src.contains("    with contextlib.redirect_stdout(_h_sink):\n        _actual = f(_a0)\n"));
        assert!(src.contains("_h_emit('Results: "));
        assert!(!src.contains("\nprint("));
    }

    #[test]
    fn test_markers_carry_the_run_token() {
        let cases = vec![case(1, "1", "1")];
        let program = SynthesizerRegistry::default()
            .synthesize_with_token(Language::Python, "def f(x): return x", &problem("f", "int"), &cases, "feedc0de")
            .unwrap();
        assert_eq!(program.run_token, "feedc0de");
        assert!(program.source.contains("'run': 'feedc0de'"));
    }

    #[test]
    fn test_strings_render_with_escapes() {
        let src = emit("def f(s): return s", "f", "string", &[("\"a\"", "\"a\"")]);
        assert!(src.contains("return json.dumps(v, ensure_ascii=False)"));
    }
}
