use super::{HarnessPlan, LanguageSynthesizer, ResultKind, CASE_MARKER};
use crate::inference::ValueType;
use crate::signature::ArgSource;
use arena_common::types::Language;
use std::fmt::Write;

const PRELUDE: &str = r#"const { performance } = require('perf_hooks');
const __arenaWrite = process.stdout.write.bind(process.stdout);

function __arenaMute() {
  const quiet = () => {};
  process.stdout.write = () => true;
  console.log = console.info = console.debug = console.dir = console.table = quiet;
}

__arenaMute();
"#;

const HELPERS: &str = r##"
const __arena = (() => {
  const trim = (s) => String(s).trim();

  function splitTop(s) {
    const parts = [];
    let cur = '';
    let depth = 0;
    let quote = null;
    let esc = false;
    for (const c of s) {
      if (quote) {
        cur += c;
        if (esc) esc = false;
        else if (c === '\\') esc = true;
        else if (c === quote) quote = null;
        continue;
      }
      if (c === '"' || c === "'") { quote = c; cur += c; }
      else if (c === '[') { depth++; cur += c; }
      else if (c === ']') { depth--; cur += c; }
      else if (c === ',' && depth === 0) { parts.push(cur.trim()); cur = ''; }
      else cur += c;
    }
    if (cur.trim() !== '') parts.push(cur.trim());
    return parts;
  }

  function inner(s) {
    const t = trim(s);
    if (t.length < 2 || t[0] !== '[' || t[t.length - 1] !== ']') {
      throw new Error('expected a bracketed list: ' + t);
    }
    return t.slice(1, -1).trim();
  }

  function unescape(body) {
    let out = '';
    for (let i = 0; i < body.length; i++) {
      const c = body[i];
      if (c === '\\' && i + 1 < body.length) {
        const n = body[++i];
        out += n === 'n' ? '\n' : n === 't' ? '\t' : n === 'r' ? '\r' : n;
      } else {
        out += c;
      }
    }
    return out;
  }

  function parseNumber(s) {
    const t = trim(s);
    const v = Number(t);
    if (t === '' || Number.isNaN(v)) throw new Error('not a number: ' + t);
    return v;
  }

  function parseInt(s) {
    const v = parseNumber(s);
    if (!Number.isInteger(v)) throw new Error('not an integer: ' + trim(s));
    return v;
  }

  const parseBool = (s) => trim(s).toLowerCase() === 'true';

  function parseString(s) {
    const t = trim(s);
    if (t.length >= 2 && (t[0] === '"' || t[0] === "'") && t[t.length - 1] === t[0]) {
      return unescape(t.slice(1, -1));
    }
    return t;
  }

  const parseIntArray = (s) => splitTop(inner(s)).map(parseInt);
  const parseDoubleArray = (s) => splitTop(inner(s)).map(parseNumber);
  const parseStringArray = (s) => splitTop(inner(s)).map(parseString);
  const parseIntMatrix = (s) => splitTop(inner(s)).map(parseIntArray);

  function extractArray(s) {
    const start = s.indexOf('[');
    if (start < 0) throw new Error('no array in input: ' + s);
    let depth = 0;
    let quote = null;
    let esc = false;
    for (let i = start; i < s.length; i++) {
      const c = s[i];
      if (quote) {
        if (esc) esc = false;
        else if (c === '\\') esc = true;
        else if (c === quote) quote = null;
        continue;
      }
      if (c === '"' || c === "'") quote = c;
      else if (c === '[') depth++;
      else if (c === ']' && --depth === 0) return s.slice(start, i + 1);
    }
    throw new Error('unbalanced array in input: ' + s);
  }

  function extractTarget(s) {
    const arr = extractArray(s);
    let rest = s.slice(s.indexOf('[') + arr.length);
    rest = rest.replace(/^[\s,]+/, '').replace(/^[A-Za-z_]\w*\s*=(?!=)\s*/, '');
    rest = rest.trim().replace(/,+$/, '').trim();
    if (rest === '') throw new Error('no target after array: ' + s);
    return rest;
  }

  function fmtDouble(d) {
    let t = d.toFixed(5);
    if (t.includes('.')) t = t.replace(/0+$/, '').replace(/\.$/, '');
    return t === '-0' ? '0' : t;
  }

  function render(v) {
    if (v === null || v === undefined) return 'null';
    if (typeof v === 'string') return JSON.stringify(v);
    if (typeof v === 'boolean') return v ? 'true' : 'false';
    if (typeof v === 'number') return Number.isInteger(v) ? String(v) : fmtDouble(v);
    if (typeof v === 'bigint') return v.toString();
    if (Array.isArray(v)) return '[' + v.map(render).join(',') + ']';
    return JSON.stringify(v);
  }

  function same(a, b, approx) {
    if (Array.isArray(b)) {
      return Array.isArray(a) && a.length === b.length && b.every((x, i) => same(a[i], x, approx));
    }
    if (typeof a === 'number' && typeof b === 'number') {
      if (approx || !Number.isInteger(a) || !Number.isInteger(b)) {
        return Math.abs(a - b) <= 1e-6 * Math.max(1, Math.abs(a), Math.abs(b));
      }
      return a === b;
    }
    if (typeof a === 'bigint' || typeof b === 'bigint') return String(a) === String(b);
    return a === b;
  }

  function sameText(actual, expected) {
    const want = expected.replace(/\s+/g, '');
    return render(actual).replace(/\s+/g, '') === want || String(actual).replace(/\s+/g, '') === want;
  }

  const emit = (...lines) => __arenaWrite(lines.join('\n') + '\n');

  function report(id, ok, raw, expected, actual, ms) {
    const status = ok ? 'PASS' : 'FAIL';
    const lines = ['Test Case ' + id + ': ' + status];
    if (!ok) lines.push('Expected: ' + expected, 'Got: ' + actual);
    lines.push('@@MARKER@@ ' + JSON.stringify({
      case: id, run: '@@RUN@@', status, input: raw, expected, actual, ms: Number(ms.toFixed(3)),
    }));
    emit(...lines);
  }

  function reportError(id, raw, expected, e) {
    const err = (e && e.name ? e.name + ': ' : '') + (e && e.message !== undefined ? e.message : String(e));
    emit(
      'Test Case ' + id + ': FAIL',
      'Expected: ' + expected,
      'Error: ' + err,
      '@@MARKER@@ ' + JSON.stringify({
        case: id, run: '@@RUN@@', status: 'ERROR', input: raw, expected, actual: 'Error: ' + err, ms: 0,
      }),
    );
  }

  return {
    parseInt, parseNumber, parseBool, parseString, parseIntArray, parseDoubleArray,
    parseStringArray, parseIntMatrix, extractArray, extractTarget, render, same, sameText,
    emit, report, reportError,
  };
})();
"##;

pub struct JavaScriptSynthesizer;

impl LanguageSynthesizer for JavaScriptSynthesizer {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn string_literal(&self, raw: &str) -> String {
        serde_json::Value::String(raw.to_string()).to_string()
    }

    fn source_expr(&self, source: &ArgSource, raw_var: &str) -> String {
        match source {
            ArgSource::Whole => raw_var.to_string(),
            ArgSource::ArrayPart => format!("__arena.extractArray({})", raw_var),
            ArgSource::TargetPart => format!("__arena.extractTarget({})", raw_var),
            ArgSource::Piece(text) => self.string_literal(text),
        }
    }

    /// JSDoc type, emitted as an annotation on each parsed argument
    fn type_name(&self, ty: ValueType) -> String {
        match ty {
            ValueType::Integer | ValueType::Long | ValueType::Double => "number",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::IntArray | ValueType::DoubleArray => "number[]",
            ValueType::StringArray => "string[]",
            ValueType::IntMatrix => "number[][]",
            ValueType::Object | ValueType::Null | ValueType::Unknown => "*",
        }
        .to_string()
    }

    fn parse_expr(&self, ty: ValueType, text_expr: &str) -> String {
        let helper = match ty {
            ValueType::Integer | ValueType::Long => "__arena.parseInt",
            ValueType::Double => "__arena.parseNumber",
            ValueType::Boolean => "__arena.parseBool",
            ValueType::String => "__arena.parseString",
            ValueType::IntArray => "__arena.parseIntArray",
            ValueType::StringArray => "__arena.parseStringArray",
            ValueType::DoubleArray => "__arena.parseDoubleArray",
            ValueType::IntMatrix => "__arena.parseIntMatrix",
            ValueType::Object | ValueType::Null | ValueType::Unknown => return text_expr.to_string(),
        };
        format!("{}({})", helper, text_expr)
    }

    fn compare_expr(&self, ty: ValueType, actual: &str, expected: &str) -> String {
        if ty.is_opaque() {
            format!("__arena.sameText({}, {})", actual, expected)
        } else {
            format!("__arena.same({}, {}, {})", actual, expected, ty.is_approximate())
        }
    }

    fn render_expr(&self, ty: ValueType, value: &str) -> String {
        if ty.is_opaque() {
            value.to_string()
        } else {
            format!("__arena.render({})", value)
        }
    }

    fn emit_program(&self, plan: &HarnessPlan, user_code: &str) -> String {
        let mut out = String::new();
        out.push_str(PRELUDE);
        out.push('\n');
        out.push_str(user_code.trim_end());
        out.push('\n');
        out.push_str(
            &HELPERS
                .replace("@@MARKER@@", CASE_MARKER)
                .replace("@@RUN@@", &plan.run_token),
        );

        let callee = if plan.uses_solution_class {
            format!("new Solution().{}", plan.function_name)
        } else {
            plan.function_name.clone()
        };

        for case in &plan.cases {
            let n = case.number;
            let args: Vec<String> = (0..case.params.len()).map(|i| format!("a{}", i)).collect();

            let _ = writeln!(out, "\nfunction __arenaCase{}() {{", n);
            let _ = writeln!(out, "  const raw = {};", self.string_literal(&case.raw_input));
            let _ = writeln!(out, "  const expectedText = {};", self.string_literal(&case.expected.raw));
            let _ = writeln!(out, "  try {{");
            for (arg, param) in args.iter().zip(&case.params) {
                let text = self.source_expr(&param.source, "raw");
                let _ = writeln!(out, "    /** @type {{{}}} */", self.type_name(param.ty));
                let _ = writeln!(out, "    const {} = {};", arg, self.parse_expr(param.ty, &text));
            }
            let _ = writeln!(
                out,
                "    const expected = {};",
                self.parse_expr(case.compare_as, "expectedText")
            );
            let _ = writeln!(out, "    __arenaMute();");
            let _ = writeln!(out, "    const start = performance.now();");
            let call = format!("{}({})", callee, args.join(", "));
            match plan.result {
                ResultKind::Returned => {
                    let _ = writeln!(out, "    const actual = {};", call);
                }
                ResultKind::MutatedFirstArgument => {
                    let _ = writeln!(out, "    {};", call);
                    let first = args.first().map(String::as_str).unwrap_or("undefined");
                    let _ = writeln!(out, "    const actual = {};", first);
                }
            }
            let _ = writeln!(out, "    const ms = performance.now() - start;");
            let _ = writeln!(
                out,
                "    const ok = {};",
                self.compare_expr(case.compare_as, "actual", "expected")
            );
            let _ = writeln!(
                out,
                "    __arena.report({}, ok, raw, {}, __arena.render(actual), ms);",
                n,
                self.render_expr(case.compare_as, "expected")
            );
            let _ = writeln!(out, "    return ok;");
            let _ = writeln!(out, "  }} catch (e) {{");
            let _ = writeln!(out, "    __arena.reportError({}, raw, expectedText, e);", n);
            let _ = writeln!(out, "    return false;");
            let _ = writeln!(out, "  }}");
            let _ = writeln!(out, "}}");
        }

        let _ = writeln!(out, "\nlet __passed = 0;");
        for case in &plan.cases {
            let _ = writeln!(out, "if (__arenaCase{}()) __passed++;", case.number);
        }
        let _ = writeln!(
            out,
            "__arena.emit('Results: ' + __passed + '/{} test cases passed');",
            plan.cases.len()
        );
        out
    }
}
