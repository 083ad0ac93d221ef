use super::{escape_c_like, HarnessPlan, LanguageSynthesizer, ResultKind, CASE_MARKER};
use crate::inference::ValueType;
use crate::signature::ArgSource;
use arena_common::types::Language;
use std::fmt::Write;

const PRELUDE: &str = "#include <bits/stdc++.h>\nusing namespace std;\n";

/// Placed ahead of the user's code: statics initialize in declaration order,
/// so `cout` is already muted when user globals are constructed
const STDOUT_GUARD: &str = r#"
namespace arena_guard {

struct NullBuffer : streambuf {
    int overflow(int c) override { return traits_type::not_eof(c); }
};

static NullBuffer muted;
static streambuf* const realOut = cout.rdbuf(&muted);
static ostream out(realOut);

}  // namespace arena_guard
"#;

const HELPERS: &str = r##"
namespace arena_harness {

static string trim(const string& s) {
    size_t b = s.find_first_not_of(" \t\r\n");
    if (b == string::npos) return "";
    size_t e = s.find_last_not_of(" \t\r\n");
    return s.substr(b, e - b + 1);
}

static vector<string> splitTop(const string& s) {
    vector<string> parts;
    string cur;
    int depth = 0;
    char quote = 0;
    bool esc = false;
    for (char c : s) {
        if (quote) {
            cur += c;
            if (esc) esc = false;
            else if (c == '\\') esc = true;
            else if (c == quote) quote = 0;
            continue;
        }
        if (c == '"' || c == '\'') { quote = c; cur += c; }
        else if (c == '[') { depth++; cur += c; }
        else if (c == ']') { depth--; cur += c; }
        else if (c == ',' && depth == 0) { parts.push_back(trim(cur)); cur.clear(); }
        else cur += c;
    }
    string tail = trim(cur);
    if (!tail.empty()) parts.push_back(tail);
    return parts;
}

static string inner(const string& s) {
    string t = trim(s);
    if (t.size() < 2 || t.front() != '[' || t.back() != ']') {
        throw invalid_argument("expected a bracketed list: " + t);
    }
    return trim(t.substr(1, t.size() - 2));
}

static string unescape(const string& body) {
    string out;
    for (size_t i = 0; i < body.size(); i++) {
        char c = body[i];
        if (c == '\\' && i + 1 < body.size()) {
            char n = body[++i];
            out += n == 'n' ? '\n' : n == 't' ? '\t' : n == 'r' ? '\r' : n;
        } else {
            out += c;
        }
    }
    return out;
}

static int parseInt(const string& s) { return stoi(trim(s)); }
static long long parseLong(const string& s) { return stoll(trim(s)); }
static double parseDouble(const string& s) { return stod(trim(s)); }

static bool parseBool(const string& s) {
    string t = trim(s);
    transform(t.begin(), t.end(), t.begin(), [](unsigned char c) { return (char)tolower(c); });
    return t == "true";
}

static string parseString(const string& s) {
    string t = trim(s);
    if (t.size() >= 2 && (t.front() == '"' || t.front() == '\'') && t.back() == t.front()) {
        return unescape(t.substr(1, t.size() - 2));
    }
    return t;
}

static vector<int> parseIntArray(const string& s) {
    vector<int> out;
    for (const string& p : splitTop(inner(s))) out.push_back(parseInt(p));
    return out;
}

static vector<double> parseDoubleArray(const string& s) {
    vector<double> out;
    for (const string& p : splitTop(inner(s))) out.push_back(parseDouble(p));
    return out;
}

static vector<string> parseStringArray(const string& s) {
    vector<string> out;
    for (const string& p : splitTop(inner(s))) out.push_back(parseString(p));
    return out;
}

static vector<vector<int>> parseIntMatrix(const string& s) {
    vector<vector<int>> out;
    for (const string& row : splitTop(inner(s))) out.push_back(parseIntArray(row));
    return out;
}

static string extractArray(const string& s) {
    size_t start = s.find('[');
    if (start == string::npos) throw invalid_argument("no array in input: " + s);
    int depth = 0;
    char quote = 0;
    bool esc = false;
    for (size_t i = start; i < s.size(); i++) {
        char c = s[i];
        if (quote) {
            if (esc) esc = false;
            else if (c == '\\') esc = true;
            else if (c == quote) quote = 0;
            continue;
        }
        if (c == '"' || c == '\'') quote = c;
        else if (c == '[') depth++;
        else if (c == ']' && --depth == 0) return s.substr(start, i - start + 1);
    }
    throw invalid_argument("unbalanced array in input: " + s);
}

static string extractTarget(const string& s) {
    string arr = extractArray(s);
    string rest = s.substr(s.find('[') + arr.size());
    size_t i = 0;
    while (i < rest.size() && (rest[i] == ',' || isspace((unsigned char)rest[i]))) i++;
    rest = rest.substr(i);
    if (!rest.empty() && (isalpha((unsigned char)rest[0]) || rest[0] == '_')) {
        size_t j = 0;
        while (j < rest.size() && (isalnum((unsigned char)rest[j]) || rest[j] == '_')) j++;
        size_t k = j;
        while (k < rest.size() && isspace((unsigned char)rest[k])) k++;
        if (k < rest.size() && rest[k] == '=' && (k + 1 >= rest.size() || rest[k + 1] != '=')) {
            rest = rest.substr(k + 1);
        }
    }
    rest = trim(rest);
    while (!rest.empty() && rest.back() == ',') rest.pop_back();
    rest = trim(rest);
    if (rest.empty()) throw invalid_argument("no target after array: " + s);
    return rest;
}

static string fmtDouble(double d) {
    char buf[64];
    snprintf(buf, sizeof buf, "%.5f", d);
    string t = buf;
    if (t.find('.') != string::npos) {
        while (!t.empty() && t.back() == '0') t.pop_back();
        if (!t.empty() && t.back() == '.') t.pop_back();
    }
    return t == "-0" ? "0" : t;
}

static string json(const string& s) {
    string out = "\"";
    for (char c : s) {
        switch (c) {
            case '"': out += "\\\""; break;
            case '\\': out += "\\\\"; break;
            case '\n': out += "\\n"; break;
            case '\r': out += "\\r"; break;
            case '\t': out += "\\t"; break;
            default:
                if ((unsigned char)c < 0x20) {
                    char buf[8];
                    snprintf(buf, sizeof buf, "\\u%04x", (unsigned char)c);
                    out += buf;
                } else {
                    out += c;
                }
        }
    }
    return out + "\"";
}

static string render(const string& v) { return json(v); }
static string render(const char* v) { return render(string(v)); }
static string render(bool v) { return v ? "true" : "false"; }
static string render(char v) { return json(string(1, v)); }

template <typename T>
static typename enable_if<is_integral<T>::value, string>::type render(T v) { return to_string(v); }

template <typename T>
static typename enable_if<is_floating_point<T>::value, string>::type render(T v) { return fmtDouble((double)v); }

template <typename T>
static string render(const vector<T>& v) {
    string out = "[";
    for (size_t i = 0; i < v.size(); i++) {
        if (i) out += ",";
        out += render(v[i]);
    }
    return out + "]";
}

static bool nearlyEqual(double a, double b) {
    return fabs(a - b) <= 1e-6 * max(1.0, max(fabs(a), fabs(b)));
}

template <typename A, typename B>
static typename enable_if<is_arithmetic<A>::value && is_arithmetic<B>::value, bool>::type
same(A a, B b, bool approx) {
    if (approx || is_floating_point<A>::value || is_floating_point<B>::value) return nearlyEqual((double)a, (double)b);
    return (long long)a == (long long)b;
}

static bool same(const string& a, const string& b, bool) { return a == b; }

template <typename A, typename B>
static bool same(const vector<A>& a, const vector<B>& b, bool approx) {
    if (a.size() != b.size()) return false;
    for (size_t i = 0; i < a.size(); i++) {
        if (!same(a[i], b[i], approx)) return false;
    }
    return true;
}

static string squash(const string& s) {
    string out;
    for (char c : s) if (!isspace((unsigned char)c)) out += c;
    return out;
}

template <typename T>
static bool sameText(const T& actual, const string& expected) {
    return squash(render(actual)) == squash(expected);
}

static bool sameText(const string& actual, const string& expected) {
    return squash(actual) == squash(expected) || squash(render(actual)) == squash(expected);
}

static void report(int id, bool ok, const string& raw, const string& expected, const string& actual, double ms) {
    ostream& out = arena_guard::out;
    const char* status = ok ? "PASS" : "FAIL";
    out << "Test Case " << id << ": " << status << "\n";
    if (!ok) {
        out << "Expected: " << expected << "\n";
        out << "Got: " << actual << "\n";
    }
    char msbuf[32];
    snprintf(msbuf, sizeof msbuf, "%.3f", ms);
    out << "@@MARKER@@ {\"case\":" << id << ",\"run\":\"@@RUN@@\",\"status\":\"" << status << "\",\"input\":" << json(raw)
         << ",\"expected\":" << json(expected) << ",\"actual\":" << json(actual)
         << ",\"ms\":" << msbuf << "}" << endl;
}

static void reportError(int id, const string& raw, const string& expected, const string& err) {
    ostream& out = arena_guard::out;
    out << "Test Case " << id << ": FAIL\n";
    out << "Expected: " << expected << "\n";
    out << "Error: " << err << "\n";
    out << "@@MARKER@@ {\"case\":" << id << ",\"run\":\"@@RUN@@\",\"status\":\"ERROR\",\"input\":" << json(raw)
         << ",\"expected\":" << json(expected) << ",\"actual\":" << json("Error: " + err)
         << ",\"ms\":0}" << endl;
}

}  // namespace arena_harness

namespace H = arena_harness;
"##;

pub struct CppSynthesizer;

impl LanguageSynthesizer for CppSynthesizer {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn string_literal(&self, raw: &str) -> String {
        format!("string({})", escape_c_like(raw, false))
    }

    fn source_expr(&self, source: &ArgSource, raw_var: &str) -> String {
        match source {
            ArgSource::Whole => raw_var.to_string(),
            ArgSource::ArrayPart => format!("H::extractArray({})", raw_var),
            ArgSource::TargetPart => format!("H::extractTarget({})", raw_var),
            ArgSource::Piece(text) => self.string_literal(text),
        }
    }

    fn type_name(&self, ty: ValueType) -> String {
        match ty {
            ValueType::Integer => "int",
            ValueType::Long => "long long",
            ValueType::Double => "double",
            ValueType::Boolean => "bool",
            ValueType::IntArray => "vector<int>",
            ValueType::StringArray => "vector<string>",
            ValueType::DoubleArray => "vector<double>",
            ValueType::IntMatrix => "vector<vector<int>>",
            ValueType::String | ValueType::Object | ValueType::Null | ValueType::Unknown => "string",
        }
        .to_string()
    }

    fn parse_expr(&self, ty: ValueType, text_expr: &str) -> String {
        let helper = match ty {
            ValueType::Integer => "H::parseInt",
            ValueType::Long => "H::parseLong",
            ValueType::Double => "H::parseDouble",
            ValueType::Boolean => "H::parseBool",
            ValueType::String => "H::parseString",
            ValueType::IntArray => "H::parseIntArray",
            ValueType::StringArray => "H::parseStringArray",
            ValueType::DoubleArray => "H::parseDoubleArray",
            ValueType::IntMatrix => "H::parseIntMatrix",
            ValueType::Object | ValueType::Null | ValueType::Unknown => return text_expr.to_string(),
        };
        format!("{}({})", helper, text_expr)
    }

    fn compare_expr(&self, ty: ValueType, actual: &str, expected: &str) -> String {
        if ty.is_opaque() {
            format!("H::sameText({}, {})", actual, expected)
        } else {
            format!("H::same({}, {}, {})", actual, expected, ty.is_approximate())
        }
    }

    fn render_expr(&self, ty: ValueType, value: &str) -> String {
        if ty.is_opaque() {
            value.to_string()
        } else {
            format!("H::render({})", value)
        }
    }

    fn emit_program(&self, plan: &HarnessPlan, user_code: &str) -> String {
        let mut out = String::new();
        out.push_str(PRELUDE);
        out.push_str(STDOUT_GUARD);
        out.push('\n');
        out.push_str(user_code.trim_end());
        out.push('\n');
        out.push_str(
            &HELPERS
                .replace("@@MARKER@@", CASE_MARKER)
                .replace("@@RUN@@", &plan.run_token),
        );

        let callee = if plan.uses_solution_class {
            format!("Solution().{}", plan.function_name)
        } else {
            plan.function_name.clone()
        };

        for case in &plan.cases {
            let n = case.number;
            let args: Vec<String> = (0..case.params.len()).map(|i| format!("a{}", i)).collect();

            let _ = writeln!(out, "\nstatic bool arena_case_{}() {{", n);
            let _ = writeln!(out, "    const string raw = {};", self.string_literal(&case.raw_input));
            let _ = writeln!(out, "    const string expectedText = {};", self.string_literal(&case.expected.raw));
            let _ = writeln!(out, "    try {{");
            for (arg, param) in args.iter().zip(&case.params) {
                let text = self.source_expr(&param.source, "raw");
                let _ = writeln!(
                    out,
                    "        {} {} = {};",
                    self.type_name(param.ty),
                    arg,
                    self.parse_expr(param.ty, &text)
                );
            }
            let _ = writeln!(
                out,
                "        {} expected = {};",
                self.type_name(case.compare_as),
                self.parse_expr(case.compare_as, "expectedText")
            );
            let _ = writeln!(out, "        cout.rdbuf(&arena_guard::muted);");
            let _ = writeln!(out, "        auto start = chrono::steady_clock::now();");
            let call = format!("{}({})", callee, args.join(", "));
            match plan.result {
                ResultKind::Returned => {
                    let _ = writeln!(out, "        auto actual = {};", call);
                }
                ResultKind::MutatedFirstArgument => {
                    let _ = writeln!(out, "        {};", call);
                    let first = args.first().map(String::as_str).unwrap_or("string()");
                    let _ = writeln!(out, "        auto actual = {};", first);
                }
            }
            let _ = writeln!(
                out,
                "        double ms = chrono::duration<double, milli>(chrono::steady_clock::now() - start).count();"
            );
            let _ = writeln!(
                out,
                "        bool ok = {};",
                self.compare_expr(case.compare_as, "actual", "expected")
            );
            let _ = writeln!(
                out,
                "        H::report({}, ok, raw, {}, H::render(actual), ms);",
                n,
                self.render_expr(case.compare_as, "expected")
            );
            let _ = writeln!(out, "        return ok;");
            let _ = writeln!(out, "    }} catch (const exception& e) {{");
            let _ = writeln!(out, "        H::reportError({}, raw, expectedText, e.what());", n);
            let _ = writeln!(out, "    }} catch (...) {{");
            let _ = writeln!(out, "        H::reportError({}, raw, expectedText, \"unknown exception\");", n);
            let _ = writeln!(out, "    }}");
            let _ = writeln!(out, "    return false;");
            let _ = writeln!(out, "}}");
        }

        let _ = writeln!(out, "\nint main() {{");
        let _ = writeln!(out, "    int passed = 0;");
        for case in &plan.cases {
            let _ = writeln!(out, "    if (arena_case_{}()) passed++;", case.number);
        }
        let _ = writeln!(
            out,
            "    arena_guard::out << \"Results: \" << passed << \"/{} test cases passed\" << endl;",
            plan.cases.len()
        );
        let _ = writeln!(out, "    return 0;");
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::tests::{case, problem};
    use crate::synth::SynthesizerRegistry;

    fn emit(user_code: &str, function: &str, return_type: &str, cases: &[(&str, &str)]) -> String {
        let cases: Vec<_> = cases
            .iter()
            .enumerate()
            .map(|(i, (input, expected))| case(i as u32 + 1, input, expected))
            .collect();
        SynthesizerRegistry::default()
            .synthesize(Language::Cpp, user_code, &problem(function, return_type), &cases)
            .unwrap()
            .source
    }

    #[test]
    fn test_two_sum_harness() {
        let user = "class Solution {\npublic:\n    vector<int> twoSum(vector<int>& nums, int target) { return {0, 1}; }\n};";
        let src = emit(user, "twoSum", "vector<int>", &[("[2,7,11,15]\n9", "[0,1]")]);

        assert!(src.starts_with("#include <bits/stdc++.h>\nusing namespace std;\n"));
        assert!(src.contains(user));
        assert!(src.contains("vector<int> a0 = H::parseIntArray(H::extractArray(raw));"));
        assert!(src.contains("int a1 = H::parseInt(H::extractTarget(raw));"));
        assert!(src.contains("auto actual = Solution().twoSum(a0, a1);"));
        assert!(src.contains("bool ok = H::same(actual, expected, false);"));
        assert!(src.contains("const string raw = string(\"[2,7,11,15]\\n9\");"));
        assert!(src.contains("if (arena_case_1()) passed++;"));
        assert!(src.contains("out << \"##CASE {\\\"case\\\":\" << id << \",\\\"run\\\":\\\""));
        assert!(!src.contains("cout << \""));
    }

    #[test]
    fn test_multi_argument_pieces() {
        let src = emit(
            "long long mul(long long a, int b, string tag) { return a * b; }",
            "mul",
            "long long",
            &[("a = 3000000000, b = 2, tag = \"x\"", "6000000000")],
        );
        assert!(src.contains("long long a0 = H::parseLong(string(\"3000000000\"));"));
        assert!(src.contains("int a1 = H::parseInt(string(\"2\"));"));
        assert!(src.contains("string a2 = H::parseString(string(\"\\\"x\\\"\"));"));
        assert!(src.contains("long long expected = H::parseLong(expectedText);"));
        assert!(src.contains("auto actual = mul(a0, a1, a2);"));
    }

    #[test]
    fn test_matrix_and_approximate_comparison() {
        let src = emit("double avg(vector<vector<int>>& m) { return 0; }", "avg", "double", &[("[[1,2],[3,4]]", "2.5")]);
        assert!(src.contains("vector<vector<int>> a0 = H::parseIntMatrix(raw);"));
        assert!(src.contains("bool ok = H::same(actual, expected, true);"));
    }

    #[test]
    fn test_cout_is_muted_before_user_code_and_each_call() {
        let user = "struct Noisy { Noisy() { cout << \"##CASE {}\" << endl; } } noisy;\nint f(int x) { return x; }";
        let src = emit(user, "f", "int", &[("1", "1")]);
        let guard = src.find("static streambuf* const realOut = cout.rdbuf(&muted);").unwrap();
        assert!(guard < src.find("struct Noisy").unwrap());
        assert!(src.contains("        cout.rdbuf(&arena_guard::muted);\n        auto start = chrono::steady_clock::now();\n        auto actual = f(a0);"));
        assert!(src.contains("arena_guard::out << \"Results: \""));
    }

    #[test]
    fn test_strings_render_through_the_json_escaper() {
        let src = emit("string f(string s) { return s; }", "f", "string", &[("\"a\"", "\"a\"")]);
        assert!(src.contains("static string render(const string& v) { return json(v); }"));
        assert!(src.find("static string json(").unwrap() < src.find("static string render(").unwrap());
    }
}
