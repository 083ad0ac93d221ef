use super::{escape_c_like, indent, HarnessPlan, LanguageSynthesizer, ResultKind, CASE_MARKER};
use crate::inference::ValueType;
use crate::signature::ArgSource;
use arena_common::types::Language;
use std::fmt::Write;

const PRELUDE: &str = "import java.util.*;\nimport java.util.function.*;\nimport java.util.stream.*;\n";

/// Opens `Main`: keeps the real stdout for the harness and mutes it for
/// everything else, before any user initializer runs
const STDOUT_GUARD: &str = r#"    static final java.io.PrintStream OUT = System.out;
    static final java.io.PrintStream MUTED = new java.io.PrintStream(java.io.OutputStream.nullOutputStream());

    static {
        System.setOut(MUTED);
    }

"#;

const HELPERS: &str = r##"
    static String trim(String s) {
        return s == null ? "" : s.trim();
    }

    static List<String> splitTop(String s) {
        List<String> parts = new ArrayList<>();
        StringBuilder cur = new StringBuilder();
        int depth = 0;
        char quote = 0;
        boolean esc = false;
        for (int i = 0; i < s.length(); i++) {
            char c = s.charAt(i);
            if (quote != 0) {
                cur.append(c);
                if (esc) esc = false;
                else if (c == '\\') esc = true;
                else if (c == quote) quote = 0;
                continue;
            }
            if (c == '"' || c == '\'') { quote = c; cur.append(c); }
            else if (c == '[') { depth++; cur.append(c); }
            else if (c == ']') { depth--; cur.append(c); }
            else if (c == ',' && depth == 0) { parts.add(cur.toString().trim()); cur.setLength(0); }
            else cur.append(c);
        }
        String tail = cur.toString().trim();
        if (!tail.isEmpty()) parts.add(tail);
        return parts;
    }

    static String inner(String s) {
        String t = trim(s);
        if (t.length() < 2 || t.charAt(0) != '[' || t.charAt(t.length() - 1) != ']') {
            throw new IllegalArgumentException("expected a bracketed list: " + t);
        }
        return t.substring(1, t.length() - 1).trim();
    }

    static String unescape(String body) {
        StringBuilder out = new StringBuilder();
        for (int i = 0; i < body.length(); i++) {
            char c = body.charAt(i);
            if (c == '\\' && i + 1 < body.length()) {
                char n = body.charAt(++i);
                out.append(n == 'n' ? '\n' : n == 't' ? '\t' : n == 'r' ? '\r' : n);
            } else {
                out.append(c);
            }
        }
        return out.toString();
    }

    static int parseInt(String s) { return Integer.parseInt(trim(s)); }
    static long parseLong(String s) { return Long.parseLong(trim(s)); }
    static double parseDouble(String s) { return Double.parseDouble(trim(s)); }
    static boolean parseBool(String s) { return trim(s).equalsIgnoreCase("true"); }

    static String parseString(String s) {
        String t = trim(s);
        if (t.length() >= 2 && (t.charAt(0) == '"' || t.charAt(0) == '\'') && t.charAt(t.length() - 1) == t.charAt(0)) {
            return unescape(t.substring(1, t.length() - 1));
        }
        return t;
    }

    static int[] parseIntArray(String s) {
        List<String> parts = splitTop(inner(s));
        int[] out = new int[parts.size()];
        for (int i = 0; i < out.length; i++) out[i] = parseInt(parts.get(i));
        return out;
    }

    static double[] parseDoubleArray(String s) {
        List<String> parts = splitTop(inner(s));
        double[] out = new double[parts.size()];
        for (int i = 0; i < out.length; i++) out[i] = parseDouble(parts.get(i));
        return out;
    }

    static String[] parseStringArray(String s) {
        List<String> parts = splitTop(inner(s));
        String[] out = new String[parts.size()];
        for (int i = 0; i < out.length; i++) out[i] = parseString(parts.get(i));
        return out;
    }

    static int[][] parseIntMatrix(String s) {
        List<String> rows = splitTop(inner(s));
        int[][] out = new int[rows.size()][];
        for (int i = 0; i < out.length; i++) out[i] = parseIntArray(rows.get(i));
        return out;
    }

    static String extractArray(String s) {
        int start = s.indexOf('[');
        if (start < 0) throw new IllegalArgumentException("no array in input: " + s);
        int depth = 0;
        char quote = 0;
        boolean esc = false;
        for (int i = start; i < s.length(); i++) {
            char c = s.charAt(i);
            if (quote != 0) {
                if (esc) esc = false;
                else if (c == '\\') esc = true;
                else if (c == quote) quote = 0;
                continue;
            }
            if (c == '"' || c == '\'') quote = c;
            else if (c == '[') depth++;
            else if (c == ']' && --depth == 0) return s.substring(start, i + 1);
        }
        throw new IllegalArgumentException("unbalanced array in input: " + s);
    }

    static String extractTarget(String s) {
        String arr = extractArray(s);
        String rest = s.substring(s.indexOf('[') + arr.length());
        rest = rest.replaceFirst("^[\\s,]+", "");
        rest = rest.replaceFirst("^[A-Za-z_]\\w*\\s*=(?!=)\\s*", "");
        rest = rest.trim().replaceFirst(",+$", "").trim();
        if (rest.isEmpty()) throw new IllegalArgumentException("no target after array: " + s);
        return rest;
    }

    static String fmtDouble(double d) {
        String t = String.format(Locale.ROOT, "%.5f", d);
        if (t.contains(".")) {
            t = t.replaceAll("0+$", "");
            t = t.replaceAll("\\.$", "");
        }
        return t.equals("-0") ? "0" : t;
    }

    static String render(Object v) {
        if (v == null) return "null";
        if (v instanceof String || v instanceof Character) return json(String.valueOf(v));
        if (v instanceof Double || v instanceof Float) return fmtDouble(((Number) v).doubleValue());
        List<Object> items = asList(v);
        if (items != null) {
            StringBuilder sb = new StringBuilder("[");
            for (int i = 0; i < items.size(); i++) {
                if (i > 0) sb.append(',');
                sb.append(render(items.get(i)));
            }
            return sb.append(']').toString();
        }
        return String.valueOf(v);
    }

    static List<Object> asList(Object v) {
        if (v == null) return null;
        if (v.getClass().isArray()) {
            int n = java.lang.reflect.Array.getLength(v);
            List<Object> out = new ArrayList<>(n);
            for (int i = 0; i < n; i++) out.add(java.lang.reflect.Array.get(v, i));
            return out;
        }
        if (v instanceof Collection) return new ArrayList<Object>((Collection<?>) v);
        return null;
    }

    static boolean same(Object a, Object b, boolean approx) {
        List<Object> lb = asList(b);
        if (lb != null) {
            List<Object> la = asList(a);
            if (la == null || la.size() != lb.size()) return false;
            for (int i = 0; i < lb.size(); i++) {
                if (!same(la.get(i), lb.get(i), approx)) return false;
            }
            return true;
        }
        if (a instanceof Number && b instanceof Number) {
            boolean floating = a instanceof Double || a instanceof Float || b instanceof Double || b instanceof Float;
            if (approx || floating) {
                double x = ((Number) a).doubleValue();
                double y = ((Number) b).doubleValue();
                return Math.abs(x - y) <= 1e-6 * Math.max(1.0, Math.max(Math.abs(x), Math.abs(y)));
            }
            return ((Number) a).longValue() == ((Number) b).longValue();
        }
        if (a instanceof Character && b instanceof String) return String.valueOf(a).equals(b);
        return Objects.equals(a, b);
    }

    static boolean sameText(Object actual, String expected) {
        String want = expected.replaceAll("\\s+", "");
        return render(actual).replaceAll("\\s+", "").equals(want)
            || String.valueOf(actual).replaceAll("\\s+", "").equals(want);
    }

    static String json(String s) {
        StringBuilder sb = new StringBuilder("\"");
        for (int i = 0; i < s.length(); i++) {
            char c = s.charAt(i);
            switch (c) {
                case '"': sb.append("\\\""); break;
                case '\\': sb.append("\\\\"); break;
                case '\n': sb.append("\\n"); break;
                case '\r': sb.append("\\r"); break;
                case '\t': sb.append("\\t"); break;
                default:
                    if (c < 0x20) sb.append(String.format("\\u%04x", (int) c));
                    else sb.append(c);
            }
        }
        return sb.append('"').toString();
    }

    static void report(int id, boolean ok, String raw, String expected, String actual, double ms) {
        String status = ok ? "PASS" : "FAIL";
        OUT.println("Test Case " + id + ": " + status);
        if (!ok) {
            OUT.println("Expected: " + expected);
            OUT.println("Got: " + actual);
        }
        OUT.println("@@MARKER@@ {\"case\":" + id + ",\"run\":\"@@RUN@@\",\"status\":\"" + status + "\",\"input\":" + json(raw)
            + ",\"expected\":" + json(expected) + ",\"actual\":" + json(actual)
            + ",\"ms\":" + String.format(Locale.ROOT, "%.3f", ms) + "}");
        OUT.flush();
    }

    static void reportError(int id, String raw, String expected, Throwable t) {
        String err = t.getClass().getSimpleName() + ": " + t.getMessage();
        OUT.println("Test Case " + id + ": FAIL");
        OUT.println("Expected: " + expected);
        OUT.println("Error: " + err);
        OUT.println("@@MARKER@@ {\"case\":" + id + ",\"run\":\"@@RUN@@\",\"status\":\"ERROR\",\"input\":" + json(raw)
            + ",\"expected\":" + json(expected) + ",\"actual\":" + json("Error: " + err) + ",\"ms\":0}");
        OUT.flush();
    }
"##;

pub struct JavaSynthesizer;

impl JavaSynthesizer {
    /// Split user code into hoisted import lines and the remaining body.
    /// A public `Solution` class is demoted so `Main` stays the only public class.
    fn prepare_user_code(user_code: &str) -> (Vec<String>, String) {
        let mut imports = Vec::new();
        let mut body = Vec::new();
        for line in user_code.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("import ") && trimmed.ends_with(';') {
                imports.push(trimmed.to_string());
            } else {
                body.push(line);
            }
        }
        let body = body.join("\n").replace("public class Solution", "class Solution");
        (imports, body)
    }
}

impl LanguageSynthesizer for JavaSynthesizer {
    fn language(&self) -> Language {
        Language::Java
    }

    fn string_literal(&self, raw: &str) -> String {
        escape_c_like(raw, true)
    }

    fn source_expr(&self, source: &ArgSource, raw_var: &str) -> String {
        match source {
            ArgSource::Whole => raw_var.to_string(),
            ArgSource::ArrayPart => format!("extractArray({})", raw_var),
            ArgSource::TargetPart => format!("extractTarget({})", raw_var),
            ArgSource::Piece(text) => self.string_literal(text),
        }
    }

    fn type_name(&self, ty: ValueType) -> String {
        match ty {
            ValueType::Integer => "int",
            ValueType::Long => "long",
            ValueType::Double => "double",
            ValueType::Boolean => "boolean",
            ValueType::IntArray => "int[]",
            ValueType::StringArray => "String[]",
            ValueType::DoubleArray => "double[]",
            ValueType::IntMatrix => "int[][]",
            ValueType::String | ValueType::Object | ValueType::Null | ValueType::Unknown => "String",
        }
        .to_string()
    }

    fn parse_expr(&self, ty: ValueType, text_expr: &str) -> String {
        let helper = match ty {
            ValueType::Integer => "parseInt",
            ValueType::Long => "parseLong",
            ValueType::Double => "parseDouble",
            ValueType::Boolean => "parseBool",
            ValueType::String => "parseString",
            ValueType::IntArray => "parseIntArray",
            ValueType::StringArray => "parseStringArray",
            ValueType::DoubleArray => "parseDoubleArray",
            ValueType::IntMatrix => "parseIntMatrix",
            ValueType::Object | ValueType::Null | ValueType::Unknown => return text_expr.to_string(),
        };
        format!("{}({})", helper, text_expr)
    }

    fn compare_expr(&self, ty: ValueType, actual: &str, expected: &str) -> String {
        if ty.is_opaque() {
            format!("sameText({}, {})", actual, expected)
        } else {
            format!("same({}, {}, {})", actual, expected, ty.is_approximate())
        }
    }

    fn render_expr(&self, ty: ValueType, value: &str) -> String {
        if ty.is_opaque() {
            value.to_string()
        } else {
            format!("render({})", value)
        }
    }

    fn emit_program(&self, plan: &HarnessPlan, user_code: &str) -> String {
        let (imports, body) = Self::prepare_user_code(user_code);
        let mut out = String::new();
        out.push_str(PRELUDE);
        for import in &imports {
            if !PRELUDE.contains(import.as_str()) {
                let _ = writeln!(out, "{}", import);
            }
        }
        out.push('\n');

        let receiver = if plan.uses_solution_class {
            out.push_str(body.trim_end());
            out.push_str("\n\n");
            "new Solution()"
        } else {
            "new Main()"
        };

        out.push_str("public class Main {\n");
        out.push_str(STDOUT_GUARD);
        if !plan.uses_solution_class && !body.trim().is_empty() {
            out.push_str(&indent(body.trim_end(), 4));
            out.push_str("\n\n");
        }
        out.push_str(
            HELPERS
                .replace("@@MARKER@@", CASE_MARKER)
                .replace("@@RUN@@", &plan.run_token)
                .trim_start_matches('\n'),
        );

        for case in &plan.cases {
            let n = case.number;
            let args: Vec<String> = (0..case.params.len()).map(|i| format!("a{}", i)).collect();

            let _ = writeln!(out, "\n    static boolean arenaCase{}() {{", n);
            let _ = writeln!(out, "        String raw = {};", self.string_literal(&case.raw_input));
            let _ = writeln!(out, "        String expectedText = {};", self.string_literal(&case.expected.raw));
            let _ = writeln!(out, "        try {{");
            for (arg, param) in args.iter().zip(&case.params) {
                let text = self.source_expr(&param.source, "raw");
                let _ = writeln!(
                    out,
                    "            {} {} = {};",
                    self.type_name(param.ty),
                    arg,
                    self.parse_expr(param.ty, &text)
                );
            }
            let _ = writeln!(
                out,
                "            {} expected = {};",
                self.type_name(case.compare_as),
                self.parse_expr(case.compare_as, "expectedText")
            );
            let _ = writeln!(out, "            System.setOut(MUTED);");
            let _ = writeln!(out, "            long start = System.nanoTime();");
            let call = format!("{}.{}({})", receiver, plan.function_name, args.join(", "));
            match plan.result {
                ResultKind::Returned => {
                    let _ = writeln!(out, "            var actual = {};", call);
                }
                ResultKind::MutatedFirstArgument => {
                    let _ = writeln!(out, "            {};", call);
                    let first = args.first().map(String::as_str).unwrap_or("null");
                    let _ = writeln!(out, "            var actual = {};", first);
                }
            }
            let _ = writeln!(out, "            double ms = (System.nanoTime() - start) / 1e6;");
            let _ = writeln!(
                out,
                "            boolean ok = {};",
                self.compare_expr(case.compare_as, "actual", "expected")
            );
            let _ = writeln!(
                out,
                "            report({}, ok, raw, {}, render(actual), ms);",
                n,
                self.render_expr(case.compare_as, "expected")
            );
            let _ = writeln!(out, "            return ok;");
            let _ = writeln!(out, "        }} catch (Throwable t) {{");
            let _ = writeln!(out, "            reportError({}, raw, expectedText, t);", n);
            let _ = writeln!(out, "            return false;");
            let _ = writeln!(out, "        }}");
            let _ = writeln!(out, "    }}");
        }

        let _ = writeln!(out, "\n    public static void main(String[] args) {{");
        let _ = writeln!(out, "        int passed = 0;");
        for case in &plan.cases {
            let _ = writeln!(out, "        if (arenaCase{}()) passed++;", case.number);
        }
        let _ = writeln!(
            out,
            "        OUT.println(\"Results: \" + passed + \"/{} test cases passed\");",
            plan.cases.len()
        );
        let _ = writeln!(out, "        OUT.flush();");
        let _ = writeln!(out, "    }}");
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
            .synthesize(Language::Java, user_code, &problem(function, return_type), &cases)
            .unwrap()
            .source
    }

    #[test]
    fn test_two_sum_harness() {
        let user = "import java.util.HashMap;\n\npublic class Solution {\n    public int[] twoSum(int[] nums, int target) {\n        return new int[]{0, 1};\n    }\n}";
        let src = emit(user, "twoSum", "int[]", &[("[2,7,11,15]\n9", "[0,1]"), ("[3,2,4]\n6", "[1,2]")]);

        assert!(src.starts_with("import java.util.*;"));
        assert!(src.contains("import java.util.HashMap;\n"));
        assert!(src.contains("\nclass Solution {"));
        assert!(!src.contains("public class Solution"));
        assert!(src.contains("public class Main {"));
        assert!(src.contains("int[] a0 = parseIntArray(extractArray(raw));"));
        assert!(src.contains("int a1 = parseInt(extractTarget(raw));"));
        assert!(src.contains("var actual = new Solution().twoSum(a0, a1);"));
        assert!(src.contains("boolean ok = same(actual, expected, false);"));
        assert!(src.contains("static boolean arenaCase2()"));
        assert!(src.contains("if (arenaCase2()) passed++;"));
        assert!(src.contains("\"/2 test cases passed\""));
        assert!(src.contains("OUT.println(\"##CASE {\\\"case\\\":\" + id + \",\\\"run\\\":\\\""));
        assert!(!src.contains("System.out.println"));
        // the import line appears once, hoisted above the classes
        assert_eq!(src.matches("import java.util.HashMap;").count(), 1);
    }

    #[test]
    fn test_free_method_lives_in_main() {
        let src = emit(
            "public boolean isPalindrome(String s) {\n    return true;\n}",
            "isPalindrome",
            "boolean",
            &[("\"racecar\"", "true")],
        );
        assert!(src.contains("public class Main {\n    static final java.io.PrintStream OUT = System.out;"));
        assert!(src.contains("        System.setOut(MUTED);\n    }\n\n    public boolean isPalindrome(String s) {"));
        assert!(src.contains("String a0 = parseString(raw);"));
        assert!(src.contains("boolean expected = parseBool(expectedText);"));
        assert!(src.contains("var actual = new Main().isPalindrome(a0);"));
    }

    #[test]
    fn test_non_ascii_literals_are_escaped() {
        let src = emit("", "echo", "String", &[("\"héllo\"", "\"héllo\"")]);
        assert!(src.contains("String raw = \"\\\"h\\u00e9llo\\\"\";"));
    }

    #[test]
    fn test_void_method() {
        let src = emit("", "sortColors", "void", &[("[2,0,1]", "[0,1,2]")]);
        assert!(src.contains("            new Main().sortColors(a0);\n            var actual = a0;\n"));
        assert!(src.contains("int[] expected = parseIntArray(expectedText);"));
    }

    #[test]
    fn test_user_output_is_muted_around_each_call() {
        let src = emit("public int f(int x) { return x; }", "f", "int", &[("1", "1")]);
        assert!(src.contains("            System.setOut(MUTED);\n            long start = System.nanoTime();\n            var actual = new Main().f(a0);"));
        assert!(src.contains("OUT.println(\"Results: \" + passed"));
    }

    #[test]
    fn test_strings_render_through_the_json_escaper() {
        let src = emit("", "echo", "String", &[("\"a\\\"b\"", "\"a\\\"b\"")]);
        assert!(src.contains("return json(String.valueOf(v));"));
    }
}
