/// Signature Detection
///
/// **Core Responsibility:**
/// Decide how many arguments a raw input literal carries, what type each one
/// has, and where in the literal each argument's text comes from.
///
/// **Heuristic Order:**
/// 1. array + scalar pair (`target` token, or a bracketed list followed by a number)
/// 2. single matrix (`[[...`)
/// 3. single bracketed list
/// 4. several top-level arguments (commas or lines)
/// 5. single string
/// 6. single scalar
///
/// A per-language signature declared on the problem takes precedence over the
/// heuristic whenever the input splits into exactly that many arguments.
use crate::inference::{infer, ValueType};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Where the text for one argument comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "text")]
pub enum ArgSource {
    /// The whole raw input literal
    Whole,
    /// First balanced bracket group of the raw input, extracted by the harness
    ArrayPart,
    /// Scalar after the array part, extracted by the harness
    TargetPart,
    /// A piece split off at synthesis time
    Piece(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub ty: ValueType,
    pub source: ArgSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureShape {
    ArrayTarget,
    Matrix,
    Array,
    Str,
    Single,
    Double,
    Triple,
    Multi,
    Declared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub shape: SignatureShape,
    pub params: Vec<Param>,
}

impl Signature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

fn bracket_then_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?s)^\s*(?:[A-Za-z_]\w*\s*=\s*)?\[.*\]\s*[,\n]\s*(?:[A-Za-z_]\w*\s*=\s*)?[+-]?\d+(?:\.\d+)?\s*$",
        )
        .expect("static regex")
    })
}

fn target_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\btarget\b").expect("static regex"))
}

fn arg_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_]\w*\s*=\s*").expect("static regex"))
}

/// Resolve the signature for one input literal
pub fn resolve(input: &str, declared: Option<&[ValueType]>) -> Signature {
    if let Some(types) = declared {
        let pieces = if types.len() == 1 {
            vec![strip_arg_name(input.trim()).to_string()]
        } else {
            split_args(input)
        };
        if pieces.len() == types.len() {
            return Signature {
                shape: SignatureShape::Declared,
                params: types
                    .iter()
                    .zip(pieces)
                    .map(|(ty, piece)| Param { ty: *ty, source: ArgSource::Piece(piece) })
                    .collect(),
            };
        }
        tracing::debug!(
            declared = types.len(),
            found = pieces.len(),
            "Declared arity does not match input; falling back to detection"
        );
    }
    detect(input)
}

/// Heuristic detection from the literal alone
pub fn detect(input: &str) -> Signature {
    let s = input.trim();

    if let Some(signature) = detect_array_target(s) {
        return signature;
    }

    let pieces = split_args(s);
    if pieces.len() > 1 {
        let shape = match pieces.len() {
            2 => SignatureShape::Double,
            3 => SignatureShape::Triple,
            _ => SignatureShape::Multi,
        };
        let params = pieces
            .into_iter()
            .map(|piece| Param { ty: infer(&piece), source: ArgSource::Piece(piece) })
            .collect();
        return Signature { shape, params };
    }

    let only = pieces.into_iter().next().unwrap_or_default();
    let ty = infer(&only);
    let source = if only == s { ArgSource::Whole } else { ArgSource::Piece(only.clone()) };

    let shape = if only.starts_with("[[") {
        SignatureShape::Matrix
    } else if only.starts_with('[') && only.ends_with(']') {
        SignatureShape::Array
    } else if ty == ValueType::String {
        SignatureShape::Str
    } else {
        SignatureShape::Single
    };

    Signature { shape, params: vec![Param { ty, source }] }
}

fn detect_array_target(s: &str) -> Option<Signature> {
    if !(s.contains('[') && s.contains(']')) {
        return None;
    }
    if !target_token().is_match(s) && !bracket_then_number().is_match(s) {
        return None;
    }
    let array = extract_array_part(s)?;
    let target = extract_target_part(s)?;

    Some(Signature {
        shape: SignatureShape::ArrayTarget,
        params: vec![
            Param { ty: infer(array), source: ArgSource::ArrayPart },
            Param { ty: infer(&target), source: ArgSource::TargetPart },
        ],
    })
}

/// First balanced `[...]` group, ignoring brackets inside quotes
pub fn extract_array_part(s: &str) -> Option<&str> {
    let start = s.find('[')?;
    let end = matching_close(s, start)?;
    Some(&s[start..=end])
}

/// Scalar text that follows the array part, without separators or `name =`
pub fn extract_target_part(s: &str) -> Option<String> {
    let start = s.find('[')?;
    let end = matching_close(s, start)?;
    let rest = s[end + 1..].trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    let rest = strip_arg_name(rest).trim().trim_end_matches(',').trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

fn matching_close(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in s[open..].char_indices() {
        if let Some(q) = in_quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                in_quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_quote = Some(c),
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_arg_name(s: &str) -> &str {
    match arg_name().find(s) {
        Some(m) if !s[m.end()..].starts_with('=') && m.end() < s.len() => &s[m.end()..],
        _ => s,
    }
}

/// Split a raw input into argument literals.
///
/// Lines separate arguments; within a line, commas outside brackets and
/// quotes do too. A leading `name =` is dropped from every argument.
pub fn split_args(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .flat_map(|line| split_top_level(line, ',', false))
        .map(|piece| strip_arg_name(piece.trim()).trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn split_top_level(s: &str, sep: char, angle_brackets: bool) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in s.char_indices() {
        if let Some(q) = in_quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                in_quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_quote = Some(c),
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth -= 1,
            '<' if angle_brackets => depth += 1,
            '>' if angle_brackets => depth -= 1,
            _ if c == sep && depth == 0 => {
                pieces.push(&s[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&s[start..]);
    pieces
}

/// Parameter types from a declared signature such as
/// `int[] twoSum(int[] nums, int target)` or
/// `def twoSum(self, nums: List[int], target: int) -> List[int]`.
///
/// Returns `None` when any parameter is untyped or outside the supported set.
pub fn declared_params(declaration: &str) -> Option<Vec<ValueType>> {
    let open = declaration.find('(')?;
    let close = declaration.rfind(')')?;
    if close < open {
        return None;
    }
    let inner = declaration[open + 1..close].trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }

    let mut types = Vec::new();
    for param in split_top_level(inner, ',', true) {
        let param = param.split('=').next().unwrap_or("").trim();
        if matches!(param, "self" | "this" | "") {
            continue;
        }
        let type_text = match param.split_once(':') {
            Some((_, annotation)) => annotation.trim(),
            None => {
                let param = param.strip_prefix("final ").unwrap_or(param);
                let name_start = param
                    .rfind(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .map(|idx| idx + 1)?;
                param[..name_start].trim()
            }
        };
        types.push(ValueType::from_declared(type_text)?);
    }
    Some(types)
}
