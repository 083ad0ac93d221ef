/// Literal Type Inference
///
/// **Core Responsibility:**
/// Classify one raw text literal into a semantic type tag.
///
/// **Limitation:**
/// Inference is literal-local. The input and expected output of the same case
/// are typed independently and nothing is remembered across calls.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer,
    Long,
    Double,
    Boolean,
    String,
    IntArray,
    StringArray,
    DoubleArray,
    IntMatrix,
    Object,
    Null,
    Unknown,
}

impl ValueType {
    /// Types the harness cannot parse structurally; handled as raw text
    pub fn is_opaque(self) -> bool {
        matches!(self, ValueType::Object | ValueType::Null | ValueType::Unknown)
    }

    /// Types compared with an epsilon instead of exact equality
    pub fn is_approximate(self) -> bool {
        matches!(self, ValueType::Double | ValueType::DoubleArray)
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            ValueType::IntArray | ValueType::StringArray | ValueType::DoubleArray | ValueType::IntMatrix
        )
    }

    /// Map a declared type name from any supported language onto the tag set.
    /// Returns `None` for `void` and for anything outside the supported set.
    pub fn from_declared(name: &str) -> Option<ValueType> {
        let (scalar, dims) = declared_shape(&normalize_declared(name))?;
        match (scalar, dims) {
            (scalar, 0) => Some(scalar),
            (ValueType::Integer | ValueType::Long, 1) => Some(ValueType::IntArray),
            (ValueType::Double, 1) => Some(ValueType::DoubleArray),
            (ValueType::String, 1) => Some(ValueType::StringArray),
            (ValueType::Integer | ValueType::Long, 2) => Some(ValueType::IntMatrix),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Integer => "integer",
            ValueType::Long => "long",
            ValueType::Double => "double",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::IntArray => "int-array",
            ValueType::StringArray => "string-array",
            ValueType::DoubleArray => "double-array",
            ValueType::IntMatrix => "int-matrix",
            ValueType::Object => "object",
            ValueType::Null => "null",
            ValueType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// True for declared return types meaning "mutates its first argument"
pub fn is_void_type(name: &str) -> bool {
    matches!(normalize_declared(name).as_str(), "void" | "none" | "undefined" | "()")
}

fn normalize_declared(name: &str) -> String {
    name.to_lowercase()
        .replace("std::", "")
        .replace("java.util.", "")
        .replace("typing.", "")
        .replace("const", "")
        .replace('&', "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn declared_shape(s: &str) -> Option<(ValueType, usize)> {
    if let Some(inner) = s.strip_suffix("[]") {
        let (scalar, dims) = declared_shape(inner)?;
        return Some((scalar, dims + 1));
    }

    const WRAPPERS: [(&str, &str); 5] = [
        ("vector<", ">"),
        ("arraylist<", ">"),
        ("list<", ">"),
        ("array<", ">"),
        ("list[", "]"),
    ];
    for (open, close) in WRAPPERS {
        if let Some(inner) = s.strip_prefix(open).and_then(|rest| rest.strip_suffix(close)) {
            let (scalar, dims) = declared_shape(inner)?;
            return Some((scalar, dims + 1));
        }
    }

    let scalar = match s {
        "int" | "integer" | "i32" | "short" | "byte" => ValueType::Integer,
        "long" | "longlong" | "int64_t" | "i64" => ValueType::Long,
        "double" | "float" | "f64" | "f32" | "number" => ValueType::Double,
        "boolean" | "bool" => ValueType::Boolean,
        "string" | "str" | "char" | "character" => ValueType::String,
        _ => return None,
    };
    Some((scalar, 0))
}

/// Classify a literal. Pure; never fails.
pub fn infer(literal: &str) -> ValueType {
    let s = literal.trim();
    if s.is_empty() {
        return ValueType::Null;
    }
    if s.chars().any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t')) {
        return ValueType::Unknown;
    }

    if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
        return ValueType::Boolean;
    }

    if s.starts_with('[') && s.ends_with(']') {
        let content = s[1..s.len() - 1].trim();
        return if content.is_empty() {
            ValueType::IntArray
        } else if content.starts_with('[') {
            ValueType::IntMatrix
        } else if content.contains('"') {
            ValueType::StringArray
        } else if content.contains('.') {
            ValueType::DoubleArray
        } else {
            ValueType::IntArray
        };
    }

    if s.starts_with('{') && s.ends_with('}') {
        return ValueType::Object;
    }

    if is_numeric(s) {
        return if s.contains(['.', 'e', 'E']) {
            ValueType::Double
        } else if s.parse::<i32>().is_ok() {
            ValueType::Integer
        } else {
            ValueType::Long
        };
    }

    ValueType::String
}

fn is_numeric(s: &str) -> bool {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(idx) => (&unsigned[..idx], Some(&unsigned[idx + 1..])),
        None => (unsigned, None),
    };

    let mut parts = mantissa.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let frac = parts.next();
    let digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());

    let mantissa_ok = match frac {
        Some(frac) => digits(whole) && digits(frac) && !(whole.is_empty() && frac.is_empty()),
        None => !whole.is_empty() && digits(whole),
    };
    let exponent_ok = match exponent {
        Some(exp) => {
            let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !exp.is_empty() && digits(exp)
        }
        None => true,
    };
    mantissa_ok && exponent_ok
}

/// A literal together with the type inferred for it at annotation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredLiteral {
    pub raw: String,
    pub ty: ValueType,
}

impl InferredLiteral {
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let ty = infer(&raw);
        Self { raw, ty }
    }
}

/// Single-line rendering of a possibly multi-line literal, for result display
pub fn display_literal(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
