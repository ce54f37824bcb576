// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Flat equality matching of documents against filters.
//
// Two predicates are exposed:
//
// - `has_attributes` is strict: the filter must be non-empty, the document
//   must have strictly more attributes than the filter, and every filter
//   attribute must be present in the document with a loosely equal value.
// - `matches` is the selection contract used by find, update and delete:
//   an empty filter selects every document, otherwise `has_attributes`.
//
// Loose equality coerces like a dynamically typed `==`: numbers and numeric
// strings compare numerically, booleans count as 0/1, `null` only equals
// `null`, and arrays or objects only equal primitives through their string
// form. Two arrays or objects are never equal, even with identical content.

use serde_json::{Number, Value};

use crate::document::{Document, Filter};

/// Strict attribute predicate: `|document| > |filter| > 0` and every filter
/// attribute is present in `document` with a loosely equal value.
pub fn has_attributes(document: &Document, filter: &Filter) -> bool {
    document.len() > filter.len()
        && !filter.is_empty()
        && filter.iter().all(|(key, expected)| {
            document
                .get(key)
                .is_some_and(|actual| loose_eq(actual, expected))
        })
}

/// Selection predicate: an empty filter selects everything.
pub fn matches(document: &Document, filter: &Filter) -> bool {
    filter.is_empty() || has_attributes(document, filter)
}

/// Coercive equality between two JSON values.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_eq(x, y),
        (Value::Array(_) | Value::Object(_), Value::Array(_) | Value::Object(_)) => false,
        (Value::Bool(flag), other) | (other, Value::Bool(flag)) => {
            loose_eq(&Value::from(u8::from(*flag)), other)
        }
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            match (parse_number(s), n.as_f64()) {
                (Some(parsed), Some(number)) => parsed == number,
                _ => false,
            }
        }
        (composite @ (Value::Array(_) | Value::Object(_)), primitive)
        | (primitive, composite @ (Value::Array(_) | Value::Object(_))) => {
            loose_eq(&Value::String(to_display_string(composite)), primitive)
        }
    }
}

fn numbers_eq(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    x.as_f64() == y.as_f64()
}

/// Numeric value of a string, or `None` where the coercion yields NaN.
///
/// Surrounding whitespace is ignored, the empty string is zero, and
/// `0x`/`0o`/`0b` prefixes and `Infinity` are understood.
fn parse_number(s: &str) -> Option<f64> {
    let text = s.trim();
    if text.is_empty() {
        return Some(0.0);
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = text.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix).ok().map(|v| v as f64);
        }
    }

    match text {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    // Rust also accepts "inf" and "NaN", which do not coerce to numbers.
    if text
        .chars()
        .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }
    text.parse::<f64>().ok()
}

fn number_to_string(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

/// String form of a value as used when a composite meets a primitive.
fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(to_display_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}
