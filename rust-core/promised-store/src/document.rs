// SPDX-License-Identifier: PMPL-1.0-or-later
//! Document and filter helpers.

use serde_json::{Map, Value};

/// Primary key attribute of every collection.
pub const ID_FIELD: &str = "_id";

/// A stored document: an open attribute map carrying a string `_id`.
pub type Document = Map<String, Value>;

/// Partial attribute map selecting documents.
pub type Filter = Map<String, Value>;

/// The document's `_id`, if it is a string.
pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// `{...original, ...patch}` with `_id` taken from `original` only.
pub fn merge(original: &Document, patch: &Document) -> Document {
    let mut merged = original.clone();
    for (key, value) in patch {
        if key != ID_FIELD {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// JS truthiness of a JSON value.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Name of the JSON type of `value`, for messages.
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
