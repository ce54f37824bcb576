// SPDX-License-Identifier: PMPL-1.0-or-later
//! Identifier generation for documents created without an `_id`.

use serde_json::Value;
use uuid::Uuid;

use crate::document::{is_truthy, Document, ID_FIELD};

/// Source of fresh, opaque document identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce a new identifier. Every call must return a distinct value.
    fn generate(&self) -> String;
}

/// Random UUID v4 identifiers (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// Give `document` a generated `_id` unless it already carries a truthy one.
pub(crate) fn assign_id(document: &mut Document, ids: &dyn IdGenerator) {
    let present = document.get(ID_FIELD).is_some_and(is_truthy);
    if !present {
        document.insert(ID_FIELD.to_string(), Value::String(ids.generate()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_uuid_ids_are_distinct() {
        let ids = UuidGenerator;
        let a = ids.generate();
        let b = ids.generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_closure_generator() {
        let counter = AtomicUsize::new(0);
        let ids = move || format!("id-{}", counter.fetch_add(1, Ordering::SeqCst));
        assert_eq!(ids.generate(), "id-0");
        assert_eq!(ids.generate(), "id-1");
    }

    #[test]
    fn test_assign_id_replaces_falsy_values_only() {
        let ids = || "generated".to_string();

        let mut missing = Document::new();
        assign_id(&mut missing, &ids);
        assert_eq!(missing[ID_FIELD], "generated");

        let mut empty = json!({"_id": ""}).as_object().cloned().unwrap();
        assign_id(&mut empty, &ids);
        assert_eq!(empty[ID_FIELD], "generated");

        let mut kept = json!({"_id": "mine"}).as_object().cloned().unwrap();
        assign_id(&mut kept, &ids);
        assert_eq!(kept[ID_FIELD], "mine");
    }
}
