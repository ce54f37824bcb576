// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for filter matching and document round-trips

use proptest::prelude::*;
use promised_engine::MemoryEngine;
use promised_store::{has_attributes, loose_eq, matches, Document, Filter, PromisedDb};
use serde_json::Value;

/// Generate scalar JSON values
fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
    ]
}

/// Generate flat documents without an `_id`
fn arb_document(min: usize, max: usize) -> impl Strategy<Value = Document> {
    prop::collection::btree_map("[a-z]{1,8}", arb_scalar(), min..max)
        .prop_map(|fields| fields.into_iter().collect())
}

/// A document together with a non-empty proper subset of its attributes
fn arb_document_and_subset() -> impl Strategy<Value = (Document, Filter)> {
    arb_document(2, 8).prop_flat_map(|document| {
        let len = document.len();
        (Just(document), 1..len).prop_map(|(document, take)| {
            let filter = document
                .iter()
                .take(take)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            (document, filter)
        })
    })
}

proptest! {
    #[test]
    fn test_empty_filter_selects_but_never_has_attributes(document in arb_document(0, 8)) {
        let empty = Filter::new();
        prop_assert!(!has_attributes(&document, &empty));
        prop_assert!(matches(&document, &empty));
    }

    #[test]
    fn test_proper_subset_filter_matches((document, filter) in arb_document_and_subset()) {
        prop_assert!(has_attributes(&document, &filter));
        prop_assert!(matches(&document, &filter));
    }

    #[test]
    fn test_filter_as_large_as_document_never_matches(document in arb_document(1, 8)) {
        let filter = document.clone();
        prop_assert!(!has_attributes(&document, &filter));
        prop_assert!(!matches(&document, &filter));
    }

    #[test]
    fn test_loose_eq_is_symmetric(a in arb_scalar(), b in arb_scalar()) {
        prop_assert_eq!(loose_eq(&a, &b), loose_eq(&b, &a));
    }

    #[test]
    fn test_integer_equals_its_decimal_string(n in -1_000_000i64..1_000_000) {
        prop_assert!(loose_eq(&Value::from(n), &Value::from(n.to_string())));
        prop_assert!(!loose_eq(&Value::from(n), &Value::Null));
    }

    #[test]
    fn test_created_document_is_found_by_its_own_fields(document in arb_document(1, 6)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let db = PromisedDb::new(MemoryEngine::new(), "props");
            let created = db.create_one("docs", Value::Object(document.clone())).await.unwrap();

            // The generated `_id` makes the stored document one attribute larger.
            let found = db.find_one("docs", &document).await.unwrap();
            prop_assert!(found.is_some());
            let found = found.unwrap();
            prop_assert_eq!(&found["_id"], &created["_id"]);
            for (key, value) in &document {
                prop_assert_eq!(&found[key], value);
            }

            Ok(())
        })?;
    }
}
