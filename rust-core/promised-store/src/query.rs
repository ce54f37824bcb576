// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cursor-driven scan-and-match queries.
//
// A find opens one read-only transaction, walks a cursor from the first
// record to exhaustion and keeps every document the filter selects.

use promised_engine::{Connection, Cursor, StorageEngine, Transaction, TransactionMode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::release;
use crate::database::{Multiplicity, PromisedDb};
use crate::document::{kind, Document, Filter};
use crate::error::Result;
use crate::matcher::matches;

/// Result of [`PromisedDb::find`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Found {
    /// First selected document, if any.
    One(Option<Document>),
    /// Every selected document, in key order.
    Many(Vec<Document>),
}

impl Found {
    fn from_matches(mut found: Vec<Document>, many: Multiplicity) -> Self {
        match many {
            Multiplicity::Many => Self::Many(found),
            Multiplicity::One => Self::One(if found.is_empty() {
                None
            } else {
                Some(found.swap_remove(0))
            }),
        }
    }

    /// The first document.
    pub fn into_one(self) -> Option<Document> {
        match self {
            Self::One(document) => document,
            Self::Many(documents) => documents.into_iter().next(),
        }
    }

    /// All documents.
    pub fn into_many(self) -> Vec<Document> {
        match self {
            Self::One(document) => document.into_iter().collect(),
            Self::Many(documents) => documents,
        }
    }

    /// Number of documents found: zero or one for [`Found::One`].
    pub fn len(&self) -> usize {
        match self {
            Self::One(document) => usize::from(document.is_some()),
            Self::Many(documents) => documents.len(),
        }
    }

    /// True when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Walk `collection` and keep every document `filter` selects.
pub(crate) async fn collect_matches<T: Transaction>(
    transaction: &T,
    collection: &str,
    filter: &Filter,
) -> Result<Vec<Document>> {
    let mut cursor = transaction.open_cursor(collection).await?;
    let mut found = Vec::new();
    while let Some(record) = cursor.advance().await? {
        match record.value {
            Value::Object(document) => {
                if matches(&document, filter) {
                    found.push(document);
                }
            }
            other => {
                warn!(collection, key = %record.key, kind = kind(&other), "skipping non-object record");
            }
        }
    }
    Ok(found)
}

impl<E: StorageEngine> PromisedDb<E> {
    /// Documents of `collection` selected by `filter`.
    ///
    /// A missing collection yields an empty result, not an error. An empty
    /// filter selects every document.
    pub async fn find(&self, collection: &str, filter: &Filter, many: Multiplicity) -> Result<Found> {
        let connection = self.open(None).await?;
        if !connection.contains(collection) {
            debug!(database = %self.name(), collection, "find on missing collection");
            return release(connection, Ok(Found::from_matches(Vec::new(), many))).await;
        }

        let result = self.scan(&connection, collection, filter).await;
        let found = release(connection, result).await?;
        debug!(database = %self.name(), collection, matched = found.len(), "find complete");
        Ok(Found::from_matches(found, many))
    }

    /// First document of `collection` selected by `filter`.
    pub async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.find(collection, filter, Multiplicity::One).await?.into_one())
    }

    /// Every document of `collection` selected by `filter`.
    pub async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        Ok(self.find(collection, filter, Multiplicity::Many).await?.into_many())
    }

    async fn scan(
        &self,
        connection: &E::Connection,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<Document>> {
        let transaction = connection
            .transaction(&[collection], TransactionMode::ReadOnly)
            .await?;
        match collect_matches(&transaction, collection, filter).await {
            Ok(found) => {
                transaction.commit().await?;
                Ok(found)
            }
            Err(err) => {
                warn!(database = %self.name(), collection, error = %err, "find aborted");
                if let Err(abort) = transaction.abort().await {
                    debug!(error = %abort, "abort after failed find");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promised_engine::{MemoryEngine, VersionChange};
    use serde_json::json;

    fn filter(value: Value) -> Filter {
        value.as_object().cloned().unwrap()
    }

    async fn seeded(engine: &MemoryEngine) -> PromisedDb<MemoryEngine> {
        let db = PromisedDb::new(engine.clone(), "db");
        db.create_many(
            "people",
            json!([
                {"_id": "1", "name": "Ada", "age": 36},
                {"_id": "2", "name": "Bob", "age": 36},
                {"_id": "3", "name": "Cy", "age": 20}
            ]),
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_find_missing_collection_is_empty() {
        let engine = MemoryEngine::new();
        let db = PromisedDb::new(engine.clone(), "db");
        assert_eq!(db.find("ghost", &Filter::new(), Multiplicity::Many).await.unwrap(), Found::Many(vec![]));
        assert_eq!(db.find_one("ghost", &Filter::new()).await.unwrap(), None);
        assert_eq!(engine.open_connections("db").await, 0);
    }

    #[tokio::test]
    async fn test_find_many_and_one() {
        let engine = MemoryEngine::new();
        let db = seeded(&engine).await;

        let all = db.find_many("people", &Filter::new()).await.unwrap();
        assert_eq!(all.len(), 3);

        let same_age = db.find_many("people", &filter(json!({"age": 36}))).await.unwrap();
        let names: Vec<_> = same_age.iter().map(|d| d["name"].clone()).collect();
        assert_eq!(names, vec![json!("Ada"), json!("Bob")]);

        let first = db.find_one("people", &filter(json!({"age": "36"}))).await.unwrap().unwrap();
        assert_eq!(first["_id"], "1");

        assert!(db.find_many("people", &filter(json!({"age": 99}))).await.unwrap().is_empty());
        assert_eq!(engine.open_connections("db").await, 0);
    }

    #[tokio::test]
    async fn test_find_reads_records_written_through_the_engine() {
        let engine = MemoryEngine::new();
        let db = seeded(&engine).await;

        let grow = |change: &mut VersionChange| change.create_object_store("raw", "_id").map(|_| ());
        let connection = db.open(Some(&grow)).await.unwrap();
        let transaction = connection
            .transaction(&["raw"], TransactionMode::ReadWrite)
            .await
            .unwrap();
        transaction.add("raw", json!({"_id": "ok", "v": 1})).await.unwrap();
        transaction.commit().await.unwrap();
        connection.close().await.unwrap();

        let found = db.find_many("raw", &Filter::new()).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_found_accessors() {
        let a = filter(json!({"_id": "a"}));
        let many = Found::Many(vec![a.clone()]);
        assert_eq!(many.len(), 1);
        assert_eq!(many.clone().into_one(), Some(a.clone()));
        assert_eq!(Found::One(None).into_many(), Vec::<Document>::new());
        assert!(Found::One(None).is_empty());
        assert_eq!(Found::One(Some(a.clone())).len(), 1);
        assert!(Found::Many(Vec::new()).is_empty());
        assert_eq!(serde_json::to_value(Found::One(None)).unwrap(), json!(null));
        assert_eq!(serde_json::to_value(many).unwrap(), json!([{"_id": "a"}]));
    }
}
