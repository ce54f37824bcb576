// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transaction-scoped create, update and delete.
//
// Each operation runs in exactly one read-write transaction on one
// collection. Create is all-or-nothing: any failed insert aborts the
// transaction. Update and multi-document delete account for each record
// separately and commit whatever succeeded.

use std::fmt;

use promised_engine::{Connection, Cursor, EngineError, StorageEngine, Transaction, TransactionMode};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::release;
use crate::database::{Multiplicity, PromisedDb};
use crate::document::{document_id, kind, merge, Document, Filter, ID_FIELD};
use crate::error::{Result, StoreError};
use crate::id::assign_id;
use crate::matcher::matches;

fn serialize_display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// A record an update could not write.
#[derive(Debug, Serialize)]
pub struct FailedRecord {
    /// The engine's reason.
    #[serde(serialize_with = "serialize_display")]
    pub error: EngineError,
    #[serde(rename = "_id")]
    pub id: String,
}

/// Per-record outcome of [`PromisedDb::update`].
#[derive(Debug, Default, Serialize)]
pub struct UpdateReport {
    pub failed: Vec<FailedRecord>,
    /// Merged documents as written.
    pub successful: Vec<Document>,
}

/// Accounting returned by a multi-document delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSummary {
    /// Records deleted.
    pub n: usize,
    /// `false` if any targeted record failed to delete.
    pub ok: bool,
    /// Records the filter selected.
    pub found: usize,
}

/// Result of [`PromisedDb::delete`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Deleted {
    /// Multi-document accounting.
    Summary(DeleteSummary),
    /// The single deleted document, if anything was found.
    One(Option<Document>),
}

fn validate_create(data: Value, many: Multiplicity) -> Result<Vec<Document>> {
    match (many, data) {
        (Multiplicity::Many, Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(document) => Ok(document),
                other => Err(StoreError::InvalidInput(format!(
                    "element {index} of a multi-document create is {}, not an object",
                    kind(&other)
                ))),
            })
            .collect(),
        (Multiplicity::Many, other) => Err(StoreError::InvalidInput(format!(
            "multi-document create needs an array of documents, got {}",
            kind(&other)
        ))),
        (Multiplicity::One, Value::Object(document)) => Ok(vec![document]),
        (Multiplicity::One, other) => Err(StoreError::InvalidInput(format!(
            "single-document create needs an object, got {}",
            kind(&other)
        ))),
    }
}

async fn insert_all<C: Connection>(connection: &C, collection: &str, documents: &[Document]) -> Result<()> {
    let transaction = connection
        .transaction(&[collection], TransactionMode::ReadWrite)
        .await?;
    let store = transaction.object_store(collection);
    for document in documents {
        if let Err(err) = store.add(Value::Object(document.clone())).await {
            warn!(collection, id = ?document_id(document), error = %err, "insert failed, aborting create");
            transaction.abort().await?;
            return Err(err.into());
        }
    }
    transaction.commit().await?;
    Ok(())
}

async fn update_matches<T: Transaction>(
    transaction: &T,
    collection: &str,
    filter: &Filter,
    patch: &Document,
    many: Multiplicity,
) -> Result<UpdateReport> {
    let mut report = UpdateReport::default();
    let mut cursor = transaction.open_cursor(collection).await?;
    let mut found = false;

    while many.is_many() || !found {
        let Some(record) = cursor.advance().await? else {
            break;
        };
        let original = match record.value {
            Value::Object(document) => document,
            other => {
                warn!(collection, key = %record.key, kind = kind(&other), "skipping non-object record");
                continue;
            }
        };
        if !matches(&original, filter) {
            continue;
        }

        found = true;
        let merged = merge(&original, patch);
        match cursor.update(Value::Object(merged.clone())).await {
            Ok(()) => report.successful.push(merged),
            Err(error) => {
                warn!(collection, id = %record.key, error = %error, "record update failed");
                report.failed.push(FailedRecord {
                    error,
                    id: record.key,
                });
            }
        }
    }
    Ok(report)
}

async fn apply_update<C: Connection>(
    connection: &C,
    collection: &str,
    filter: &Filter,
    patch: &Document,
    many: Multiplicity,
) -> Result<UpdateReport> {
    let transaction = connection
        .transaction(&[collection], TransactionMode::ReadWrite)
        .await?;
    match update_matches(&transaction, collection, filter, patch, many).await {
        Ok(report) => {
            transaction.commit().await?;
            Ok(report)
        }
        Err(err) => {
            warn!(collection, error = %err, "update aborted");
            if let Err(abort) = transaction.abort().await {
                debug!(error = %abort, "abort after failed update");
            }
            Err(err)
        }
    }
}

async fn delete_each<C: Connection>(connection: &C, collection: &str, targets: &[Document]) -> Result<DeleteSummary> {
    let transaction = connection
        .transaction(&[collection], TransactionMode::ReadWrite)
        .await?;
    let mut summary = DeleteSummary {
        n: 0,
        ok: true,
        found: targets.len(),
    };

    let store = transaction.object_store(collection);
    for target in targets {
        let Some(id) = document_id(target) else {
            warn!(collection, "selected document has no string _id");
            summary.ok = false;
            continue;
        };
        match store.delete(id).await {
            Ok(_) => summary.n += 1,
            Err(err) => {
                warn!(collection, id, error = %err, "record delete failed");
                summary.ok = false;
            }
        }
    }
    transaction.commit().await?;
    Ok(summary)
}

async fn delete_single<C: Connection>(connection: &C, collection: &str, target: &Document) -> Result<()> {
    let id = document_id(target).ok_or_else(|| StoreError::MalformedDocument {
        collection: collection.to_string(),
        reason: format!("selected document has no string {ID_FIELD}"),
    })?;
    let transaction = connection
        .transaction(&[collection], TransactionMode::ReadWrite)
        .await?;
    if let Err(err) = transaction.delete(collection, id).await {
        warn!(collection, id, error = %err, "delete failed, aborting");
        transaction.abort().await?;
        return Err(err.into());
    }
    transaction.commit().await?;
    Ok(())
}

impl<E: StorageEngine> PromisedDb<E> {
    /// Insert `data` into `collection`, creating the collection if needed.
    ///
    /// Single mode takes one object; multi mode an array of objects.
    /// Documents without a truthy `_id` get a generated one. Returns the input
    /// with `_id`s filled in. A failed insert aborts the whole call.
    pub async fn create(&self, collection: &str, data: Value, many: Multiplicity) -> Result<Value> {
        if collection.is_empty() {
            return Err(StoreError::InvalidInput(
                "collection name must not be empty".to_string(),
            ));
        }
        let mut documents = validate_create(data, many)?;
        for document in &mut documents {
            assign_id(document, self.ids.as_ref());
        }

        let connection = self.open(None).await?;
        let connection = if connection.contains(collection) {
            connection
        } else {
            connection.close().await?;
            self.create_collections(&[collection]).await?
        };

        let result = insert_all(&connection, collection, &documents).await;
        release(connection, result).await?;
        debug!(database = %self.name(), collection, inserted = documents.len(), "create complete");

        let mut echoed = documents.into_iter().map(Value::Object);
        Ok(match many {
            Multiplicity::Many => Value::Array(echoed.collect()),
            Multiplicity::One => echoed.next().unwrap_or(Value::Null),
        })
    }

    /// Insert one document.
    pub async fn create_one(&self, collection: &str, data: Value) -> Result<Value> {
        self.create(collection, data, Multiplicity::One).await
    }

    /// Insert an array of documents.
    pub async fn create_many(&self, collection: &str, data: Value) -> Result<Value> {
        self.create(collection, data, Multiplicity::Many).await
    }

    /// Merge `patch` into documents selected by `filter`.
    ///
    /// `_id` in `patch` is ignored. In single mode the scan stops at the
    /// first selected document. Fails with
    /// [`StoreError::CollectionNotFound`] if the collection is missing.
    pub async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
        many: Multiplicity,
    ) -> Result<UpdateReport> {
        let connection = self.open(None).await?;
        if !connection.contains(collection) {
            return release(connection, Err(StoreError::CollectionNotFound(collection.to_string()))).await;
        }

        let result = apply_update(&connection, collection, filter, patch, many).await;
        let report = release(connection, result).await?;
        debug!(
            database = %self.name(),
            collection,
            successful = report.successful.len(),
            failed = report.failed.len(),
            "update complete"
        );
        Ok(report)
    }

    /// Update the first document selected by `filter`.
    pub async fn update_one(&self, collection: &str, filter: &Filter, patch: &Document) -> Result<UpdateReport> {
        self.update(collection, filter, patch, Multiplicity::One).await
    }

    /// Update every document selected by `filter`.
    pub async fn update_many(&self, collection: &str, filter: &Filter, patch: &Document) -> Result<UpdateReport> {
        self.update(collection, filter, patch, Multiplicity::Many).await
    }

    /// Delete documents selected by `filter`.
    pub async fn delete(&self, collection: &str, filter: &Filter, many: Multiplicity) -> Result<Deleted> {
        Ok(match many {
            Multiplicity::Many => Deleted::Summary(self.delete_many(collection, filter).await?),
            Multiplicity::One => Deleted::One(self.delete_one(collection, filter).await?),
        })
    }

    /// Delete the first selected document and return it.
    ///
    /// Returns `None` without opening a transaction when nothing matches. A
    /// failed delete aborts and fails the call.
    pub async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let Some(target) = self.find(collection, filter, Multiplicity::One).await?.into_one() else {
            return Ok(None);
        };
        let connection = self.open(None).await?;
        let result = delete_single(&connection, collection, &target).await;
        release(connection, result).await?;
        debug!(database = %self.name(), collection, "delete_one complete");
        Ok(Some(target))
    }

    /// Delete every selected document, reporting `{n, ok, found}`.
    ///
    /// Per-record failures clear `ok` without aborting the rest.
    pub async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<DeleteSummary> {
        let found = self.find(collection, filter, Multiplicity::Many).await?;
        if found.is_empty() {
            return Ok(DeleteSummary {
                n: 0,
                ok: true,
                found: 0,
            });
        }
        let targets = found.into_many();
        let connection = self.open(None).await?;
        let result = delete_each(&connection, collection, &targets).await;
        let summary = release(connection, result).await?;
        debug!(database = %self.name(), collection, deleted = summary.n, ok = summary.ok, "delete_many complete");
        Ok(summary)
    }

    /// Delete every document of `collection`.
    pub async fn empty_collection(&self, collection: &str) -> Result<DeleteSummary> {
        self.delete_many(collection, &Filter::new()).await
    }
}
