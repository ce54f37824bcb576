// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Copy-on-write transactions and cursors shared by every backend.
//
// A transaction starts from the committed record maps of its scope
// (`Arc<BTreeMap>`, so starting is O(1) per store). The first write to a
// store clones its map into a private working copy and every write is also
// recorded in a per-store change log. Commit hands the change log to the
// backend's `CommitSink`; abort or drop simply forgets it. Cursors walk the
// working copy by key, so a scan sees the transaction's own writes.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::backend::{Cursor, Record, Transaction, TransactionMode};
use crate::config::EngineLimits;
use crate::error::EngineError;
use crate::schema::StoreSchema;

/// Committed records of one object store, in key order.
pub type RecordMap = BTreeMap<String, Value>;

/// A store's committed state captured when a transaction begins.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    /// Definition of the store.
    pub schema: StoreSchema,
    /// Records as committed at transaction start.
    pub records: Arc<RecordMap>,
}

/// Writes a committed transaction made to one store.
///
/// `None` marks a deletion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreWrites {
    /// Store the writes belong to.
    pub store: String,
    /// Final state of every key the transaction touched.
    pub writes: BTreeMap<String, Option<Value>>,
}

impl StoreWrites {
    /// Apply the writes to a record map.
    pub fn apply_to(self, records: &mut RecordMap) {
        for (key, value) in self.writes {
            match value {
                Some(value) => {
                    records.insert(key, value);
                }
                None => {
                    records.remove(&key);
                }
            }
        }
    }
}

/// Destination of committed writes, implemented by each backend.
///
/// `apply` must be atomic: either every batch is applied or none is.
#[async_trait]
pub trait CommitSink: Send + Sync {
    /// Apply the writes of one committed transaction on `database`.
    async fn apply(&self, database: &str, writes: Vec<StoreWrites>) -> Result<(), EngineError>;
}

#[derive(Debug)]
struct WorkingStore {
    schema: StoreSchema,
    records: Arc<RecordMap>,
    writes: BTreeMap<String, Option<Value>>,
}

impl WorkingStore {
    fn write(&mut self, key: String, value: Option<Value>) {
        let records = Arc::make_mut(&mut self.records);
        match &value {
            Some(value) => {
                records.insert(key.clone(), value.clone());
            }
            None => {
                records.remove(&key);
            }
        }
        self.writes.insert(key, value);
    }
}

#[derive(Debug)]
struct WorkingSet {
    mode: TransactionMode,
    limits: EngineLimits,
    stores: BTreeMap<String, WorkingStore>,
    finished: bool,
}

fn out_of_scope(store: &str) -> EngineError {
    EngineError::NotFound(format!(
        "object store '{store}' is not in the transaction scope"
    ))
}

impl WorkingSet {
    fn ensure_active(&self) -> Result<(), EngineError> {
        if self.finished {
            return Err(EngineError::InvalidState(
                "transaction has already finished".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_writable(&self, store: &str) -> Result<(), EngineError> {
        self.ensure_active()?;
        if self.mode == TransactionMode::ReadOnly {
            return Err(EngineError::ReadOnly(format!(
                "cannot write to '{store}' in a read-only transaction"
            )));
        }
        Ok(())
    }

    fn store(&self, store: &str) -> Result<&WorkingStore, EngineError> {
        self.ensure_active()?;
        self.stores.get(store).ok_or_else(|| out_of_scope(store))
    }

    fn insert(&mut self, store: &str, value: Value, overwrite: bool) -> Result<String, EngineError> {
        self.ensure_writable(store)?;
        let working = self.stores.get_mut(store).ok_or_else(|| out_of_scope(store))?;
        let key = working.schema.key_of(&value)?;
        self.limits.check_key(&key)?;
        self.limits.check_value(&value)?;
        if !overwrite && working.records.contains_key(&key) {
            return Err(EngineError::Constraint(format!(
                "key '{key}' already exists in '{store}'"
            )));
        }
        working.write(key.clone(), Some(value));
        Ok(key)
    }

    fn replace_at(&mut self, store: &str, key: &str, value: Value) -> Result<(), EngineError> {
        self.ensure_writable(store)?;
        let working = self.stores.get_mut(store).ok_or_else(|| out_of_scope(store))?;
        let new_key = working.schema.key_of(&value)?;
        if new_key != key {
            return Err(EngineError::Data(format!(
                "cursor update may not change the primary key ('{key}' -> '{new_key}')"
            )));
        }
        self.limits.check_value(&value)?;
        working.write(new_key, Some(value));
        Ok(())
    }

    fn remove(&mut self, store: &str, key: &str) -> Result<bool, EngineError> {
        self.ensure_writable(store)?;
        let working = self.stores.get_mut(store).ok_or_else(|| out_of_scope(store))?;
        if !working.records.contains_key(key) {
            return Ok(false);
        }
        working.write(key.to_string(), None);
        Ok(true)
    }

    fn take_writes(&mut self) -> Vec<StoreWrites> {
        self.stores
            .iter_mut()
            .filter(|(_, working)| !working.writes.is_empty())
            .map(|(name, working)| StoreWrites {
                store: name.clone(),
                writes: std::mem::take(&mut working.writes),
            })
            .collect()
    }
}

/// A copy-on-write transaction over a backend implementing [`CommitSink`].
///
/// Read-write transactions hold the database's writer lock from creation
/// until they finish or are dropped.
pub struct SnapshotTransaction<S: CommitSink> {
    database: String,
    scope: Vec<String>,
    mode: TransactionMode,
    state: Arc<Mutex<WorkingSet>>,
    sink: Arc<S>,
    _writer: Option<OwnedMutexGuard<()>>,
}

impl<S: CommitSink> SnapshotTransaction<S> {
    /// Start a transaction from captured store snapshots.
    pub fn new(
        database: &str,
        mode: TransactionMode,
        limits: EngineLimits,
        stores: Vec<SnapshotStore>,
        sink: Arc<S>,
        writer: Option<OwnedMutexGuard<()>>,
    ) -> Self {
        let scope = stores.iter().map(|s| s.schema.name.clone()).collect();
        let stores = stores
            .into_iter()
            .map(|snapshot| {
                (
                    snapshot.schema.name.clone(),
                    WorkingStore {
                        schema: snapshot.schema,
                        records: snapshot.records,
                        writes: BTreeMap::new(),
                    },
                )
            })
            .collect();

        Self {
            database: database.to_string(),
            scope,
            mode,
            state: Arc::new(Mutex::new(WorkingSet {
                mode,
                limits,
                stores,
                finished: false,
            })),
            sink,
            _writer: writer,
        }
    }
}

impl<S: CommitSink> std::fmt::Debug for SnapshotTransaction<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotTransaction")
            .field("database", &self.database)
            .field("scope", &self.scope)
            .field("mode", &self.mode)
            .finish()
    }
}

impl<S: CommitSink> Drop for SnapshotTransaction<S> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_lock() {
            if !state.finished {
                state.finished = true;
                debug!(database = %self.database, "transaction dropped unfinished, writes discarded");
            }
        }
    }
}

#[async_trait]
impl<S: CommitSink + 'static> Transaction for SnapshotTransaction<S> {
    type Cursor = SnapshotCursor;

    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn scope(&self) -> &[String] {
        &self.scope
    }

    async fn open_cursor(&self, store: &str) -> Result<SnapshotCursor, EngineError> {
        self.state.lock().await.store(store)?;
        Ok(SnapshotCursor {
            state: Arc::clone(&self.state),
            store: store.to_string(),
            position: Position::BeforeStart,
        })
    }

    async fn get(&self, store: &str, key: &str) -> Result<Option<Value>, EngineError> {
        let state = self.state.lock().await;
        Ok(state.store(store)?.records.get(key).cloned())
    }

    async fn add(&self, store: &str, value: Value) -> Result<String, EngineError> {
        self.state.lock().await.insert(store, value, false)
    }

    async fn put(&self, store: &str, value: Value) -> Result<String, EngineError> {
        self.state.lock().await.insert(store, value, true)
    }

    async fn delete(&self, store: &str, key: &str) -> Result<bool, EngineError> {
        self.state.lock().await.remove(store, key)
    }

    async fn count(&self, store: &str) -> Result<usize, EngineError> {
        let state = self.state.lock().await;
        Ok(state.store(store)?.records.len())
    }

    async fn commit(self) -> Result<(), EngineError> {
        let writes = {
            let mut state = self.state.lock().await;
            state.ensure_active()?;
            state.finished = true;
            state.take_writes()
        };

        if !writes.is_empty() {
            self.sink.apply(&self.database, writes).await?;
        }
        debug!(database = %self.database, mode = %self.mode, scope = ?self.scope, "transaction committed");
        Ok(())
    }

    async fn abort(self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        state.ensure_active()?;
        state.finished = true;
        state.stores.clear();
        debug!(database = %self.database, mode = %self.mode, "transaction aborted");
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Position {
    BeforeStart,
    At(Record),
    Removed(String),
    Exhausted,
}

/// Cursor over a [`SnapshotTransaction`]'s view of one store.
#[derive(Debug)]
pub struct SnapshotCursor {
    state: Arc<Mutex<WorkingSet>>,
    store: String,
    position: Position,
}

impl SnapshotCursor {
    fn positioned_key(&self) -> Result<String, EngineError> {
        match &self.position {
            Position::At(record) => Ok(record.key.clone()),
            _ => Err(EngineError::InvalidState(format!(
                "cursor over '{}' is not positioned on a record",
                self.store
            ))),
        }
    }
}

#[async_trait]
impl Cursor for SnapshotCursor {
    async fn advance(&mut self) -> Result<Option<Record>, EngineError> {
        let state = self.state.lock().await;
        let working = state.store(&self.store)?;
        let next = match &self.position {
            Position::BeforeStart => working.records.iter().next(),
            Position::At(Record { key, .. }) | Position::Removed(key) => working
                .records
                .range::<str, _>((Bound::Excluded(key.as_str()), Bound::Unbounded))
                .next(),
            Position::Exhausted => {
                return Err(EngineError::InvalidState(format!(
                    "cursor over '{}' is already exhausted",
                    self.store
                )))
            }
        };
        let next = next.map(|(key, value)| Record {
            key: key.clone(),
            value: value.clone(),
        });
        drop(state);

        self.position = match &next {
            Some(record) => Position::At(record.clone()),
            None => Position::Exhausted,
        };
        Ok(next)
    }

    fn current(&self) -> Option<&Record> {
        match &self.position {
            Position::At(record) => Some(record),
            _ => None,
        }
    }

    fn is_exhausted(&self) -> bool {
        matches!(self.position, Position::Exhausted)
    }

    async fn update(&mut self, value: Value) -> Result<(), EngineError> {
        let key = self.positioned_key()?;
        self.state
            .lock()
            .await
            .replace_at(&self.store, &key, value.clone())?;
        self.position = Position::At(Record { key, value });
        Ok(())
    }

    async fn delete(&mut self) -> Result<(), EngineError> {
        let key = self.positioned_key()?;
        self.state.lock().await.remove(&self.store, &key)?;
        self.position = Position::Removed(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Sink that records every applied batch.
    #[derive(Default)]
    struct RecordingSink {
        applied: Mutex<Vec<StoreWrites>>,
    }

    #[async_trait]
    impl CommitSink for RecordingSink {
        async fn apply(&self, _database: &str, writes: Vec<StoreWrites>) -> Result<(), EngineError> {
            self.applied.lock().await.extend(writes);
            Ok(())
        }
    }

    fn snapshot(records: &[(&str, Value)]) -> SnapshotStore {
        SnapshotStore {
            schema: StoreSchema::new("docs", "_id"),
            records: Arc::new(
                records
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ),
        }
    }

    fn transaction(
        mode: TransactionMode,
        store: SnapshotStore,
    ) -> (SnapshotTransaction<RecordingSink>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let txn = SnapshotTransaction::new(
            "db",
            mode,
            EngineLimits::default(),
            vec![store],
            Arc::clone(&sink),
            None,
        );
        (txn, sink)
    }

    #[tokio::test]
    async fn test_writes_visible_inside_but_not_in_snapshot() {
        let base = snapshot(&[("a", json!({"_id": "a"}))]);
        let committed = Arc::clone(&base.records);
        let (txn, _sink) = transaction(TransactionMode::ReadWrite, base);

        txn.add("docs", json!({"_id": "b", "n": 1})).await.unwrap();
        assert_eq!(txn.count("docs").await.unwrap(), 2);
        assert_eq!(txn.get("docs", "b").await.unwrap(), Some(json!({"_id": "b", "n": 1})));

        // The committed map is untouched by the working copy.
        assert_eq!(committed.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_hands_change_log_to_sink() {
        let (txn, sink) = transaction(
            TransactionMode::ReadWrite,
            snapshot(&[("a", json!({"_id": "a"})), ("b", json!({"_id": "b"}))]),
        );
        txn.put("docs", json!({"_id": "a", "v": 2})).await.unwrap();
        assert!(txn.delete("docs", "b").await.unwrap());
        assert!(!txn.delete("docs", "missing").await.unwrap());
        txn.commit().await.unwrap();

        let applied = sink.applied.lock().await;
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].store, "docs");
        assert_eq!(applied[0].writes.get("a"), Some(&Some(json!({"_id": "a", "v": 2}))));
        assert_eq!(applied[0].writes.get("b"), Some(&None));
        assert!(!applied[0].writes.contains_key("missing"));
    }

    #[tokio::test]
    async fn test_abort_applies_nothing() {
        let (txn, sink) = transaction(TransactionMode::ReadWrite, snapshot(&[]));
        txn.add("docs", json!({"_id": "x"})).await.unwrap();
        txn.abort().await.unwrap();
        assert!(sink.applied.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_duplicate_is_constraint_error() {
        let (txn, _sink) = transaction(
            TransactionMode::ReadWrite,
            snapshot(&[("a", json!({"_id": "a"}))]),
        );
        assert!(matches!(
            txn.add("docs", json!({"_id": "a"})).await,
            Err(EngineError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let (txn, _sink) = transaction(TransactionMode::ReadOnly, snapshot(&[]));
        assert!(matches!(
            txn.add("docs", json!({"_id": "a"})).await,
            Err(EngineError::ReadOnly(_))
        ));
        assert!(matches!(
            txn.delete("docs", "a").await,
            Err(EngineError::ReadOnly(_))
        ));
        // Reads still work.
        assert_eq!(txn.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_out_of_scope_store_is_not_found() {
        let (txn, _sink) = transaction(TransactionMode::ReadWrite, snapshot(&[]));
        assert!(matches!(
            txn.get("other", "a").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            txn.open_cursor("other").await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cursor_walks_in_key_order_and_reports_exhaustion() {
        let (txn, _sink) = transaction(
            TransactionMode::ReadOnly,
            snapshot(&[
                ("c", json!({"_id": "c"})),
                ("a", json!({"_id": "a"})),
                ("b", json!({"_id": "b"})),
            ]),
        );
        let mut cursor = txn.open_cursor("docs").await.unwrap();
        assert!(cursor.current().is_none());

        let mut keys = Vec::new();
        while let Some(record) = cursor.advance().await.unwrap() {
            assert_eq!(cursor.current().map(|r| r.key.as_str()), Some(record.key.as_str()));
            keys.push(record.key);
        }
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(cursor.is_exhausted());

        // Advancing past exhaustion is an error, not a silent no-op.
        assert!(matches!(
            cursor.advance().await,
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_cursor_update_and_delete() {
        let (txn, _sink) = transaction(
            TransactionMode::ReadWrite,
            snapshot(&[
                ("a", json!({"_id": "a", "n": 1})),
                ("b", json!({"_id": "b", "n": 2})),
                ("c", json!({"_id": "c", "n": 3})),
            ]),
        );
        let mut cursor = txn.open_cursor("docs").await.unwrap();

        // Update before the first advance has no position.
        assert!(matches!(
            cursor.update(json!({"_id": "a"})).await,
            Err(EngineError::InvalidState(_))
        ));

        cursor.advance().await.unwrap();
        cursor.update(json!({"_id": "a", "n": 10})).await.unwrap();
        assert_eq!(cursor.current().unwrap().value["n"], 10);

        // Changing the primary key through the cursor is rejected.
        assert!(matches!(
            cursor.update(json!({"_id": "z", "n": 10})).await,
            Err(EngineError::Data(_))
        ));

        cursor.advance().await.unwrap();
        cursor.delete().await.unwrap();
        assert!(cursor.current().is_none());
        assert!(matches!(cursor.delete().await, Err(EngineError::InvalidState(_))));

        // The scan continues after a deleted record.
        let next = cursor.advance().await.unwrap().unwrap();
        assert_eq!(next.key, "c");
        assert!(cursor.advance().await.unwrap().is_none());

        assert_eq!(txn.get("docs", "a").await.unwrap().unwrap()["n"], 10);
        assert_eq!(txn.get("docs", "b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_finished_transaction_rejects_requests() {
        let (txn, _sink) = transaction(
            TransactionMode::ReadWrite,
            snapshot(&[("a", json!({"_id": "a"}))]),
        );
        let mut cursor = txn.open_cursor("docs").await.unwrap();
        txn.commit().await.unwrap();
        assert!(matches!(
            cursor.advance().await,
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_value_limit_applies_to_writes() {
        let sink = Arc::new(RecordingSink::default());
        let txn = SnapshotTransaction::new(
            "db",
            TransactionMode::ReadWrite,
            EngineLimits {
                max_value_bytes: Some(32),
                ..Default::default()
            },
            vec![snapshot(&[])],
            sink,
            None,
        );
        txn.add("docs", json!({"_id": "a"})).await.unwrap();
        assert!(matches!(
            txn.put("docs", json!({"_id": "a", "pad": "x".repeat(64)})).await,
            Err(EngineError::ValueTooLarge { max: 32, .. })
        ));
    }

    #[test]
    fn test_store_writes_apply_to() {
        let mut records: RecordMap = [("a".to_string(), json!(1)), ("b".to_string(), json!(2))]
            .into_iter()
            .collect();
        let writes = StoreWrites {
            store: "s".to_string(),
            writes: [("a".to_string(), None), ("c".to_string(), Some(json!(3)))]
                .into_iter()
                .collect(),
        };
        writes.apply_to(&mut records);
        assert_eq!(records.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }
}
