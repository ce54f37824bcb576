// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// redb-backed persistent engine for PromisedDB.
//
// One redb file holds every database the engine serves.
//
// # Layout
//
// - `promised_meta` maps a database name to its JSON-encoded schema
//   (version plus object store definitions).
// - Each object store is a table named `<database>/<store>` mapping the
//   primary key to the JSON-encoded record.
//
// A transaction snapshots its scope inside one redb read transaction, then
// runs on the shared copy-on-write core. Beginning a transaction decodes every
// record of every store in its scope, so its cost grows with the size of the
// scoped stores, not with what the transaction touches. Commit replays the change log inside
// one redb write transaction, so it is atomic across stores. All redb work
// runs under `spawn_blocking`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{Connection, StorageEngine, TransactionMode, UpgradeHook};
use crate::config::EngineLimits;
use crate::error::EngineError;
use crate::schema::{DatabaseSchema, SchemaChange, StoreSchema, VersionChange};
use crate::snapshot::{CommitSink, RecordMap, SnapshotStore, SnapshotTransaction, StoreWrites};
use crate::tracker::ConnectionTracker;

/// Database name -> JSON-encoded [`DatabaseSchema`].
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("promised_meta");

/// Transaction type of the redb engine.
pub type RedbTransaction = SnapshotTransaction<RedbDatabase>;

fn records_table(database: &str, store: &str) -> String {
    format!("{database}/{store}")
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::BackendUnavailable(format!("{context}: {err}"))
}

fn corrupted(context: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::CorruptedData(format!("{context}: {err}"))
}

async fn blocking<T, F>(work: F) -> Result<T, EngineError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| unavailable("task join", e))?
}

fn load_schema(db: &Database, name: &str) -> Result<DatabaseSchema, EngineError> {
    let txn = db.begin_read().map_err(|e| unavailable("read txn", e))?;
    let table = match txn.open_table(META_TABLE) {
        Ok(t) => t,
        // Nothing has been written yet
        Err(TableError::TableDoesNotExist(_)) => return Ok(DatabaseSchema::default()),
        Err(e) => return Err(corrupted("open meta", e)),
    };
    let schema = match table.get(name).map_err(|e| corrupted("meta get", e))? {
        Some(bytes) => serde_json::from_slice(bytes.value())
            .map_err(|e| corrupted(&format!("schema of '{name}'"), e))?,
        None => DatabaseSchema::default(),
    };
    Ok(schema)
}

fn save_schema(
    db: &Database,
    name: &str,
    schema: &DatabaseSchema,
    changes: &[SchemaChange],
) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec(schema).map_err(|e| EngineError::SerializationError(e.to_string()))?;
    let txn = db.begin_write().map_err(|e| unavailable("write txn", e))?;
    for change in changes {
        match change {
            SchemaChange::CreateStore(store) => {
                let table = records_table(name, &store.name);
                txn.open_table(TableDefinition::<&str, &[u8]>::new(&table))
                    .map_err(|e| unavailable("create table", e))?;
            }
            SchemaChange::DeleteStore(store) => {
                let table = records_table(name, store);
                txn.delete_table(TableDefinition::<&str, &[u8]>::new(&table))
                    .map_err(|e| unavailable("delete table", e))?;
            }
        }
    }
    {
        let mut meta = txn
            .open_table(META_TABLE)
            .map_err(|e| unavailable("open meta", e))?;
        meta.insert(name, bytes.as_slice())
            .map_err(|e| corrupted("meta insert", e))?;
    }
    txn.commit().map_err(|e| corrupted("schema commit", e))?;
    Ok(())
}

/// Decode the full contents of each scoped store into a snapshot.
///
/// Every store is read from the same redb read transaction, so the snapshot
/// is consistent across the scope.
fn read_stores(
    db: &Database,
    database: &str,
    schemas: Vec<StoreSchema>,
) -> Result<Vec<SnapshotStore>, EngineError> {
    let txn = db.begin_read().map_err(|e| unavailable("read txn", e))?;
    let mut stores = Vec::with_capacity(schemas.len());
    for schema in schemas {
        let name = records_table(database, &schema.name);
        let mut records = RecordMap::new();
        match txn.open_table(TableDefinition::<&str, &[u8]>::new(&name)) {
            Ok(table) => {
                for entry in table.iter().map_err(|e| corrupted("scan", e))? {
                    let (key, value) = entry.map_err(|e| corrupted("scan entry", e))?;
                    let value: Value = serde_json::from_slice(value.value())
                        .map_err(|e| corrupted(&format!("record in '{name}'"), e))?;
                    records.insert(key.value().to_string(), value);
                }
            }
            // A store created but never written may have no table yet.
            Err(TableError::TableDoesNotExist(_)) => {}
            Err(e) => return Err(corrupted(&format!("open '{name}'"), e)),
        }
        stores.push(SnapshotStore {
            schema,
            records: Arc::new(records),
        });
    }
    Ok(stores)
}

/// A persistent engine powered by redb.
///
/// Clones share the same file and connection bookkeeping.
///
/// # Example
///
/// ```rust,no_run
/// use promised_engine::backend::StorageEngine;
/// use promised_engine::redb_backend::RedbEngine;
///
/// # tokio_test::block_on(async {
/// let engine = RedbEngine::create("/tmp/promised-test.redb").unwrap();
/// let conn = engine.open("promised", None, None).await.unwrap();
/// # });
/// ```
#[derive(Clone)]
pub struct RedbEngine {
    db: Arc<Database>,
    path: PathBuf,
    handles: Arc<Mutex<HashMap<String, Arc<RedbDatabase>>>>,
    limits: EngineLimits,
}

impl RedbEngine {
    /// Open or create the redb file at `path`.
    ///
    /// Creates parent directories if they don't exist.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path).map_err(|e| {
            EngineError::BackendUnavailable(format!("failed to open redb at {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "opened redb engine");

        Ok(Self {
            db: Arc::new(db),
            path,
            handles: Arc::default(),
            limits: EngineLimits::default(),
        })
    }

    /// Enforce `limits` on every connection opened from now on.
    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Filesystem path of the redb file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn handle(&self, name: &str) -> Arc<RedbDatabase> {
        let mut handles = self.handles.lock().await;
        Arc::clone(handles.entry(name.to_string()).or_insert_with(|| {
            Arc::new(RedbDatabase {
                name: name.to_string(),
                db: Arc::clone(&self.db),
                open_lock: Mutex::new(()),
                writer: Arc::new(Mutex::new(())),
                connections: ConnectionTracker::new(),
            })
        }))
    }
}

impl std::fmt::Debug for RedbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbEngine")
            .field("path", &self.path)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Per-database coordination state of a [`RedbEngine`].
pub struct RedbDatabase {
    name: String,
    db: Arc<Database>,
    open_lock: Mutex<()>,
    writer: Arc<Mutex<()>>,
    connections: ConnectionTracker,
}

#[async_trait]
impl CommitSink for RedbDatabase {
    async fn apply(&self, database: &str, writes: Vec<StoreWrites>) -> Result<(), EngineError> {
        let db = Arc::clone(&self.db);
        let database = database.to_string();

        blocking(move || {
            let txn = db.begin_write().map_err(|e| unavailable("write txn", e))?;
            {
                let meta = txn
                    .open_table(META_TABLE)
                    .map_err(|e| unavailable("open meta", e))?;
                let schema: DatabaseSchema = match meta
                    .get(database.as_str())
                    .map_err(|e| corrupted("meta get", e))?
                {
                    Some(bytes) => serde_json::from_slice(bytes.value())
                        .map_err(|e| corrupted("schema", e))?,
                    None => DatabaseSchema::default(),
                };
                // Dropping `txn` on return aborts the write.
                if let Some(missing) = writes.iter().find(|w| !schema.contains(&w.store)) {
                    return Err(EngineError::NotFound(format!(
                        "object store '{}' was deleted before commit",
                        missing.store
                    )));
                }
            }

            for batch in writes {
                let name = records_table(&database, &batch.store);
                let mut table = txn
                    .open_table(TableDefinition::<&str, &[u8]>::new(&name))
                    .map_err(|e| unavailable("open table", e))?;
                for (key, value) in batch.writes {
                    match value {
                        Some(value) => {
                            let bytes = serde_json::to_vec(&value)
                                .map_err(|e| EngineError::SerializationError(e.to_string()))?;
                            table
                                .insert(key.as_str(), bytes.as_slice())
                                .map_err(|e| corrupted("insert", e))?;
                        }
                        None => {
                            table
                                .remove(key.as_str())
                                .map_err(|e| corrupted("remove", e))?;
                        }
                    }
                }
            }
            txn.commit().map_err(|e| corrupted("commit", e))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl StorageEngine for RedbEngine {
    type Connection = RedbConnection;

    async fn open(
        &self,
        name: &str,
        version: Option<u64>,
        upgrade: Option<&UpgradeHook<'_>>,
    ) -> Result<RedbConnection, EngineError> {
        if version == Some(0) {
            return Err(EngineError::InvalidAccess(
                "version must be greater than zero".to_string(),
            ));
        }
        let handle = self.handle(name).await;

        loop {
            let guard = handle.open_lock.lock().await;
            let schema = {
                let db = Arc::clone(&self.db);
                let name = name.to_string();
                blocking(move || load_schema(&db, &name)).await?
            };
            let current = schema.version;
            let target = version.unwrap_or_else(|| current.max(1));
            if target < current {
                return Err(EngineError::VersionError {
                    requested: target,
                    current,
                });
            }

            let schema = if target > current {
                let open = handle.connections.open();
                if open > 0 {
                    drop(guard);
                    debug!(database = name, version = target, open, "upgrade waiting for connections to close");
                    handle
                        .connections
                        .wait_idle(self.limits.blocked_timeout(), target)
                        .await?;
                    continue;
                }

                let mut change = VersionChange::new(&schema, target);
                if let Some(hook) = upgrade {
                    if let Err(err) = hook(&mut change) {
                        warn!(database = name, version = target, error = %err, "upgrade hook failed");
                        return Err(err);
                    }
                }
                let (next, changes) = change.into_parts();
                let db = Arc::clone(&self.db);
                let db_name = name.to_string();
                let persisted = next.clone();
                blocking(move || save_schema(&db, &db_name, &persisted, &changes)).await?;
                info!(database = name, from = current, to = target, "database upgraded");
                next
            } else {
                schema
            };

            handle.connections.acquire();
            drop(guard);
            return Ok(RedbConnection {
                database: handle,
                schema,
                limits: self.limits.clone(),
            });
        }
    }

    async fn database_names(&self) -> Result<Vec<String>, EngineError> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let txn = db.begin_read().map_err(|e| unavailable("read txn", e))?;
            let table = match txn.open_table(META_TABLE) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(corrupted("open meta", e)),
            };
            let mut names = Vec::new();
            for entry in table.iter().map_err(|e| corrupted("meta scan", e))? {
                let (key, value) = entry.map_err(|e| corrupted("meta entry", e))?;
                let schema: DatabaseSchema = serde_json::from_slice(value.value())
                    .map_err(|e| corrupted("schema", e))?;
                if schema.version > 0 {
                    names.push(key.value().to_string());
                }
            }
            Ok(names)
        })
        .await
    }

    fn name(&self) -> &str {
        "redb"
    }
}

/// Connection to a database in a [`RedbEngine`].
pub struct RedbConnection {
    database: Arc<RedbDatabase>,
    schema: DatabaseSchema,
    limits: EngineLimits,
}

impl std::fmt::Debug for RedbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbConnection")
            .field("database", &self.database.name)
            .field("version", &self.schema.version)
            .finish()
    }
}

impl Drop for RedbConnection {
    fn drop(&mut self) {
        self.database.connections.release();
    }
}

#[async_trait]
impl Connection for RedbConnection {
    type Transaction = RedbTransaction;

    fn database(&self) -> &str {
        &self.database.name
    }

    fn version(&self) -> u64 {
        self.schema.version
    }

    fn object_store_names(&self) -> Vec<String> {
        self.schema.store_names()
    }

    fn contains(&self, store: &str) -> bool {
        self.schema.contains(store)
    }

    async fn transaction(
        &self,
        scope: &[&str],
        mode: TransactionMode,
    ) -> Result<RedbTransaction, EngineError> {
        if scope.is_empty() {
            return Err(EngineError::InvalidAccess(
                "transaction scope must name at least one object store".to_string(),
            ));
        }
        let mut schemas = Vec::with_capacity(scope.len());
        for name in scope {
            match self.schema.stores.get(*name) {
                Some(schema) => schemas.push(schema.clone()),
                None => return Err(EngineError::NotFound(format!("object store '{name}'"))),
            }
        }

        let writer = match mode {
            TransactionMode::ReadWrite => Some(Arc::clone(&self.database.writer).lock_owned().await),
            TransactionMode::ReadOnly => None,
        };

        let db = Arc::clone(&self.database.db);
        let database = self.database.name.clone();
        let stores = blocking(move || read_stores(&db, &database, schemas)).await?;

        debug!(database = %self.database.name, mode = %mode, scope = ?scope, "transaction started");
        Ok(SnapshotTransaction::new(
            &self.database.name,
            mode,
            self.limits.clone(),
            stores,
            Arc::clone(&self.database),
            writer,
        ))
    }

    async fn close(self) -> Result<(), EngineError> {
        debug!(database = %self.database.name, version = self.schema.version, "connection closed");
        Ok(())
    }
}
