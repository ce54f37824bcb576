// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-Memory Storage Engine
//
// Keeps every database in process memory. Committed records live in
// `Arc<BTreeMap>` per object store, so a transaction snapshot is a reference
// count bump and the first write clones. Intended for tests and for
// embedding where persistence is not needed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{Connection, StorageEngine, TransactionMode, UpgradeHook};
use crate::config::EngineLimits;
use crate::error::EngineError;
use crate::schema::{DatabaseSchema, SchemaChange, VersionChange};
use crate::snapshot::{CommitSink, RecordMap, SnapshotStore, SnapshotTransaction, StoreWrites};
use crate::tracker::ConnectionTracker;

/// Transaction type of the in-memory engine.
pub type MemoryTransaction = SnapshotTransaction<MemoryDatabase>;

/// In-memory engine. Clones share the same databases.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    databases: Arc<Mutex<HashMap<String, Arc<MemoryDatabase>>>>,
    limits: EngineLimits,
}

impl MemoryEngine {
    /// Create an empty engine with no limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty engine enforcing `limits`.
    pub fn with_limits(limits: EngineLimits) -> Self {
        Self {
            databases: Arc::default(),
            limits,
        }
    }

    /// Limits this engine enforces.
    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// Number of connections currently open on `name`.
    pub async fn open_connections(&self, name: &str) -> usize {
        match self.databases.lock().await.get(name) {
            Some(database) => database.connections.open(),
            None => 0,
        }
    }

    async fn database(&self, name: &str) -> Arc<MemoryDatabase> {
        let mut databases = self.databases.lock().await;
        Arc::clone(
            databases
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryDatabase::new(name))),
        )
    }
}

/// One in-memory database: schema, records and connection bookkeeping.
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    state: Mutex<DatabaseState>,
    writer: Arc<Mutex<()>>,
    connections: ConnectionTracker,
}

#[derive(Debug, Default)]
struct DatabaseState {
    schema: DatabaseSchema,
    records: BTreeMap<String, Arc<RecordMap>>,
}

impl DatabaseState {
    fn apply(&mut self, change: VersionChange) {
        let (schema, changes) = change.into_parts();
        for change in changes {
            match change {
                SchemaChange::CreateStore(store) => {
                    self.records.insert(store.name, Arc::default());
                }
                SchemaChange::DeleteStore(name) => {
                    self.records.remove(&name);
                }
            }
        }
        self.schema = schema;
    }
}

impl MemoryDatabase {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(DatabaseState::default()),
            writer: Arc::new(Mutex::new(())),
            connections: ConnectionTracker::new(),
        }
    }
}

#[async_trait]
impl CommitSink for MemoryDatabase {
    async fn apply(&self, _database: &str, writes: Vec<StoreWrites>) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if let Some(missing) = writes.iter().find(|w| !state.records.contains_key(&w.store)) {
            return Err(EngineError::NotFound(format!(
                "object store '{}' was deleted before commit",
                missing.store
            )));
        }

        for batch in writes {
            if let Some(records) = state.records.get_mut(&batch.store) {
                batch.apply_to(Arc::make_mut(records));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    type Connection = MemoryConnection;

    async fn open(
        &self,
        name: &str,
        version: Option<u64>,
        upgrade: Option<&UpgradeHook<'_>>,
    ) -> Result<MemoryConnection, EngineError> {
        if version == Some(0) {
            return Err(EngineError::InvalidAccess(
                "version must be greater than zero".to_string(),
            ));
        }
        let database = self.database(name).await;

        loop {
            let mut state = database.state.lock().await;
            let current = state.schema.version;
            let target = version.unwrap_or_else(|| current.max(1));
            if target < current {
                return Err(EngineError::VersionError {
                    requested: target,
                    current,
                });
            }

            if target > current {
                let open = database.connections.open();
                if open > 0 {
                    drop(state);
                    debug!(database = name, version = target, open, "upgrade waiting for connections to close");
                    database
                        .connections
                        .wait_idle(self.limits.blocked_timeout(), target)
                        .await?;
                    continue;
                }

                let mut change = VersionChange::new(&state.schema, target);
                if let Some(hook) = upgrade {
                    if let Err(err) = hook(&mut change) {
                        warn!(database = name, version = target, error = %err, "upgrade hook failed");
                        return Err(err);
                    }
                }
                state.apply(change);
                info!(database = name, from = current, to = target, "database upgraded");
            }

            database.connections.acquire();
            return Ok(MemoryConnection {
                database: Arc::clone(&database),
                schema: state.schema.clone(),
                limits: self.limits.clone(),
            });
        }
    }

    async fn database_names(&self) -> Result<Vec<String>, EngineError> {
        let databases: Vec<Arc<MemoryDatabase>> =
            self.databases.lock().await.values().cloned().collect();
        let mut names = Vec::new();
        for database in databases {
            if database.state.lock().await.schema.version > 0 {
                names.push(database.name.clone());
            }
        }
        names.sort();
        Ok(names)
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Connection to a [`MemoryDatabase`]. Dropping it releases the connection.
#[derive(Debug)]
pub struct MemoryConnection {
    database: Arc<MemoryDatabase>,
    schema: DatabaseSchema,
    limits: EngineLimits,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.database.connections.release();
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    type Transaction = MemoryTransaction;

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
    ) -> Result<MemoryTransaction, EngineError> {
        if scope.is_empty() {
            return Err(EngineError::InvalidAccess(
                "transaction scope must name at least one object store".to_string(),
            ));
        }
        if let Some(missing) = scope.iter().find(|store| !self.schema.contains(store)) {
            return Err(EngineError::NotFound(format!("object store '{missing}'")));
        }

        let writer = match mode {
            TransactionMode::ReadWrite => Some(Arc::clone(&self.database.writer).lock_owned().await),
            TransactionMode::ReadOnly => None,
        };

        let state = self.database.state.lock().await;
        let mut stores = Vec::with_capacity(scope.len());
        for name in scope {
            let (Some(schema), Some(records)) =
                (state.schema.stores.get(*name), state.records.get(*name))
            else {
                return Err(EngineError::NotFound(format!("object store '{name}'")));
            };
            stores.push(SnapshotStore {
                schema: schema.clone(),
                records: Arc::clone(records),
            });
        }
        drop(state);

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
