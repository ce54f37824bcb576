// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connection lifecycle: opening at the right version, running upgrade hooks,
// and releasing connections on every path.

use std::sync::atomic::{AtomicBool, Ordering};

use promised_engine::{Connection, EngineError, StorageEngine, UpgradeHook, VersionChange};
use tracing::debug;

use crate::database::PromisedDb;
use crate::error::Result;

/// Close `connection`, then hand back `result`.
///
/// The operation's own error wins over a failure to close.
pub(crate) async fn release<C: Connection, T>(connection: C, result: Result<T>) -> Result<T> {
    let closed = connection.close().await;
    let value = result?;
    closed?;
    Ok(value)
}

impl<E: StorageEngine> PromisedDb<E> {
    /// Open a connection to the database.
    ///
    /// Without a hook the database opens at its stored version (created at
    /// version 1 if absent). With a hook the version is bumped by one and the
    /// hook runs during the upgrade; if it fails the open fails and no schema
    /// change is applied. The caller must close the returned connection.
    pub async fn open(&self, upgrade: Option<&UpgradeHook<'_>>) -> Result<E::Connection> {
        match upgrade {
            None => Ok(self.engine.open(self.name(), None, None).await?),
            Some(hook) => {
                let _schema = self.schema_lock.lock().await;
                self.upgrade(hook).await
            }
        }
    }

    /// Open at the next version with `hook`. Callers hold `schema_lock`.
    ///
    /// The lock only covers this handle. If another handle sharing the
    /// engine reaches the target version first, the engine opens without
    /// running `hook`; the attempt is then released and retried against the
    /// newly stored version until `hook` runs.
    pub(crate) async fn upgrade(&self, hook: &UpgradeHook<'_>) -> Result<E::Connection> {
        loop {
            let current = self.current_version().await?;
            let ran = AtomicBool::new(false);
            let tracked = |change: &mut VersionChange| -> std::result::Result<(), EngineError> {
                ran.store(true, Ordering::SeqCst);
                hook(change)
            };
            let tracked: &UpgradeHook<'_> = &tracked;

            debug!(database = %self.name(), from = current, to = current + 1, "requesting schema upgrade");
            let connection = match self.engine.open(self.name(), Some(current + 1), Some(tracked)).await {
                Ok(connection) => connection,
                Err(EngineError::VersionError { requested, current: stored }) => {
                    debug!(database = %self.name(), requested, stored, "version moved on, retrying upgrade");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if ran.load(Ordering::SeqCst) {
                return Ok(connection);
            }

            debug!(
                database = %self.name(),
                version = connection.version(),
                "another handle upgraded first, retrying"
            );
            connection.close().await?;
        }
    }

    /// The stored database version, creating the database if needed.
    pub async fn current_version(&self) -> Result<u64> {
        let connection = self.engine.open(self.name(), None, None).await?;
        let version = connection.version();
        release(connection, Ok(version)).await
    }

    /// Whether `collection` exists.
    pub async fn is_collection(&self, collection: &str) -> Result<bool> {
        let connection = self.open(None).await?;
        let exists = connection.contains(collection);
        release(connection, Ok(exists)).await
    }

    /// Names of every collection, in name order.
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        let connection = self.open(None).await?;
        let names = connection.object_store_names();
        release(connection, Ok(names)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use promised_engine::MemoryEngine;

    #[tokio::test]
    async fn test_current_version_creates_database() {
        let engine = MemoryEngine::new();
        let db = PromisedDb::new(engine.clone(), "fresh");
        assert_eq!(db.current_version().await.unwrap(), 1);
        assert_eq!(engine.open_connections("fresh").await, 0);
    }

    #[tokio::test]
    async fn test_open_with_hook_bumps_version() {
        let engine = MemoryEngine::new();
        let db = PromisedDb::new(engine.clone(), "db");
        let hook = |change: &mut VersionChange| change.create_object_store("notes", "_id").map(|_| ());

        let connection = db.open(Some(&hook)).await.unwrap();
        assert_eq!(connection.version(), 2);
        assert!(connection.contains("notes"));
        connection.close().await.unwrap();

        assert!(db.is_collection("notes").await.unwrap());
        assert!(!db.is_collection("other").await.unwrap());
        assert_eq!(db.collection_names().await.unwrap(), vec!["notes".to_string()]);
        assert_eq!(engine.open_connections("db").await, 0);
    }

    #[tokio::test]
    async fn test_failing_hook_fails_open_without_schema_change() {
        let db = PromisedDb::new(MemoryEngine::new(), "db");
        let hook = |_: &mut VersionChange| -> std::result::Result<(), EngineError> {
            Err(EngineError::InvalidState("refused".into()))
        };
        assert!(matches!(
            db.open(Some(&hook)).await,
            Err(StoreError::Engine(EngineError::InvalidState(_)))
        ));
        assert_eq!(db.current_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_release_prefers_operation_error() {
        let engine = MemoryEngine::new();
        let connection = engine.open("db", None, None).await.unwrap();
        let result: Result<()> = release(connection, Err(StoreError::InvalidInput("bad".into()))).await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
        assert_eq!(engine.open_connections("db").await, 0);
    }
}
