// SPDX-License-Identifier: PMPL-1.0-or-later
//! Collection provisioning.

use promised_engine::{Connection, EngineError, StorageEngine, VersionChange};
use tracing::{debug, info};

use crate::config::ProvisioningMode;
use crate::database::PromisedDb;
use crate::document::ID_FIELD;
use crate::error::{Result, StoreError};

impl<E: StorageEngine> PromisedDb<E> {
    /// Ensure every collection in `collections` exists, keyed by `_id`.
    ///
    /// Idempotent. Returns an open connection that already sees the new
    /// collections; the caller must close it. Under
    /// [`ProvisioningMode::UpgradeIfMissing`] no upgrade happens when every
    /// collection is present. Concurrent calls through the same handle are
    /// serialized.
    pub async fn create_collections(&self, collections: &[&str]) -> Result<E::Connection> {
        if collections.iter().any(|name| name.is_empty()) {
            return Err(StoreError::InvalidInput(
                "collection names must not be empty".to_string(),
            ));
        }

        let _schema = self.schema_lock.lock().await;
        if self.config.provisioning == ProvisioningMode::UpgradeIfMissing {
            let connection = self.engine.open(self.name(), None, None).await?;
            if collections.iter().all(|name| connection.contains(name)) {
                debug!(database = %self.name(), ?collections, "collections already present");
                return Ok(connection);
            }
            connection.close().await?;
        }

        let wanted: Vec<String> = collections.iter().map(|name| name.to_string()).collect();
        let hook = move |change: &mut VersionChange| -> std::result::Result<(), EngineError> {
            for name in &wanted {
                if !change.contains(name) {
                    change.create_object_store(name, ID_FIELD)?;
                }
            }
            Ok(())
        };
        let connection = self.upgrade(&hook).await?;
        info!(
            database = %self.name(),
            ?collections,
            version = connection.version(),
            "collections provisioned"
        );
        Ok(connection)
    }

    /// Not supported; fails immediately.
    pub async fn drop_collection(&self, collection: &str) -> Result<()> {
        debug!(database = %self.name(), collection, "drop_collection requested");
        Err(StoreError::Unsupported("drop_collection"))
    }
}
