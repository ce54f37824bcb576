// SPDX-License-Identifier: PMPL-1.0-or-later
//! The document store handle.

use std::fmt;
use std::sync::Arc;

use promised_engine::StorageEngine;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::StoreConfig;
use crate::id::{IdGenerator, UuidGenerator};

/// Whether an operation targets the first selected document or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    /// Only the first selected document.
    One,
    /// Every selected document.
    Many,
}

impl Multiplicity {
    /// `true` for [`Multiplicity::Many`].
    pub fn is_many(self) -> bool {
        self == Self::Many
    }
}

impl From<bool> for Multiplicity {
    fn from(many: bool) -> Self {
        if many {
            Self::Many
        } else {
            Self::One
        }
    }
}

/// A Mongo-style document store over a versioned object-store engine.
///
/// Every public operation opens its own connection and releases it before
/// returning, on success and on error. Collections are object stores keyed
/// by `_id`; they are created on demand by the first write.
///
/// # Example
///
/// ```rust
/// use promised_engine::MemoryEngine;
/// use promised_store::PromisedDb;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let db = PromisedDb::new(MemoryEngine::new(), "sample");
/// db.create_one("people", json!({"name": "Ada"})).await.unwrap();
///
/// let ada = db
///     .find_one("people", json!({"name": "Ada"}).as_object().unwrap())
///     .await
///     .unwrap()
///     .unwrap();
/// assert!(ada["_id"].as_str().is_some_and(|id| !id.is_empty()));
/// # });
/// ```
pub struct PromisedDb<E: StorageEngine> {
    pub(crate) engine: E,
    pub(crate) config: StoreConfig,
    pub(crate) ids: Arc<dyn IdGenerator>,
    /// Serializes schema upgrades issued through this handle.
    pub(crate) schema_lock: Mutex<()>,
}

impl<E: StorageEngine> PromisedDb<E> {
    /// Store over database `name` with default configuration.
    pub fn new(engine: E, name: impl Into<String>) -> Self {
        Self::with_config(engine, StoreConfig::named(name))
    }

    /// Store configured by `config`.
    pub fn with_config(engine: E, config: StoreConfig) -> Self {
        Self {
            engine,
            config,
            ids: Arc::new(UuidGenerator),
            schema_lock: Mutex::new(()),
        }
    }

    /// Replace the identifier generator used for documents without an `_id`.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: StorageEngine> fmt::Debug for PromisedDb<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromisedDb")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish()
    }
}
