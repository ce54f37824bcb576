// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Database schema and the version-change handle.
//
// A database schema is its version plus the set of object stores it owns.
// Object stores can only be created or deleted while a version change is in
// progress; the engine hands an upgrade hook a `VersionChange` that records
// the requested changes, and applies them only if the hook succeeds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// Definition of a single object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    /// Store name, unique within its database.
    pub name: String,
    /// Top-level attribute holding each record's primary key.
    pub key_path: String,
}

impl StoreSchema {
    /// Create a store definition.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
        }
    }

    /// Extract the primary key of `value` through this store's key path.
    ///
    /// The value must be an object carrying a string at the key path.
    pub fn key_of(&self, value: &Value) -> Result<String, EngineError> {
        match value.get(&self.key_path) {
            Some(Value::String(key)) => Ok(key.clone()),
            Some(other) => Err(EngineError::Data(format!(
                "key path '{}' of store '{}' yielded a non-string key: {}",
                self.key_path, self.name, other
            ))),
            None => Err(EngineError::Data(format!(
                "value has no '{}' attribute for store '{}'",
                self.key_path, self.name
            ))),
        }
    }
}

/// Persisted schema of one database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Current version; `0` means the database has never been opened.
    pub version: u64,
    /// Object stores keyed by name.
    pub stores: BTreeMap<String, StoreSchema>,
}

impl DatabaseSchema {
    /// Names of all object stores, in name order.
    pub fn store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    /// Whether an object store named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }
}

/// A structural change requested during a version change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    /// Create a new, empty object store.
    CreateStore(StoreSchema),
    /// Delete an object store and all of its records.
    DeleteStore(String),
}

/// Mutable schema handle passed to an upgrade hook.
///
/// Changes are staged: the engine applies them after the hook returns `Ok`,
/// and discards them if the hook returns an error.
#[derive(Debug, Clone)]
pub struct VersionChange {
    old_version: u64,
    new_version: u64,
    stores: BTreeMap<String, StoreSchema>,
    changes: Vec<SchemaChange>,
}

impl VersionChange {
    /// Start a version change from `schema` to `new_version`.
    pub fn new(schema: &DatabaseSchema, new_version: u64) -> Self {
        Self {
            old_version: schema.version,
            new_version,
            stores: schema.stores.clone(),
            changes: Vec::new(),
        }
    }

    /// Version stored before this change.
    pub fn old_version(&self) -> u64 {
        self.old_version
    }

    /// Version the database will have once the change is applied.
    pub fn new_version(&self) -> u64 {
        self.new_version
    }

    /// Object store names as they stand with the staged changes applied.
    pub fn object_store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    /// Whether `name` exists with the staged changes applied.
    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Stage creation of an object store keyed by `key_path`.
    pub fn create_object_store(
        &mut self,
        name: &str,
        key_path: &str,
    ) -> Result<&StoreSchema, EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidAccess(
                "object store name must not be empty".to_string(),
            ));
        }
        if key_path.is_empty() {
            return Err(EngineError::InvalidAccess(format!(
                "object store '{name}' needs a non-empty key path"
            )));
        }
        if self.stores.contains_key(name) {
            return Err(EngineError::Constraint(format!(
                "object store '{name}' already exists"
            )));
        }

        let schema = StoreSchema::new(name, key_path);
        self.changes.push(SchemaChange::CreateStore(schema.clone()));
        Ok(self.stores.entry(name.to_string()).or_insert(schema))
    }

    /// Stage deletion of an object store.
    pub fn delete_object_store(&mut self, name: &str) -> Result<(), EngineError> {
        if self.stores.remove(name).is_none() {
            return Err(EngineError::NotFound(format!("object store '{name}'")));
        }
        self.changes.push(SchemaChange::DeleteStore(name.to_string()));
        Ok(())
    }

    /// Changes staged so far, in the order they were requested.
    pub fn changes(&self) -> &[SchemaChange] {
        &self.changes
    }

    /// Consume the handle, yielding the resulting schema and the change log.
    pub fn into_parts(self) -> (DatabaseSchema, Vec<SchemaChange>) {
        let schema = DatabaseSchema {
            version: self.new_version,
            stores: self.stores,
        };
        (schema, self.changes)
    }
}
