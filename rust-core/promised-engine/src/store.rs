// SPDX-License-Identifier: PMPL-1.0-or-later
//! Single-store view of a transaction.

use serde_json::Value;

use crate::backend::Transaction;
use crate::error::EngineError;

/// A transaction bound to one object store.
///
/// Saves repeating the store name on every request; obtained through
/// [`Transaction::object_store`].
pub struct ObjectStore<'t, T: Transaction> {
    transaction: &'t T,
    name: &'t str,
}

impl<'t, T: Transaction> ObjectStore<'t, T> {
    /// Bind `transaction` to the store `name`.
    pub fn new(transaction: &'t T, name: &'t str) -> Self {
        Self { transaction, name }
    }

    /// Name of the bound store.
    pub fn name(&self) -> &str {
        self.name
    }

    /// See [`Transaction::open_cursor`].
    pub async fn open_cursor(&self) -> Result<T::Cursor, EngineError> {
        self.transaction.open_cursor(self.name).await
    }

    /// See [`Transaction::get`].
    pub async fn get(&self, key: &str) -> Result<Option<Value>, EngineError> {
        self.transaction.get(self.name, key).await
    }

    /// See [`Transaction::add`].
    pub async fn add(&self, value: Value) -> Result<String, EngineError> {
        self.transaction.add(self.name, value).await
    }

    /// See [`Transaction::put`].
    pub async fn put(&self, value: Value) -> Result<String, EngineError> {
        self.transaction.put(self.name, value).await
    }

    /// See [`Transaction::delete`].
    pub async fn delete(&self, key: &str) -> Result<bool, EngineError> {
        self.transaction.delete(self.name, key).await
    }

    /// See [`Transaction::count`].
    pub async fn count(&self) -> Result<usize, EngineError> {
        self.transaction.count(self.name).await
    }
}
