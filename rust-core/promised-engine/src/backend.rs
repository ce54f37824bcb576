// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core engine traits for PromisedDB.
//
// An engine owns named, versioned databases. A database is reached through a
// `Connection`; all record access goes through a `Transaction` scoped to one
// or more object stores, and scans go through a forward-only `Cursor`.
// Schema changes happen only while a connection is being opened at a higher
// version, inside the upgrade hook.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::schema::VersionChange;
use crate::store::ObjectStore;

/// Hook run during the upgrade phase of a version-increasing open.
///
/// Returning an error aborts the open; none of the staged changes are
/// applied and the stored version stays where it was.
pub type UpgradeHook<'a> = dyn Fn(&mut VersionChange) -> Result<(), EngineError> + Send + Sync + 'a;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionMode {
    /// Reads only; observes a consistent snapshot.
    ReadOnly,
    /// Reads and writes; serialized with other read-write transactions.
    ReadWrite,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("read-only"),
            Self::ReadWrite => f.write_str("read-write"),
        }
    }
}

/// A stored record as seen by a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Primary key, extracted through the store's key path.
    pub key: String,
    /// The stored value.
    pub value: Value,
}

/// A pluggable, versioned object-store engine.
///
/// Implementations must be safe to share across threads and tokio tasks.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Connection type handed out by [`StorageEngine::open`].
    type Connection: Connection;

    /// Open the database `name`.
    ///
    /// With `version: None` the database opens at its stored version; a
    /// database that does not exist yet is created at version 1. When the
    /// requested version exceeds the stored one the engine waits until every
    /// other connection to the database is closed, then runs `upgrade` (if
    /// any) against a [`VersionChange`] before the new version is recorded.
    /// Requesting a lower version fails with [`EngineError::VersionError`].
    async fn open(
        &self,
        name: &str,
        version: Option<u64>,
        upgrade: Option<&UpgradeHook<'_>>,
    ) -> Result<Self::Connection, EngineError>;

    /// Names of every database this engine knows about.
    async fn database_names(&self) -> Result<Vec<String>, EngineError>;

    /// A human-readable name for this engine, used in logging.
    fn name(&self) -> &str;
}

/// An open handle to one database at one version.
///
/// Dropping a connection releases it; [`Connection::close`] does the same
/// explicitly. A held connection blocks version upgrades of its database.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Transaction type handed out by [`Connection::transaction`].
    type Transaction: Transaction;

    /// Name of the database this connection is open on.
    fn database(&self) -> &str;

    /// Version the database had when this connection was opened.
    fn version(&self) -> u64;

    /// Object stores that existed when this connection was opened.
    fn object_store_names(&self) -> Vec<String>;

    /// Whether `store` existed when this connection was opened.
    fn contains(&self, store: &str) -> bool {
        self.object_store_names().iter().any(|name| name == store)
    }

    /// Begin a transaction over `scope` in `mode`.
    ///
    /// Fails with [`EngineError::NotFound`] if a store in `scope` does not
    /// exist and with [`EngineError::InvalidAccess`] if `scope` is empty.
    async fn transaction(
        &self,
        scope: &[&str],
        mode: TransactionMode,
    ) -> Result<Self::Transaction, EngineError>;

    /// Release the connection.
    async fn close(self) -> Result<(), EngineError>;
}

/// A unit of work over a fixed set of object stores.
///
/// Writes are private to the transaction until [`Transaction::commit`]
/// succeeds. A request that fails does not abort the transaction by itself;
/// the caller decides between committing the successful requests and
/// calling [`Transaction::abort`]. Dropping an unfinished transaction
/// discards its writes.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Cursor type handed out by [`Transaction::open_cursor`].
    type Cursor: Cursor;

    /// Mode this transaction was opened with.
    fn mode(&self) -> TransactionMode;

    /// Object stores this transaction may touch.
    fn scope(&self) -> &[String];

    /// Open a cursor positioned before the first record of `store`.
    async fn open_cursor(&self, store: &str) -> Result<Self::Cursor, EngineError>;

    /// Read the record stored under `key`.
    async fn get(&self, store: &str, key: &str) -> Result<Option<Value>, EngineError>;

    /// Insert `value`; fails with [`EngineError::Constraint`] if its key is
    /// already present. Returns the extracted key.
    async fn add(&self, store: &str, value: Value) -> Result<String, EngineError>;

    /// Insert or replace `value`. Returns the extracted key.
    async fn put(&self, store: &str, value: Value) -> Result<String, EngineError>;

    /// Remove the record under `key`. Returns `true` if it existed.
    async fn delete(&self, store: &str, key: &str) -> Result<bool, EngineError>;

    /// Number of records in `store` as seen by this transaction.
    async fn count(&self, store: &str) -> Result<usize, EngineError>;

    /// Make every write durable and visible, then finish the transaction.
    async fn commit(self) -> Result<(), EngineError>;

    /// Discard every write and finish the transaction.
    async fn abort(self) -> Result<(), EngineError>;

    /// Bind this transaction to one store for repeated requests.
    fn object_store<'t>(&'t self, name: &'t str) -> ObjectStore<'t, Self>
    where
        Self: Sized,
    {
        ObjectStore::new(self, name)
    }
}

/// A forward-only, single-use traversal of one object store in key order.
///
/// A fresh cursor sits before the first record. Each [`Cursor::advance`]
/// moves to the next record and returns it, or returns `None` once the
/// store is exhausted. Advancing an exhausted cursor is an
/// [`EngineError::InvalidState`].
#[async_trait]
pub trait Cursor: Send {
    /// Move to the next record.
    async fn advance(&mut self) -> Result<Option<Record>, EngineError>;

    /// The record the cursor is positioned on, if any.
    fn current(&self) -> Option<&Record>;

    /// Whether the cursor has reported exhaustion.
    fn is_exhausted(&self) -> bool;

    /// Replace the current record with `value`; the primary key must not
    /// change.
    async fn update(&mut self, value: Value) -> Result<(), EngineError>;

    /// Remove the current record.
    async fn delete(&mut self) -> Result<(), EngineError>;
}
