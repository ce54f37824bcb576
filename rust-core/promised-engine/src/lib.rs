// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! PromisedDB Object-Store Engine
//!
//! This crate defines the versioned, transactional object-store boundary that
//! the PromisedDB document adapter runs on, plus two engines implementing it.
//!
//! # Modules
//!
//! - [`backend`] -- The `StorageEngine`, `Connection`, `Transaction` and
//!   `Cursor` traits.
//! - [`schema`] -- Database schema and the `VersionChange` handle given to
//!   upgrade hooks.
//! - [`error`] -- The `EngineError` enum covering every engine failure.
//! - [`config`] -- `EngineLimits` (size limits, blocked-upgrade timeout).
//! - [`snapshot`] -- The copy-on-write transaction and cursor core shared by
//!   both engines.
//! - [`store`] -- `ObjectStore`, a transaction bound to one store.
//! - [`memory`] -- An in-memory engine for tests and ephemeral workloads.
//! - `redb_backend` -- A persistent engine on redb (feature `redb-backend`).
//!
//! # Example
//!
//! ```rust
//! use promised_engine::{
//!     Connection, Cursor, EngineError, MemoryEngine, StorageEngine, Transaction,
//!     TransactionMode, VersionChange,
//! };
//!
//! fn create_notes(change: &mut VersionChange) -> Result<(), EngineError> {
//!     change.create_object_store("notes", "_id").map(|_| ())
//! }
//!
//! # tokio_test::block_on(async {
//! let engine = MemoryEngine::new();
//! let conn = engine.open("demo", Some(1), Some(&create_notes)).await.unwrap();
//!
//! let txn = conn.transaction(&["notes"], TransactionMode::ReadWrite).await.unwrap();
//! txn.add("notes", serde_json::json!({"_id": "n1", "text": "hi"})).await.unwrap();
//! txn.commit().await.unwrap();
//!
//! let txn = conn.transaction(&["notes"], TransactionMode::ReadOnly).await.unwrap();
//! let mut cursor = txn.open_cursor("notes").await.unwrap();
//! let first = cursor.advance().await.unwrap().unwrap();
//! assert_eq!(first.value["text"], "hi");
//! # });
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod memory;
pub mod schema;
pub mod snapshot;
pub mod store;
mod tracker;

// Optional persistent engines, feature-gated to keep the default build lean.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;

pub use backend::{Connection, Cursor, Record, StorageEngine, Transaction, TransactionMode, UpgradeHook};
pub use config::EngineLimits;
pub use error::EngineError;
pub use memory::MemoryEngine;
pub use schema::{DatabaseSchema, StoreSchema, VersionChange};
pub use store::ObjectStore;

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbEngine;
