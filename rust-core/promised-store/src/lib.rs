// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PromisedDB Document Store
//
// A Mongo-like CRUD vocabulary (find, create, update, delete, save, each in
// single- and multi-document form) over any `promised_engine::StorageEngine`.
// Collections are object stores keyed by `_id`; documents are JSON objects.
//
// # Modules
//
// - [`database`] -- The `PromisedDb` handle and `Multiplicity`.
// - [`connection`] -- Opening at the right version and releasing connections.
// - [`provision`] -- `create_collections` and its provisioning policies.
// - [`query`] -- Cursor-driven `find`.
// - [`mutation`] -- `create`, `update`, `delete` and their reports.
// - [`save`] -- Upsert on top of find, update and create.
// - [`matcher`] -- Flat loose-equality filter matching.
// - [`config`] -- `StoreConfig` (name, provisioning mode).
// - [`error`] -- The `StoreError` enum.

pub mod config;
pub mod connection;
pub mod database;
pub mod document;
pub mod error;
pub mod id;
pub mod matcher;
pub mod mutation;
pub mod provision;
pub mod query;
pub mod save;

pub use config::{ProvisioningMode, StoreConfig};
pub use database::{Multiplicity, PromisedDb};
pub use document::{Document, Filter, ID_FIELD};
pub use error::{Result, StoreError};
pub use id::{IdGenerator, UuidGenerator};
pub use matcher::{has_attributes, loose_eq, matches};
pub use mutation::{DeleteSummary, Deleted, FailedRecord, UpdateReport};
pub use query::Found;
pub use save::{SaveOptions, SaveOutcome};
