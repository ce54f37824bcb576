// SPDX-License-Identifier: PMPL-1.0-or-later
//! Document store error types.

use promised_engine::EngineError;
use thiserror::Error;

/// Errors surfaced by [`PromisedDb`](crate::PromisedDb) operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The engine rejected an open, a transaction or a request.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// Caller misuse, reported without touching the engine.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A stored record is not a JSON object.
    #[error("malformed document in '{collection}': {reason}")]
    MalformedDocument { collection: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
