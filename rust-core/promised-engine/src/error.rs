// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine error types for the PromisedDB object-store boundary.
//
// One enum covers every failure an engine may report: open and version
// failures, schema (upgrade) failures, per-request failures inside a
// transaction, cursor misuse, and backend I/O problems.

use thiserror::Error;

/// Errors that can occur when interacting with a storage engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested object store (or database entry) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated (duplicate key, existing store).
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A value could not be stored, usually because its key path did not
    /// yield a valid key.
    #[error("data error: {0}")]
    Data(String),

    /// A write was attempted inside a read-only transaction.
    #[error("read-only transaction: {0}")]
    ReadOnly(String),

    /// The transaction or cursor is not in a state that allows the request.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The request was malformed (empty scope, version zero, ...).
    #[error("invalid access: {0}")]
    InvalidAccess(String),

    /// An open requested a version lower than the stored one.
    #[error("requested version {requested} is lower than the stored version {current}")]
    VersionError {
        /// Version the caller asked for.
        requested: u64,
        /// Version currently stored.
        current: u64,
    },

    /// A version upgrade could not proceed because other connections stayed
    /// open past the configured wait.
    #[error("upgrade to version {version} blocked by {open} open connection(s)")]
    Blocked {
        /// Version the upgrade was targeting.
        version: u64,
        /// Connections still open when the wait gave up.
        open: usize,
    },

    /// Failed to serialize or deserialize a stored value.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The storage backend is not available.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The key exceeds the maximum allowed size.
    #[error("key too large: {size} bytes (max: {max})")]
    KeyTooLarge {
        /// Actual key size in bytes.
        size: usize,
        /// Maximum allowed key size in bytes.
        max: usize,
    },

    /// The value exceeds the maximum allowed size.
    #[error("value too large: {size} bytes (max: {max})")]
    ValueTooLarge {
        /// Actual serialized value size in bytes.
        size: usize,
        /// Maximum allowed value size in bytes.
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_error_display() {
        let err = EngineError::VersionError {
            requested: 2,
            current: 5,
        };
        assert_eq!(
            err.to_string(),
            "requested version 2 is lower than the stored version 5"
        );
    }

    #[test]
    fn test_blocked_display() {
        let err = EngineError::Blocked { version: 4, open: 2 };
        assert!(err.to_string().contains("version 4"));
        assert!(err.to_string().contains("2 open connection"));
    }

    #[test]
    fn test_constraint_display() {
        let err = EngineError::Constraint("key 'a' already exists".to_string());
        assert_eq!(
            err.to_string(),
            "constraint violation: key 'a' already exists"
        );
    }

    #[test]
    fn test_value_too_large_display() {
        let err = EngineError::ValueTooLarge { size: 4096, max: 2048 };
        assert!(err.to_string().contains("value too large"));
        assert!(err.to_string().contains("4096"));
        assert!(err.to_string().contains("2048"));
    }

    #[test]
    fn test_io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file gone");
        let err: EngineError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }
}
