// SPDX-License-Identifier: PMPL-1.0-or-later
//! Engine limits shared by every backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// Size and wait limits enforced by an engine.
///
/// `None` disables a limit. The defaults impose no size limits and let a
/// version upgrade wait indefinitely for other connections to close.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    /// Maximum key length in bytes.
    pub max_key_bytes: Option<usize>,
    /// Maximum serialized (JSON) value length in bytes.
    pub max_value_bytes: Option<usize>,
    /// How long an upgrade waits for other connections before failing with
    /// [`EngineError::Blocked`], in milliseconds.
    pub blocked_timeout_ms: Option<u64>,
}

impl EngineLimits {
    /// The blocked-upgrade wait as a [`Duration`].
    pub fn blocked_timeout(&self) -> Option<Duration> {
        self.blocked_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn check_key(&self, key: &str) -> Result<(), EngineError> {
        match self.max_key_bytes {
            Some(max) if key.len() > max => Err(EngineError::KeyTooLarge {
                size: key.len(),
                max,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn check_value(&self, value: &Value) -> Result<(), EngineError> {
        let Some(max) = self.max_value_bytes else {
            return Ok(());
        };
        let size = serde_json::to_vec(value)
            .map_err(|err| EngineError::SerializationError(err.to_string()))?
            .len();
        if size > max {
            return Err(EngineError::ValueTooLarge { size, max });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_are_unlimited() {
        let limits = EngineLimits::default();
        assert!(limits.check_key(&"k".repeat(10_000)).is_ok());
        assert!(limits.check_value(&json!({"big": "x".repeat(10_000)})).is_ok());
        assert_eq!(limits.blocked_timeout(), None);
    }

    #[test]
    fn test_key_limit() {
        let limits = EngineLimits {
            max_key_bytes: Some(4),
            ..Default::default()
        };
        assert!(limits.check_key("abcd").is_ok());
        match limits.check_key("abcde") {
            Err(EngineError::KeyTooLarge { size: 5, max: 4 }) => {}
            other => panic!("expected KeyTooLarge, got: {:?}", other),
        }
    }

    #[test]
    fn test_value_limit_uses_json_size() {
        let limits = EngineLimits {
            max_value_bytes: Some(10),
            ..Default::default()
        };
        // {"a":1} is 7 bytes.
        assert!(limits.check_value(&json!({"a": 1})).is_ok());
        assert!(matches!(
            limits.check_value(&json!({"a": "0123456789"})),
            Err(EngineError::ValueTooLarge { max: 10, .. })
        ));
    }

    #[test]
    fn test_limits_deserialize_partial() {
        let limits: EngineLimits = serde_json::from_str(r#"{"blocked_timeout_ms": 250}"#).unwrap();
        assert_eq!(limits.blocked_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(limits.max_key_bytes, None);
    }
}
