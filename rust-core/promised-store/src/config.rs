// SPDX-License-Identifier: PMPL-1.0-or-later
//! Store configuration.
//!
//! Defaults:
//! - name: `promised`
//! - provisioning: `upgrade-if-missing`
//!
//! Environment overrides: `PROMISED_DB_NAME`, `PROMISED_PROVISIONING`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::ID_FIELD;
use crate::error::{Result, StoreError};

/// Environment variable naming the database.
pub const ENV_NAME: &str = "PROMISED_DB_NAME";
/// Environment variable selecting the [`ProvisioningMode`].
pub const ENV_PROVISIONING: &str = "PROMISED_PROVISIONING";

/// When collection provisioning bumps the database version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisioningMode {
    /// Every provisioning call upgrades, even if nothing is missing.
    AlwaysUpgrade,
    /// Upgrade only when a requested collection is absent.
    #[default]
    UpgradeIfMissing,
}

impl fmt::Display for ProvisioningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlwaysUpgrade => f.write_str("always-upgrade"),
            Self::UpgradeIfMissing => f.write_str("upgrade-if-missing"),
        }
    }
}

impl FromStr for ProvisioningMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always-upgrade" => Ok(Self::AlwaysUpgrade),
            "upgrade-if-missing" => Ok(Self::UpgradeIfMissing),
            other => Err(StoreError::InvalidConfig(format!(
                "unknown provisioning mode '{other}' (expected always-upgrade or upgrade-if-missing)"
            ))),
        }
    }
}

/// Configuration for a [`PromisedDb`](crate::PromisedDb).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database name passed to the engine.
    pub name: String,
    /// Provisioning policy for `create_collections`.
    pub provisioning: ProvisioningMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "promised".to_string(),
            provisioning: ProvisioningMode::default(),
        }
    }
}

impl StoreConfig {
    /// Configuration for database `name` with default settings.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Primary key attribute of every collection.
    pub fn key_path(&self) -> &'static str {
        ID_FIELD
    }

    /// Parse a JSON configuration document; absent fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `PROMISED_DB_NAME` / `PROMISED_PROVISIONING`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(name) = lookup(ENV_NAME) {
            config.name = name;
        }
        if let Some(mode) = lookup(ENV_PROVISIONING) {
            config.provisioning = mode.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject an empty database name.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidConfig(
                "database name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
