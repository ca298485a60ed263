//! Sync engine configuration.
//!
//! Every field has a default, so a missing config file is equivalent to `{}`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::DEFAULT_TOKEN_KEY;
use crate::error::{Error, Result};
use crate::util::{compact_text, normalize_text_option};

/// Default identifier for the push subscription registered with the store.
pub const DEFAULT_SUBSCRIPTION_ID: &str = "hazard-report-changes";

/// Settings for one [`SyncEngine`](crate::sync::SyncEngine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Key the change token is persisted under.
    ///
    /// The engine takes its token store ready-made; this key is applied where
    /// that store is built, via [`SqliteChangeTokenStore::for_config`](crate::db::SqliteChangeTokenStore::for_config).
    #[serde(default = "default_token_key")]
    pub token_key: String,
    /// Identifier of the standing push subscription
    #[serde(default = "default_subscription_id")]
    pub subscription_id: String,
    /// Directory for staged photo files; the system temp dir when unset
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_key: default_token_key(),
            subscription_id: default_subscription_id(),
            staging_dir: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config payload.
    pub fn from_json_str(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload).map_err(|error| {
            Error::InvalidInput(format!(
                "invalid engine config ({error}): {}",
                compact_text(payload)
            ))
        })?;
        config.validated()
    }

    /// Load from a JSON file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No engine config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let payload = std::fs::read_to_string(path)?;
        Self::from_json_str(&payload)
    }

    /// Directory staged photo files are written to.
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    fn validated(self) -> Result<Self> {
        let token_key = normalize_text_option(Some(self.token_key))
            .ok_or_else(|| Error::InvalidInput("token_key must not be empty".to_string()))?;
        let subscription_id = normalize_text_option(Some(self.subscription_id)).ok_or_else(|| {
            Error::InvalidInput("subscription_id must not be empty".to_string())
        })?;
        Ok(Self {
            token_key,
            subscription_id,
            staging_dir: self.staging_dir,
        })
    }
}

fn default_token_key() -> String {
    DEFAULT_TOKEN_KEY.to_string()
}

fn default_subscription_id() -> String {
    DEFAULT_SUBSCRIPTION_ID.to_string()
}
