//! # Store configuration — `store.toml`
//!
//! Tunables for a [`crate::StoreContext`]. The file is optional; a missing or
//! empty file is equivalent to [`StoreConfig::default`]. Native builds read it
//! from the app's data directory with [`StoreConfig::load`]; the web build has
//! no file system and always uses the defaults.
//!
//! ## Structure
//!
//! ```toml
//! namespace = "user-42"          # optional per-user key prefix
//!
//! [persist]
//! debounce_ms = 500              # delay before a pending write is flushed
//!
//! [sync]
//! channel_name = "store-changes" # BroadcastChannel used between tabs
//! ```
//!
//! ## Types
//!
//! | Struct | Purpose |
//! |--------|---------|
//! | [`StoreConfig`] | Top-level config, builder helpers, TOML (de)serialisation. |
//! | [`PersistConfig`] | Debounce window, default **500 ms**. |
//! | [`SyncConfig`] | Cross-context channel name, default `"store-changes"`. |

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration stored in `store.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Prefix applied to every key, isolating one user's data from another's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub persist: PersistConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Persistence configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Milliseconds without a new update before the pending value is written.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Cross-context sync configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
}

fn default_channel_name() -> String {
    "store-changes".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_name: default_channel_name(),
        }
    }
}

impl StoreConfig {
    /// Builder method to scope keys to a namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Builder method to set the debounce window.
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.persist.debounce_ms = ms;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.persist.debounce_ms)
    }

    /// The slot key actually used for `key` under this config.
    pub fn scoped_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{key}"),
            None => key.to_string(),
        }
    }

    /// The well-known filename for the config file.
    pub fn filename() -> &'static str {
        "store.toml"
    }

    /// Parse from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Read `store.toml` from `dir`, falling back to the defaults when the file
    /// is missing or invalid.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load(dir: &std::path::Path) -> Self {
        let path = dir.join(Self::filename());
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "cannot read store config, using defaults");
                return Self::default();
            }
        };
        Self::from_toml(&text).unwrap_or_else(|error| {
            tracing::warn!(path = %path.display(), %error, "invalid store config, using defaults");
            Self::default()
        })
    }
}
