//! Error taxonomy for the durable storage boundary.
//!
//! Backends return [`StoreError`]; [`crate::PersistentStore`] logs and drops every
//! one of them so a broken slot degrades to "not persisted" instead of crashing
//! the session.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The value could not be encoded to or decoded from its stored text.
    #[error("cannot (de)serialize value for `{key}`: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backing storage refused the write because it is full.
    #[error("storage quota exceeded writing `{key}` ({needed} bytes, {available} available)")]
    Capacity {
        key: String,
        needed: usize,
        available: usize,
    },

    /// A cross-context change notice could not be understood.
    #[error("malformed change notice for `{key}`: {reason}")]
    MalformedNotification { key: String, reason: String },

    /// The backing storage is missing or disabled in this environment.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn serialization(key: &str, source: serde_json::Error) -> Self {
        StoreError::Serialization {
            key: key.to_string(),
            source,
        }
    }

    pub fn malformed(key: &str, reason: impl ToString) -> Self {
        StoreError::MalformedNotification {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
