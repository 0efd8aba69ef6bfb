//! # Durable slots — the persistent key/value backing
//!
//! A [`DurableSlot`] is a flat, string-keyed, string-valued map that survives
//! reloads: `window.localStorage` in the browser, a directory of files on
//! desktop, a shared in-memory map in tests. The API is synchronous because the
//! browser's storage API is.
//!
//! Implementations live in sibling modules ([`crate::memory`],
//! [`crate::file_store`], and `local_storage` on wasm with the `web` feature).
//!
//! [`read`] is the construction-time read path shared by every store: it never
//! fails, falling back to the caller's initial value on absence or bad data.

use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// Synchronous string key/value storage shared by every context of an origin.
pub trait DurableSlot {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: DurableSlot + ?Sized> DurableSlot for std::rc::Rc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Read and decode the value stored under `key`, or return `initial`.
///
/// Missing slots, backend errors, and text that does not decode into `T` all
/// yield `initial`; failures are logged, never returned.
pub fn read<T: DeserializeOwned>(slot: &dyn DurableSlot, key: &str, initial: T) -> T {
    let text = match slot.get(key) {
        Ok(Some(text)) => text,
        Ok(None) => return initial,
        Err(error) => {
            tracing::warn!(key, %error, "failed to read durable slot, using initial value");
            return initial;
        }
    };

    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(source) => {
            let error = StoreError::serialization(key, source);
            tracing::warn!(key, %error, "discarding unreadable stored value");
            initial
        }
    }
}
