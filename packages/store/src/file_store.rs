//! # Filesystem-backed durable slot
//!
//! [`FileSlot`] is the [`DurableSlot`] used on desktop and mobile, where there is
//! no browser storage. Each key becomes one file so a corrupt entry cannot take
//! its neighbours with it.
//!
//! ## Layout
//!
//! ```text
//! <base_dir>/
//! └── slots/
//!     └── <key_hex>        # UTF-8 JSON text of the stored value
//! ```
//!
//! Keys are hex-encoded so any string (including `/` and `:` from namespaced
//! keys) maps to a valid filename. Writes go to a `.tmp` sibling first and are
//! renamed into place, so a crash mid-write leaves the previous value intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::slot::DurableSlot;

/// Filesystem-backed DurableSlot for desktop and mobile persistence.
#[derive(Clone, Debug)]
pub struct FileSlot {
    base: PathBuf,
}

impl FileSlot {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    fn slots_dir(&self) -> PathBuf {
        self.base.join("slots")
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        let name: String = key.bytes().map(|b| format!("{b:02x}")).collect();
        self.slots_dir().join(name)
    }

    /// Delete every slot stored under `base`. Clearing an empty base is a no-op.
    pub fn clear(base: &Path) -> Result<(), StoreError> {
        match std::fs::remove_dir_all(base.join("slots")) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                tracing::warn!(base = %base.display(), error = %e, "failed to clear slots");
                Err(e.into())
            }
        }
    }
}

impl DurableSlot for FileSlot {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.slot_path(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.slot_path(key);
        std::fs::create_dir_all(self.slots_dir())?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value).map_err(|e| match e.kind() {
            ErrorKind::StorageFull => StoreError::Capacity {
                key: key.to_string(),
                needed: value.len(),
                available: 0,
            },
            _ => e.into(),
        })?;
        std::fs::rename(tmp, path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.slot_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
