use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::StoreError;
use crate::slot::DurableSlot;

/// In-memory DurableSlot for tests and hosts without persistent storage.
///
/// Clones share the same map, so several contexts opened over clones of one
/// `MemorySlot` behave like tabs sharing an origin's storage.
#[derive(Clone, Debug, Default)]
pub struct MemorySlot {
    entries: Rc<RefCell<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total bytes (keys plus values) the slot will hold.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Rc::default(),
            quota: Some(quota),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn used_except(&self, key: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl DurableSlot for MemorySlot {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(quota) = self.quota {
            let available = quota.saturating_sub(self.used_except(key));
            let needed = key.len() + value.len();
            if needed > available {
                return Err(StoreError::Capacity {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let slot = MemorySlot::new();
        assert!(slot.get("patients").unwrap().is_none());

        slot.set("patients", "[]").unwrap();
        assert_eq!(slot.get("patients").unwrap().as_deref(), Some("[]"));

        slot.remove("patients").unwrap();
        assert!(slot.get("patients").unwrap().is_none());
        assert!(slot.is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let tab_a = MemorySlot::new();
        let tab_b = tab_a.clone();

        tab_a.set("inventory", "{}").unwrap();
        assert_eq!(tab_b.get("inventory").unwrap().as_deref(), Some("{}"));
        assert_eq!(tab_b.len(), 1);
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let slot = MemorySlot::with_quota(10);
        slot.set("k", "12345").unwrap();

        let err = slot.set("other", "123456").unwrap_err();
        assert!(matches!(err, StoreError::Capacity { needed: 11, .. }));
        // Failed write leaves the existing entry alone
        assert_eq!(slot.get("k").unwrap().as_deref(), Some("12345"));
        assert!(slot.get("other").unwrap().is_none());
    }

    #[test]
    fn test_quota_counts_replacement_not_old_value() {
        let slot = MemorySlot::with_quota(10);
        slot.set("k", "123456789").unwrap();
        // Overwriting the same key only needs room for the new value
        slot.set("k", "987654321").unwrap();
        assert_eq!(slot.get("k").unwrap().as_deref(), Some("987654321"));
    }
}
