//! # StoreContext — one browsing context's view of durable storage
//!
//! A tab, window, or desktop app instance owns exactly one [`StoreContext`]. It
//! bundles the three collaborators every [`PersistentStore`] needs (the
//! durable slot, the change channel, the timer source) plus the
//! [`StoreConfig`], and hands them to each store it opens. Nothing is global:
//! two contexts over the same slot behave like two tabs of the same origin.
//!
//! Within one context a key has at most one live store. Opening a key that is
//! already open returns a handle to that store (its `initial` wins), so every
//! component of a tab sees the same value and queues into the same pending
//! write. The registry holds weak handles; a store whose last handle is dropped
//! is torn down as usual and the next `open` starts a fresh one.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::StoreConfig;
use crate::notify::ChangeChannel;
use crate::persistent::PersistentStore;
use crate::scheduler::Scheduler;
use crate::slot::{read, DurableSlot};

#[derive(Clone)]
pub struct StoreContext {
    slot: Rc<dyn DurableSlot>,
    channel: Rc<dyn ChangeChannel>,
    scheduler: Rc<dyn Scheduler>,
    config: StoreConfig,
    stores: Rc<RefCell<HashMap<String, Weak<dyn Any>>>>,
}

impl StoreContext {
    pub fn new(
        slot: impl DurableSlot + 'static,
        channel: impl ChangeChannel + 'static,
        scheduler: impl Scheduler + 'static,
    ) -> Self {
        Self {
            slot: Rc::new(slot),
            channel: Rc::new(channel),
            scheduler: Rc::new(scheduler),
            config: StoreConfig::default(),
            stores: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Builder method to replace the default configuration.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Open a store for `key`, seeded from the slot or `initial`.
    ///
    /// Returns the live store when `key` is already open in this context.
    pub fn open<T>(&self, key: &str, initial: T) -> PersistentStore<T>
    where
        T: Clone + Serialize + DeserializeOwned + 'static,
    {
        let key = self.config.scoped_key(key);
        let live = self.stores.borrow().get(&key).and_then(Weak::upgrade);
        if let Some(live) = live {
            match PersistentStore::from_any(live) {
                Some(store) => return store,
                None => {
                    tracing::warn!(%key, "key already open with another type, opening a separate store");
                    return self.open_new(key, initial);
                }
            }
        }

        let store = self.open_new(key.clone(), initial);
        let mut stores = self.stores.borrow_mut();
        stores.retain(|_, weak| weak.strong_count() > 0);
        stores.insert(key, store.downgrade());
        store
    }

    fn open_new<T>(&self, key: String, initial: T) -> PersistentStore<T>
    where
        T: Clone + Serialize + DeserializeOwned + 'static,
    {
        PersistentStore::open(
            key,
            initial,
            self.config.debounce(),
            self.slot.clone(),
            self.channel.clone(),
            self.scheduler.clone(),
        )
    }

    /// Read `key` once without opening a store.
    pub fn read<T: DeserializeOwned>(&self, key: &str, initial: T) -> T {
        read(self.slot.as_ref(), &self.config.scoped_key(key), initial)
    }
}

impl std::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
