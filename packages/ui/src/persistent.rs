//! `use_persistent` — a component-scoped handle to a [`PersistentStore`].

use std::rc::Rc;

use dioxus::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use store::{PersistentStore, StoreContext, Subscription};

/// A persistent value bound to a Dioxus signal.
///
/// Reading through [`value`](UsePersistent::value) subscribes the component;
/// local writes, removals, and changes made in other tabs all re-render it.
pub struct UsePersistent<T: 'static> {
    store: PersistentStore<T>,
    value: Signal<T>,
    _watch: Rc<Subscription>,
}

impl<T: 'static> Clone for UsePersistent<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            value: self.value,
            _watch: self._watch.clone(),
        }
    }
}

impl<T> UsePersistent<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    pub fn get(&self) -> T {
        self.value.cloned()
    }

    pub fn value(&self) -> ReadOnlySignal<T> {
        ReadOnlySignal::new(self.value)
    }

    pub fn set(&self, value: T) {
        self.store.set(value);
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.store.update(f);
    }

    pub fn remove(&self) {
        self.store.remove();
    }

    pub fn store(&self) -> &PersistentStore<T> {
        &self.store
    }
}

/// Open `key` in the nearest [`StoreProvider`](crate::StoreProvider).
///
/// `initial` is only called on first render, and its value is used when the
/// slot is empty or unreadable. Components that open the same key share one
/// store, so they always show the same value.
pub fn use_persistent<T>(key: &str, initial: impl FnOnce() -> T) -> UsePersistent<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    let context = use_context::<StoreContext>();
    let key = key.to_string();
    use_hook(move || {
        let store = context.open(&key, initial());
        let value = Signal::new(store.get());
        let watch = store.watch(move |next: &T| {
            let mut value = value;
            value.set(next.clone());
        });
        UsePersistent {
            store,
            value,
            _watch: Rc::new(watch),
        }
    })
}
