//! # PersistentStore — an in-memory value mirrored to a durable slot
//!
//! [`PersistentStore<T>`] owns one key of a [`DurableSlot`]. Reads are served
//! from memory; writes land in memory immediately and reach the slot after a
//! debounce window, so a burst of updates costs one durable write.
//!
//! ## Write path
//!
//! Every [`set`](PersistentStore::set) / [`update`](PersistentStore::update)
//! replaces the current value before returning, records it as the pending
//! value, cancels the previous timer, and schedules a new one. When a timer
//! survives its full window the pending value is serialised with `serde_json`,
//! written to the slot, and published as a [`ChangeNotice`] for other contexts.
//!
//! ## Sync path
//!
//! The store listens on its [`ChangeChannel`]. A notice for its key replaces
//! the current value (`newValue: null` resets it to the initial value), unless
//! a local write is still pending: that write lands later and wins, and the
//! other contexts adopt it when its own notice reaches them.
//!
//! ## Failure model
//!
//! Nothing here returns an error. Unreadable slot contents fall back to the
//! initial value, failed writes are dropped (memory stays authoritative for the
//! session), malformed notices are ignored. Each case logs a `tracing` warning.
//!
//! ## Teardown
//!
//! Dropping the last handle cancels a write that is still waiting for its
//! timer. An update made less than one debounce window before teardown may
//! therefore never reach the slot.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::notify::{ChangeChannel, ChangeNotice, Listener, Subscription};
use crate::scheduler::{Scheduler, TimerHandle};
use crate::slot::{read, DurableSlot};

/// A requested change: a replacement value or a function of the current one.
pub enum Update<T> {
    Replace(T),
    With(Box<dyn FnOnce(&T) -> T>),
}

impl<T> Update<T> {
    pub fn with(f: impl FnOnce(&T) -> T + 'static) -> Self {
        Update::With(Box::new(f))
    }
}

impl<T> From<T> for Update<T> {
    fn from(value: T) -> Self {
        Update::Replace(value)
    }
}

struct State<T> {
    current: T,
    pending: Option<T>,
    timer: Option<TimerHandle>,
}

type Watcher<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    key: String,
    initial: T,
    debounce: Duration,
    slot: Rc<dyn DurableSlot>,
    channel: Rc<dyn ChangeChannel>,
    scheduler: Rc<dyn Scheduler>,
    state: RefCell<State<T>>,
    watchers: RefCell<Vec<(u64, Watcher<T>)>>,
    next_watcher: Cell<u64>,
    subscription: RefCell<Option<Subscription>>,
}

/// A value of type `T` kept in sync with one durable slot key.
///
/// Cloning is cheap and yields another handle to the same store.
pub struct PersistentStore<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for PersistentStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PersistentStore<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    /// Open `key`, loading its current value from `slot`.
    ///
    /// Most callers go through [`crate::StoreContext::open`] instead.
    pub fn open(
        key: impl Into<String>,
        initial: T,
        debounce: Duration,
        slot: Rc<dyn DurableSlot>,
        channel: Rc<dyn ChangeChannel>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Self {
        let key = key.into();
        let current = read(slot.as_ref(), &key, initial.clone());
        let inner = Rc::new(Inner {
            key,
            initial,
            debounce,
            slot,
            channel,
            scheduler,
            state: RefCell::new(State {
                current,
                pending: None,
                timer: None,
            }),
            watchers: RefCell::new(Vec::new()),
            next_watcher: Cell::new(0),
            subscription: RefCell::new(None),
        });

        let weak = Rc::downgrade(&inner);
        let listener: Listener = Rc::new(move |notice: &ChangeNotice| {
            if let Some(inner) = weak.upgrade() {
                inner.reconcile(notice);
            }
        });
        let subscription = inner.channel.subscribe(listener);
        inner.subscription.replace(Some(subscription));

        Self { inner }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// A type-erased weak handle, for registries that must not keep the store
    /// alive.
    pub(crate) fn downgrade(&self) -> Weak<dyn Any> {
        let inner: Rc<dyn Any> = self.inner.clone();
        Rc::downgrade(&inner)
    }

    /// Recover a store from [`downgrade`](Self::downgrade)'s handle, if it was
    /// opened with the same `T`.
    pub(crate) fn from_any(inner: Rc<dyn Any>) -> Option<Self> {
        inner.downcast::<Inner<T>>().ok().map(|inner| Self { inner })
    }

    /// A copy of the current value.
    pub fn get(&self) -> T {
        self.inner.state.borrow().current.clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.state.borrow().current)
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        self.inner.replace(value);
    }

    /// Replace the value with `f(current)`.
    ///
    /// `f` may read the store but must not write to it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.state.borrow().current);
        self.inner.replace(next);
    }

    pub fn apply(&self, update: impl Into<Update<T>>) {
        match update.into() {
            Update::Replace(value) => self.set(value),
            Update::With(f) => self.update(f),
        }
    }

    /// Clear the slot and reset to the initial value.
    ///
    /// A write still waiting for its timer is cancelled, and other contexts are
    /// told the slot is gone.
    pub fn remove(&self) {
        let inner = &self.inner;
        let cancelled = {
            let mut state = inner.state.borrow_mut();
            state.pending = None;
            state.current = inner.initial.clone();
            state.timer.take()
        };
        if let Some(timer) = cancelled {
            timer.cancel();
        }

        if let Err(error) = inner.slot.remove(&inner.key) {
            tracing::warn!(key = %inner.key, %error, "failed to clear durable slot");
        }
        inner.channel.publish(&ChangeNotice {
            key: inner.key.clone(),
            new_value: None,
        });
        inner.notify_watchers();
    }

    /// Whether an update is waiting for its debounce timer.
    pub fn has_pending_write(&self) -> bool {
        self.inner.state.borrow().pending.is_some()
    }

    /// Call `f` with the new value after every change.
    pub fn watch(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.next_watcher.get();
        self.inner.next_watcher.set(id + 1);
        let watcher: Watcher<T> = Rc::new(f);
        self.inner.watchers.borrow_mut().push((id, watcher));

        let weak: Weak<Inner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.watchers.borrow_mut().retain(|(w, _)| *w != id);
            }
        })
    }

    /// The current value together with an update function and a remove
    /// function, for callers that only need those three things.
    pub fn split(&self) -> (T, impl Fn(Update<T>) + 'static, impl Fn() + 'static) {
        let updater = self.clone();
        let remover = self.clone();
        (
            self.get(),
            move |update: Update<T>| updater.apply(update),
            move || remover.remove(),
        )
    }
}

impl<T> Inner<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    fn replace(self: &Rc<Self>, value: T) {
        let superseded = {
            let mut state = self.state.borrow_mut();
            state.current = value.clone();
            state.pending = Some(value);
            state.timer.take()
        };
        if let Some(timer) = superseded {
            timer.cancel();
        }

        let weak = Rc::downgrade(self);
        let timer = self.scheduler.schedule(
            self.debounce,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.flush();
                }
            }),
        );
        self.state.borrow_mut().timer = Some(timer);
        self.notify_watchers();
    }

    fn flush(&self) {
        let pending = {
            let mut state = self.state.borrow_mut();
            if let Some(timer) = state.timer.take() {
                timer.detach();
            }
            state.pending.take()
        };
        let Some(value) = pending else {
            return;
        };

        let text = match serde_json::to_string(&value) {
            Ok(text) => text,
            Err(source) => {
                let error = StoreError::serialization(&self.key, source);
                tracing::warn!(key = %self.key, %error, "dropping unserializable write");
                return;
            }
        };
        if let Err(error) = self.slot.set(&self.key, &text) {
            tracing::warn!(key = %self.key, %error, "dropping durable write");
            return;
        }
        tracing::debug!(key = %self.key, bytes = text.len(), "flushed pending value");

        self.channel.publish(&ChangeNotice {
            key: self.key.clone(),
            new_value: Some(text),
        });
    }

    fn reconcile(&self, notice: &ChangeNotice) {
        if notice.key != self.key {
            return;
        }
        if self.state.borrow().pending.is_some() {
            tracing::debug!(key = %self.key, "local write pending, ignoring external change");
            return;
        }

        let next = match &notice.new_value {
            None => self.initial.clone(),
            Some(text) => match serde_json::from_str::<T>(text) {
                Ok(value) => value,
                Err(e) => {
                    let error = StoreError::malformed(&self.key, e);
                    tracing::warn!(key = %self.key, %error, "ignoring change notice");
                    return;
                }
            },
        };
        tracing::debug!(key = %self.key, removed = notice.new_value.is_none(), "adopted external change");
        self.state.borrow_mut().current = next;
        self.notify_watchers();
    }

    fn notify_watchers(&self) {
        let watchers: Vec<Watcher<T>> = self
            .watchers
            .borrow()
            .iter()
            .map(|(_, w)| w.clone())
            .collect();
        if watchers.is_empty() {
            return;
        }
        let value = self.state.borrow().current.clone();
        for watcher in watchers {
            watcher(&value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StoreContext;
    use crate::memory::MemorySlot;
    use crate::notify::LocalBus;
    use crate::scheduler::ManualScheduler;

    const WINDOW: Duration = Duration::from_millis(500);

    /// A MemorySlot that records every write it accepts.
    #[derive(Clone, Default)]
    struct RecordingSlot {
        inner: MemorySlot,
        writes: Rc<RefCell<Vec<(String, String)>>>,
    }

    impl DurableSlot for RecordingSlot {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(key, value)?;
            self.writes
                .borrow_mut()
                .push((key.to_string(), value.to_string()));
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    fn tab<S: DurableSlot + Clone + 'static>(
        slot: &S,
        bus: &LocalBus,
        scheduler: &ManualScheduler,
    ) -> StoreContext {
        StoreContext::new(slot.clone(), bus.connect(scheduler.clone()), scheduler.clone())
    }

    #[test]
    fn test_update_is_visible_before_return() {
        let scheduler = ManualScheduler::new();
        let slot = RecordingSlot::default();
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let counter = tab.open("counter", 0u32);
        counter.set(3);
        assert_eq!(counter.get(), 3);
        counter.update(|n| n + 1);
        assert_eq!(counter.get(), 4);
        assert!(counter.has_pending_write());
        // Nothing durable yet
        assert!(slot.writes.borrow().is_empty());
    }

    #[test]
    fn test_burst_of_updates_makes_one_write_with_last_value() {
        let scheduler = ManualScheduler::new();
        let slot = RecordingSlot::default();
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let visits = tab.open("visits", Vec::<String>::new());
        for name in ["Amina", "Baraka", "Chebet"] {
            visits.update(|v| {
                let mut v = v.clone();
                v.push(name.to_string());
                v
            });
            scheduler.advance(Duration::from_millis(200));
        }
        assert!(slot.writes.borrow().is_empty());

        scheduler.advance(WINDOW);
        let writes = slot.writes.borrow();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "visits");
        assert_eq!(writes[0].1, r#"["Amina","Baraka","Chebet"]"#);
        assert!(!visits.has_pending_write());
    }

    #[test]
    fn test_updates_in_separate_windows_write_twice() {
        let scheduler = ManualScheduler::new();
        let slot = RecordingSlot::default();
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let counter = tab.open("counter", 0u32);
        counter.set(1);
        scheduler.advance(WINDOW);
        counter.set(2);
        scheduler.advance(WINDOW);

        let writes: Vec<String> = slot.writes.borrow().iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(writes, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_open_reads_existing_value() {
        let scheduler = ManualScheduler::new();
        let slot = MemorySlot::new();
        slot.set("theme", "\"dark\"").unwrap();
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let theme = tab.open("theme", "light".to_string());
        assert_eq!(theme.get(), "dark");
    }

    #[test]
    fn test_open_with_corrupt_value_uses_initial() {
        let scheduler = ManualScheduler::new();
        let slot = MemorySlot::new();
        slot.set("inventory", "<html>oops").unwrap();
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let inventory = tab.open("inventory", vec![0u32; 2]);
        assert_eq!(inventory.get(), vec![0, 0]);
    }

    #[test]
    fn test_remove_resets_and_clears_slot() {
        let scheduler = ManualScheduler::new();
        let slot = RecordingSlot::default();
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let counter = tab.open("counter", 7u32);
        counter.set(9);
        scheduler.advance(WINDOW);
        assert_eq!(slot.inner.get("counter").unwrap().as_deref(), Some("9"));

        counter.remove();
        assert_eq!(counter.get(), 7);
        assert!(slot.inner.get("counter").unwrap().is_none());
        assert_eq!(tab.read("counter", 7u32), 7);
    }

    #[test]
    fn test_remove_cancels_pending_write() {
        let scheduler = ManualScheduler::new();
        let slot = RecordingSlot::default();
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let counter = tab.open("counter", 0u32);
        counter.set(5);
        counter.remove();
        scheduler.run_until_idle();

        assert!(slot.writes.borrow().is_empty());
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_failed_write_keeps_memory_value() {
        let scheduler = ManualScheduler::new();
        let slot = MemorySlot::with_quota(8);
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let notes = tab.open("notes", String::new());
        notes.set("far too long for the quota".to_string());
        scheduler.advance(WINDOW);

        assert_eq!(notes.get(), "far too long for the quota");
        assert!(slot.get("notes").unwrap().is_none());
        assert!(!notes.has_pending_write());
    }

    #[test]
    fn test_update_converges_in_other_context() {
        let scheduler = ManualScheduler::new();
        let slot = MemorySlot::new();
        let bus = LocalBus::new();
        let tab_a = tab(&slot, &bus, &scheduler);
        let tab_b = tab(&slot, &bus, &scheduler);

        let a = tab_a.open("patients", Vec::<String>::new());
        let b = tab_b.open("patients", Vec::<String>::new());

        a.set(vec!["Amina".to_string()]);
        assert!(b.get().is_empty());

        scheduler.run_until_idle();
        assert_eq!(b.get(), vec!["Amina".to_string()]);
        assert_eq!(a.get(), b.get());
    }

    #[test]
    fn test_remove_propagates_to_other_context() {
        let scheduler = ManualScheduler::new();
        let slot = MemorySlot::new();
        let bus = LocalBus::new();
        let tab_a = tab(&slot, &bus, &scheduler);
        let tab_b = tab(&slot, &bus, &scheduler);

        let a = tab_a.open("page_size", 10u32);
        let b = tab_b.open("page_size", 10u32);
        a.set(25);
        scheduler.run_until_idle();
        assert_eq!(b.get(), 25);

        a.remove();
        scheduler.run_until_idle();
        assert_eq!(b.get(), 10);
    }

    #[test]
    fn test_malformed_notice_is_ignored() {
        let scheduler = ManualScheduler::new();
        let slot = MemorySlot::new();
        let bus = LocalBus::new();
        let tab_a = tab(&slot, &bus, &scheduler);
        let rogue = bus.connect(scheduler.clone());

        let counter = tab_a.open("counter", 1u32);
        rogue.publish(&ChangeNotice {
            key: "counter".to_string(),
            new_value: Some("not a number".to_string()),
        });
        scheduler.run_until_idle();
        assert_eq!(counter.get(), 1);

        rogue.publish(&ChangeNotice {
            key: "counter".to_string(),
            new_value: Some("42".to_string()),
        });
        scheduler.run_until_idle();
        assert_eq!(counter.get(), 42);
    }

    #[test]
    fn test_notice_for_other_key_is_ignored() {
        let scheduler = ManualScheduler::new();
        let bus = LocalBus::new();
        let tab_a = tab(&MemorySlot::new(), &bus, &scheduler);
        let rogue = bus.connect(scheduler.clone());

        let counter = tab_a.open("counter", 1u32);
        rogue.publish(&ChangeNotice {
            key: "other".to_string(),
            new_value: Some("5".to_string()),
        });
        scheduler.run_until_idle();
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn test_pending_local_write_wins_over_external_notice() {
        let scheduler = ManualScheduler::new();
        let slot = MemorySlot::new();
        let bus = LocalBus::new();
        let tab_a = tab(&slot, &bus, &scheduler);
        let tab_b = tab(&slot, &bus, &scheduler);

        let a = tab_a.open("counter", 0u32);
        let b = tab_b.open("counter", 0u32);

        a.set(1);
        scheduler.advance(Duration::from_millis(300));
        b.set(2);
        // A flushes first; B still has its own write pending and keeps it
        scheduler.advance(Duration::from_millis(200));
        assert_eq!(b.get(), 2);

        scheduler.run_until_idle();
        assert_eq!(slot.get("counter").unwrap().as_deref(), Some("2"));
        assert_eq!(a.get(), 2);
        assert_eq!(b.get(), 2);
    }

    #[test]
    fn test_dropping_store_discards_pending_write() {
        let scheduler = ManualScheduler::new();
        let slot = RecordingSlot::default();
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let counter = tab.open("counter", 0u32);
        counter.set(8);
        drop(counter);

        scheduler.run_until_idle();
        assert!(slot.writes.borrow().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_watchers_see_local_and_external_changes() {
        let scheduler = ManualScheduler::new();
        let slot = MemorySlot::new();
        let bus = LocalBus::new();
        let tab_a = tab(&slot, &bus, &scheduler);
        let tab_b = tab(&slot, &bus, &scheduler);

        let a = tab_a.open("counter", 0u32);
        let b = tab_b.open("counter", 0u32);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let watch = {
            let seen = seen.clone();
            b.watch(move |v| seen.borrow_mut().push(*v))
        };

        b.set(1);
        scheduler.run_until_idle();
        a.set(5);
        scheduler.run_until_idle();
        assert_eq!(*seen.borrow(), vec![1, 5]);

        drop(watch);
        a.set(6);
        scheduler.run_until_idle();
        assert_eq!(b.get(), 6);
        assert_eq!(*seen.borrow(), vec![1, 5]);
    }

    #[test]
    fn test_split_accessor() {
        let scheduler = ManualScheduler::new();
        let slot = MemorySlot::new();
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let store = tab.open("counter", 10u32);
        let (value, update, remove) = store.split();
        assert_eq!(value, 10);

        update(Update::Replace(11));
        update(Update::with(|n: &u32| n * 2));
        assert_eq!(store.get(), 22);
        scheduler.run_until_idle();
        assert_eq!(slot.get("counter").unwrap().as_deref(), Some("22"));

        remove();
        assert_eq!(store.get(), 10);
        assert!(slot.get("counter").unwrap().is_none());
    }

    #[test]
    fn test_same_key_in_one_context_shares_updates() {
        let scheduler = ManualScheduler::new();
        let slot = MemorySlot::new();
        let tab = tab(&slot, &LocalBus::new(), &scheduler);

        let list_view = tab.open("patients", Vec::<String>::new());
        let badge = tab.open("patients", Vec::<String>::new());

        let seen = Rc::new(Cell::new(0));
        let _watch = {
            let seen = seen.clone();
            badge.watch(move |v: &Vec<String>| seen.set(v.len()))
        };

        list_view.set(vec!["Amina".to_string()]);
        assert_eq!(badge.get(), vec!["Amina".to_string()]);
        assert_eq!(seen.get(), 1);
        scheduler.run_until_idle();

        badge.update(|v| {
            let mut v = v.clone();
            v.push("Baraka".to_string());
            v
        });
        scheduler.run_until_idle();

        let both = vec!["Amina".to_string(), "Baraka".to_string()];
        assert_eq!(list_view.get(), both);
        assert_eq!(badge.get(), both);
        assert_eq!(
            slot.get("patients").unwrap().as_deref(),
            Some(r#"["Amina","Baraka"]"#)
        );
    }

    #[test]
    fn test_apply_accepts_plain_values() {
        let scheduler = ManualScheduler::new();
        let tab = tab(&MemorySlot::new(), &LocalBus::new(), &scheduler);

        let store = tab.open("label", String::from("a"));
        store.apply("b".to_string());
        assert_eq!(store.get(), "b");
        store.with(|s| assert_eq!(s.len(), 1));
    }
}
