//! # Cross-context change notices
//!
//! When a store flushes a value it publishes a [`ChangeNotice`] so every other
//! context sharing the same durable storage can pick the value up. A context
//! never receives its own notices.
//!
//! | Channel | Transport |
//! |---------|-----------|
//! | [`LocalBus`] | In-process fan-out; deliveries are deferred through each subscriber's [`Scheduler`]. |
//! | `BroadcastBus` | Browser `BroadcastChannel` (wasm, `web` feature). |
//!
//! On the wire a notice is the JSON object `{"key": ..., "newValue": ...}`,
//! with `newValue: null` meaning the slot was removed.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::Scheduler;

/// A durable slot changed in some context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotice {
    pub key: String,
    /// Serialized value now in the slot, or `None` after a removal.
    pub new_value: Option<String>,
}

pub type Listener = Rc<dyn Fn(&ChangeNotice)>;

/// Publish/subscribe medium shared by all contexts of an origin.
pub trait ChangeChannel {
    /// Deliver `notice` to every subscriber in every *other* context.
    fn publish(&self, notice: &ChangeNotice);

    /// Register `listener` for notices from other contexts.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

impl<C: ChangeChannel + ?Sized> ChangeChannel for Rc<C> {
    fn publish(&self, notice: &ChangeNotice) {
        (**self).publish(notice)
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        (**self).subscribe(listener)
    }
}

/// Registration guard; dropping it detaches the listener.
#[must_use = "dropping a Subscription detaches the listener"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

struct Subscriber {
    id: u64,
    context: u64,
    listener: Listener,
    scheduler: Rc<dyn Scheduler>,
}

#[derive(Default)]
struct BusState {
    next_context: u64,
    next_subscriber: u64,
    subscribers: Vec<Subscriber>,
}

impl BusState {
    fn is_subscribed(&self, id: u64) -> bool {
        self.subscribers.iter().any(|s| s.id == id)
    }
}

/// In-process stand-in for the browser's cross-tab broadcast.
///
/// Each [`connect`](LocalBus::connect) call yields a [`BusContext`], the
/// equivalent of one tab.
#[derive(Clone, Default)]
pub struct LocalBus {
    state: Rc<RefCell<BusState>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the bus as a new context whose deliveries run on `scheduler`.
    pub fn connect(&self, scheduler: impl Scheduler + 'static) -> BusContext {
        let mut state = self.state.borrow_mut();
        let id = state.next_context;
        state.next_context += 1;
        BusContext {
            id,
            bus: self.state.clone(),
            scheduler: Rc::new(scheduler),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }
}

/// One context's endpoint on a [`LocalBus`].
pub struct BusContext {
    id: u64,
    bus: Rc<RefCell<BusState>>,
    scheduler: Rc<dyn Scheduler>,
}

impl ChangeChannel for BusContext {
    fn publish(&self, notice: &ChangeNotice) {
        let targets: Vec<(u64, Listener, Rc<dyn Scheduler>)> = self
            .bus
            .borrow()
            .subscribers
            .iter()
            .filter(|s| s.context != self.id)
            .map(|s| (s.id, s.listener.clone(), s.scheduler.clone()))
            .collect();

        for (id, listener, scheduler) in targets {
            let bus: Weak<RefCell<BusState>> = Rc::downgrade(&self.bus);
            let notice = notice.clone();
            scheduler
                .schedule(
                    Duration::ZERO,
                    Box::new(move || {
                        let attached = bus
                            .upgrade()
                            .is_some_and(|bus| bus.borrow().is_subscribed(id));
                        if attached {
                            listener(&notice);
                        }
                    }),
                )
                .detach();
        }
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        let id = {
            let mut state = self.bus.borrow_mut();
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.push(Subscriber {
                id,
                context: self.id,
                listener,
                scheduler: self.scheduler.clone(),
            });
            id
        };

        let bus = Rc::downgrade(&self.bus);
        Subscription::new(move || {
            if let Some(bus) = bus.upgrade() {
                let removed: Vec<Subscriber> = {
                    let mut state = bus.borrow_mut();
                    let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.subscribers)
                        .into_iter()
                        .partition(|s| s.id == id);
                    state.subscribers = kept;
                    gone
                };
                drop(removed);
            }
        })
    }
}
