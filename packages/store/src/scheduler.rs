//! # Timers for debounced writes and deferred deliveries
//!
//! The store never sleeps itself; it asks a [`Scheduler`] to run a callback
//! later and keeps the returned [`TimerHandle`] so the callback can be
//! cancelled when a newer update supersedes it.
//!
//! | Scheduler | Where |
//! |-----------|-------|
//! | [`ManualScheduler`] | Virtual clock advanced by hand. Deterministic tests. |
//! | [`TokioScheduler`] | Native, inside a `tokio::task::LocalSet`. |
//! | `ui::DioxusScheduler` | Dioxus tasks, web and desktop. |
//!
//! Everything here is single-threaded: callbacks are `FnOnce() + 'static`,
//! not `Send`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

/// A callback scheduled to run once.
pub type Task = Box<dyn FnOnce()>;

/// Something that can run a callback after a delay.
pub trait Scheduler {
    /// Run `task` once `delay` has elapsed. Must not run it synchronously.
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Handle to a scheduled callback. Dropping it cancels the callback.
#[must_use = "dropping a TimerHandle cancels the scheduled callback"]
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel the callback if it has not run yet.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Let the callback run without keeping the handle around.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        (**self).schedule(delay, task)
    }
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, u64), Task>,
}

/// Scheduler driven by an explicit virtual clock.
///
/// Nothing runs until [`advance`](ManualScheduler::advance) or
/// [`run_until_idle`](ManualScheduler::run_until_idle) is called. Callbacks due
/// at the same instant run in scheduling order.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of callbacks waiting to run.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Move the clock forward by `by`, running every callback that falls due,
    /// including ones scheduled by callbacks along the way.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        while let Some(task) = self.pop_due(Some(target)) {
            task();
        }
        self.state.borrow_mut().now = target;
    }

    /// Run callbacks, moving the clock as needed, until the queue is empty.
    pub fn run_until_idle(&self) {
        while let Some(task) = self.pop_due(None) {
            task();
        }
    }

    fn pop_due(&self, limit: Option<Duration>) -> Option<Task> {
        let mut state = self.state.borrow_mut();
        let (due, id) = *state.queue.keys().next()?;
        if limit.is_some_and(|limit| due > limit) {
            return None;
        }
        state.now = state.now.max(due);
        state.queue.remove(&(due, id))
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let slot = {
            let mut state = self.state.borrow_mut();
            let slot = (state.now + delay, state.next_id);
            state.next_id += 1;
            state.queue.insert(slot, task);
            slot
        };
        let state = Rc::downgrade(&self.state);
        TimerHandle::new(move || {
            if let Some(state) = state.upgrade() {
                // Bind so the removed task drops after the borrow ends.
                let removed = state.borrow_mut().queue.remove(&slot);
                drop(removed);
            }
        })
    }
}

/// Scheduler backed by `tokio::task::spawn_local`.
///
/// Must be used from inside a `tokio::task::LocalSet`.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

#[cfg(not(target_arch = "wasm32"))]
impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let join = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        TimerHandle::new(move || join.abort())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() -> Task) {
        let hits = Rc::new(Cell::new(0));
        let make = {
            let hits = hits.clone();
            move || -> Task {
                let hits = hits.clone();
                Box::new(move || hits.set(hits.get() + 1))
            }
        };
        (hits, make)
    }

    #[test]
    fn test_manual_runs_only_when_due() {
        let scheduler = ManualScheduler::new();
        let (hits, task) = counter();

        scheduler.schedule(Duration::from_millis(500), task()).detach();
        scheduler.advance(Duration::from_millis(499));
        assert_eq!(hits.get(), 0);

        scheduler.advance(Duration::from_millis(1));
        assert_eq!(hits.get(), 1);
        assert_eq!(scheduler.now(), Duration::from_millis(500));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_dropping_handle_cancels() {
        let scheduler = ManualScheduler::new();
        let (hits, task) = counter();

        let handle = scheduler.schedule(Duration::from_millis(10), task());
        drop(handle);
        scheduler.run_until_idle();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_explicit_cancel() {
        let scheduler = ManualScheduler::new();
        let (hits, task) = counter();

        let handle = scheduler.schedule(Duration::ZERO, task());
        handle.cancel();
        assert_eq!(scheduler.pending(), 0);
        scheduler.run_until_idle();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_callbacks_can_schedule_more() {
        let scheduler = ManualScheduler::new();
        let (hits, task) = counter();

        let inner = scheduler.clone();
        let follow_up = task();
        scheduler
            .schedule(
                Duration::from_millis(5),
                Box::new(move || inner.schedule(Duration::from_millis(5), follow_up).detach()),
            )
            .detach();

        scheduler.advance(Duration::from_millis(10));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_same_instant_runs_in_order() {
        let scheduler = ManualScheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            scheduler
                .schedule(Duration::ZERO, Box::new(move || order.borrow_mut().push(i)))
                .detach();
        }
        scheduler.run_until_idle();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_fires_and_cancels() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (hits, task) = counter();
                TokioScheduler
                    .schedule(Duration::from_millis(100), task())
                    .detach();
                let cancelled = TokioScheduler.schedule(Duration::from_millis(100), task());
                cancelled.cancel();

                tokio::time::sleep(Duration::from_millis(150)).await;
                assert_eq!(hits.get(), 1);
            })
            .await;
    }
}
