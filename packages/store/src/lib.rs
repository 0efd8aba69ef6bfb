//! Local persistent reactive store and pagination helpers.
//!
//! [`PersistentStore`] mirrors a value into durable client-side storage with
//! debounced writes and cross-context change propagation; [`pagination`] holds
//! the pure page-bound arithmetic used by list views.

pub mod config;
pub mod error;
pub mod notify;
pub mod pagination;
pub mod scheduler;
pub mod slot;

mod context;
mod persistent;
pub use context::StoreContext;
pub use persistent::{PersistentStore, Update};

mod memory;
pub use memory::MemorySlot;

#[cfg(not(target_arch = "wasm32"))]
mod file_store;
#[cfg(not(target_arch = "wasm32"))]
pub use file_store::FileSlot;

#[cfg(all(target_arch = "wasm32", feature = "web"))]
mod local_storage;
#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub use local_storage::{BroadcastBus, LocalStorageSlot};

pub use config::StoreConfig;
pub use error::StoreError;
pub use notify::{BusContext, ChangeChannel, ChangeNotice, LocalBus, Subscription};
pub use pagination::{PageItem, PaginationState, Paginator};
#[cfg(not(target_arch = "wasm32"))]
pub use scheduler::TokioScheduler;
pub use scheduler::{ManualScheduler, Scheduler, TimerHandle};
pub use slot::{read, DurableSlot};
