//! Dioxus bindings for the persistent store and pagination helpers.
//!
//! Wrap the app in [`StoreProvider`], then call [`use_persistent`] or
//! [`use_pagination`] from any component below it.

mod context;
pub use context::{make_store_context, DioxusScheduler, StoreProvider};

mod persistent;
pub use persistent::{use_persistent, UsePersistent};

mod pagination;
pub use pagination::{use_pagination, UsePagination};
