//! Shared store context for all platforms.
//!
//! [`make_store_context`] picks the platform backends:
//! - **Web** (WASM + `web` feature): `localStorage` via [`store::LocalStorageSlot`],
//!   tab-to-tab sync via [`store::BroadcastBus`]
//! - **WASM without `web`**: in-memory only, via [`store::MemorySlot`]
//! - **Desktop / Mobile** (native): files via [`store::FileSlot`], with an
//!   in-process [`store::LocalBus`] since there is only one window
//!
//! Native builds also read `store.toml` from the data directory; the web build
//! uses the default [`StoreConfig`].

use std::time::Duration;

use dioxus::prelude::*;
use store::{Scheduler, StoreConfig, StoreContext, TimerHandle};

/// Runs store timers as Dioxus tasks.
#[derive(Clone, Copy, Debug, Default)]
pub struct DioxusScheduler;

impl Scheduler for DioxusScheduler {
    fn schedule(&self, delay: Duration, task: store::scheduler::Task) -> TimerHandle {
        let handle = spawn(async move {
            #[cfg(target_arch = "wasm32")]
            gloo_timers::future::sleep(delay).await;
            #[cfg(not(target_arch = "wasm32"))]
            tokio::time::sleep(delay).await;
            task();
        });
        TimerHandle::new(move || handle.cancel())
    }
}

/// Create a platform-appropriate store context scoped to an optional user ID.
///
/// When `user_id` is `Some("uuid")` every key is prefixed with `"uuid:"`, so
/// two users of the same browser or machine never see each other's data.
pub fn make_store_context(user_id: Option<&str>) -> StoreContext {
    #[cfg(not(target_arch = "wasm32"))]
    let base = dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("clinic");
    #[cfg(not(target_arch = "wasm32"))]
    let mut config = StoreConfig::load(&base);
    #[cfg(target_arch = "wasm32")]
    let mut config = StoreConfig::default();
    if let Some(id) = user_id {
        config = config.with_namespace(id);
    }

    #[cfg(all(target_arch = "wasm32", feature = "web"))]
    {
        let context = match store::BroadcastBus::open(&config.sync.channel_name) {
            Ok(bus) => StoreContext::new(store::LocalStorageSlot::new(), bus, DioxusScheduler),
            Err(error) => {
                tracing::warn!(%error, "tab sync unavailable, changes stay in this tab");
                StoreContext::new(
                    store::LocalStorageSlot::new(),
                    store::LocalBus::new().connect(DioxusScheduler),
                    DioxusScheduler,
                )
            }
        };
        context.with_config(config)
    }
    #[cfg(all(target_arch = "wasm32", not(feature = "web")))]
    {
        StoreContext::new(
            store::MemorySlot::new(),
            store::LocalBus::new().connect(DioxusScheduler),
            DioxusScheduler,
        )
        .with_config(config)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        StoreContext::new(
            store::FileSlot::new(base),
            store::LocalBus::new().connect(DioxusScheduler),
            DioxusScheduler,
        )
        .with_config(config)
    }
}

/// Provider component that makes a [`StoreContext`] available to descendants.
#[component]
pub fn StoreProvider(user_id: Option<String>, children: Element) -> Element {
    use_context_provider(|| make_store_context(user_id.as_deref()));

    rsx! {
        {children}
    }
}
